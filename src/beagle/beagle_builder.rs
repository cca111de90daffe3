use anyhow::bail;
use log::info;

use crate::beagle::errors::BeagleError;
use crate::beagle::kernels::KernelVariant;
use crate::beagle::scaling::DEFAULT_EXPONENT_THRESHOLD;
use crate::beagle::BeagleInstance;
use crate::Result;

/// Buffer counts an instance is allocated with. None of them change after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceDims {
    pub tip_count: usize,
    pub partials_buffer_count: usize,
    pub compact_buffer_count: usize,
    pub state_count: usize,
    pub pattern_count: usize,
    pub eigen_buffer_count: usize,
    pub matrix_buffer_count: usize,
    pub category_count: usize,
    pub scale_buffer_count: usize,
}

impl InstanceDims {
    pub fn partials_size(&self) -> usize {
        self.category_count * self.pattern_count * self.state_count
    }

    pub fn matrix_size(&self) -> usize {
        self.state_count * self.state_count
    }
}

/// When to rescale a freshly written buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingPolicy {
    pub enabled: bool,
    /// Rescale when the exponent flag of the written values exceeds this value.
    pub exponent_threshold: u32,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            exponent_threshold: DEFAULT_EXPONENT_THRESHOLD,
        }
    }
}

pub struct BeagleBuilder {
    dims: InstanceDims,
    scaling: ScalingPolicy,
    force_general: bool,
}

impl BeagleBuilder {
    /// Creates a builder with one eigen buffer, one rate category, no named scale buffers
    /// and one transition matrix per partials buffer.
    ///
    /// # Arguments
    /// * `tip_count` - Number of tips, tip buffers are indices `0..tip_count`.
    /// * `partials_buffer_count` - Total number of partials buffers, tips included.
    /// * `compact_buffer_count` - Number of tips that may hold compact states.
    /// * `state_count` - Size of the state alphabet.
    /// * `pattern_count` - Number of site patterns.
    ///
    /// # Example
    /// ```
    /// use phylo_beagle::beagle::BeagleBuilder;
    /// let instance = BeagleBuilder::new(3, 5, 3, 4, 10).categories(4).build().unwrap();
    /// assert_eq!(instance.dims().category_count, 4);
    /// ```
    pub fn new(
        tip_count: usize,
        partials_buffer_count: usize,
        compact_buffer_count: usize,
        state_count: usize,
        pattern_count: usize,
    ) -> BeagleBuilder {
        BeagleBuilder {
            dims: InstanceDims {
                tip_count,
                partials_buffer_count,
                compact_buffer_count,
                state_count,
                pattern_count,
                eigen_buffer_count: 1,
                matrix_buffer_count: partials_buffer_count,
                category_count: 1,
                scale_buffer_count: 0,
            },
            scaling: ScalingPolicy::default(),
            force_general: false,
        }
    }

    pub fn eigen_buffers(mut self, count: usize) -> BeagleBuilder {
        self.dims.eigen_buffer_count = count;
        self
    }

    pub fn matrix_buffers(mut self, count: usize) -> BeagleBuilder {
        self.dims.matrix_buffer_count = count;
        self
    }

    pub fn categories(mut self, count: usize) -> BeagleBuilder {
        self.dims.category_count = count;
        self
    }

    pub fn scale_buffers(mut self, count: usize) -> BeagleBuilder {
        self.dims.scale_buffer_count = count;
        self
    }

    pub fn scaling_threshold(mut self, exponent_threshold: u32) -> BeagleBuilder {
        self.scaling.exponent_threshold = exponent_threshold;
        self
    }

    pub fn disable_scaling(mut self) -> BeagleBuilder {
        self.scaling.enabled = false;
        self
    }

    /// Uses the general kernels even for four states.
    pub fn general_kernels(mut self) -> BeagleBuilder {
        self.force_general = true;
        self
    }

    pub fn build(self) -> Result<BeagleInstance> {
        let dims = self.dims;
        check_minimum("pattern count", dims.pattern_count, 1)?;
        check_minimum("category count", dims.category_count, 1)?;
        check_minimum("state count", dims.state_count, 2)?;
        check_minimum("eigen buffer count", dims.eigen_buffer_count, 1)?;
        check_minimum("partials buffer count", dims.partials_buffer_count, dims.tip_count)?;

        let kernel = if self.force_general {
            KernelVariant::General
        } else {
            KernelVariant::for_state_count(dims.state_count)
        };
        info!(
            "Setting up likelihood instance with {} tips, {} partials buffers, {} states, {} patterns and {} rate categories.",
            dims.tip_count,
            dims.partials_buffer_count,
            dims.state_count,
            dims.pattern_count,
            dims.category_count
        );
        info!(
            "Using {:?} kernels, scaling {}.",
            kernel,
            if self.scaling.enabled {
                format!("above exponent {}", self.scaling.exponent_threshold)
            } else {
                "disabled".to_string()
            }
        );
        Ok(BeagleInstance::allocate(dims, self.scaling, kernel))
    }
}

fn check_minimum(name: &'static str, value: usize, minimum: usize) -> Result<()> {
    if value < minimum {
        bail!(BeagleError::InvalidDimension {
            name,
            value,
            minimum
        });
    }
    Ok(())
}
