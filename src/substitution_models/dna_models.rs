use std::fmt::Display;

use anyhow::bail;
use approx::relative_eq;
use log::{info, warn};

use crate::substitution_models::{FreqVector, SubstMatrix, SubstitutionModel};
use crate::Result;

pub const NUCLEOTIDES: &[u8] = b"ACGT";

#[derive(Clone, Copy, Debug, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub enum DNAModelType {
    JC69,
    K80,
    HKY,
    GTR,
}

impl Display for DNAModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DNAModelType::JC69 => write!(f, "JC69"),
            DNAModelType::K80 => write!(f, "K80"),
            DNAModelType::HKY => write!(f, "HKY"),
            DNAModelType::GTR => write!(f, "GTR"),
        }
    }
}

impl DNAModelType {
    pub fn get_model_type(model_name: &str) -> Self {
        match model_name.to_uppercase().as_str() {
            "JC69" => DNAModelType::JC69,
            "K80" => DNAModelType::K80,
            "HKY" => DNAModelType::HKY,
            "GTR" => DNAModelType::GTR,
            _ => {
                warn!("Unknown DNA model requested, defaulting to GTR.");
                DNAModelType::GTR
            }
        }
    }
}

/// Frequencies and exchangeabilities of a reversible nucleotide model, states in ACGT
/// order.
#[derive(Clone, Debug, PartialEq)]
pub struct DNASubstParams {
    pub(crate) pi: FreqVector,
    pub(crate) rac: f64,
    pub(crate) rag: f64,
    pub(crate) rat: f64,
    pub(crate) rcg: f64,
    pub(crate) rct: f64,
    pub(crate) rgt: f64,
}

impl Display for DNASubstParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[pi = {:?}, rac = {}, rag = {}, rat = {}, rcg = {}, rct = {}, rgt = {}]",
            self.pi.as_slice(),
            self.rac,
            self.rag,
            self.rat,
            self.rcg,
            self.rct,
            self.rgt
        )
    }
}

impl From<DNASubstParams> for Vec<f64> {
    fn from(val: DNASubstParams) -> Self {
        vec![
            val.pi[0], val.pi[1], val.pi[2], val.pi[3], val.rac, val.rag, val.rat, val.rcg,
            val.rct, val.rgt,
        ]
    }
}

impl DNASubstParams {
    fn uniform(pi: FreqVector, transition: f64, transversion: f64) -> Self {
        DNASubstParams {
            pi,
            rac: transversion,
            rag: transition,
            rat: transversion,
            rcg: transversion,
            rct: transition,
            rgt: transversion,
        }
    }

    pub fn pi(&self) -> &FreqVector {
        &self.pi
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DNASubstModel {
    pub(crate) model_type: DNAModelType,
    pub(crate) params: DNASubstParams,
    pub(crate) q: SubstMatrix,
}

impl SubstitutionModel for DNASubstModel {
    const N: usize = 4;
    const ALPHABET: &'static [u8] = NUCLEOTIDES;

    fn q(&self) -> &SubstMatrix {
        &self.q
    }

    fn freqs(&self) -> &FreqVector {
        &self.params.pi
    }
}

impl DNASubstModel {
    /// Sets up a nucleotide model normalised to one expected substitution per unit time.
    ///
    /// Parameters per model: none for JC69; `kappa` or `alpha, beta` for K80; four
    /// frequencies and `kappa` for HKY; four frequencies and the rates `ac, ag, at, cg, ct,
    /// gt` for GTR. Frequencies are in ACGT order.
    ///
    /// # Example
    /// ```
    /// use phylo_beagle::substitution_models::{DNAModelType, DNASubstModel, SubstitutionModel};
    /// let model = DNASubstModel::new(DNAModelType::K80, &[2.0]).unwrap();
    /// assert!((model.mean_rate() - 1.0).abs() < 1e-12);
    /// ```
    pub fn new(model_type: DNAModelType, model_params: &[f64]) -> Result<Self> {
        let params = match model_type {
            DNAModelType::JC69 => parse_jc69_parameters(model_params),
            DNAModelType::K80 => parse_k80_parameters(model_params)?,
            DNAModelType::HKY => parse_hky_parameters(model_params)?,
            DNAModelType::GTR => parse_gtr_parameters(model_params)?,
        };
        info!("Setting up {} with parameters: {}", model_type, params);
        Ok(Self::from_params(model_type, params))
    }

    fn from_params(model_type: DNAModelType, params: DNASubstParams) -> Self {
        let q = gtr_q(&params);
        DNASubstModel {
            model_type,
            params,
            q,
        }
    }

    /// Replaces the stationary frequencies, keeping the exchangeabilities.
    pub fn with_frequencies(self, freqs: &[f64]) -> Result<Self> {
        let mut params = self.params;
        params.pi = make_pi(freqs)?;
        info!("Using stationary frequencies {:?}", params.pi.as_slice());
        Ok(Self::from_params(self.model_type, params))
    }

    pub fn model_type(&self) -> DNAModelType {
        self.model_type
    }

    pub fn params(&self) -> &DNASubstParams {
        &self.params
    }
}

pub(crate) fn make_pi(pi_array: &[f64]) -> Result<FreqVector> {
    if pi_array.len() != 4 {
        bail!(
            "There have to be 4 equilibrium frequencies for DNA models, got {}.",
            pi_array.len()
        );
    }
    if pi_array.iter().any(|&f| !(f > 0.0 && f.is_finite())) {
        bail!("The equilibrium frequencies have to be positive.");
    }
    let pi = FreqVector::from_column_slice(pi_array);
    if !relative_eq!(pi.sum(), 1.0, epsilon = 1e-10) {
        bail!("The equilibrium frequencies provided do not sum up to 1.");
    }
    Ok(pi)
}

fn check_rates(rates: &[f64]) -> Result<()> {
    if rates.iter().any(|&r| !(r > 0.0 && r.is_finite())) {
        bail!("Substitution rates have to be positive, got {:?}.", rates);
    }
    Ok(())
}

fn parse_jc69_parameters(model_params: &[f64]) -> DNASubstParams {
    if !model_params.is_empty() {
        warn!("Too many values provided for JC69, average rate is fixed at 1.0.");
    }
    DNASubstParams::uniform(FreqVector::from_column_slice(&[0.25; 4]), 1.0, 1.0)
}

fn parse_k80_parameters(model_params: &[f64]) -> Result<DNASubstParams> {
    let (alpha, beta) = if model_params.is_empty() {
        warn!("Too few values provided for K80, required 1 or 2 values, kappa or alpha and beta.");
        warn!("Falling back to default values.");
        (2.0, 1.0)
    } else if model_params.len() == 1 {
        (model_params[0], 1.0)
    } else if model_params.len() == 2 {
        (model_params[0], model_params[1])
    } else {
        warn!("Too many values provided for K80, required 2 values, alpha and beta.");
        warn!("Will only use the first two values provided.");
        (model_params[0], model_params[1])
    };
    check_rates(&[alpha, beta])?;
    Ok(DNASubstParams::uniform(
        FreqVector::from_column_slice(&[0.25; 4]),
        alpha,
        beta,
    ))
}

fn parse_hky_parameters(model_params: &[f64]) -> Result<DNASubstParams> {
    if model_params.len() != 5 {
        bail!(
            "{} parameters for the HKY model, expected 5, got {}",
            if model_params.len() < 5 {
                "Not enough"
            } else {
                "Too many"
            },
            model_params.len()
        );
    }
    let pi = make_pi(&model_params[0..4])?;
    check_rates(&model_params[4..5])?;
    Ok(DNASubstParams::uniform(pi, model_params[4], 1.0))
}

fn parse_gtr_parameters(model_params: &[f64]) -> Result<DNASubstParams> {
    if model_params.len() != 10 {
        bail!(
            "{} parameters for the GTR model, expected 10, got {}",
            if model_params.len() < 10 {
                "Not enough"
            } else {
                "Too many"
            },
            model_params.len()
        );
    }
    let pi = make_pi(&model_params[0..4])?;
    check_rates(&model_params[4..10])?;
    Ok(DNASubstParams {
        pi,
        rac: model_params[4],
        rag: model_params[5],
        rat: model_params[6],
        rcg: model_params[7],
        rct: model_params[8],
        rgt: model_params[9],
    })
}

/// Rate matrix `q_ij = r_ij π_j` scaled to a mean rate of one.
fn gtr_q(p: &DNASubstParams) -> SubstMatrix {
    let rates = [
        [0.0, p.rac, p.rag, p.rat],
        [p.rac, 0.0, p.rcg, p.rct],
        [p.rag, p.rcg, 0.0, p.rgt],
        [p.rat, p.rct, p.rgt, 0.0],
    ];
    let mut q = SubstMatrix::from_fn(4, 4, |i, j| rates[i][j] * p.pi[j]);
    for i in 0..4 {
        q[(i, i)] = -q.row(i).sum();
    }
    let total: f64 = (0..4).map(|i| -q[(i, i)] * p.pi[i]).sum();
    q / total
}
