use std::error::Error;
use std::fmt;

/// The kinds of fixed-size pools a `BeagleInstance` owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Partials,
    TipStates,
    TransitionMatrix,
    EigenDecomposition,
    StateFrequencies,
    CategoryWeights,
    ScaleFactors,
    SiteLogLikelihoods,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Partials => write!(f, "partials"),
            BufferKind::TipStates => write!(f, "tip states"),
            BufferKind::TransitionMatrix => write!(f, "transition matrix"),
            BufferKind::EigenDecomposition => write!(f, "eigen decomposition"),
            BufferKind::StateFrequencies => write!(f, "state frequencies"),
            BufferKind::CategoryWeights => write!(f, "category weights"),
            BufferKind::ScaleFactors => write!(f, "scale factors"),
            BufferKind::SiteLogLikelihoods => write!(f, "site log-likelihoods"),
        }
    }
}

/// Errors raised by the likelihood engine.
///
/// Everything except `FloatingPointRange` means the caller passed something inconsistent with
/// the instance layout and should abort. `FloatingPointRange` reports a non-finite
/// log-likelihood, which usually comes from one pathological parameter combination; callers
/// are expected to log it and carry on, see [`BeagleError::is_recoverable`].
#[derive(Debug, Clone, PartialEq)]
pub enum BeagleError {
    InvalidDimension {
        name: &'static str,
        value: usize,
        minimum: usize,
    },
    BufferOutOfRange {
        kind: BufferKind,
        index: usize,
        count: usize,
    },
    UninitialisedBuffer {
        kind: BufferKind,
        index: usize,
    },
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    InvalidOperationTuple {
        position: usize,
        value: i32,
    },
    AliasedOperation {
        destination: usize,
    },
    NotImplemented(&'static str),
    FloatingPointRange(f64),
}

impl BeagleError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BeagleError::FloatingPointRange(_))
    }
}

pub(crate) fn check_len(
    what: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), BeagleError> {
    if expected != actual {
        return Err(BeagleError::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

impl fmt::Display for BeagleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeagleError::InvalidDimension {
                name,
                value,
                minimum,
            } => write!(f, "{} must be at least {}, got {}", name, minimum, value),
            BeagleError::BufferOutOfRange { kind, index, count } => write!(
                f,
                "No {} buffer with index {}, the instance has {}",
                kind, index, count
            ),
            BeagleError::UninitialisedBuffer { kind, index } => {
                write!(f, "The {} buffer {} has not been set", kind, index)
            }
            BeagleError::LengthMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "Expected {} values for {}, got {}",
                expected, what, actual
            ),
            BeagleError::InvalidOperationTuple { position, value } => write!(
                f,
                "Invalid value {} at position {} of an operation tuple",
                value, position
            ),
            BeagleError::AliasedOperation { destination } => write!(
                f,
                "Operation writes to buffer {} which is also one of its children",
                destination
            ),
            BeagleError::NotImplemented(what) => write!(f, "{} is not implemented", what),
            BeagleError::FloatingPointRange(value) => write!(
                f,
                "Log-likelihood {} is outside of the floating point range",
                value
            ),
        }
    }
}

impl Error for BeagleError {}
