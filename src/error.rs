use thiserror::Error;

/// Everything the spectrum pipeline can fail with. None of these are
/// recoverable: a run that hits one stops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpectrumError {
    /// Bad grid shape, dimensions or run parameters. Detected before any
    /// transform or reduction is attempted.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A local buffer or index range that does not fit the layout it claims.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A collective that could not complete consistently across ranks.
    #[error("collective failure: {0}")]
    Collective(String),
}

impl SpectrumError {
    pub(crate) fn config<S: Into<String>>(msg: S) -> SpectrumError {
        SpectrumError::InvalidConfiguration(msg.into())
    }

    pub(crate) fn input<S: Into<String>>(msg: S) -> SpectrumError {
        SpectrumError::InvalidInput(msg.into())
    }

    pub(crate) fn collective<S: Into<String>>(msg: S) -> SpectrumError {
        SpectrumError::Collective(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SpectrumError>;
