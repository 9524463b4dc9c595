use std::path::PathBuf;

/// Error reported by the `xrdfit` binary.
///
/// Carries the process exit code next to a human-readable message:
/// - 2: bad input or usage
/// - 3: nothing to fit
/// - 4: fitting failed
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let exit_code = match &err {
            FitError::InsufficientData { .. } => 3,
            FitError::ModelMismatch(_) => 4,
            FitError::InvalidTrace(_)
            | FitError::InvalidInput(_)
            | FitError::Io { .. }
            | FitError::Parse { .. } => 2,
        };
        AppError::new(exit_code, err.to_string())
    }
}

/// Errors raised by the fitting engine and its IO helpers.
///
/// Fit *outcomes* (a peak that did not converge, an EoS fit that failed) are
/// not errors: they come back as structured results so batches can continue.
#[derive(Debug, thiserror::Error)]
pub enum FitError {
    #[error("insufficient data for {operation}: need at least {required}, got {actual}")]
    InsufficientData {
        operation: &'static str,
        required: usize,
        actual: usize,
    },
    #[error("invalid trace: {0}")]
    InvalidTrace(String),
    #[error("model evaluated outside its domain: {0}")]
    ModelMismatch(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse '{}' line {line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

pub type Result<T, E = FitError> = std::result::Result<T, E>;
