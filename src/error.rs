use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CfdError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Unknown solver: {0}")]
    UnknownSolver(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("Solver diverged: {0}")]
    Diverged(String),

    #[error("Pressure solve did not converge after {iterations} iterations (residual: {residual:.3e})")]
    MaxIterationsExceeded { iterations: usize, residual: f64 },

    #[error("I/O error: {0}")]
    Io(String),
}

pub type CfdResult<T> = Result<T, CfdError>;

impl CfdError {
    pub fn status(&self) -> StatusCode {
        match self {
            CfdError::InvalidArgument(_) => StatusCode::Invalid,
            CfdError::OutOfMemory(_) => StatusCode::OutOfMemory,
            CfdError::UnknownSolver(_) => StatusCode::UnknownSolver,
            CfdError::UnsupportedBackend(_) => StatusCode::Unsupported,
            CfdError::Diverged(_) => StatusCode::Diverged,
            CfdError::MaxIterationsExceeded { .. } => StatusCode::MaxIterations,
            CfdError::Io(_) => StatusCode::Io,
        }
    }
}

impl From<std::io::Error> for CfdError {
    fn from(err: std::io::Error) -> Self {
        CfdError::Io(err.to_string())
    }
}

/// Integer status codes handed to callers that cannot carry a `CfdError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Success,
    Error,
    OutOfMemory,
    Invalid,
    Io,
    Unsupported,
    Diverged,
    MaxIterations,
    UnknownSolver,
}

impl StatusCode {
    pub const ALL: [StatusCode; 9] = [
        StatusCode::Success,
        StatusCode::Error,
        StatusCode::OutOfMemory,
        StatusCode::Invalid,
        StatusCode::Io,
        StatusCode::Unsupported,
        StatusCode::Diverged,
        StatusCode::MaxIterations,
        StatusCode::UnknownSolver,
    ];

    pub fn code(self) -> i32 {
        match self {
            StatusCode::Success => 0,
            StatusCode::Error => -1,
            StatusCode::OutOfMemory => -2,
            StatusCode::Invalid => -3,
            StatusCode::Io => -4,
            StatusCode::Unsupported => -5,
            StatusCode::Diverged => -6,
            StatusCode::MaxIterations => -7,
            StatusCode::UnknownSolver => -8,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }

    pub fn description(self) -> &'static str {
        match self {
            StatusCode::Success => "Success",
            StatusCode::Error => "Generic error",
            StatusCode::OutOfMemory => "Out of memory",
            StatusCode::Invalid => "Invalid argument",
            StatusCode::Io => "I/O error",
            StatusCode::Unsupported => "Unsupported operation or backend",
            StatusCode::Diverged => "Solver diverged",
            StatusCode::MaxIterations => "Maximum iterations reached without convergence",
            StatusCode::UnknownSolver => "Unknown solver",
        }
    }
}

/// Describes a raw status code; unknown codes get a generic description.
pub fn error_string(code: i32) -> &'static str {
    StatusCode::from_code(code)
        .map(StatusCode::description)
        .unwrap_or("Unknown status code")
}

/// The last failure recorded by a simulation context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub status: StatusCode,
    pub message: String,
}

impl From<&CfdError> for ErrorRecord {
    fn from(err: &CfdError) -> Self {
        Self {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip_and_are_unique() {
        let mut codes: Vec<i32> = StatusCode::ALL.iter().map(|s| s.code()).collect();
        for status in StatusCode::ALL {
            assert_eq!(StatusCode::from_code(status.code()), Some(status));
        }
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), StatusCode::ALL.len());
        assert_eq!(StatusCode::from_code(42), None);
    }

    #[test]
    fn test_error_maps_to_status() {
        assert_eq!(CfdError::InvalidArgument("x".into()).status(), StatusCode::Invalid);
        assert_eq!(CfdError::UnknownSolver("x".into()).status(), StatusCode::UnknownSolver);
        assert_eq!(
            CfdError::MaxIterationsExceeded { iterations: 3, residual: 0.1 }.status(),
            StatusCode::MaxIterations
        );
        let record = ErrorRecord::from(&CfdError::Diverged("nan in u".into()));
        assert_eq!(record.status.code(), -6);
        assert!(record.message.contains("nan in u"));
    }

    #[test]
    fn test_error_string() {
        assert_eq!(error_string(0), "Success");
        assert_eq!(error_string(-3), "Invalid argument");
        assert_eq!(error_string(999), "Unknown status code");
    }

    #[test]
    fn test_io_error_conversion() {
        let err: CfdError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.json").into();
        assert!(matches!(err, CfdError::Io(ref msg) if msg.contains("missing.json")));
    }
}
