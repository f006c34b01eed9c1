use skein_types::error::SkeinError;
use thiserror::Error;

/// Errors raised at the store layer.
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum StoreError {
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("node error: {0}")]
    Core(#[from] SkeinError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = StoreError::ConfigError {
            reason: "start_slots must be positive".to_string(),
        };
        assert!(err.to_string().contains("start_slots must be positive"));
    }

    #[test]
    fn test_core_error_from() {
        let err: StoreError = SkeinError::NotFound { token: 7 }.into();
        assert!(matches!(err, StoreError::Core(SkeinError::NotFound { token: 7 })));
        assert!(err.to_string().contains("0x7"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::IoError(_)));
    }
}
