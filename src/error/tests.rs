//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("invalid budget");
        assert_eq!(err.to_string(), "configuration error: invalid budget");
    }

    #[test]
    fn test_collaborator_error_display() {
        let err = Error::collaborator("pdftotext", "exit status 1");
        assert_eq!(err.to_string(), "pdftotext failed: exit status 1");
    }

    #[test]
    fn test_storage_error_conversion() {
        let storage_err = StorageError::Database("connection failed".to_string());
        let err: Error = storage_err.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_backend_error_conversion() {
        let backend_err = BackendError::Status {
            status: 429,
            body: "rate limited".to_string(),
        };
        let err: Error = backend_err.into();
        assert!(matches!(err, Error::Backend(_)));
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_backend_request_helper() {
        let err = BackendError::request("https://models.example", "connection refused");
        assert_eq!(
            err.to_string(),
            "request to https://models.example failed: connection refused"
        );
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::WatchFailed {
            path: "/tmp/test".to_string(),
            reason: "permission denied".to_string(),
        };
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_pipeline_error_messages() {
        assert_eq!(
            PipelineError::NoModelAvailable.to_string(),
            "no language model is available"
        );
        assert_eq!(
            PipelineError::WritebackFailed("403".to_string()).to_string(),
            "analysis complete, persistence failed: 403"
        );
    }

    #[test]
    fn test_only_writeback_failure_keeps_analysis() {
        assert!(PipelineError::WritebackFailed(String::new()).analysis_survived());
        assert!(!PipelineError::GenerationFailed(String::new()).analysis_survived());
        assert!(!PipelineError::ExtractionEmpty.analysis_survived());
        assert!(!PipelineError::NoModelAvailable.analysis_survived());
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(Error::config("test error"))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::Internal("something went wrong".to_string());
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Internal"));
        assert!(debug_str.contains("something went wrong"));
    }
}
