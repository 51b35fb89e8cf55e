/*!
Tests for error handling and the failure taxonomy.
*/

#[cfg(test)]
mod tests {
    use crate::error::{FailureKind, StoreError};
    use crate::payload::DataKind;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_store_error_display() {
        let error = StoreError::InsufficientVolume { count: 2, min: 3 };
        assert_eq!(
            error.to_string(),
            "insufficient volume: only 2 items (minimum: 3)"
        );

        let error = StoreError::schema(DataKind::Flights, "record 0 is missing 'hora'");
        assert_eq!(
            error.to_string(),
            "schema violation for flights: record 0 is missing 'hora'"
        );

        let error = StoreError::storage("disk full");
        assert_eq!(error.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_io_failure_names_path() {
        let error = StoreError::IoFailure {
            path: PathBuf::from("public/vuelos.json"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let text = error.to_string();
        assert!(text.contains("public/vuelos.json"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn test_store_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        match StoreError::from(io_error) {
            StoreError::Io(_) => {}
            other => panic!("Expected Io error variant, got {other:?}"),
        }
    }

    #[test]
    fn test_store_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        match StoreError::from(json_error) {
            StoreError::Json(_) => {}
            other => panic!("Expected Json error variant, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            StoreError::empty("null").failure_kind(),
            FailureKind::EmptyPayload
        );
        assert_eq!(
            StoreError::InsufficientVolume { count: 1, min: 2 }.failure_kind(),
            FailureKind::InsufficientVolume
        );
        assert_eq!(
            StoreError::invalid_payload("scalar").failure_kind(),
            FailureKind::SchemaViolation
        );
        assert_eq!(
            StoreError::storage("boom").failure_kind(),
            FailureKind::IoFailure
        );
    }

    #[test]
    fn test_rejections_are_not_io() {
        assert!(StoreError::empty("x").is_rejection());
        assert!(StoreError::schema(DataKind::Cruises, "x").is_rejection());
        assert!(!StoreError::Io(io::Error::new(io::ErrorKind::Other, "x")).is_rejection());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<StoreError>();
        assert_sync::<StoreError>();
    }
}
