use fill_the_drive::config::RunConfig;
use fill_the_drive::error::{self, is_out_of_space};
use fill_the_drive::FtdError;
use std::io;

#[test]
fn test_validation_errors_are_config_errors() {
    let temp_dir = tempfile::tempdir().unwrap();
    let data = temp_dir.path().join("data.dat");
    std::fs::write(&data, b"keep me").unwrap();

    for config in [
        RunConfig::new("bogus"),
        RunConfig::new("loop").with_fill(300),
        RunConfig::new("fill").with_size_kb(0),
        RunConfig::new("loop").with_duration_secs(-1.0),
    ] {
        let err = config
            .with_data_filepath(data.clone())
            .into_plan()
            .expect_err("validation should fail");
        assert!(matches!(err, FtdError::ConfigError(_)));
        assert!(error::user_friendly_message(&err).contains("Configuration error"));
    }

    // nothing truncated
    assert_eq!(std::fs::read(&data).unwrap(), b"keep me");
}

#[test]
fn test_user_friendly_messages() {
    let full = FtdError::IoError(io::Error::from(io::ErrorKind::StorageFull));
    assert!(error::user_friendly_message(&full).contains("full"));

    let denied = FtdError::IoError(io::Error::from(io::ErrorKind::PermissionDenied));
    assert!(error::user_friendly_message(&denied).contains("Permission denied"));

    let cancelled = FtdError::CancellationError("stopped".into());
    assert!(error::is_cancellation(&cancelled));
    assert!(error::user_friendly_message(&cancelled).contains("cancelled"));
    assert!(!error::is_cancellation(&denied));
}

#[cfg(unix)]
#[test]
fn test_out_of_space_detection() {
    assert!(is_out_of_space(&io::Error::from_raw_os_error(libc::ENOSPC)));
    assert!(is_out_of_space(&io::Error::from(io::ErrorKind::StorageFull)));
    assert!(!is_out_of_space(&io::Error::from(io::ErrorKind::NotFound)));
}
