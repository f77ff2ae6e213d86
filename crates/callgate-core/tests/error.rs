//! Tests for error handling

use std::io;
use std::path::PathBuf;

use callgate_core::error::{CallgateError, CallgateResult};

#[test]
fn test_not_found_display()
{
    let error = CallgateError::NotFound("GetGold".to_string());
    assert_eq!(error.to_string(), "Function not found: GetGold");
}

#[test]
fn test_invalid_signature_display()
{
    let error = CallgateError::InvalidSignature {
        signature: "foo(int)".to_string(),
        token: Some("foo".to_string()),
        reason: "unknown type".to_string(),
    };
    let message = error.to_string();
    assert!(message.contains("foo(int)"));
    assert!(message.contains("unknown type"));
}

#[test]
fn test_timeout_display()
{
    let error = CallgateError::CallTimeout {
        function: "Hang".to_string(),
        timeout_ms: 5000,
    };
    assert_eq!(error.to_string(), "Call to Hang timed out after 5000 ms");
}

#[test]
fn test_memory_failure_display()
{
    let error = CallgateError::MemoryOperationFailed {
        address: 0x1000,
        reason: "unmapped".to_string(),
    };
    assert_eq!(error.to_string(), "Memory operation failed at 0x00001000: unmapped");
}

#[test]
fn test_file_io_keeps_path_and_source()
{
    let error = CallgateError::FileIo {
        path: PathBuf::from("/nowhere/functions.txt"),
        source: io::Error::new(io::ErrorKind::NotFound, "missing"),
    };
    assert!(error.to_string().contains("/nowhere/functions.txt"));
    assert!(std::error::Error::source(&error).is_some());
}

#[test]
fn test_io_error_conversion()
{
    fn fails() -> CallgateResult<()>
    {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))?;
        Ok(())
    }

    match fails() {
        Err(CallgateError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::PermissionDenied),
        other => panic!("expected Io, got {other:?}"),
    }
}

#[test]
fn test_script_error_display()
{
    let error = CallgateError::Script {
        line: 12,
        message: "expected ')'".to_string(),
    };
    assert_eq!(error.to_string(), "Script error at line 12: expected ')'");
}
