//! Tests for direct and context-switched calls against real native functions
//!
//! The functions below are ordinary `extern` functions of this test binary,
//! registered by address exactly as an operator would register a function
//! found in a disassembler.

#![cfg(any(all(target_arch = "x86_64", not(windows)), target_arch = "aarch64"))]

use std::thread;
use std::time::Duration;

use callgate_core::error::CallgateError;
use callgate_core::invoke::ContextCallOutcome;
use callgate_core::oplog::{LogDetail, ThreadType};
use callgate_core::settings::{DebugConfigUpdate, DebugSettings};
use callgate_core::{Session, SessionConfig, Value};

extern "C" fn add(a: i32, b: i32) -> i32
{
    a + b
}

extern "C" fn scale(value: f32, factor: f64) -> f64
{
    f64::from(value) * factor
}

extern "C" fn halve(value: f32) -> f32
{
    value / 2.0
}

extern "C" fn mask(value: u32) -> u32
{
    value & 0xFFFF_0000
}

extern "C" fn fill(buffer: *mut u8, value: u32)
{
    for i in 0..8 {
        unsafe { *buffer.add(i) = value as u8 + i as u8 };
    }
}

extern "C" fn identity(pointer: *const u8) -> *const u8
{
    pointer
}

extern "system" fn double_it(parameter: usize) -> usize
{
    parameter * 2
}

extern "system" fn sleep_for(millis: usize) -> usize
{
    thread::sleep(Duration::from_millis(millis as u64));
    0
}

fn session() -> Session
{
    Session::new(SessionConfig::default())
}

fn address_of(function: usize) -> u64
{
    function as u64
}

#[test]
fn test_direct_call_returns_int()
{
    let mut session = session();
    session.register("Add", address_of(add as usize), "int(int, int)", "").unwrap();

    let result = session.call("Add", &mut [Value::Int(2), Value::Int(-7)]).unwrap();
    assert_eq!(result, Value::Int(-5));
}

#[test]
fn test_direct_call_is_logged()
{
    let mut session = session();
    let entry = session.register("Add", address_of(add as usize), "int(int, int)", "").unwrap();
    session.call("Add", &mut [Value::Int(20), Value::Int(22)]).unwrap();

    let calls = session.show_calls(10);
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert!(call.success);
    assert!(call.duration_ms.is_some());
    assert_eq!(call.summary, format!("Add(20, 22) [direct] @ {} -> 42", entry.address));
    match &call.detail {
        LogDetail::Call(record) => {
            assert_eq!(record.thread_type, ThreadType::Direct);
            assert_eq!(record.return_value.as_deref(), Some("42"));
        }
        other => panic!("expected a call record, got {other:?}"),
    }
}

#[test]
fn test_logging_flags_shape_the_summary()
{
    let mut session = session();
    session.register("Add", address_of(add as usize), "int(int, int)", "").unwrap();
    session.debug_config(&DebugConfigUpdate {
        log_parameters: Some(false),
        log_return_values: Some(false),
        ..DebugConfigUpdate::default()
    });
    session.call("Add", &mut [Value::Int(1), Value::Int(1)]).unwrap();

    let summary = &session.show_calls(1)[0].summary;
    assert!(summary.starts_with("Add(...) [direct] @ 0x"));
    assert!(!summary.contains("->"));
}

#[test]
fn test_float_arguments_and_returns()
{
    let mut session = session();
    session.register("Scale", address_of(scale as usize), "double(float, double)", "").unwrap();
    session.register("Halve", address_of(halve as usize), "float(float)", "").unwrap();

    assert_eq!(session.call("Scale", &mut [Value::Float(1.5), Value::Int(4)]).unwrap(), Value::Float(6.0));
    assert_eq!(session.call("Halve", &mut [Value::Float(5.0)]).unwrap(), Value::Float(2.5));
}

#[test]
fn test_unsigned_values_above_i32_max()
{
    let mut session = session();
    session.register("Mask", address_of(mask as usize), "unsigned int(unsigned int)", "").unwrap();

    let result = session.call("Mask", &mut [Value::Int(0xDEAD_BEEF)]).unwrap();
    assert_eq!(result, Value::Int(0xDEAD_0000));
}

#[test]
fn test_buffer_is_an_out_parameter()
{
    let mut session = session();
    session.register("Fill", address_of(fill as usize), "void(char[8], unsigned int)", "").unwrap();

    let mut args = [Value::Buffer(vec![0; 8]), Value::Int(10)];
    assert_eq!(session.call("Fill", &mut args).unwrap(), Value::Void);
    assert_eq!(args[0], Value::Buffer(vec![10, 11, 12, 13, 14, 15, 16, 17]));
}

#[test]
fn test_pointer_round_trip()
{
    let mut session = session();
    session.register("Identity", address_of(identity as usize), "void*(void*)", "").unwrap();

    let result = session.call("Identity", &mut [Value::Pointer(0x1234)]).unwrap();
    assert_eq!(result, Value::Pointer(0x1234));
}

#[test]
fn test_mismatch_is_not_logged_as_a_call()
{
    let mut session = session();
    session.register("Add", address_of(add as usize), "int(int, int)", "").unwrap();

    assert!(matches!(
        session.call("Add", &mut [Value::Int(1)]),
        Err(CallgateError::ArgumentTypeMismatch { .. })
    ));
    assert!(matches!(
        session.call("Add", &mut [Value::Int(1), Value::Pointer(2)]),
        Err(CallgateError::ArgumentTypeMismatch { .. })
    ));
    assert!(session.show_calls(10).is_empty());
}

#[test]
fn test_unsupported_signature_is_logged_as_failure()
{
    let mut session = session();
    session
        .register("Wide", address_of(add as usize), "int(int, int, int, int, int, int, int, int, int)", "")
        .unwrap();

    let mut args: Vec<Value> = (0..9).map(Value::Int).collect();
    assert!(matches!(
        session.call("Wide", &mut args),
        Err(CallgateError::UnsupportedSignature(_))
    ));
    let calls = session.show_calls(10);
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].success);
}

#[test]
fn test_context_switched_call_completes()
{
    let mut session = session();
    session.register("Double", address_of(double_it as usize), "unsigned int(void*)", "").unwrap();

    let outcome = session.call_in_main_context("Double", &Value::Pointer(21)).unwrap();
    match outcome {
        ContextCallOutcome::Completed { exit_code, .. } => assert_eq!(exit_code, Some(42)),
        other => panic!("expected completion, got {other:?}"),
    }

    let calls = session.show_calls(10);
    assert_eq!(calls.len(), 1);
    assert!(calls[0].success);
    assert!(calls[0].summary.contains("[context-switched]"));
    match &calls[0].detail {
        LogDetail::Call(record) => assert_eq!(record.thread_type, ThreadType::ContextSwitched),
        other => panic!("expected a call record, got {other:?}"),
    }
}

#[test]
fn test_context_switched_call_times_out()
{
    let mut session = Session::new(SessionConfig {
        call_timeout: Duration::from_millis(50),
        ..SessionConfig::default()
    });
    session.register("Sleep", address_of(sleep_for as usize), "int(unsigned int)", "").unwrap();

    let outcome = session.call_in_main_context("Sleep", &Value::Int(2_000)).unwrap();
    assert_eq!(
        outcome,
        ContextCallOutcome::TimedOut {
            waited: Duration::from_millis(50)
        }
    );
    assert!(matches!(
        outcome.into_result("Sleep"),
        Err(CallgateError::CallTimeout { timeout_ms: 50, .. })
    ));

    let calls = session.show_calls(10);
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].success);
    assert!(calls[0].summary.contains("timed out"));
}

#[test]
fn test_context_switched_argument_must_be_pointer_sized()
{
    let mut session = session();
    session.register("Double", address_of(double_it as usize), "unsigned int(void*)", "").unwrap();

    assert!(matches!(
        session.call_in_main_context("Double", &Value::Buffer(vec![1, 2])),
        Err(CallgateError::ArgumentTypeMismatch { .. })
    ));
    assert!(session.show_calls(10).is_empty());
}

#[test]
fn test_disabled_log_records_nothing()
{
    let mut session = Session::new(SessionConfig {
        debug: DebugSettings {
            enabled: false,
            ..DebugSettings::default()
        },
        ..SessionConfig::default()
    });
    session.register("Add", address_of(add as usize), "int(int, int)", "").unwrap();
    session.call("Add", &mut [Value::Int(1), Value::Int(2)]).unwrap();
    assert!(session.show_calls(10).is_empty());
}
