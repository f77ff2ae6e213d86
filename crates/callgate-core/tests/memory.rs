//! Tests for the memory access subsystem

use std::hint::black_box;

use callgate_core::oplog::{LogDetail, MemoryOperation};
use callgate_core::types::{Address, TypeToken, Value};
use callgate_core::{Session, SessionConfig};

static MARKERS: [i32; 4] = [7, -1, 1_000_000, 42];

fn session() -> Session
{
    Session::new(SessionConfig::default())
}

#[test]
fn test_null_read_is_a_sentinel()
{
    let session = session();
    let read = session.read_mem(Address::new(0), 4, TypeToken::Int32);
    assert!(read.data.is_none());
    assert_eq!(read.bytes_read, 0);
    assert!(read.values().is_empty());

    let ops = session.show_memory_ops(10);
    assert_eq!(ops.len(), 1);
    assert!(!ops[0].success);
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_unmapped_read_is_a_sentinel()
{
    let session = session();
    let read = session.read_mem(Address::new(0x10), 4, TypeToken::Int32);
    assert!(!read.is_success());
    assert_eq!(read.bytes_read, 0);

    let ops = session.show_memory_ops(10);
    assert_eq!(ops.len(), 1);
    assert!(!ops[0].success);
    match &ops[0].detail {
        LogDetail::Memory(record) => {
            assert_eq!(record.operation, MemoryOperation::Read);
            assert_eq!(record.size, 16);
            assert_eq!(record.transferred, 0);
            assert!(record.error.is_some());
        }
        other => panic!("expected a memory record, got {other:?}"),
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_read_static_values()
{
    let session = session();
    let address = Address::new(MARKERS.as_ptr() as usize);
    let read = session.read_mem(address, 4, TypeToken::Int32);

    assert_eq!(read.bytes_read, 16);
    assert_eq!(
        read.values(),
        vec![Value::Int(7), Value::Int(-1), Value::Int(1_000_000), Value::Int(42)]
    );
    assert!(session.show_memory_ops(1)[0].success);
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_write_then_read_back()
{
    let session = session();
    let mut target = vec![0u8; 8];
    let address = Address::new(target.as_mut_ptr() as usize);

    let write = session.write_mem(address, &[1, 2, 3, 4, 5], 4);
    assert!(write.success);
    assert_eq!(write.bytes_written, 4);

    let read = session.read_mem(address, 8, TypeToken::FixedBuffer(1));
    assert_eq!(read.data.as_deref(), Some(&[1, 2, 3, 4, 0, 0, 0, 0][..]));
    assert_eq!(black_box(&target)[..4], [1, 2, 3, 4]);

    let ops = session.show_memory_ops(10);
    assert_eq!(ops.len(), 2);
    assert!(ops.iter().all(|op| op.success));
}

#[test]
fn test_write_more_than_supplied_fails()
{
    let session = session();
    let mut target = [0u8; 4];
    let write = session.write_mem(Address::new(target.as_mut_ptr() as usize), &[9, 9], 4);
    assert!(!write.success);
    assert_eq!(write.bytes_written, 0);
    assert_eq!(black_box(target), [0, 0, 0, 0]);
    assert!(!session.show_memory_ops(1)[0].success);
}

#[test]
fn test_memory_logging_can_be_switched_off()
{
    let session = session();
    session.debug_config(&callgate_core::settings::DebugConfigUpdate {
        log_memory_ops: Some(false),
        ..Default::default()
    });
    let read = session.read_mem(Address::new(0), 1, TypeToken::Int32);
    assert!(read.data.is_none());
    assert!(session.show_memory_ops(10).is_empty());
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_huge_read_is_a_sentinel()
{
    let value = black_box(9u32);
    let session = session();
    let address = Address::new(std::ptr::addr_of!(value) as usize);
    let read = session.read_mem(address, 1usize << 62, TypeToken::FixedBuffer(1));
    assert!(read.data.is_none());
    assert_eq!(read.bytes_read, 0);

    let ops = session.show_memory_ops(10);
    assert_eq!(ops.len(), 1);
    assert!(!ops[0].success);
    match &ops[0].detail {
        LogDetail::Memory(record) => {
            assert_eq!(record.size, 1usize << 62);
            assert_eq!(record.transferred, 0);
        }
        other => panic!("expected a memory record, got {other:?}"),
    }
}
