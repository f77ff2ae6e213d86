use std::hint::black_box;
use std::io::Cursor;

use callgate::ScriptRunner;
use callgate_core::error::CallgateError;
use callgate_core::script::quote;
use callgate_core::{Session, SessionConfig};
use tempfile::TempDir;

static PATTERN: [u32; 2] = [0x1122_3344, 7];

fn runner() -> ScriptRunner<Vec<u8>>
{
    ScriptRunner::new(Session::new(SessionConfig::default()), Vec::new())
}

fn output(runner: ScriptRunner<Vec<u8>>) -> String
{
    String::from_utf8(runner.into_output()).unwrap()
}

#[test]
fn test_register_and_list()
{
    let mut runner = runner();
    let executed = runner
        .run_source(
            "-- two functions\n\
             register(\"Tick\", 0x00401000, \"void __stdcall(int)\", \"game tick\")\n\
             register(\"Add\", \"00402000\", \"int(int, int)\")\n\
             list()\n",
        )
        .unwrap();
    assert_eq!(executed, 3);

    let text = output(runner);
    assert!(text.contains("Registered Tick @ 0x00401000 : void __stdcall(int)"));
    assert!(text.contains("Add   0x00402000  int(int, int)"));
    assert!(text.contains("2 function(s)"));
}

#[test]
fn test_stops_at_first_error()
{
    let mut runner = runner();
    let err = runner
        .run_source("register(\"a\", 0x10, \"int()\")\nfrobnicate()\nregister(\"b\", 0x20, \"int()\")\n")
        .unwrap_err();
    assert!(matches!(err, CallgateError::Script { line: 2, .. }));
    assert_eq!(runner.session().list().len(), 1);
}

#[test]
fn test_interactive_continues_after_errors()
{
    let mut runner = runner();
    let input = Cursor::new("register(\"a\", 0, \"int()\")\ncall(\"missing\")\nregister(\"b\", 0x20, \"int()\")\n");
    let failures = runner.run_interactive(input, false).unwrap();
    assert_eq!(failures, 2);
    assert_eq!(runner.session().list().len(), 1);

    let text = output(runner);
    assert_eq!(text.matches("Error: ").count(), 2);
}

#[test]
fn test_read_mem_prints_values()
{
    let address = black_box(PATTERN.as_ptr()) as usize;
    let mut runner = runner();
    runner
        .run_source(&format!("readMem({address}, 2, \"uint32_t\")\nreadMem(0, 4)\nshowMemoryOps()\n"))
        .unwrap();

    let text = output(runner);
    assert!(text.contains("8 bytes: "));
    assert!(text.contains("unsigned int: [287454020, 7]"));
    assert!(text.contains("nil, 0"));
    assert!(text.contains("FAIL read 4 bytes"));
}

#[test]
fn test_write_mem_round_trip()
{
    let mut target = black_box([0u8; 8]);
    let address = target.as_mut_ptr() as usize;
    let mut runner = runner();
    runner
        .run_source(&format!("writeMem({address}, \"abcd\")\nwriteMem({address}, \"xy\", 5)\n"))
        .unwrap();
    assert_eq!(&black_box(target)[..4], b"abcd");

    let text = output(runner);
    assert!(text.contains("true, 4"));
    assert!(text.contains("false, 0"));
}

#[test]
fn test_debug_config_and_logs()
{
    let mut runner = runner();
    runner
        .run_source(
            "debugConfig(\"maxLogEntries\", 2, \"logMemoryOps\", false)\n\
             readMem(0, 1)\n\
             showMemoryOps(5)\n\
             debugEnable(false)\n\
             clearLogs()\n",
        )
        .unwrap();

    let settings = runner.session().operation_log().settings();
    assert_eq!(settings.max_log_entries, 2);
    assert!(!settings.log_memory_ops);
    assert!(!settings.enabled);

    let text = output(runner);
    assert!(text.contains("maxLogEntries    = 2"));
    assert!(text.contains("No memory operations recorded"));
    assert!(text.contains("Operation log disabled"));
    assert!(text.contains("Logs cleared"));
}

#[test]
fn test_debug_config_rejects_bad_options()
{
    let mut runner = runner();
    assert!(runner.run_source("debugConfig(\"nope\", true)").is_err());
    assert!(runner.run_source("debugConfig(\"logCalls\")").is_err());
    assert!(runner.run_source("debugConfig(\"logCalls\", 3)").is_err());
}

#[test]
fn test_save_and_load()
{
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("saved").join("functions.txt");
    let path = quote(&path.to_string_lossy());

    let mut first = runner();
    first
        .run_source(&format!(
            "register(\"Tick\", 0x00401000, \"void __stdcall(int)\", \"game tick\")\nsave({path})\n"
        ))
        .unwrap();
    assert!(output(first).contains("Saved 1 function(s)"));

    let mut second = runner();
    second.run_source(&format!("load({path})\n")).unwrap();
    let entry = second.session().resolve("Tick").unwrap();
    assert_eq!(entry.description, "game tick");
    assert!(output(second).contains("Loaded 1 function(s)"));
}

#[test]
fn test_module_base_address()
{
    let mut runner = runner();
    runner
        .run_source("moduleBaseAddress()\nmoduleBaseAddress(\"no_such_module.so\")\n")
        .unwrap();

    let text = output(runner);
    let lines: Vec<_> = text.lines().collect();
    assert!(lines[0].starts_with("0x"));
    assert_eq!(lines[1], "nil");
}

#[cfg(any(all(target_arch = "x86_64", not(windows)), target_arch = "aarch64"))]
mod native
{
    use super::*;

    extern "C" fn add(a: i32, b: i32) -> i32
    {
        a + b
    }

    extern "C" fn fill(out: *mut u8)
    {
        // SAFETY: the caller passes a buffer of at least 4 bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(b"ok".as_ptr(), out, 2);
        }
    }

    extern "system" fn echo(parameter: usize) -> usize
    {
        parameter + 1
    }

    #[test]
    fn test_call_coerces_arguments()
    {
        let mut runner = runner();
        runner
            .run_source(&format!(
                "register(\"add\", {}, \"int(int, int)\")\n\
                 register(\"fill\", {}, \"void(char[4])\")\n\
                 call(\"add\", 2, 40)\n\
                 call(\"fill\", \"\")\n\
                 showCalls()\n",
                add as usize, fill as usize
            ))
            .unwrap();

        let text = output(runner);
        assert!(text.contains("add -> 42"));
        assert!(text.contains("fill -> void"));
        assert!(text.contains("  arg 1: 6F 6B 00 00"));
        assert!(text.contains("OK   add(2, 40) [direct]"));
    }

    #[test]
    fn test_call_in_main_context_prints_success()
    {
        let mut runner = runner();
        runner
            .run_source(&format!(
                "register(\"echo\", {}, \"int __stdcall(void*)\")\ncallInMainContext(\"echo\", 5)\n",
                echo as usize
            ))
            .unwrap();
        assert!(output(runner).ends_with("true\n"));
    }
}
