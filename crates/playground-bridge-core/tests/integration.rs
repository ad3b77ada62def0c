//! Integration tests for playground-bridge-core.
//!
//! These tests boot small WAT runtimes through the full pipeline:
//! - WAT compilation to module
//! - Host function registration
//! - Entry routine and entry point installation
//! - `run` / `check` / `cancel` through the execution facade

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use wasmtime::Linker;

use playground_bridge_common::{BridgeError, EngineConfig, ExecutionConfig, Operation, Outcome};
use playground_bridge_core::handle::{instantiate, run_entry_routine};
use playground_bridge_core::store::create_store;
use playground_bridge_core::{
    Bindings, CompiledModule, ExecutionFacade, ExecutionRequest, ReturnConvention, RuntimeHandle,
    WasmEngine,
};
use playground_bridge_host::linker::register_all;

/// Runtime with throw-only entry points.
///
/// `run` throws the script itself if it starts with `t`, otherwise reports
/// `null`. `check` throws "unexpected token" if the script starts with `x`.
const THROWING_RUNTIME: &str = r#"
    (module
        (import "env" "result_callback" (func $result (param i32 i32)))
        (import "env" "check_callback" (func $check (param i32 i32)))
        (import "env" "throw" (func $throw (param i32 i32)))
        (memory (export "memory") 1)
        (global $booted (mut i32) (i32.const 0))
        (data (i32.const 32) "unexpected token")
        (func (export "_initialize") (global.set $booted (i32.const 1)))
        (func (export "booted") (result i32) (global.get $booted))
        (func (export "alloc") (param i32) (result i32) (i32.const 1024))
        (func (export "run") (param $ptr i32) (param $len i32)
            (if (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 116))
                (then (call $throw (local.get $ptr) (local.get $len)))
                (else (call $result (i32.const 0) (i32.const 0)))))
        (func (export "check") (param $ptr i32) (param $len i32)
            (if (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 120))
                (then (call $throw (i32.const 32) (i32.const 16)))
                (else (call $check (i32.const 0) (i32.const 0)))))
    )
"#;

/// Runtime whose `run` returns an error object for scripts starting with `e`.
const ERROR_VALUE_RUNTIME: &str = r#"
    (module
        (import "env" "result_callback" (func $result (param i32 i32)))
        (memory (export "memory") 1)
        (data (i32.const 64) "{\"error\":\"stack overflow\"}")
        (func (export "alloc") (param i32) (result i32) (i32.const 1024))
        (func (export "run") (param $ptr i32) (param $len i32) (result i64)
            (if (result i64) (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 101))
                (then (i64.const 274877906970))
                (else (call $result (i32.const 0) (i32.const 0)) (i64.const 0))))
        (func (export "check") (param i32 i32))
    )
"#;

/// Runtime that spins until cancellation is requested.
const CANCELLABLE_RUNTIME: &str = r#"
    (module
        (import "env" "throw" (func $throw (param i32 i32)))
        (import "env" "cancel_requested" (func $cancelled (result i32)))
        (memory (export "memory") 1)
        (data (i32.const 0) "cancelled")
        (func (export "alloc") (param i32) (result i32) (i32.const 1024))
        (func (export "run") (param i32 i32)
            (block $done
                (loop $spin
                    (br_if $done (call $cancelled))
                    (br $spin)))
            (call $throw (i32.const 0) (i32.const 9)))
        (func (export "check") (param i32 i32))
    )
"#;

/// Runtime counting live script buffers.
///
/// `run` throws for scripts starting with `t` and traps for `u`. `check`
/// throws "leaked" if any buffer besides its own is still allocated.
const COUNTING_RUNTIME: &str = r#"
    (module
        (import "env" "result_callback" (func $result (param i32 i32)))
        (import "env" "throw" (func $throw (param i32 i32)))
        (memory (export "memory") 1)
        (global $live (mut i32) (i32.const 0))
        (data (i32.const 0) "leaked")
        (func (export "alloc") (param i32) (result i32)
            (global.set $live (i32.add (global.get $live) (i32.const 1)))
            (i32.const 1024))
        (func (export "dealloc") (param i32 i32)
            (global.set $live (i32.sub (global.get $live) (i32.const 1))))
        (func (export "run") (param $ptr i32) (param $len i32)
            (if (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 116))
                (then (call $throw (local.get $ptr) (local.get $len))))
            (if (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 117))
                (then unreachable))
            (if (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 108))
                (then (loop $forever (br $forever))))
            (call $result (i32.const 0) (i32.const 0)))
        (func (export "check") (param i32 i32)
            (if (i32.gt_s (global.get $live) (i32.const 1))
                (then (call $throw (i32.const 0) (i32.const 6)))))
    )
"#;

fn quiet() -> ExecutionConfig {
    ExecutionConfig {
        inherit_stdio: false,
        ..Default::default()
    }
}

fn boot(wat: &str) -> ExecutionFacade {
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();

    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker).unwrap();

    let mut store = create_store(&engine, &quiet()).unwrap();
    let instance = instantiate(&linker, &mut store, &module).unwrap();
    run_entry_routine(&mut store, &instance, "_initialize").unwrap();

    let handle = RuntimeHandle::install(store, &instance, &module, None).unwrap();
    ExecutionFacade::new(handle)
}

fn boot_with_fuel(wat: &str, max_fuel: u64) -> ExecutionFacade {
    let engine = WasmEngine::new(&EngineConfig {
        fuel_metering: true,
        ..Default::default()
    })
    .unwrap();
    let exec = ExecutionConfig {
        max_fuel,
        ..quiet()
    };

    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker).unwrap();
    let mut store = create_store(&engine, &exec).unwrap();
    let instance = instantiate(&linker, &mut store, &module).unwrap();

    let handle = RuntimeHandle::install(store, &instance, &module, Some(max_fuel)).unwrap();
    ExecutionFacade::new(handle)
}

type Seen = Arc<Mutex<Vec<Value>>>;

fn recorder() -> (Seen, impl FnMut(Value) + Send + 'static) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |value| sink.lock().push(value))
}

// ============================================================================
// Test: run
// ============================================================================

#[test]
fn test_run_healthy_script() {
    let mut facade = boot(THROWING_RUNTIME);
    let (seen, callback) = recorder();

    let outcome = facade.run(ExecutionRequest::new(
        "print(1+1)",
        Bindings::new().with_result_callback(callback),
    ));

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(*seen.lock(), vec![Value::Null]);
}

#[test]
fn test_run_throw_is_delivered_once() {
    let mut facade = boot(THROWING_RUNTIME);
    let (seen, callback) = recorder();

    let outcome = facade.run(ExecutionRequest::new(
        "throw oops",
        Bindings::new().with_result_callback(callback),
    ));

    assert_eq!(outcome, Outcome::failure("throw oops"));
    assert_eq!(*seen.lock(), vec![json!({"error": "throw oops"})]);
}

#[test]
fn test_run_throw_without_callback() {
    let mut facade = boot(THROWING_RUNTIME);

    let outcome = facade.run(ExecutionRequest::new("throw", Bindings::new()));

    assert!(outcome.is_failure());
    assert_eq!(outcome.message(), Some("throw"));
}

#[test]
fn test_runtime_state_survives_between_calls() {
    let mut facade = boot(THROWING_RUNTIME);

    facade.run(ExecutionRequest::new("throw", Bindings::new()));
    let (seen, callback) = recorder();
    let outcome = facade.run(ExecutionRequest::new(
        "ok",
        Bindings::new().with_result_callback(callback),
    ));

    assert!(outcome.is_success());
    assert_eq!(seen.lock().len(), 1);
}

// ============================================================================
// Test: check
// ============================================================================

#[test]
fn test_check_throw_becomes_warning() {
    let mut facade = boot(THROWING_RUNTIME);
    let (seen, callback) = recorder();

    let outcome = facade.check(ExecutionRequest::new(
        "x = = 1",
        Bindings::new().with_check_callback(callback),
    ));

    assert_eq!(outcome, Outcome::failure("unexpected token"));
    assert_eq!(*seen.lock(), vec![json!({"warning": "unexpected token"})]);
}

#[test]
fn test_check_valid_script() {
    let mut facade = boot(THROWING_RUNTIME);
    let (seen, callback) = recorder();

    let outcome = facade.check(ExecutionRequest::new(
        "a = 1",
        Bindings::new().with_check_callback(callback),
    ));

    assert!(outcome.is_success());
    assert_eq!(*seen.lock(), vec![Value::Null]);
}

#[test]
fn test_check_empty_script() {
    let mut facade = boot(THROWING_RUNTIME);
    let (seen, callback) = recorder();

    let outcome = facade.check(ExecutionRequest::new(
        "",
        Bindings::new().with_check_callback(callback),
    ));

    assert_eq!(outcome, Outcome::failure("empty script"));
    assert_eq!(*seen.lock(), vec![json!({"warning": "empty script"})]);
}

// ============================================================================
// Test: Error-value convention
// ============================================================================

#[test]
fn test_error_value_convention_detected() {
    let facade = boot(ERROR_VALUE_RUNTIME);

    let handle = facade.handle();
    assert_eq!(
        handle.entry(Operation::Run).convention(),
        ReturnConvention::ErrorValue
    );
    assert_eq!(
        handle.entry(Operation::Check).convention(),
        ReturnConvention::ThrowOnly
    );
}

#[test]
fn test_returned_error_is_synthesized() {
    let mut facade = boot(ERROR_VALUE_RUNTIME);
    let (seen, callback) = recorder();

    let outcome = facade.run(ExecutionRequest::new(
        "eval deep",
        Bindings::new().with_result_callback(callback),
    ));

    assert_eq!(outcome, Outcome::failure("internal error: stack overflow"));
    assert_eq!(
        *seen.lock(),
        vec![json!({"error": "internal error: stack overflow"})]
    );
}

#[test]
fn test_zero_return_is_success() {
    let mut facade = boot(ERROR_VALUE_RUNTIME);
    let (seen, callback) = recorder();

    let outcome = facade.run(ExecutionRequest::new(
        "fine",
        Bindings::new().with_result_callback(callback),
    ));

    assert!(outcome.is_success());
    assert_eq!(*seen.lock(), vec![Value::Null]);
}

// ============================================================================
// Test: Cancellation
// ============================================================================

#[test]
fn test_cancel_unsupported() {
    let facade = boot(THROWING_RUNTIME);

    assert!(facade.cancel_entry().is_none());
    assert!(!facade.cancel());
}

#[test]
fn test_cancel_unwinds_running_script() {
    let mut facade = boot(CANCELLABLE_RUNTIME);
    let entry = facade.cancel_entry().cloned().unwrap();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        entry.request().is_ok()
    });

    let (seen, callback) = recorder();
    let outcome = facade.run(ExecutionRequest::new(
        "while true do end",
        Bindings::new().with_result_callback(callback),
    ));

    assert!(canceller.join().unwrap());
    assert_eq!(outcome, Outcome::failure("cancelled"));
    assert_eq!(*seen.lock(), vec![json!({"error": "cancelled"})]);
}

#[test]
fn test_cancel_entry_detached_on_drop() {
    let facade = boot(CANCELLABLE_RUNTIME);
    let entry = facade.cancel_entry().cloned().unwrap();

    drop(facade);

    assert!(!entry.is_attached());
    assert!(matches!(entry.request(), Err(BridgeError::CancelFailure { .. })));
}

// ============================================================================
// Test: Installation
// ============================================================================

#[test]
fn test_entry_routine_runs() {
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), THROWING_RUNTIME).unwrap();
    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker).unwrap();
    let mut store = create_store(&engine, &quiet()).unwrap();
    let instance = instantiate(&linker, &mut store, &module).unwrap();

    assert!(run_entry_routine(&mut store, &instance, "_initialize").unwrap());
    assert!(!run_entry_routine(&mut store, &instance, "_missing").unwrap());

    let booted = instance
        .get_typed_func::<(), i32>(&mut store, "booted")
        .unwrap();
    assert_eq!(booted.call(&mut store, ()).unwrap(), 1);
}

#[test]
fn test_missing_run_export() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "alloc") (param i32) (result i32) (i32.const 0))
            (func (export "check") (param i32 i32))
        )
    "#;
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let linker = Linker::new(engine.inner());
    let mut store = create_store(&engine, &quiet()).unwrap();
    let instance = instantiate(&linker, &mut store, &module).unwrap();

    let err = RuntimeHandle::install(store, &instance, &module, None).unwrap_err();
    assert!(matches!(err, BridgeError::MissingExport { ref name } if name == "run"));
}

#[test]
fn test_unresolved_import_fails_boot() {
    let wat = r#"
        (module
            (import "env" "not_a_host_function" (func))
        )
    "#;
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let linker = Linker::new(engine.inner());
    let mut store = create_store(&engine, &quiet()).unwrap();

    let err = instantiate(&linker, &mut store, &module).unwrap_err();
    assert!(matches!(err, BridgeError::BootFailure { .. }));
}

// ============================================================================
// Test: Fuel
// ============================================================================

#[test]
fn test_fuel_exhaustion_is_a_failure() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "alloc") (param i32) (result i32) (i32.const 0))
            (func (export "run") (param i32 i32) (loop $forever (br $forever)))
            (func (export "check") (param i32 i32))
        )
    "#;
    let mut facade = boot_with_fuel(wat, 10_000);

    let first = facade.run(ExecutionRequest::new("loop", Bindings::new()));
    let second = facade.run(ExecutionRequest::new("loop", Bindings::new()));

    // Every call gets a fresh tank
    assert!(first.is_failure());
    assert!(second.is_failure());
    assert_eq!(first, second);
}

#[test]
fn test_exhausted_call_still_releases_buffer() {
    let mut facade = boot_with_fuel(COUNTING_RUNTIME, 10_000);

    for _ in 0..3 {
        let outcome = facade.run(ExecutionRequest::new("loop", Bindings::new()));
        assert!(outcome.is_failure());
    }

    let outcome = facade.check(ExecutionRequest::new("x", Bindings::new()));
    assert_eq!(outcome, Outcome::Success);
}

// ============================================================================
// Test: Script buffers
// ============================================================================

#[test]
fn test_successful_calls_release_buffer() {
    let mut facade = boot(COUNTING_RUNTIME);

    for _ in 0..3 {
        let outcome = facade.run(ExecutionRequest::new("a = 1", Bindings::new()));
        assert!(outcome.is_success());
    }

    let outcome = facade.check(ExecutionRequest::new("x", Bindings::new()));
    assert_eq!(outcome, Outcome::Success);
}

#[test]
fn test_failed_calls_release_buffer() {
    let mut facade = boot(COUNTING_RUNTIME);

    for script in ["throw 1", "throw 2", "throw 3", "unreachable()"] {
        let outcome = facade.run(ExecutionRequest::new(script, Bindings::new()));
        assert!(outcome.is_failure());
    }

    let outcome = facade.check(ExecutionRequest::new("x", Bindings::new()));
    assert_eq!(outcome, Outcome::Success);
}

#[test]
fn test_returned_value_out_of_bounds() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "alloc") (param i32) (result i32) (i32.const 1024))
            (func (export "run") (param i32 i32) (result i64) (i64.const 279172874239))
            (func (export "check") (param i32 i32))
        )
    "#;
    let mut facade = boot(wat);
    let (seen, callback) = recorder();

    let outcome = facade.run(ExecutionRequest::new(
        "huge()",
        Bindings::new().with_result_callback(callback),
    ));

    assert!(outcome.message().unwrap().contains("out of bounds"));
    assert_eq!(seen.lock().len(), 1);
}
