//! Host function registration for Wasmtime linkers.
//!
//! The playground runtime imports the following from `env`:
//!
//! | import | signature |
//! |---|---|
//! | `log` | `(level: i32, ptr: i32, len: i32)` |
//! | `result_callback` | `(ptr: i32, len: i32)` |
//! | `check_callback` | `(ptr: i32, len: i32)` |
//! | `throw` | `(ptr: i32, len: i32)` |
//! | `cancel_requested` | `() -> i32` |
//!
//! and WASI preview1 from `wasi_snapshot_preview1`.

use tracing::warn;
use wasmtime::{Caller, Linker};

use playground_bridge_common::{BridgeError, CallbackSlot};
use playground_bridge_core::module::{CANCEL_IMPORT, HOST_MODULE};
use playground_bridge_core::store::RuntimeContext;
use playground_bridge_core::trap::GuestThrow;

use crate::callbacks::CallbackHost;
use crate::logging::{LoggingHost, level_from_i32};
use crate::memory::{read_bytes, read_string};

/// Register every host function the runtime may import.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(linker: &mut Linker<RuntimeContext>) -> Result<(), BridgeError> {
    register_logging(linker)?;
    register_callback(linker, CallbackSlot::Result)?;
    register_callback(linker, CallbackSlot::Check)?;
    register_throw(linker)?;
    register_cancellation(linker)?;
    register_wasi(linker)?;
    Ok(())
}

/// Register `env.log`.
///
/// Malformed arguments are logged and ignored; logging never traps.
pub fn register_logging(linker: &mut Linker<RuntimeContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            HOST_MODULE,
            "log",
            |mut caller: Caller<'_, RuntimeContext>, level: i32, ptr: i32, len: i32| {
                let message = match read_string(&mut caller, ptr, len) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed guest log");
                        return;
                    }
                };

                LoggingHost::log(caller.data_mut(), level_from_i32(level), &message);
            },
        )
        .map_err(|e| {
            BridgeError::invalid_config(format!("Failed to register log function: {e}"))
        })?;

    Ok(())
}

/// Register the callback import of `slot`.
///
/// A payload that is not JSON traps, so the runtime sees it as a throw.
pub fn register_callback(
    linker: &mut Linker<RuntimeContext>,
    slot: CallbackSlot,
) -> Result<(), BridgeError> {
    let name = CallbackHost::import_name(slot);

    linker
        .func_wrap(
            HOST_MODULE,
            name,
            move |mut caller: Caller<'_, RuntimeContext>,
                  ptr: i32,
                  len: i32|
                  -> wasmtime::Result<()> {
                let payload = if len == 0 {
                    serde_json::Value::Null
                } else {
                    CallbackHost::decode(&read_bytes(&mut caller, ptr, len)?)?
                };

                CallbackHost::deliver(caller.data_mut(), slot, payload);
                Ok(())
            },
        )
        .map_err(|e| BridgeError::invalid_config(format!("Failed to register {name}: {e}")))?;

    Ok(())
}

/// Register `env.throw`, the runtime's way of raising an error.
pub fn register_throw(linker: &mut Linker<RuntimeContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            HOST_MODULE,
            "throw",
            |mut caller: Caller<'_, RuntimeContext>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let message = read_string(&mut caller, ptr, len)?;
                Err(wasmtime::Error::new(GuestThrow::new(message)))
            },
        )
        .map_err(|e| {
            BridgeError::invalid_config(format!("Failed to register throw function: {e}"))
        })?;

    Ok(())
}

/// Register `env.cancel_requested`, the cooperative cancellation checkpoint.
pub fn register_cancellation(linker: &mut Linker<RuntimeContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            HOST_MODULE,
            CANCEL_IMPORT,
            |caller: Caller<'_, RuntimeContext>| -> i32 {
                i32::from(caller.data().cancel.is_raised())
            },
        )
        .map_err(|e| {
            BridgeError::invalid_config(format!("Failed to register {CANCEL_IMPORT}: {e}"))
        })?;

    Ok(())
}

/// Register the WASI preview1 imports.
pub fn register_wasi(linker: &mut Linker<RuntimeContext>) -> Result<(), BridgeError> {
    wasmtime_wasi::preview1::add_to_linker_sync(linker, RuntimeContext::wasi_mut)
        .map_err(|e| BridgeError::invalid_config(format!("Failed to register WASI: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use wasmtime::Store;

    use super::*;
    use playground_bridge_common::{EngineConfig, ExecutionConfig};
    use playground_bridge_core::store::create_store;
    use playground_bridge_core::{Bindings, CompiledModule, WasmEngine, trap};

    const GUEST: &str = r#"
        (module
            (import "env" "log" (func $log (param i32 i32 i32)))
            (import "env" "result_callback" (func $result (param i32 i32)))
            (import "env" "throw" (func $throw (param i32 i32)))
            (import "env" "cancel_requested" (func $cancelled (result i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "{\"value\":\"2\"}")
            (data (i32.const 32) "boom")
            (data (i32.const 48) "{oops")
            (data (i32.const 64) "bad \ff byte")
            (func (export "say") (call $log (i32.const 2) (i32.const 32) (i32.const 4)))
            (func (export "deliver") (call $result (i32.const 0) (i32.const 13)))
            (func (export "deliver_null") (call $result (i32.const 0) (i32.const 0)))
            (func (export "deliver_garbage") (call $result (i32.const 48) (i32.const 5)))
            (func (export "raise") (call $throw (i32.const 32) (i32.const 4)))
            (func (export "raise_mangled") (call $throw (i32.const 64) (i32.const 10)))
            (func (export "poll") (result i32) (call $cancelled))
        )
    "#;

    fn instantiate() -> (Store<RuntimeContext>, wasmtime::Instance) {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let module = CompiledModule::from_wat(engine.inner(), GUEST).unwrap();

        let mut linker = Linker::new(engine.inner());
        register_all(&mut linker).unwrap();

        let exec = ExecutionConfig {
            inherit_stdio: false,
            ..Default::default()
        };
        let mut store = create_store(&engine, &exec).unwrap();
        let instance = linker.instantiate(&mut store, module.inner()).unwrap();
        (store, instance)
    }

    fn call(
        store: &mut Store<RuntimeContext>,
        instance: &wasmtime::Instance,
        name: &str,
    ) -> wasmtime::Result<()> {
        instance
            .get_typed_func::<(), ()>(&mut *store, name)?
            .call(&mut *store, ())
    }

    #[test]
    fn test_register_all() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let mut linker = Linker::new(engine.inner());

        assert!(register_all(&mut linker).is_ok());
    }

    #[test]
    fn test_guest_log_is_collected() {
        let (mut store, instance) = instantiate();

        call(&mut store, &instance, "say").unwrap();

        let logs = &store.data().logs;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "boom");
    }

    #[test]
    fn test_result_callback_delivers_json() {
        let (mut store, instance) = instantiate();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.data_mut().bindings =
            Some(Bindings::new().with_result_callback(move |v| sink.lock().push(v)));

        call(&mut store, &instance, "deliver").unwrap();
        call(&mut store, &instance, "deliver_null").unwrap();

        assert_eq!(*seen.lock(), vec![json!({"value": "2"}), Value::Null]);
    }

    #[test]
    fn test_malformed_payload_traps() {
        let (mut store, instance) = instantiate();
        store.data_mut().bindings = Some(Bindings::new().with_result_callback(|_| {}));

        let err = call(&mut store, &instance, "deliver_garbage").unwrap_err();
        assert!(trap::describe(&err).contains("not JSON"));
    }

    #[test]
    fn test_throw_carries_message() {
        let (mut store, instance) = instantiate();

        let err = call(&mut store, &instance, "raise").unwrap_err();
        assert_eq!(trap::describe(&err), "boom");
    }

    #[test]
    fn test_throw_keeps_mangled_message() {
        let (mut store, instance) = instantiate();

        let err = call(&mut store, &instance, "raise_mangled").unwrap_err();
        assert_eq!(trap::describe(&err), "bad \u{FFFD} byte");
    }

    #[test]
    fn test_cancel_requested_reads_flag() {
        let (mut store, instance) = instantiate();
        let poll = instance.get_typed_func::<(), i32>(&mut store, "poll").unwrap();

        assert_eq!(poll.call(&mut store, ()).unwrap(), 0);
        store.data().cancel.raise();
        assert_eq!(poll.call(&mut store, ()).unwrap(), 1);
    }
}
