//! The installed runtime and its entry points.
//!
//! [`RuntimeHandle`] is what the loader produces once the module is
//! instantiated: the store plus explicit references to `run`, `check` and
//! the cancellation entry. Nothing is looked up by name after installation.
//!
//! # Entry point conventions
//!
//! Two generations of runtimes exist and both stay supported:
//!
//! | signature | convention |
//! |---|---|
//! | `(i32, i32) -> ()` | [`ReturnConvention::ThrowOnly`]: errors only by throwing |
//! | `(i32, i32) -> i64` | [`ReturnConvention::ErrorValue`]: may also return `(ptr << 32) \| len` of a JSON object |

use std::time::{Duration, Instant};

use wasmtime::{Func, Instance, Linker, Memory, Store, TypedFunc, ValType};

use tracing::{debug, info, warn};

use crate::bindings::Bindings;
use crate::cancel::CancelEntry;
use crate::module::CompiledModule;
use crate::store::{LogEntry, RuntimeContext, calculate_fuel_consumed, refuel};
use crate::trap;
use playground_bridge_common::{BridgeError, HostFunctionError, Operation};

/// Export holding the runtime's linear memory.
pub const MEMORY_EXPORT: &str = "memory";

/// Export allocating a buffer for the script text.
pub const ALLOC_EXPORT: &str = "alloc";

/// Optional export releasing the script buffer after a call.
pub const DEALLOC_EXPORT: &str = "dealloc";

/// Fuel lent to `dealloc` after each call.
const RELEASE_FUEL: u64 = 10_000;

/// How an entry point reports errors besides throwing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnConvention {
    /// Returns nothing; errors are thrown.
    ThrowOnly,
    /// Returns a packed pointer to a JSON object, `0` for nothing.
    ErrorValue,
}

/// A resolved `run` or `check` export.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint {
    func: Func,
    convention: ReturnConvention,
}

impl EntryPoint {
    fn resolve(
        store: &mut Store<RuntimeContext>,
        instance: &Instance,
        name: &str,
    ) -> Result<Self, BridgeError> {
        let func = instance
            .get_func(&mut *store, name)
            .ok_or_else(|| BridgeError::missing_export(name))?;

        let ty = func.ty(&*store);
        let params: Vec<ValType> = ty.params().collect();
        if !matches!(params.as_slice(), [ValType::I32, ValType::I32]) {
            return Err(BridgeError::compilation_failed(format!(
                "Entry point '{name}' must take (i32, i32)"
            )));
        }

        let results: Vec<ValType> = ty.results().collect();
        let convention = match results.as_slice() {
            [] => ReturnConvention::ThrowOnly,
            [ValType::I64] => ReturnConvention::ErrorValue,
            _ => {
                return Err(BridgeError::compilation_failed(format!(
                    "Entry point '{name}' must return nothing or i64"
                )));
            }
        };

        debug!(entry_point = name, convention = ?convention, "Entry point resolved");

        Ok(Self { func, convention })
    }

    /// The error convention detected for this entry point.
    pub fn convention(&self) -> ReturnConvention {
        self.convention
    }
}

/// Per-call state handed back by [`RuntimeHandle::end_call`].
#[derive(Debug)]
pub struct CallReport {
    /// Bindings moved back out of the store.
    pub bindings: Bindings,
    /// Logs the runtime emitted during the call.
    pub logs: Vec<LogEntry>,
    /// Fuel consumed, `0` without fuel metering.
    pub fuel_consumed: u64,
    /// Wall-clock time since the call began.
    pub duration: Duration,
}

/// The installed runtime.
///
/// Lives on the worker thread; only the [`CancelEntry`] leaves it.
pub struct RuntimeHandle {
    store: Store<RuntimeContext>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    dealloc: Option<TypedFunc<(i32, i32), ()>>,
    run: EntryPoint,
    check: EntryPoint,
    cancel: Option<CancelEntry>,
    fuel_per_call: Option<u64>,
    call_started: Option<Instant>,
}

impl RuntimeHandle {
    /// Resolve the entry points of an instantiated runtime.
    ///
    /// # Arguments
    ///
    /// * `store` - The store the instance lives in
    /// * `instance` - The instantiated runtime
    /// * `module` - The module it was instantiated from
    /// * `fuel_per_call` - Fuel granted to each call, `None` without metering
    ///
    /// # Errors
    ///
    /// Returns an error if `memory`, `alloc`, `run` or `check` is missing or
    /// has the wrong type.
    pub fn install(
        mut store: Store<RuntimeContext>,
        instance: &Instance,
        module: &CompiledModule,
        fuel_per_call: Option<u64>,
    ) -> Result<Self, BridgeError> {
        let memory = instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .ok_or_else(|| BridgeError::missing_export(MEMORY_EXPORT))?;

        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, ALLOC_EXPORT)
            .map_err(|_| BridgeError::missing_export(ALLOC_EXPORT))?;

        let dealloc = if module.exports_function(DEALLOC_EXPORT) {
            Some(
                instance
                    .get_typed_func::<(i32, i32), ()>(&mut store, DEALLOC_EXPORT)
                    .map_err(|e| {
                        BridgeError::compilation_failed(format!(
                            "Export '{DEALLOC_EXPORT}' has the wrong type: {e}"
                        ))
                    })?,
            )
        } else {
            None
        };

        let run = EntryPoint::resolve(&mut store, instance, Operation::Run.export_name())?;
        let check = EntryPoint::resolve(&mut store, instance, Operation::Check.export_name())?;

        let cancel = module
            .supports_cancellation()
            .then(|| CancelEntry::new(store.data().cancel.clone()));

        info!(
            content_hash = %module.content_hash(),
            run = ?run.convention(),
            check = ?check.convention(),
            cancellable = cancel.is_some(),
            "Runtime entry points installed"
        );

        Ok(Self {
            store,
            memory,
            alloc,
            dealloc,
            run,
            check,
            cancel,
            fuel_per_call,
            call_started: None,
        })
    }

    /// The entry point of an operation.
    pub fn entry(&self, operation: Operation) -> &EntryPoint {
        match operation {
            Operation::Run => &self.run,
            Operation::Check => &self.check,
        }
    }

    /// The cancellation entry, if the runtime observes cancellation.
    pub fn cancel_entry(&self) -> Option<&CancelEntry> {
        self.cancel.as_ref()
    }

    /// Get the store.
    pub fn store(&self) -> &Store<RuntimeContext> {
        &self.store
    }

    /// Move the bindings into the store and reset per-call state.
    pub(crate) fn begin_call(
        &mut self,
        call_id: String,
        bindings: Bindings,
    ) -> Result<(), BridgeError> {
        let ctx = self.store.data_mut();
        ctx.cancel.clear();
        ctx.logs.clear();
        ctx.call_id = Some(call_id);
        ctx.bindings = Some(bindings);
        self.call_started = Some(Instant::now());

        if let Some(fuel) = self.fuel_per_call {
            refuel(&mut self.store, fuel)?;
        }
        Ok(())
    }

    /// Take the bindings back and measure the call.
    pub(crate) fn end_call(&mut self) -> CallReport {
        let fuel_consumed = self
            .fuel_per_call
            .map_or(0, |fuel| calculate_fuel_consumed(fuel, &self.store));

        let duration = self
            .call_started
            .take()
            .map_or(Duration::ZERO, |started| started.elapsed());

        let ctx = self.store.data_mut();
        ctx.call_id = None;

        CallReport {
            bindings: ctx.bindings.take().unwrap_or_default(),
            logs: std::mem::take(&mut ctx.logs),
            fuel_consumed,
            duration,
        }
    }

    /// Copy the script into guest memory and call the entry point.
    ///
    /// Returns the raw bytes of an error-shaped return value, if the entry
    /// point returned one. The script buffer is released whether or not the
    /// call succeeded.
    pub(crate) fn invoke(
        &mut self,
        operation: Operation,
        script: &str,
    ) -> wasmtime::Result<Option<Vec<u8>>> {
        let bytes = script.as_bytes();
        let len = i32::try_from(bytes.len())
            .map_err(|_| wasmtime::Error::msg("script does not fit in guest memory"))?;

        let ptr = self.alloc.call(&mut self.store, len)?;
        let result = self.call_entry(operation, ptr, len, bytes);
        self.release(ptr, len);

        result
    }

    fn call_entry(
        &mut self,
        operation: Operation,
        ptr: i32,
        len: i32,
        bytes: &[u8],
    ) -> wasmtime::Result<Option<Vec<u8>>> {
        #[allow(clippy::cast_sign_loss)]
        self.memory.write(&mut self.store, ptr as u32 as usize, bytes)?;

        let entry = *self.entry(operation);
        match entry.convention {
            ReturnConvention::ThrowOnly => {
                entry
                    .func
                    .typed::<(i32, i32), ()>(&self.store)?
                    .call(&mut self.store, (ptr, len))?;
                Ok(None)
            }
            ReturnConvention::ErrorValue => {
                let packed = entry
                    .func
                    .typed::<(i32, i32), i64>(&self.store)?
                    .call(&mut self.store, (ptr, len))?;
                self.read_packed(packed)
            }
        }
    }

    /// Hand the script buffer back to the runtime's `dealloc`, if it has one.
    ///
    /// Runs on a loan of `RELEASE_FUEL` that is not billed to the call, so
    /// a call that ran out of fuel still frees its buffer.
    fn release(&mut self, ptr: i32, len: i32) {
        let Some(dealloc) = &self.dealloc else {
            return;
        };

        let remaining = self.store.get_fuel().ok();
        if let Some(remaining) = remaining {
            let _ = self.store.set_fuel(remaining.saturating_add(RELEASE_FUEL));
        }

        if let Err(e) = dealloc.call(&mut self.store, (ptr, len)) {
            warn!(error = %trap::describe(&e), "Failed to release script buffer");
        }

        if let Some(remaining) = remaining {
            let _ = self.store.set_fuel(remaining);
        }
    }

    /// Read a `(ptr << 32) | len` value out of guest memory.
    fn read_packed(&self, packed: i64) -> wasmtime::Result<Option<Vec<u8>>> {
        if packed == 0 {
            return Ok(None);
        }

        #[allow(clippy::cast_sign_loss)]
        let packed = packed as u64;
        let (ptr, len) = (packed >> 32, packed & 0xffff_ffff);

        let out_of_bounds = || {
            wasmtime::Error::new(HostFunctionError::OutOfBounds {
                ptr: i64::try_from(ptr).unwrap_or(i64::MAX),
                len: i64::try_from(len).unwrap_or(i64::MAX),
            })
        };

        let start = usize::try_from(ptr).map_err(|_| out_of_bounds())?;
        let end = usize::try_from(ptr + len).map_err(|_| out_of_bounds())?;
        let bytes = self
            .memory
            .data(&self.store)
            .get(start..end)
            .ok_or_else(out_of_bounds)?;

        Ok(Some(bytes.to_vec()))
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.detach();
        }
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("run", &self.run.convention)
            .field("check", &self.check.convention)
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

/// Instantiate a compiled runtime against a linker.
///
/// # Errors
///
/// Returns [`BridgeError::BootFailure`] if an import is unresolved or a
/// start function traps.
pub fn instantiate(
    linker: &Linker<RuntimeContext>,
    store: &mut Store<RuntimeContext>,
    module: &CompiledModule,
) -> Result<Instance, BridgeError> {
    linker
        .instantiate(&mut *store, module.inner())
        .map_err(|e| BridgeError::boot_failure(format!("Instantiation failed: {e}")))
}

/// Call the runtime's entry routine, if it exports one.
///
/// Returns `true` if the routine was found and completed.
///
/// # Errors
///
/// Returns [`BridgeError::BootFailure`] if the routine throws.
pub fn run_entry_routine(
    store: &mut Store<RuntimeContext>,
    instance: &Instance,
    name: &str,
) -> Result<bool, BridgeError> {
    let Some(func) = instance.get_func(&mut *store, name) else {
        debug!(entry_point = name, "No entry routine exported");
        return Ok(false);
    };

    let routine = func.typed::<(), ()>(&*store).map_err(|e| {
        BridgeError::boot_failure(format!("Entry routine '{name}' has the wrong type: {e}"))
    })?;

    routine.call(&mut *store, ()).map_err(|e| {
        BridgeError::boot_failure(format!(
            "Entry routine '{name}' failed: {}",
            trap::describe(&e)
        ))
    })?;

    debug!(entry_point = name, "Entry routine completed");
    Ok(true)
}
