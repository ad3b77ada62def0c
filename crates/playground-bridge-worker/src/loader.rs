//! The runtime loader.
//!
//! [`RuntimeLoader::spawn`] starts a dedicated worker thread and returns at
//! once. The thread fetches and compiles the module, links the host
//! functions, instantiates it, runs its entry routine and installs the entry
//! points. Completion is observable only through the readiness gate: there
//! is no boot future, and a boot failure leaves the gate short of `Ready`
//! forever.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};
use uuid::Uuid;
use wasmtime::Linker;

use crate::client::BridgeClient;
use crate::fetch::{DefaultFetcher, ModuleFetcher, ModuleSource};
use crate::protocol::{CallToken, HostFrame, SlotSet, WorkerFrame};
use crate::transport::{self, FrameSender, WorkerEnd};
use playground_bridge_common::{BridgeError, CallbackSlot, ConfigFile, RuntimeConfig};
use playground_bridge_core::handle::{instantiate, run_entry_routine};
use playground_bridge_core::store::create_store;
use playground_bridge_core::{
    Bindings, CompiledModule, EntryRegistry, ExecutionFacade, ExecutionRequest, RuntimeHandle,
    WasmEngine,
};
use playground_bridge_host::linker::register_all;

/// Default name of the runtime's entry routine.
pub const DEFAULT_ENTRY_POINT: &str = "_initialize";

/// Boots the runtime inside a worker thread.
pub struct RuntimeLoader {
    config: RuntimeConfig,
    source: ModuleSource,
    entry_point: String,
    fetcher: Arc<dyn ModuleFetcher>,
}

impl RuntimeLoader {
    /// Create a loader for `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default fetcher cannot be built.
    pub fn new(config: RuntimeConfig, source: ModuleSource) -> Result<Self, BridgeError> {
        let fetcher = DefaultFetcher::new(config.bridge.max_module_bytes())?;

        Ok(Self {
            config,
            source,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            fetcher: Arc::new(fetcher),
        })
    }

    /// Create a loader from a config file.
    ///
    /// `source` overrides the file's `[module] source`.
    ///
    /// # Errors
    ///
    /// Returns an error if no module source is configured.
    pub fn from_config_file(file: ConfigFile, source: Option<&str>) -> Result<Self, BridgeError> {
        let source = source
            .or(file.module.source.as_deref())
            .ok_or_else(|| BridgeError::invalid_config("No runtime module configured"))?;
        let source = ModuleSource::parse(source)?;

        Ok(Self::new(file.runtime, source)?.with_entry_point(file.module.entry_point))
    }

    /// Use a different entry routine.
    #[must_use]
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Use a custom fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ModuleFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Start the worker and return the host adapter.
    ///
    /// Must be called from within a Tokio runtime; fetching and the host
    /// side of the transport run on it.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no current Tokio runtime or the worker
    /// thread cannot be spawned.
    pub fn spawn(self) -> Result<BridgeClient, BridgeError> {
        let runtime = Handle::try_current().map_err(|e| {
            BridgeError::invalid_config(format!("Loader needs a Tokio runtime: {e}"))
        })?;

        let bridge_id = Uuid::new_v4();
        let registry = Arc::new(EntryRegistry::new());
        let (host, worker) = transport::channel();
        let bridge = self.config.bridge.clone();

        info!(bridge_id = %bridge_id, source = %self.source, "Spawning runtime worker");

        let worker_registry = registry.clone();
        let worker_runtime = runtime.clone();
        let thread = std::thread::Builder::new()
            .name(format!("playground-worker-{}", &bridge_id.simple().to_string()[..8]))
            .spawn(move || {
                let span = info_span!("worker", bridge_id = %bridge_id);
                let _entered = span.enter();
                self.run_worker(&worker_runtime, &worker_registry, worker);
            })?;

        Ok(BridgeClient::new(bridge_id, registry, host, bridge, thread, &runtime))
    }

    fn run_worker(self, runtime: &Handle, registry: &EntryRegistry, end: WorkerEnd) {
        registry.mark_loading();

        let mut facade = match self.boot(runtime) {
            Ok(facade) => facade,
            Err(e) => {
                error!(error = %e, source = %self.source, "Runtime failed to boot");
                return;
            }
        };

        registry.publish(facade.cancel_entry().cloned());
        info!(cancellable = facade.cancel_entry().is_some(), "Runtime ready");

        serve(&mut facade, end);
        debug!("Worker stopped");
    }

    fn boot(&self, runtime: &Handle) -> Result<ExecutionFacade, BridgeError> {
        let engine = WasmEngine::new(&self.config.engine)?;
        let module = self.compile(&engine, runtime)?;

        let mut linker = Linker::new(engine.inner());
        register_all(&mut linker)?;

        let mut store = create_store(&engine, &self.config.execution)?;
        let instance = instantiate(&linker, &mut store, &module)?;
        run_entry_routine(&mut store, &instance, &self.entry_point)?;

        let fuel_per_call = engine
            .is_fuel_enabled()
            .then_some(self.config.execution.max_fuel);
        let handle = RuntimeHandle::install(store, &instance, &module, fuel_per_call)?;

        Ok(ExecutionFacade::new(handle))
    }

    fn compile(
        &self,
        engine: &WasmEngine,
        runtime: &Handle,
    ) -> Result<CompiledModule, BridgeError> {
        if let ModuleSource::Wat(text) = &self.source {
            return CompiledModule::from_wat(engine.inner(), text);
        }

        let bytes = self.fetch(runtime)?;
        if self.source.is_text() {
            let text = std::str::from_utf8(&bytes).map_err(|e| {
                BridgeError::compilation_failed(format!("WAT module is not UTF-8: {e}"))
            })?;
            CompiledModule::from_wat(engine.inner(), text)
        } else {
            CompiledModule::from_bytes(engine.inner(), &bytes)
        }
    }

    /// Run the async fetch on the Tokio runtime and wait for it here.
    fn fetch(&self, runtime: &Handle) -> Result<Vec<u8>, BridgeError> {
        let (tx, rx) = oneshot::channel();
        let fetcher = self.fetcher.clone();
        let source = self.source.clone();
        let span = Span::current();

        runtime.spawn(
            async move {
                let _ = tx.send(fetcher.fetch(&source).await);
            }
            .instrument(span),
        );

        rx.blocking_recv().map_err(|_| {
            BridgeError::fetch_failed(self.source.to_string(), "fetch task was dropped")
        })?
    }
}

/// Serve calls until the host shuts the worker down or goes away.
fn serve(facade: &mut ExecutionFacade, mut end: WorkerEnd) {
    while let Some(frame) = end.receiver.blocking_recv() {
        match frame {
            Ok(HostFrame::Call {
                token,
                op,
                script,
                slots,
            }) => {
                let bindings = relay_bindings(&end.sender, token, slots);
                let outcome = facade.execute(op, ExecutionRequest::new(script, bindings));

                if end
                    .sender
                    .send(&WorkerFrame::Finished { token, outcome })
                    .is_err()
                {
                    debug!(token, "Host is gone, stopping");
                    break;
                }
            }
            Ok(HostFrame::Shutdown) => {
                info!("Shutdown requested");
                break;
            }
            Err(e) => warn!(error = %e, "Dropping malformed host frame"),
        }
    }
}

/// Worker-side bindings forwarding every invocation to the host by token.
fn relay_bindings(
    sender: &FrameSender<WorkerFrame>,
    token: CallToken,
    slots: SlotSet,
) -> Bindings {
    let mut bindings = Bindings::new();

    for slot in [CallbackSlot::Result, CallbackSlot::Check] {
        if !slots.contains(slot) {
            continue;
        }

        let sender = sender.clone();
        bindings.set(
            slot,
            Box::new(move |payload| {
                if let Err(e) = sender.send(&WorkerFrame::Callback {
                    token,
                    slot,
                    payload,
                }) {
                    warn!(token, error = %e, "Failed to relay callback");
                }
            }),
        );
    }

    bindings
}
