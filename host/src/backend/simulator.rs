use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use enclave_ffi_types::{
    ExitBridgeDescriptor, ParameterStack, PrimitiveErrorKind, PrimitiveStatus, Selector,
    SEL_ABORT,
};
use libloading::{Library, Symbol};
use log::{debug, trace};
use parking_lot::RwLock;

use crate::backend::{Backend, LoadError};
use crate::client::{ClientError, EnclaveClient, EnclaveHandle};
use crate::exit_table::ExitCallTable;

type InitFn = unsafe extern "C" fn(*mut ParameterStack) -> PrimitiveStatus;
type FiniFn = unsafe extern "C" fn() -> PrimitiveStatus;
type EntryFn = unsafe extern "C" fn(Selector, *mut ParameterStack) -> PrimitiveStatus;

const SYM_INIT: &[u8] = b"enclave_init\0";
const SYM_FINI: &[u8] = b"enclave_fini\0";
const SYM_ENTRY: &[u8] = b"enclave_entry\0";

struct LoadedModule {
    // Keeping the library alive is what keeps `fini`/`entry` valid; drop
    // order (fields drop in declaration order) matters less here since we
    // never read `library` again once it's loaded, but it must outlive the
    // function pointers resolved from it.
    library: Library,
    fini: FiniFn,
    entry: EntryFn,
}

/// Reference implementation of the backend contract: loads a dynamic
/// object from a path, resolves `enclave_init`/`enclave_fini`/
/// `enclave_entry`, and routes `EnclaveCall` straight into it in-process.
/// There is no context switch — the "boundary" is a function call — so
/// this backend provides no actual confidentiality or integrity; it exists
/// to exercise the dispatch machinery end to end.
pub struct SimulatorBackend {
    destroy_probe: Option<Arc<AtomicUsize>>,
}

impl SimulatorBackend {
    pub fn new() -> Self {
        Self {
            destroy_probe: None,
        }
    }

    /// A backend whose clients record every completed `destroy()` into
    /// `probe`, so tests can observe the resource-release property without
    /// reaching into private state.
    pub fn with_destroy_probe(probe: Arc<AtomicUsize>) -> Self {
        Self {
            destroy_probe: Some(probe),
        }
    }
}

impl Default for SimulatorBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SimulatorBackend {
    fn load(
        &self,
        path: &Path,
        exit_calls: Arc<ExitCallTable>,
    ) -> Result<EnclaveHandle, LoadError> {
        let library = unsafe { Library::new(path) }
            .map_err(|e| LoadError::NotFound(path.display().to_string(), e.to_string()))?;

        let init: InitFn = *unsafe { library.get::<InitFn>(SYM_INIT) }
            .map_err(|_| LoadError::SymbolMissing("enclave_init"))?;
        let fini: FiniFn = *unsafe { library.get::<FiniFn>(SYM_FINI) }
            .map_err(|_| LoadError::SymbolMissing("enclave_fini"))?;
        let entry: EntryFn = *unsafe { library.get::<EntryFn>(SYM_ENTRY) }
            .map_err(|_| LoadError::SymbolMissing("enclave_entry"))?;

        trace!("loaded simulator module from {:?}", path);

        let client = Arc::new_cyclic(|weak: &Weak<SimulatorClient>| SimulatorClient {
            closed: AtomicBool::new(false),
            exit_calls,
            self_weak: weak.clone(),
            module: RwLock::new(Some(LoadedModule {
                library,
                fini,
                entry,
            })),
            destroy_probe: self.destroy_probe.clone(),
            // The trusted side needs a way to call back out (§4.I) without
            // widening the ABI signature: every call we make carries this
            // as its trailing parameter frame. `Weak::as_ptr` is valid to
            // take before the `Arc` exists (the allocation is already
            // there; `new_cyclic` just hasn't handed out the strong handle
            // yet) and is the same address `Arc::as_ptr` would later give.
            bridge: ExitBridgeDescriptor {
                exit_fn: host_exit_trampoline as usize,
                ctx: weak.as_ptr() as usize,
            },
        });

        let mut init_params = ParameterStack::new(false);
        init_params.push_value(client.bridge);
        let status = unsafe { init(&mut init_params as *mut ParameterStack) };
        if !status.is_ok() {
            client.destroy();
            return Err(LoadError::InitFailed(status.message().to_string()));
        }

        debug!("enclave initialized");
        Ok(client)
    }

    fn leaks_memory_on_abort(&self) -> bool {
        true
    }
}

struct SimulatorClient {
    closed: AtomicBool,
    exit_calls: Arc<ExitCallTable>,
    self_weak: Weak<SimulatorClient>,
    // A reader/writer lock, not a plain mutex: `enclave_call` holds a
    // *read* guard for the full duration of the FFI call into `entry`, and
    // `destroy` takes the *write* side before tearing the module down.
    // Acquiring the writer blocks until every reader (in-flight call) has
    // returned, so `destroy` can never unload the library out from under a
    // call that's still running — drain semantics, per the resolution
    // SPEC_FULL.md §9 commits to.
    module: RwLock<Option<LoadedModule>>,
    destroy_probe: Option<Arc<AtomicUsize>>,
    bridge: ExitBridgeDescriptor,
}

impl EnclaveClient for SimulatorClient {
    fn enclave_call(
        &self,
        selector: Selector,
        params: &mut ParameterStack,
    ) -> Result<(), ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        let module = self.module.read();
        let entry = match &*module {
            Some(m) => m.entry,
            None => return Err(ClientError::Closed),
        };

        params.push_value(self.bridge);
        let status = unsafe { entry(selector, params as *mut ParameterStack) };
        // Held until here: a concurrent `destroy()` blocks on the writer
        // side until this call, and any other in-flight call, returns.
        drop(module);

        if selector == SEL_ABORT && status.is_ok() {
            // Forced transition to a non-enterable state. We deliberately
            // do not run `fini` or drop the module here: this backend
            // leaks on abort (see `leaks_memory_on_abort`).
            self.closed.store(true, Ordering::SeqCst);
        }

        if status.is_ok() {
            Ok(())
        } else {
            Err(ClientError::Internal(status.message().to_string()))
        }
    }

    fn destroy(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Blocks until every in-flight `enclave_call` has released its
        // read guard before the module (and the library backing it) is
        // torn down.
        if let Some(module) = self.module.write().take() {
            let _ = unsafe { (module.fini)() };
            drop(module.library);
        }
        if let Some(probe) = &self.destroy_probe {
            probe.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn exit_call_provider(&self) -> &ExitCallTable {
        &self.exit_calls
    }
}

impl Drop for SimulatorClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// The function the trusted side learns about on every call (via
/// `SimulatorClient::bridge`) and calls back through to run an exit call.
unsafe extern "C" fn host_exit_trampoline(
    ctx: usize,
    selector: Selector,
    params: *mut ParameterStack,
) -> PrimitiveStatus {
    let client = &*(ctx as *const SimulatorClient);
    let handle: EnclaveHandle = match client.self_weak.upgrade() {
        Some(strong) => strong,
        None => {
            return PrimitiveStatus::failed(
                PrimitiveErrorKind::FailedPrecondition,
                "exit call after client was dropped",
            )
        }
    };
    match client.exit_calls.invoke(selector, &handle, &mut *params) {
        Ok(status) => status,
        Err(e) => e.into(),
    }
}
