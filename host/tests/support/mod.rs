//! A second `Backend` implementation, used only by this test suite: it
//! links the fixture's entry points directly into the test binary instead
//! of `dlopen`ing a `cdylib`, the way Asylo's own primitives test keeps a
//! `TestBackend` independent of whichever real backend (simulator, SGX) is
//! under test. Exercises the same client/dispatch-table machinery as
//! `SimulatorBackend` without needing a build step to produce a shared
//! object first.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use enclave_ffi_types::{
    ExitBridgeDescriptor, ParameterStack, PrimitiveErrorKind, PrimitiveStatus, Selector, SEL_ABORT,
};
use enclave_host::{Backend, ClientError, EnclaveClient, EnclaveHandle, ExitCallTable, LoadError};

pub struct TestBackend;

impl Backend for TestBackend {
    fn load(&self, _path: &Path, exit_calls: Arc<ExitCallTable>) -> Result<EnclaveHandle, LoadError> {
        let client = Arc::new_cyclic(|weak: &Weak<TestClient>| TestClient {
            closed: AtomicBool::new(false),
            exit_calls,
            self_weak: weak.clone(),
            bridge: ExitBridgeDescriptor {
                exit_fn: test_exit_trampoline as usize,
                ctx: weak.as_ptr() as usize,
            },
        });

        let mut init_params = ParameterStack::new(false);
        init_params.push_value(client.bridge);
        let status = enclave_sim_fixture::init(&mut init_params);
        if !status.is_ok() {
            client.destroy();
            return Err(LoadError::InitFailed(status.message().to_string()));
        }
        Ok(client)
    }

    fn leaks_memory_on_abort(&self) -> bool {
        false
    }
}

struct TestClient {
    closed: AtomicBool,
    exit_calls: Arc<ExitCallTable>,
    self_weak: Weak<TestClient>,
    bridge: ExitBridgeDescriptor,
}

impl EnclaveClient for TestClient {
    fn enclave_call(
        &self,
        selector: Selector,
        params: &mut ParameterStack,
    ) -> Result<(), ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        params.push_value(self.bridge);
        let status = enclave_sim_fixture::entry(selector, params);
        if selector == SEL_ABORT && status.is_ok() {
            self.closed.store(true, Ordering::SeqCst);
        }
        if status.is_ok() {
            Ok(())
        } else {
            Err(ClientError::Internal(status.message().to_string()))
        }
    }

    fn destroy(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = enclave_sim_fixture::fini();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn exit_call_provider(&self) -> &ExitCallTable {
        &self.exit_calls
    }
}

impl Drop for TestClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

unsafe extern "C" fn test_exit_trampoline(
    ctx: usize,
    selector: Selector,
    params: *mut ParameterStack,
) -> PrimitiveStatus {
    let client = &*(ctx as *const TestClient);
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

/// Recurse into `TrustedFib` from the untrusted side, the way a real
/// Asylo-style "call chain" test drives recursion across the boundary.
pub fn untrusted_fibonacci(client: &EnclaveHandle, n: i32) -> Result<i32, ClientError> {
    let mut params = ParameterStack::new(false);
    params.push_value(n);
    client.enclave_call(enclave_sim_fixture::selectors::TRUSTED_FIBONACCI, &mut params)?;
    Ok(params.pop_value::<i32>()?)
}

/// The `enclave-sim-fixture` `cdylib` built as a sibling of this test
/// binary. `cargo test` builds every dev-dependency's declared crate
/// types before running the test suite, so by the time a test body runs,
/// the `cdylib` form of `enclave-sim-fixture` (declared alongside the
/// `rlib` form `TestBackend` links directly) already sits in the
/// workspace's `target/<profile>` directory — `SimulatorBackend` can
/// `dlopen` it exactly like it would a real trusted module's shared
/// object.
pub fn fixture_cdylib_path() -> PathBuf {
    let target_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("target");
    for profile in ["debug", "release"] {
        let candidate = target_dir.join(profile).join("libenclave_sim_fixture.so");
        if candidate.exists() {
            return candidate;
        }
    }
    panic!(
        "enclave-sim-fixture cdylib not found under {}; build the workspace before running this test",
        target_dir.display()
    );
}
