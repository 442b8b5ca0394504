//! A minimal trusted module used to exercise the untrusted/trusted
//! boundary end to end: a handful of entry points built on
//! `enclave-trusted-runtime`, compiled both as a `cdylib` (for
//! `SimulatorBackend`, which `dlopen`s it) and as an ordinary `rlib` (for
//! `TestBackend`, which links its entry points directly into the test
//! binary). The two exported surfaces below — the `#[no_mangle] extern
//! "C"` functions and the plain `pub fn` wrappers — dispatch to the same
//! registry so neither backend exercises different logic.

use enclave_ffi_types::{ParameterStack, PrimitiveErrorKind, PrimitiveStatus, Selector, SEL_ABORT};
use enclave_trusted_runtime::{activate_exit_bridge, call_exit, dispatch_entry, EntryRegistry};
use lazy_static::lazy_static;
use log::trace;

/// Selectors this fixture answers on the trusted side, and the one it
/// expects the untrusted side to answer on its own dispatch table.
pub mod selectors {
    use enclave_ffi_types::{Selector, USER_SELECTOR_BASE};

    /// `EnclaveCall(TIMES_TWO, [n: i32]) -> [2n: i32]`.
    pub const TIMES_TWO: Selector = USER_SELECTOR_BASE;
    /// `EnclaveCall(TRUSTED_FIBONACCI, [n: i32]) -> [fib(n): i32]`, n < 50.
    pub const TRUSTED_FIBONACCI: Selector = USER_SELECTOR_BASE + 1;
    /// Exit call the trusted side issues from `TRUSTED_FIBONACCI`'s handler;
    /// the untrusted side must register a handler for it before loading.
    pub const UNTRUSTED_FIBONACCI: Selector = USER_SELECTOR_BASE + 2;
    /// Never registered; used by tests exercising the unknown-selector path.
    pub const NOT_REGISTERED: Selector = USER_SELECTOR_BASE + 999;
}

lazy_static! {
    static ref REGISTRY: EntryRegistry = build_registry();
}

fn build_registry() -> EntryRegistry {
    let registry = EntryRegistry::new();

    registry
        .register(selectors::TIMES_TWO, |params| {
            if params.len() != 1 {
                return PrimitiveStatus::failed(
                    PrimitiveErrorKind::InvalidArgument,
                    "expects exactly one argument frame",
                );
            }
            let n: i32 = match params.pop_value() {
                Ok(n) => n,
                Err(e) => {
                    return PrimitiveStatus::failed(PrimitiveErrorKind::InvalidArgument, &e.to_string())
                }
            };
            params.push_value(n.wrapping_mul(2));
            PrimitiveStatus::ok()
        })
        .expect("TIMES_TWO registered once at module init");

    registry
        .register(selectors::TRUSTED_FIBONACCI, trusted_fibonacci)
        .expect("TRUSTED_FIBONACCI registered once at module init");

    // A trusted module's own SEL_ABORT handler: acknowledge the call so the
    // host can force the client closed. What "finalize before abort" means
    // is backend-specific (the simulator backend skips fini/teardown
    // entirely and declares that it leaks via `leaks_memory_on_abort`).
    registry
        .register_reserved(SEL_ABORT, |_params| PrimitiveStatus::ok(), true)
        .expect("SEL_ABORT registered once at module init");

    registry
}

/// `fib(n)` computed by handing off every recursive step to the untrusted
/// side: `TrustedFib(n)` issues `UntrustedFib(n)` as an exit call, and the
/// untrusted handler re-enters with `TrustedFib(n-1)` and `TrustedFib(n-2)`.
/// Exercises reentrancy through both directions of the boundary at once.
fn trusted_fibonacci(params: &mut ParameterStack) -> PrimitiveStatus {
    let n: i32 = match params.pop_value() {
        Ok(n) => n,
        Err(e) => return PrimitiveStatus::failed(PrimitiveErrorKind::InvalidArgument, &e.to_string()),
    };
    if !(0..50).contains(&n) {
        return PrimitiveStatus::failed(
            PrimitiveErrorKind::OutOfRange,
            "fibonacci argument must be in 0..50",
        );
    }
    if n < 2 {
        params.push_value(n);
        return PrimitiveStatus::ok();
    }

    let mut exit_params = ParameterStack::new(true);
    exit_params.push_value(n);
    let status = call_exit(selectors::UNTRUSTED_FIBONACCI, &mut exit_params);
    if !status.is_ok() {
        return status;
    }
    let result: i32 = match exit_params.pop_value() {
        Ok(v) => v,
        Err(e) => return PrimitiveStatus::failed(PrimitiveErrorKind::InvalidArgument, &e.to_string()),
    };
    params.push_value(result);
    PrimitiveStatus::ok()
}

/// Plain-function entry points, callable directly in-process (used by
/// `TestBackend`) without going through a `dlopen`ed symbol table.
pub fn init(params: &mut ParameterStack) -> PrimitiveStatus {
    let _bridge = match activate_exit_bridge(params) {
        Ok(guard) => guard,
        Err(status) => return status,
    };
    lazy_static::initialize(&REGISTRY);
    trace!("fixture initialized");
    PrimitiveStatus::ok()
}

pub fn fini() -> PrimitiveStatus {
    PrimitiveStatus::ok()
}

pub fn entry(selector: Selector, params: &mut ParameterStack) -> PrimitiveStatus {
    dispatch_entry(&REGISTRY, selector, params)
}

/// # Safety
/// Must only be called by the host's simulator backend with a valid,
/// exclusively-owned `ParameterStack` pointer, exactly once per load.
#[no_mangle]
pub unsafe extern "C" fn enclave_init(params: *mut ParameterStack) -> PrimitiveStatus {
    init(&mut *params)
}

/// # Safety
/// Must only be called by the host's simulator backend, at most once, after
/// every in-flight `enclave_entry` call has returned.
#[no_mangle]
pub unsafe extern "C" fn enclave_fini() -> PrimitiveStatus {
    fini()
}

/// # Safety
/// Must only be called by the host's simulator backend with a valid,
/// exclusively-owned `ParameterStack` pointer.
#[no_mangle]
pub unsafe extern "C" fn enclave_entry(
    selector: Selector,
    params: *mut ParameterStack,
) -> PrimitiveStatus {
    entry(selector, &mut *params)
}
