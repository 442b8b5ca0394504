use std::cell::RefCell;

use enclave_ffi_types::{
    ExitBridgeDescriptor, ParameterStack, PrimitiveErrorKind, PrimitiveStatus, Selector,
};

type ExitFn = unsafe extern "C" fn(usize, Selector, *mut ParameterStack) -> PrimitiveStatus;

#[derive(Clone, Copy)]
struct ExitBridge {
    exit_fn: ExitFn,
    ctx: usize,
}

// The bridge is just an address pair; the untrusted side is responsible
// for the pointee's thread-safety.
unsafe impl Send for ExitBridge {}
unsafe impl Sync for ExitBridge {}

thread_local! {
    // A stack, not a single slot. Every call into this module's entry
    // point carries its own bridge descriptor as the trailing frame on its
    // parameter stack (see `activate_exit_bridge`), so two modules loaded
    // in the same process — or the same module loaded twice, as every
    // integration test file that runs more than one `#[test]` does — never
    // share state: each call on each thread only ever sees the bridge it
    // arrived with. The stack (rather than a single cell) is what makes
    // reentrancy safe: a handler that calls out and is called back into
    // pushes a second frame instead of clobbering the first.
    static ACTIVE: RefCell<Vec<ExitBridge>> = RefCell::new(Vec::new());
}

/// Held for the duration of one call into this module's entry point.
/// While live, `call_exit` routes through the bridge it was built from.
/// Dropping it restores whatever bridge (if any) was active before, so
/// nested activations on the same thread unwind correctly.
#[must_use]
pub struct ExitBridgeGuard(());

impl Drop for ExitBridgeGuard {
    fn drop(&mut self) {
        ACTIVE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Pop the `ExitBridgeDescriptor` every call into this module carries as
/// its trailing frame (see SPEC_FULL.md §4.I) and make it the bridge
/// `call_exit` routes through on this thread until the returned guard is
/// dropped. Every entrypoint this crate's embedder exports must call this
/// before running any handler logic.
pub fn activate_exit_bridge(
    params: &mut ParameterStack,
) -> Result<ExitBridgeGuard, PrimitiveStatus> {
    let descriptor: ExitBridgeDescriptor = params.pop_value().map_err(|e| {
        PrimitiveStatus::failed(PrimitiveErrorKind::InvalidArgument, &e.to_string())
    })?;
    // Safety: the descriptor's `exit_fn` was produced by the host as a
    // valid `ExitFn`-typed function pointer.
    let exit_fn: ExitFn = unsafe { std::mem::transmute(descriptor.exit_fn) };
    ACTIVE.with(|stack| {
        stack.borrow_mut().push(ExitBridge {
            exit_fn,
            ctx: descriptor.ctx,
        });
    });
    Ok(ExitBridgeGuard(()))
}

/// Issue an exit call: control passes to the untrusted side's dispatch
/// table for `selector`, which consults the handler registered there, then
/// returns here with `params` exchanged in place.
pub fn call_exit(selector: Selector, params: &mut ParameterStack) -> PrimitiveStatus {
    let bridge = ACTIVE.with(|stack| stack.borrow().last().copied());
    match bridge {
        Some(bridge) => unsafe {
            (bridge.exit_fn)(bridge.ctx, selector, params as *mut ParameterStack)
        },
        None => PrimitiveStatus::failed(
            PrimitiveErrorKind::FailedPrecondition,
            "exit bridge not active on this thread; call_exit is only valid from within an entry handler",
        ),
    }
}
