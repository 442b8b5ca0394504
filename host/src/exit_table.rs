use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

use enclave_ffi_types::{ParameterStack, PrimitiveErrorKind, PrimitiveStatus, Selector};
use parking_lot::RwLock;

use crate::client::EnclaveHandle;

/// An opaque pointer handed back to an exit handler unchanged, the way it
/// was registered. The pointee's safety is entirely the registrant's
/// responsibility.
#[derive(Clone, Copy)]
pub struct ExitContext(pub *mut c_void);

// An ExitContext is just an address; whether it's safe to dereference from
// another thread is up to whatever the registrant put behind it.
unsafe impl Send for ExitContext {}
unsafe impl Sync for ExitContext {}

impl ExitContext {
    pub fn none() -> Self {
        Self(std::ptr::null_mut())
    }
}

/// The callable half of an exit handler: takes the owning client handle (so
/// a reentrant call back into the enclave is possible), the context it was
/// registered with, and the parameter stack to read/write in place.
pub type ExitHandlerCallback =
    dyn Fn(EnclaveHandle, ExitContext, &mut ParameterStack) -> PrimitiveStatus + Send + Sync;

struct ExitHandlerEntry {
    context: ExitContext,
    callback: Box<ExitHandlerCallback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("selector {0} is already registered")]
    AlreadyExists(Selector),
    #[error("selector {0} is not registered")]
    OutOfRange(Selector),
}

impl From<DispatchError> for PrimitiveStatus {
    fn from(e: DispatchError) -> Self {
        let kind = match e {
            DispatchError::AlreadyExists(_) => PrimitiveErrorKind::AlreadyExists,
            DispatchError::OutOfRange(_) => PrimitiveErrorKind::OutOfRange,
        };
        PrimitiveStatus::failed(kind, &e.to_string())
    }
}

/// Selector -> handler map on the untrusted side. Registration and
/// invocation may race from many threads: an insert either wins or returns
/// `AlreadyExists`, and once a handler is visible to one thread it is
/// visible to all subsequent invokers. Invocation holds only a shared view
/// and never blocks other invocations on unrelated selectors — the lock is
/// dropped before the handler runs, since a handler may re-enter the
/// enclave.
pub struct ExitCallTable {
    handlers: RwLock<HashMap<Selector, Arc<ExitHandlerEntry>>>,
}

impl ExitCallTable {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register<F>(
        &self,
        selector: Selector,
        context: ExitContext,
        callback: F,
    ) -> Result<(), DispatchError>
    where
        F: Fn(EnclaveHandle, ExitContext, &mut ParameterStack) -> PrimitiveStatus
            + Send
            + Sync
            + 'static,
    {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&selector) {
            return Err(DispatchError::AlreadyExists(selector));
        }
        handlers.insert(
            selector,
            Arc::new(ExitHandlerEntry {
                context,
                callback: Box::new(callback),
            }),
        );
        Ok(())
    }

    pub fn invoke(
        &self,
        selector: Selector,
        client: &EnclaveHandle,
        params: &mut ParameterStack,
    ) -> Result<PrimitiveStatus, DispatchError> {
        let entry = {
            // Drop the guard before calling the handler: the handler may
            // recursively re-enter the enclave, which may itself invoke
            // another exit call on this same table.
            let handlers = self.handlers.read();
            handlers
                .get(&selector)
                .cloned()
                .ok_or(DispatchError::OutOfRange(selector))?
        };
        Ok((entry.callback)(Arc::clone(client), entry.context, params))
    }
}

impl Default for ExitCallTable {
    fn default() -> Self {
        Self::new()
    }
}
