use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use enclave_ffi_types::{
    ParameterStack, PrimitiveErrorKind, PrimitiveStatus, Selector, RESERVED_SELECTOR_COUNT,
};
use log::error;
use parking_lot::RwLock;

pub type EntryHandlerFn = dyn Fn(&mut ParameterStack) -> PrimitiveStatus + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("selector {0} is already registered")]
    AlreadyExists(Selector),
    #[error("selector {0} is reserved for runtime-internal use")]
    Reserved(Selector),
    #[error("selector {0} is not registered")]
    NotFound(Selector),
}

impl From<RegistryError> for PrimitiveStatus {
    fn from(e: RegistryError) -> Self {
        let kind = match e {
            RegistryError::AlreadyExists(_) => PrimitiveErrorKind::AlreadyExists,
            RegistryError::Reserved(_) => PrimitiveErrorKind::InvalidArgument,
            RegistryError::NotFound(_) => PrimitiveErrorKind::NotFound,
        };
        PrimitiveStatus::failed(kind, &e.to_string())
    }
}

/// Symmetric to the untrusted dispatch table: selector -> handler map on
/// the trusted side, used by the entry trampoline. Populated during
/// enclave initialization; unknown selectors at lookup time return
/// `NotFound`.
pub struct EntryRegistry {
    handlers: RwLock<HashMap<Selector, Arc<EntryHandlerFn>>>,
}

impl EntryRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for `selector`. Selectors below
    /// `RESERVED_SELECTOR_COUNT` are runtime-internal; registering one from
    /// user code is a configuration error, reported the same as a double
    /// registration would be.
    pub fn register<F>(&self, selector: Selector, handler: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut ParameterStack) -> PrimitiveStatus + Send + Sync + 'static,
    {
        self.register_reserved(selector, handler, false)
    }

    /// Like `register`, but allowed to target the reserved range. Used by
    /// the runtime itself to install `SEL_INIT`/`SEL_FINI`/`SEL_ABORT`.
    pub fn register_reserved<F>(
        &self,
        selector: Selector,
        handler: F,
        allow_reserved: bool,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&mut ParameterStack) -> PrimitiveStatus + Send + Sync + 'static,
    {
        if !allow_reserved && selector < RESERVED_SELECTOR_COUNT {
            return Err(RegistryError::Reserved(selector));
        }
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&selector) {
            return Err(RegistryError::AlreadyExists(selector));
        }
        handlers.insert(selector, Arc::new(handler));
        Ok(())
    }

    pub fn lookup(&self, selector: Selector) -> Result<Arc<EntryHandlerFn>, RegistryError> {
        self.handlers
            .read()
            .get(&selector)
            .cloned()
            .ok_or(RegistryError::NotFound(selector))
    }
}

impl Default for EntryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The sole legitimate entrypoint from untrusted code. Looks up `selector`
/// in `registry` and dispatches to it; converts an unknown selector or a
/// handler panic into a failure status rather than ever unwinding across
/// the `extern "C"` boundary.
pub fn dispatch_entry(
    registry: &EntryRegistry,
    selector: Selector,
    params: &mut ParameterStack,
) -> PrimitiveStatus {
    let _bridge = match crate::exit_bridge::activate_exit_bridge(params) {
        Ok(guard) => guard,
        Err(status) => return status,
    };

    if let Some(bad) = params.extents().iter().find(|e| e.is_trusted()) {
        error!(
            "rejecting entry for selector {}: incoming frame ({} bytes) claims to be trusted memory",
            selector,
            bad.len()
        );
        return PrimitiveStatus::failed(
            PrimitiveErrorKind::InvalidArgument,
            "parameter stack from untrusted code must not contain trusted frames",
        );
    }

    let handler = match registry.lookup(selector) {
        Ok(h) => h,
        Err(e) => return e.into(),
    };

    match panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
        Ok(status) => status,
        Err(payload) => {
            let message = panic_message(&payload);
            error!("entry handler for selector {} panicked: {}", selector, message);
            PrimitiveStatus::failed(PrimitiveErrorKind::Unknown, &message)
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enclave_ffi_types::ExitBridgeDescriptor;

    unsafe extern "C" fn unused_exit_fn(
        _ctx: usize,
        _selector: Selector,
        _params: *mut ParameterStack,
    ) -> PrimitiveStatus {
        PrimitiveStatus::ok()
    }

    /// Every call through `dispatch_entry` carries a bridge descriptor as
    /// its trailing frame; these tests don't exercise `call_exit`, so a
    /// placeholder that's never actually invoked is enough.
    fn push_bridge(params: &mut ParameterStack) {
        params.push_value(ExitBridgeDescriptor {
            exit_fn: unused_exit_fn as usize,
            ctx: 0,
        });
    }

    #[test]
    fn register_each_selector_once_succeeds_twice_fails() {
        let registry = EntryRegistry::new();
        for s in [100u64, 110, 120] {
            assert!(registry.register(s, |_| PrimitiveStatus::ok()).is_ok());
        }
        assert_eq!(
            registry.register(100, |_| PrimitiveStatus::ok()),
            Err(RegistryError::AlreadyExists(100))
        );
    }

    #[test]
    fn registering_in_the_reserved_range_is_rejected() {
        let registry = EntryRegistry::new();
        assert_eq!(
            registry.register(0, |_| PrimitiveStatus::ok()),
            Err(RegistryError::Reserved(0))
        );
    }

    #[test]
    fn dispatch_runs_the_registered_handler() {
        let registry = EntryRegistry::new();
        registry
            .register(200, |params: &mut ParameterStack| {
                let n: i32 = params.pop_value().unwrap();
                params.push_value(n * 2);
                PrimitiveStatus::ok()
            })
            .unwrap();
        let mut params = ParameterStack::new(true);
        params.push_value(21i32);
        push_bridge(&mut params);
        let status = dispatch_entry(&registry, 200, &mut params);
        assert!(status.is_ok());
        assert_eq!(params.pop_value::<i32>().unwrap(), 42);
    }

    #[test]
    fn dispatch_on_unknown_selector_fails_without_unwinding() {
        let registry = EntryRegistry::new();
        let mut params = ParameterStack::new(true);
        push_bridge(&mut params);
        let status = dispatch_entry(&registry, 999, &mut params);
        assert!(!status.is_ok());
        assert_eq!(status.kind(), Some(PrimitiveErrorKind::NotFound));
    }

    #[test]
    fn dispatch_rejects_a_stack_carrying_a_trusted_frame() {
        let registry = EntryRegistry::new();
        registry.register(202, |_| PrimitiveStatus::ok()).unwrap();
        let mut params = ParameterStack::new(true);
        params.push_value(7i32);
        push_bridge(&mut params);
        let status = dispatch_entry(&registry, 202, &mut params);
        assert!(!status.is_ok());
        assert_eq!(status.kind(), Some(PrimitiveErrorKind::InvalidArgument));
    }

    #[test]
    fn a_panicking_handler_becomes_a_failure_status() {
        let registry = EntryRegistry::new();
        registry
            .register(201, |_| panic!("boom"))
            .unwrap();
        let mut params = ParameterStack::new(true);
        push_bridge(&mut params);
        let status = dispatch_entry(&registry, 201, &mut params);
        assert!(!status.is_ok());
    }
}
