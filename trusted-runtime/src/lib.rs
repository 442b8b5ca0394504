//! Trusted-side primitives: the entry registry a trusted module populates
//! during initialization, the trampoline that's the sole legitimate
//! entrypoint from untrusted code, and the bridge a trusted module uses to
//! issue exit calls back out.

mod exit_bridge;
mod registry;

pub use exit_bridge::{activate_exit_bridge, call_exit, ExitBridgeGuard};
pub use registry::{dispatch_entry, EntryHandlerFn, EntryRegistry, RegistryError};

pub use enclave_ffi_types::{
    Extent, ParameterStack, PrimitiveErrorKind, PrimitiveStatus, Selector,
    RESERVED_SELECTOR_COUNT, SEL_ABORT, SEL_FINI, SEL_INIT, SEL_TRUSTED_MALLOC_PROBE,
    SEL_UNTRUSTED_ALLOC_PROBE, SEL_UNTRUSTED_INIT, USER_SELECTOR_BASE,
};
