//! Untrusted-side primitives: the enclave client, the exit-call dispatch
//! table it owns, and the backend contract that loads and enters a
//! concrete trusted module.

mod backend;
mod client;
mod exit_table;

pub use backend::{Backend, LoadError, SimulatorBackend};
pub use client::{ClientError, EnclaveClient, EnclaveHandle};
pub use exit_table::{DispatchError, ExitCallTable, ExitContext, ExitHandlerCallback};

pub use enclave_ffi_types::{
    Extent, ParameterStack, PrimitiveErrorKind, PrimitiveStatus, Selector, StackError,
    RESERVED_SELECTOR_COUNT, SEL_ABORT, SEL_FINI, SEL_INIT, SEL_TRUSTED_MALLOC_PROBE,
    SEL_UNTRUSTED_ALLOC_PROBE, SEL_UNTRUSTED_INIT, USER_SELECTOR_BASE,
};
