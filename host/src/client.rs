use std::sync::Arc;

use enclave_ffi_types::{ParameterStack, PrimitiveErrorKind, PrimitiveStatus, Selector, StackError};

use crate::exit_table::ExitCallTable;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("enclave call failed: client is closed")]
    Closed,
    #[error("parameter stack error: {0}")]
    Stack(#[from] StackError),
    #[error("backend entry failed: {0}")]
    Internal(String),
}

impl From<ClientError> for PrimitiveStatus {
    fn from(e: ClientError) -> Self {
        let kind = match e {
            ClientError::Closed => PrimitiveErrorKind::FailedPrecondition,
            ClientError::Stack(_) => PrimitiveErrorKind::InvalidArgument,
            ClientError::Internal(_) => PrimitiveErrorKind::Internal,
        };
        PrimitiveStatus::failed(kind, &e.to_string())
    }
}

/// The untrusted-side handle for a loaded enclave.
///
/// State machine: `Loaded -> Entered* -> Loaded -> Closed` (`Closed` is
/// terminal). Many threads may call `enclave_call` concurrently on the same
/// client; the backend serializes as its trust technology requires, but the
/// client layer itself never adds global serialization.
pub trait EnclaveClient: Send + Sync {
    /// Enter the enclave at `selector`, exchanging `params` in place. Fails
    /// if the client is closed or aborted, if the backend's entry fails, or
    /// if the trusted side returns a failed status.
    fn enclave_call(
        &self,
        selector: Selector,
        params: &mut ParameterStack,
    ) -> Result<(), ClientError>;

    /// Initiate close. Idempotent, and the resulting state is visible to
    /// all co-owners immediately upon return.
    fn destroy(&self);

    fn is_closed(&self) -> bool;

    /// The dispatch table this client owns, so handlers can be registered
    /// before or between calls.
    fn exit_call_provider(&self) -> &ExitCallTable;
}

/// A client is multi-owned: cloning the handle produces another co-owner
/// that observes the same `Closed` state atomically. Dropping the last
/// owner of a not-yet-destroyed client invokes `destroy` implicitly.
pub type EnclaveHandle = Arc<dyn EnclaveClient>;
