mod simulator;

pub use simulator::SimulatorBackend;

use std::path::Path;
use std::sync::Arc;

use enclave_ffi_types::PrimitiveErrorKind;

use crate::client::EnclaveHandle;
use crate::exit_table::ExitCallTable;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("shared object not found at {0}: {1}")]
    NotFound(String, String),
    #[error("required symbol missing: {0}")]
    SymbolMissing(&'static str),
    #[error("initializer returned failure: {0}")]
    InitFailed(String),
}

impl LoadError {
    pub fn kind(&self) -> PrimitiveErrorKind {
        match self {
            LoadError::NotFound(..) => PrimitiveErrorKind::NotFound,
            LoadError::SymbolMissing(_) => PrimitiveErrorKind::NotFound,
            LoadError::InitFailed(_) => PrimitiveErrorKind::Internal,
        }
    }
}

/// How a concrete backend (simulator, real enclave) loads and enters. The
/// minimal surface every backend must satisfy: construct a client from a
/// path and hand it the dispatch table it will own, and back the client's
/// per-call entry primitive.
pub trait Backend {
    /// Construct a concrete client, handing it `exit_calls` to own.
    fn load(&self, path: &Path, exit_calls: Arc<ExitCallTable>) -> Result<EnclaveHandle, LoadError>;

    /// Whether an aborted client from this backend intentionally leaks
    /// trusted-side resources rather than tearing them down. Lets test
    /// harnesses calibrate leak detection around the abort scenario.
    fn leaks_memory_on_abort(&self) -> bool {
        false
    }
}
