use core::fmt;

/// Maximum length, in bytes, of a `PrimitiveStatus` message.
pub const STATUS_MESSAGE_CAPACITY: usize = 256;

/// The narrow taxonomy of error kinds that can cross the boundary. Richer
/// envelopes above this layer are built from a `PrimitiveStatus` after
/// `EnclaveCall` returns; this layer never depends on their allocation
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveErrorKind {
    /// parameter stack shape mismatch (wrong frame count or frame size)
    #[error("invalid argument")]
    InvalidArgument,
    /// selector not registered on the dispatched side
    #[error("not found")]
    NotFound,
    /// selector not registered on the dispatched side (exit-call table)
    #[error("out of range")]
    OutOfRange,
    /// double registration of a selector
    #[error("already exists")]
    AlreadyExists,
    /// call on a closed or aborted client
    #[error("failed precondition")]
    FailedPrecondition,
    /// backend-reported entry failure
    #[error("internal")]
    Internal,
    /// caught from the trusted side when it could not produce a structured error
    #[error("unknown")]
    Unknown,
}

impl PrimitiveErrorKind {
    fn code(self) -> i32 {
        match self {
            PrimitiveErrorKind::InvalidArgument => 1,
            PrimitiveErrorKind::NotFound => 2,
            PrimitiveErrorKind::OutOfRange => 3,
            PrimitiveErrorKind::AlreadyExists => 4,
            PrimitiveErrorKind::FailedPrecondition => 5,
            PrimitiveErrorKind::Internal => 6,
            PrimitiveErrorKind::Unknown => 7,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => PrimitiveErrorKind::InvalidArgument,
            2 => PrimitiveErrorKind::NotFound,
            3 => PrimitiveErrorKind::OutOfRange,
            4 => PrimitiveErrorKind::AlreadyExists,
            5 => PrimitiveErrorKind::FailedPrecondition,
            6 => PrimitiveErrorKind::Internal,
            7 => PrimitiveErrorKind::Unknown,
            _ => return None,
        })
    }
}

/// A small integer code plus an optional short message: the result carrier
/// for the hot path across the boundary. `error_code == 0` means success.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct PrimitiveStatus {
    error_code: i32,
    message_len: u16,
    message: [u8; STATUS_MESSAGE_CAPACITY],
}

impl PrimitiveStatus {
    pub fn ok() -> Self {
        Self {
            error_code: 0,
            message_len: 0,
            message: [0; STATUS_MESSAGE_CAPACITY],
        }
    }

    pub fn failed(kind: PrimitiveErrorKind, message: &str) -> Self {
        let mut buf = [0u8; STATUS_MESSAGE_CAPACITY];
        let bytes = message.as_bytes();
        let n = bytes.len().min(STATUS_MESSAGE_CAPACITY);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self {
            error_code: kind.code(),
            message_len: n as u16,
            message: buf,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_code == 0
    }

    pub fn kind(&self) -> Option<PrimitiveErrorKind> {
        PrimitiveErrorKind::from_code(self.error_code)
    }

    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.message[..self.message_len as usize]).unwrap_or("")
    }
}

impl fmt::Debug for PrimitiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveStatus")
            .field("error_code", &self.error_code)
            .field("message", &self.message())
            .finish()
    }
}
