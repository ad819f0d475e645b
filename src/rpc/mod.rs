//! Caller identity and the error envelope exchanged with the routing tier.
//!
//! Both travel as MessagePack. Error codes keep their wire numbers so that
//! an [`RpcError`] can be mapped back without a lookup table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{DbError, Result};

/// Identity of the caller, attached to every dispatched statement.
///
/// The routing tier uses it for logging and ACLs only; it never affects
/// where a statement goes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerId {
    pub principal: String,
    pub component: String,
    pub subcomponent: String,
}

impl CallerId {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            ..Self::default()
        }
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn subcomponent(mut self, subcomponent: impl Into<String>) -> Self {
        self.subcomponent = subcomponent.into();
        self
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self)
            .map_err(|e| DbError::SerializationError(format!("Failed to encode caller id: {}", e)))
    }

    pub fn from_msgpack(data: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(data)
            .map_err(|e| DbError::SerializationError(format!("Failed to decode caller id: {}", e)))
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.principal)?;
        if !self.component.is_empty() {
            write!(f, "/{}", self.component)?;
        }
        if !self.subcomponent.is_empty() {
            write!(f, "/{}", self.subcomponent)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ErrorCode {
    Success = 0,
    Cancelled = 1,
    UnknownError = 2,
    BadInput = 3,
    DeadlineExceeded = 4,
    IntegrityError = 5,
    PermissionDenied = 6,
    ThrottledError = 7,
    QueryNotServed = 8,
    NotInTx = 9,
    InternalError = 10,
    ResourceTemporarilyUnavailable = 11,
}

impl ErrorCode {
    pub fn from_i32(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Success,
            1 => Self::Cancelled,
            2 => Self::UnknownError,
            3 => Self::BadInput,
            4 => Self::DeadlineExceeded,
            5 => Self::IntegrityError,
            6 => Self::PermissionDenied,
            7 => Self::ThrottledError,
            8 => Self::QueryNotServed,
            9 => Self::NotInTx,
            10 => Self::InternalError,
            11 => Self::ResourceTemporarilyUnavailable,
            _ => return None,
        })
    }

    /// Whether resending the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeadlineExceeded
                | Self::ThrottledError
                | Self::QueryNotServed
                | Self::ResourceTemporarilyUnavailable
        )
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code as i32
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = String;

    fn try_from(code: i32) -> std::result::Result<Self, Self::Error> {
        Self::from_i32(code).ok_or_else(|| format!("unknown error code {}", code))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "SUCCESS",
            Self::Cancelled => "CANCELLED",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::BadInput => "BAD_INPUT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::IntegrityError => "INTEGRITY_ERROR",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ThrottledError => "THROTTLED_ERROR",
            Self::QueryNotServed => "QUERY_NOT_SERVED",
            Self::NotInTx => "NOT_IN_TX",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ResourceTemporarilyUnavailable => "RESOURCE_TEMPORARILY_UNAVAILABLE",
        };
        write!(f, "{}", name)
    }
}

/// Legacy code space still sent by older servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCodeDeprecated {
    NoError = 0,
    TabletError = 1000,
    UnknownTabletError = 1999,
    VtgateError = 2000,
    UnknownVtgateError = 2999,
}

impl ErrorCodeDeprecated {
    pub fn from_i32(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::NoError,
            1000 => Self::TabletError,
            1999 => Self::UnknownTabletError,
            2000 => Self::VtgateError,
            2999 => Self::UnknownVtgateError,
            _ => return None,
        })
    }

    /// Closest current code.
    pub fn to_error_code(self) -> ErrorCode {
        match self {
            Self::NoError => ErrorCode::Success,
            Self::TabletError | Self::VtgateError => ErrorCode::BadInput,
            Self::UnknownTabletError | Self::UnknownVtgateError => ErrorCode::UnknownError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self)
            .map_err(|e| DbError::SerializationError(format!("Failed to encode rpc error: {}", e)))
    }

    pub fn from_msgpack(data: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(data)
            .map_err(|e| DbError::SerializationError(format!("Failed to decode rpc error: {}", e)))
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<&DbError> for RpcError {
    fn from(err: &DbError) -> Self {
        let code = match err {
            DbError::ConfigurationError(_)
            | DbError::ValidationError(_)
            | DbError::WriteRoutingError(_)
            | DbError::PreconditionError(_)
            | DbError::FormatError(_)
            | DbError::TableNotFound(_) => ErrorCode::BadInput,
            DbError::NotFoundError(_) => ErrorCode::IntegrityError,
            DbError::PartialWriteError { .. } => ErrorCode::IntegrityError,
            DbError::LockError(_) => ErrorCode::ResourceTemporarilyUnavailable,
            DbError::ExecutionError(_) | DbError::SerializationError(_) => ErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Value, WriteStep};

    #[test]
    fn test_caller_id_msgpack() {
        let caller = CallerId::new("alice").component("billing").subcomponent("invoices");
        let bytes = caller.to_msgpack().unwrap();
        assert_eq!(CallerId::from_msgpack(&bytes).unwrap(), caller);
        assert_eq!(caller.to_string(), "alice/billing/invoices");
        assert_eq!(CallerId::new("bob").to_string(), "bob");
    }

    #[test]
    fn test_error_code_wire_numbers() {
        assert_eq!(i32::from(ErrorCode::ResourceTemporarilyUnavailable), 11);
        assert_eq!(ErrorCode::from_i32(5), Some(ErrorCode::IntegrityError));
        assert_eq!(ErrorCode::from_i32(12), None);
        assert!(ErrorCode::ResourceTemporarilyUnavailable.is_retryable());
        assert!(!ErrorCode::BadInput.is_retryable());
    }

    #[test]
    fn test_deprecated_codes() {
        assert_eq!(ErrorCodeDeprecated::from_i32(1999), Some(ErrorCodeDeprecated::UnknownTabletError));
        assert_eq!(ErrorCodeDeprecated::from_i32(1), None);
        assert_eq!(ErrorCodeDeprecated::VtgateError.to_error_code(), ErrorCode::BadInput);
    }

    #[test]
    fn test_db_error_mapping() {
        let routing = RpcError::from(&DbError::WriteRoutingError("two shard keys".into()));
        assert_eq!(routing.code, ErrorCode::BadInput);
        assert!(routing.message.contains("two shard keys"));

        let partial = DbError::partial_write(
            "users",
            Value::Integer(1),
            WriteStep::PrimaryInsert,
            DbError::ExecutionError("boom".into()),
        );
        assert_eq!(RpcError::from(&partial).code, ErrorCode::IntegrityError);
    }

    #[test]
    fn test_rpc_error_msgpack() {
        let err = RpcError::new(ErrorCode::QueryNotServed, "shard -80 is draining");
        let decoded = RpcError::from_msgpack(&err.to_msgpack().unwrap()).unwrap();
        assert_eq!(decoded, err);
        assert!(RpcError::from_msgpack(&[0xc1]).is_err());
    }
}
