use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::remote::{RemoteError, RemoteErrorCode};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeErrorCode {
    Uninitialized,
    Parse,
    Connection,
    RemoteWrite,
    RemoteQuery,
    Authentication,
    FunctionInvocation,
    Subscription,
    NoActiveSession,
    Internal,
}

impl BridgeErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeErrorCode::Uninitialized => "bridge/uninitialized",
            BridgeErrorCode::Parse => "bridge/parse",
            BridgeErrorCode::Connection => "bridge/connection",
            BridgeErrorCode::RemoteWrite => "bridge/remote-write",
            BridgeErrorCode::RemoteQuery => "bridge/remote-query",
            BridgeErrorCode::Authentication => "bridge/authentication",
            BridgeErrorCode::FunctionInvocation => "bridge/function-invocation",
            BridgeErrorCode::Subscription => "bridge/subscription",
            BridgeErrorCode::NoActiveSession => "bridge/no-active-session",
            BridgeErrorCode::Internal => "bridge/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct BridgeError {
    pub code: BridgeErrorCode,
    message: String,
}

impl BridgeError {
    pub fn new(code: BridgeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for BridgeError {}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Remote failures cross the facade unchanged: same message, the matching
/// bridge-side code.
impl From<RemoteError> for BridgeError {
    fn from(error: RemoteError) -> Self {
        let code = match error.code {
            RemoteErrorCode::Connection => BridgeErrorCode::Connection,
            RemoteErrorCode::Write => BridgeErrorCode::RemoteWrite,
            RemoteErrorCode::Query => BridgeErrorCode::RemoteQuery,
            RemoteErrorCode::Authentication => BridgeErrorCode::Authentication,
            RemoteErrorCode::Function => BridgeErrorCode::FunctionInvocation,
            RemoteErrorCode::Subscription => BridgeErrorCode::Subscription,
        };
        BridgeError::new(code, error.message())
    }
}

pub fn uninitialized() -> BridgeError {
    BridgeError::new(
        BridgeErrorCode::Uninitialized,
        "bridge used before initialize; call initialize(app_id) first",
    )
}

pub fn parse_error(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::Parse, message)
}

pub fn no_active_session() -> BridgeError {
    BridgeError::new(BridgeErrorCode::NoActiveSession, "no active session")
}

pub fn internal_error(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::Internal, message)
}
