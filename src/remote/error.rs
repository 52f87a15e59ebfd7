use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteErrorCode {
    Connection,
    Write,
    Query,
    Authentication,
    Function,
    Subscription,
}

impl RemoteErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorCode::Connection => "remote/connection",
            RemoteErrorCode::Write => "remote/write",
            RemoteErrorCode::Query => "remote/query",
            RemoteErrorCode::Authentication => "remote/authentication",
            RemoteErrorCode::Function => "remote/function",
            RemoteErrorCode::Subscription => "remote/subscription",
        }
    }
}

/// Failure reported by the hosted service. Carried to the caller unchanged;
/// this crate performs no retries or local recovery.
#[derive(Clone, Debug)]
pub struct RemoteError {
    pub code: RemoteErrorCode,
    message: String,
}

impl RemoteError {
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
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

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for RemoteError {}

pub type RemoteResult<T> = Result<T, RemoteError>;

pub fn connection_error(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::Connection, message)
}

pub fn write_error(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::Write, message)
}

pub fn query_error(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::Query, message)
}

pub fn authentication_error(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::Authentication, message)
}

pub fn function_error(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::Function, message)
}

pub fn subscription_error(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::Subscription, message)
}
