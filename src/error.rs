use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{}", Labeled("Not found", .0))]
    NotFound(String),
    #[error("{}", Labeled("Invalid input", .0))]
    InvalidInput(String),
    #[error("{}", RequestMessage(.message, .status))]
    Request {
        message: String,
        status: Option<u16>,
        details: Option<serde_json::Value>,
    },
    #[error("network error: {0}")]
    Network(String),
}

impl AppError {
    /// Message suitable for a user notification, without the category label.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(message)
            | AppError::InvalidInput(message)
            | AppError::Network(message) => message.clone(),
            AppError::Request { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Request { status, .. } => *status,
            AppError::NotFound(_) => Some(404),
            _ => None,
        }
    }

    /// Structured body the server sent with a failed request.
    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            AppError::Request { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
            || matches!(self, AppError::Request { status: Some(404), .. })
    }
}

struct Labeled<'a>(&'a str, &'a String);

impl fmt::Display for Labeled<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_multiline(f, self.0, self.1)
    }
}

struct RequestMessage<'a>(&'a String, &'a Option<u16>);

impl fmt::Display for RequestMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.1 {
            Some(status) => write_multiline(f, &format!("Request failed ({status})"), self.0),
            None => write_multiline(f, "Request failed", self.0),
        }
    }
}

fn write_multiline(f: &mut fmt::Formatter<'_>, label: &str, message: &str) -> fmt::Result {
    if message.contains('\n') {
        write!(f, "{label}:\n{message}")
    } else {
        write!(f, "{label}: {message}")
    }
}
