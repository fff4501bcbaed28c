use std::fmt;

use serde::{Deserialize, Serialize};

/// Standard Matrix error body: `{"errcode": "...", "error": "..."}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixErrorBody {
    #[serde(default)]
    pub errcode: String,
    #[serde(default)]
    pub error: String,
}

/// Destination-side operation errors
#[derive(Debug, Clone)]
pub enum ClientError {
    /// Transport failure before a status code was received
    NetworkError {
        message: String,
    },
    /// Serialization error
    SerializationError {
        message: String,
    },
    /// Authentication failed
    AuthenticationFailed {
        message: String,
    },
    /// Still throttled after the configured number of retries
    RateLimitExceeded {
        retries: u32,
    },
    /// Non-2xx response carrying a structured Matrix error
    Api {
        operation: String,
        status: u16,
        errcode: String,
        message: String,
    },
    /// Invalid response format
    InvalidResponse {
        expected: String,
        got: String,
    },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NetworkError { message } => {
                write!(f, "Network error: {}", message)
            }
            ClientError::SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
            ClientError::AuthenticationFailed { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            ClientError::RateLimitExceeded { retries } => {
                write!(f, "rate limit exceeded after {} retries", retries)
            }
            ClientError::Api {
                operation,
                status,
                errcode,
                message,
            } => {
                if errcode.is_empty() {
                    write!(f, "{} failed with HTTP {}: {}", operation, status, message)
                } else {
                    write!(
                        f,
                        "{} failed with HTTP {} ({}): {}",
                        operation, status, errcode, message
                    )
                }
            }
            ClientError::InvalidResponse { expected, got } => {
                write!(f, "Invalid response format: expected {}, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for ClientError {}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::SerializationError {
            message: err.to_string(),
        }
    }
}

impl ClientError {
    /// Build an API error from a status code and a raw response body
    pub fn from_response(operation: &str, status: u16, body: &str) -> Self {
        let parsed: MatrixErrorBody = serde_json::from_str(body).unwrap_or_else(|_| MatrixErrorBody {
            errcode: String::new(),
            error: body.trim().to_string(),
        });

        ClientError::Api {
            operation: operation.to_string(),
            status,
            errcode: parsed.errcode,
            message: parsed.error,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn errcode(&self) -> Option<&str> {
        match self {
            ClientError::Api { errcode, .. } if !errcode.is_empty() => Some(errcode.as_str()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404) || self.errcode() == Some("M_NOT_FOUND")
    }

    /// The entity being created is already present on the homeserver
    pub fn is_already_exists(&self) -> bool {
        match self {
            ClientError::Api {
                status,
                errcode,
                message,
                ..
            } => {
                *status == 409
                    || errcode == "M_USER_IN_USE"
                    || errcode == "M_ROOM_IN_USE"
                    || message.to_lowercase().contains("already exists")
            }
            _ => false,
        }
    }

    /// Synapse refuses admin lookups of users that live on another server.
    /// Creation can still be attempted in that case.
    pub fn is_remote_lookup_rejected(&self) -> bool {
        match self {
            ClientError::Api {
                status, message, ..
            } => *status == 400 && message.to_lowercase().contains("local users"),
            _ => false,
        }
    }

    /// A forbidden invite whose reason is that the target already joined
    pub fn is_already_member(&self) -> bool {
        match self {
            ClientError::Api {
                status,
                errcode,
                message,
                ..
            } if *status == 403 && (errcode.is_empty() || errcode == "M_FORBIDDEN") => {
                let message = message.to_lowercase();
                message.contains("already in the room")
                    || message.contains("already joined")
                    || message.contains("already a member")
            }
            _ => false,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::NetworkError { .. } | ClientError::RateLimitExceeded { .. }
        )
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_error_is_parsed() {
        let err = ClientError::from_response(
            "create_user",
            400,
            r#"{"errcode":"M_USER_IN_USE","error":"User ID already taken."}"#,
        );
        assert_eq!(err.errcode(), Some("M_USER_IN_USE"));
        assert!(err.is_already_exists());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_plain_text_body_is_kept_as_message() {
        let err = ClientError::from_response("whoami", 502, "Bad Gateway\n");
        assert_eq!(err.errcode(), None);
        assert_eq!(err.to_string(), "whoami failed with HTTP 502: Bad Gateway");
    }

    #[test]
    fn test_already_member_is_distinguished_from_real_forbidden() {
        let member = ClientError::from_response(
            "invite_user",
            403,
            r#"{"errcode":"M_FORBIDDEN","error":"@alice:example.org is already in the room."}"#,
        );
        assert!(member.is_already_member());

        let denied = ClientError::from_response(
            "invite_user",
            403,
            r#"{"errcode":"M_FORBIDDEN","error":"You don't have permission to invite users"}"#,
        );
        assert!(!denied.is_already_member());
    }

    #[test]
    fn test_remote_lookup_rejection() {
        let err = ClientError::from_response(
            "get_user",
            400,
            r#"{"errcode":"M_UNKNOWN","error":"Can only look up local users"}"#,
        );
        assert!(err.is_remote_lookup_rejected());
        assert!(!err.is_not_found());
    }
}
