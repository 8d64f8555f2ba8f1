//! Typed errors for Directus API responses

use serde::Deserialize;

/// A single error entry from a Directus error payload
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(default)]
    pub extensions: serde_json::Value,
}

impl RemoteError {
    /// Machine-readable error code, if the server provided one
    pub fn code(&self) -> Option<&str> {
        self.extensions.get("code").and_then(|c| c.as_str())
    }
}

/// Error returned by the Directus API or the transport underneath it
#[derive(Debug)]
pub enum ApiError {
    /// The server answered with a non-success status and (usually) a
    /// structured `errors` array in the body
    Http {
        status: u16,
        errors: Vec<RemoteError>,
    },
    /// The request never produced an HTTP response
    Transport(String),
}

impl ApiError {
    /// Parse a Directus error body into a typed error
    pub fn from_body(status: u16, body: &serde_json::Value) -> Self {
        let errors = body
            .get("errors")
            .and_then(|e| serde_json::from_value(e.clone()).ok())
            .unwrap_or_default();
        Self::Http { status, errors }
    }

    /// HTTP status code, if the failure came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    /// Whether any remote error carries the given code
    pub fn has_code(&self, code: &str) -> bool {
        match self {
            Self::Http { errors, .. } => errors.iter().any(|e| e.code() == Some(code)),
            Self::Transport(_) => false,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http { status, errors } => {
                if errors.is_empty() {
                    write!(f, "API request failed with status {}", status)
                } else {
                    let messages: Vec<&str> =
                        errors.iter().map(|e| e.message.as_str()).collect();
                    write!(
                        f,
                        "API request failed with status {}: {}",
                        status,
                        messages.join("; ")
                    )
                }
            }
            Self::Transport(msg) => write!(f, "network error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_body_parses_error_list() {
        let body = json!({
            "errors": [
                {"message": "Field \"title\" is required.", "extensions": {"code": "FAILED_VALIDATION"}},
                {"message": "Something else."}
            ]
        });

        let err = ApiError::from_body(400, &body);
        assert_eq!(err.status(), Some(400));
        assert!(err.has_code("FAILED_VALIDATION"));
        assert!(!err.has_code("FORBIDDEN"));
        assert!(err.to_string().contains("Field \"title\" is required."));
    }

    #[test]
    fn test_from_body_without_errors_array() {
        let err = ApiError::from_body(502, &json!("Bad Gateway"));
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.to_string(), "API request failed with status 502");
    }

    #[test]
    fn test_transport_error_has_no_status() {
        let err = ApiError::Transport("connection refused".to_string());
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("connection refused"));
    }
}
