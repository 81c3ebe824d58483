/// Failures from a single network attempt. Every variant is retried by the
/// fetch layer; the last one is returned once attempts run out.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("HTTP error {status} from {url}")]
    Status { status: u16, url: String },

    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_display() {
        let err = FetchError::Status {
            status: 503,
            url: "https://example.com/x".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503 from https://example.com/x");
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn timeout_has_no_status() {
        let err = FetchError::Timeout {
            url: "u".to_string(),
            timeout_ms: 10,
        };
        assert!(err.status().is_none());
        assert!(err.to_string().contains("timed out"));
    }
}
