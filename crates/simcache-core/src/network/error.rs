use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Server error for {url}: {body}")]
    ServerError { url: String, body: String },

    #[error("Unexpected status {status} for {url}: {body}")]
    UnexpectedStatus { url: String, status: u16, body: String },

    #[error("Network unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl NetworkError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        if text.len() <= MAX_ERROR_BODY_LENGTH {
            text.into_owned()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &text[..end], text.len())
        }
    }

    pub fn from_status(url: &str, status: u16, body: &[u8]) -> Self {
        let url = url.to_string();
        match status {
            404 => NetworkError::NotFound { url },
            500..=599 => NetworkError::ServerError {
                url,
                body: Self::truncate_body(body),
            },
            _ => NetworkError::UnexpectedStatus {
                url,
                status,
                body: Self::truncate_body(body),
            },
        }
    }
}
