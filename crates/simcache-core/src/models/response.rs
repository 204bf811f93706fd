use bytes::Bytes;

use crate::network::NetworkError;

/// A response as the agent sees it, whether it came from the network or a store.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into an error, keeping successful ones as-is.
    pub fn error_for_status(self) -> Result<Self, NetworkError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(NetworkError::from_status(&self.url, self.status, &self.body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_for_status() {
        let ok = HttpResponse::new("http://localhost/a.html", 200, "hi");
        assert!(ok.error_for_status().is_ok());

        let missing = HttpResponse::new("http://localhost/b.html", 404, "");
        assert!(matches!(
            missing.error_for_status(),
            Err(NetworkError::NotFound { .. })
        ));
    }
}
