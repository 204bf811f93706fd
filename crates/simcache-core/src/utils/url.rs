use url::{ParseError, Url};

use crate::error::{AgentError, AgentResult};

/// Resolve a manifest path (`a.html`, `/img/e1.png` or an absolute URL)
/// against the application origin.
pub fn resolve(origin: &Url, path: &str) -> Result<Url, ParseError> {
    origin.join(path)
}

/// Resolve a list of manifest paths, failing on the first invalid one.
pub fn resolve_all(origin: &Url, paths: &[String]) -> AgentResult<Vec<Url>> {
    paths
        .iter()
        .map(|path| {
            resolve(origin, path).map_err(|e| AgentError::InvalidUrl {
                url: path.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Normalize a URL into the key it is stored under. Fragments never reach
/// the network, so they never distinguish entries.
pub fn cache_key(url: &Url) -> Url {
    let mut key = url.clone();
    key.set_fragment(None);
    key
}

/// The cache key with its query string removed, used for query-insensitive lookups.
pub fn without_query(url: &Url) -> Url {
    let mut key = cache_key(url);
    key.set_query(None);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("http://localhost:8080/").unwrap()
    }

    #[test]
    fn test_resolve_relative_and_absolute_paths() {
        assert_eq!(
            resolve(&origin(), "a.html").unwrap().as_str(),
            "http://localhost:8080/a.html"
        );
        assert_eq!(
            resolve(&origin(), "/img/EJ.1/e1.png").unwrap().as_str(),
            "http://localhost:8080/img/EJ.1/e1.png"
        );
        assert_eq!(
            resolve(&origin(), "https://cdn.example.com/x.png").unwrap().as_str(),
            "https://cdn.example.com/x.png"
        );
    }

    #[test]
    fn test_resolve_all_reports_bad_path() {
        let paths = vec!["a.html".to_string(), "http://[broken".to_string()];
        assert!(matches!(
            resolve_all(&origin(), &paths),
            Err(AgentError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_keys_drop_fragment_and_query() {
        let url = Url::parse("http://localhost:8080/sufragio.html?mesa=3#top").unwrap();
        assert_eq!(
            cache_key(&url).as_str(),
            "http://localhost:8080/sufragio.html?mesa=3"
        );
        assert_eq!(
            without_query(&url).as_str(),
            "http://localhost:8080/sufragio.html"
        );
    }
}
