use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::{ContentSource, RetrievalError, RetrievalResult};

/// Fetches module text over HTTP(S).
///
/// Relative locations are joined onto `base`; absolute URLs are used as-is.
/// Only a 200 response counts as success.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base: Option<Url>,
}

impl HttpSource {
    pub fn new(base: Option<&str>) -> RetrievalResult<Self> {
        let base = base
            .map(|b| Url::parse(b).map_err(|e| RetrievalError::Transport(format!("invalid base url '{b}': {e}"))))
            .transpose()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(30))
            .user_agent(format!("tsb/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RetrievalError::Transport(e.to_string()))?;

        Ok(Self { client, base })
    }

    fn url_for(&self, location: &str) -> RetrievalResult<Url> {
        let parsed = match &self.base {
            Some(base) => base.join(location),
            None => Url::parse(location),
        };
        parsed.map_err(|e| RetrievalError::Transport(format!("invalid url '{location}': {e}")))
    }
}

#[async_trait]
impl ContentSource for HttpSource {
    async fn retrieve(&self, location: &str) -> RetrievalResult<String> {
        let url = self.url_for(location)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RetrievalError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .text()
                .await
                .map_err(|e| RetrievalError::Transport(e.to_string())),
            StatusCode::NOT_FOUND => Err(RetrievalError::NotFound),
            status => Err(RetrievalError::Status(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_locations_join_base() {
        let source = HttpSource::new(Some("https://app.test/site/")).unwrap();
        assert_eq!(
            source.url_for("./src/a.ts").unwrap().as_str(),
            "https://app.test/site/src/a.ts"
        );
        assert_eq!(
            source.url_for("/lib/b.ts").unwrap().as_str(),
            "https://app.test/lib/b.ts"
        );
    }

    #[test]
    fn test_relative_location_without_base_is_rejected() {
        let source = HttpSource::new(None).unwrap();
        assert!(matches!(
            source.url_for("./a.ts"),
            Err(RetrievalError::Transport(_))
        ));
    }
}
