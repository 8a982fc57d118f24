//! Socket server resolution
//!
//! A channel is served by one of several socket servers. The directory service
//! publishes them per channel at `/socketconfig/<channel>.json`:
//!
//! ```text
//! { "servers": [ { "url": "https://zip.cytu.be:8443", "secure": true }, ... ] }
//! ```
//!
//! Resolution is a single attempt. A caller-supplied endpoint skips the lookup.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::config::ConnectionSettings;
use crate::error::{ClientError, Result};

/// A socket server to open a session against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub secure: bool,
}

/// Body of a socket config lookup.
#[derive(Debug, Deserialize)]
pub struct SocketConfig {
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub url: String,
    pub secure: bool,
}

impl SocketConfig {
    /// First server whose security flag matches `secure`.
    pub fn select(&self, secure: bool) -> Option<Endpoint> {
        self.servers
            .iter()
            .find(|server| server.secure == secure)
            .map(|server| Endpoint {
                url: server.url.clone(),
                secure: server.secure,
            })
    }
}

/// Resolve the endpoint for `settings`.
///
/// # Errors
/// `ClientError::Resolution` if the lookup fails, the body is malformed, or no
/// server matches the security preference.
pub async fn resolve(settings: &ConnectionSettings, http: &Client) -> Result<Endpoint> {
    if let Some(url) = &settings.endpoint {
        debug!(url = %url, "Using explicit socket server");
        return Ok(Endpoint {
            url: url.clone(),
            secure: settings.secure,
        });
    }

    let config_url = config_url(&settings.config_base_url, &settings.channel)?;
    debug!(url = %config_url, "Fetching socket config");

    let response = http.get(config_url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Resolution(format!(
            "socket config lookup returned {}",
            status
        )));
    }

    let body = response.bytes().await?;
    let config: SocketConfig = serde_json::from_slice(&body)
        .map_err(|e| ClientError::Resolution(format!("malformed socket config: {}", e)))?;

    let endpoint = config.select(settings.secure).ok_or_else(|| {
        ClientError::Resolution(format!(
            "no {} socket server offered for channel '{}'",
            if settings.secure { "secure" } else { "insecure" },
            settings.channel
        ))
    })?;

    info!(channel = %settings.channel, url = %endpoint.url, "Resolved socket server");
    Ok(endpoint)
}

/// Build `<base>/socketconfig/<channel>.json` with the channel as one path segment.
fn config_url(base: &str, channel: &str) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| ClientError::Resolution(format!("invalid config base url: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::Resolution(format!("config base url cannot hold a path: {}", base)))?
        .pop_if_empty()
        .push("socketconfig")
        .push(&format!("{}.json", channel));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SocketConfig {
        serde_json::from_str(
            r#"{"servers": [
                {"url": "http://plain-a:8080", "secure": false},
                {"url": "https://tls-a:8443", "secure": true},
                {"url": "https://tls-b:8443", "secure": true}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_select_first_match() {
        let cfg = config();
        assert_eq!(cfg.select(true).unwrap().url, "https://tls-a:8443");
        assert_eq!(cfg.select(false).unwrap().url, "http://plain-a:8080");
    }

    #[test]
    fn test_select_none() {
        let cfg = SocketConfig { servers: vec![] };
        assert!(cfg.select(true).is_none());
    }

    #[test]
    fn test_config_url() {
        assert_eq!(
            config_url("https://cytu.be", "movies").unwrap().as_str(),
            "https://cytu.be/socketconfig/movies.json"
        );
        assert_eq!(
            config_url("http://localhost:9000/", "a b").unwrap().as_str(),
            "http://localhost:9000/socketconfig/a%20b.json"
        );
        assert!(config_url("not a url", "x").is_err());
    }

    #[tokio::test]
    async fn test_explicit_endpoint_skips_lookup() {
        let settings = ConnectionSettings::new("movies")
            .with_endpoint("http://localhost:1")
            .with_secure(false)
            // Unroutable base: any request would fail
            .with_config_base_url("http://127.0.0.1:9");
        let endpoint = resolve(&settings, &Client::new()).await.unwrap();
        assert_eq!(
            endpoint,
            Endpoint {
                url: "http://localhost:1".into(),
                secure: false
            }
        );
    }
}
