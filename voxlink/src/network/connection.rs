//! WebSocket connection to the voice service
//!
//! This module builds the endpoint URL and opens the socket the session
//! streams over.

use crate::network::error::{NetworkError, NetworkResult};
use futures_util::{
    stream::{SplitSink, SplitStream},
    StreamExt,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{http::StatusCode, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the WebSocket stream
pub type WsWriter = SplitSink<WsStream, Message>;

/// Read half of the WebSocket stream
pub type WsReader = SplitStream<WsStream>;

/// Default service base URL
pub const DEFAULT_BASE_URL: &str = "ws://localhost:8000";

/// Default socket path under the base URL
pub const DEFAULT_PATH: &str = "/ws/voices/";

/// Configuration for the WebSocket connection
///
/// The endpoint is either `socket_url` as given, or
/// `{base_url}{path}?authorization=<value>`.
///
/// # Example
/// ```
/// use voxlink_lib::network::ConnectionConfig;
///
/// let config = ConnectionConfig::new("wss://voice.example.com")
///     .with_authorization("Basic dXNlcjpwYXNz")
///     .with_timeout(5000);
///
/// let url = config.build_url().unwrap();
/// assert_eq!(url.path(), "/ws/voices/");
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Service base URL (ws:// or wss://)
    pub base_url: String,

    /// Socket path appended to the base URL
    pub path: String,

    /// Full socket URL; overrides `base_url` and `path`
    pub socket_url: Option<String>,

    /// Authorization value sent as a query parameter
    pub authorization: Option<String>,

    /// Connection timeout in milliseconds (0 waits forever)
    pub timeout_ms: u64,
}

impl ConnectionConfig {
    /// Create a configuration for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: DEFAULT_PATH.to_string(),
            socket_url: None,
            authorization: None,
            timeout_ms: 10000,
        }
    }

    /// Set the socket path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Connect to this exact URL instead of `base_url` + `path`
    pub fn with_socket_url(mut self, socket_url: impl Into<String>) -> Self {
        self.socket_url = Some(socket_url.into());
        self
    }

    /// Set the authorization value
    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    /// Set connection timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Build the WebSocket URL
    ///
    /// # Errors
    /// Returns `NetworkError::InvalidUrl` if the URL does not parse, or
    /// `NetworkError::InvalidConfig` if its scheme is not ws/wss.
    pub fn build_url(&self) -> NetworkResult<Url> {
        let url = match &self.socket_url {
            Some(socket_url) => Url::parse(socket_url)?,
            None => {
                let path = self.path.trim_start_matches('/');
                let mut url = Url::parse(&format!(
                    "{}/{}",
                    self.base_url.trim_end_matches('/'),
                    path
                ))?;
                if let Some(authorization) = &self.authorization {
                    url.query_pairs_mut()
                        .append_pair("authorization", authorization);
                }
                url
            }
        };

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(NetworkError::InvalidConfig(format!(
                "Unsupported URL scheme: {}",
                other
            ))),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// WebSocket connection to the voice service
///
/// # Example
/// ```no_run
/// use voxlink_lib::network::{ConnectionConfig, VoiceConnection};
///
/// #[tokio::main]
/// async fn main() {
///     let config = ConnectionConfig::default().with_authorization("Basic dXNlcjpwYXNz");
///     let conn = VoiceConnection::connect(&config).await.unwrap();
///
///     let (writer, reader) = conn.split();
///     // Hand each half to its own task
/// }
/// ```
#[derive(Debug)]
pub struct VoiceConnection {
    /// WebSocket stream
    ws_stream: WsStream,

    /// URL the socket is connected to
    url: Url,
}

impl VoiceConnection {
    /// Connect to the voice service
    ///
    /// # Errors
    /// * `NetworkError::Timeout` - the handshake did not finish in time
    /// * `NetworkError::AuthenticationFailed` - the server answered 401/403
    /// * `NetworkError::ConnectionFailed` - any other connect failure
    pub async fn connect(config: &ConnectionConfig) -> NetworkResult<Self> {
        let url = config.build_url()?;
        info!("Connecting to voice service at {}", redact(&url));

        let connect_future = connect_async(url.as_str());

        let result = if config.timeout_ms == 0 {
            connect_future.await
        } else {
            let timeout = tokio::time::Duration::from_millis(config.timeout_ms);
            tokio::time::timeout(timeout, connect_future)
                .await
                .map_err(|_| NetworkError::Timeout(config.timeout_ms))?
        };

        let (ws_stream, response) = result.map_err(|e| {
            if let tokio_tungstenite::tungstenite::Error::Http(resp) = &e {
                if resp.status() == StatusCode::UNAUTHORIZED
                    || resp.status() == StatusCode::FORBIDDEN
                {
                    return NetworkError::AuthenticationFailed;
                }
            }
            NetworkError::ConnectionFailed(e.to_string())
        })?;

        info!("Connected to voice service (status: {})", response.status());
        debug!("Response headers: {:?}", response.headers());

        Ok(Self { ws_stream, url })
    }

    /// URL the socket is connected to
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Split the connection into separate read and write halves
    pub fn split(self) -> (WsWriter, WsReader) {
        let (writer, reader) = self.ws_stream.split();
        (writer, reader)
    }
}

/// URL with the authorization value hidden, for logs
fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    if url.query_pairs().any(|(key, _)| key == "authorization") {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| {
                let value = if key == "authorization" {
                    "***".to_string()
                } else {
                    value.into_owned()
                };
                (key.into_owned(), value)
            })
            .collect();
        redacted.query_pairs_mut().clear().extend_pairs(pairs);
    }
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_default() {
        let config = ConnectionConfig::default();

        assert_eq!(config.base_url, "ws://localhost:8000");
        assert_eq!(config.path, "/ws/voices/");
        assert_eq!(config.timeout_ms, 10000);
        assert!(config.socket_url.is_none());
        assert!(config.authorization.is_none());
    }

    #[test]
    fn test_build_url_with_authorization() {
        let config = ConnectionConfig::new("wss://voice.example.com/")
            .with_authorization("Basic dXNlcjpwYXNz");
        let url = config.build_url().unwrap();

        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("voice.example.com"));
        assert_eq!(url.path(), "/ws/voices/");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![(
                "authorization".to_string(),
                "Basic dXNlcjpwYXNz".to_string()
            )]
        );
    }

    #[test]
    fn test_build_url_keeps_base_path() {
        let config = ConnectionConfig::new("ws://host:9000/api").with_path("ws/voices/");
        let url = config.build_url().unwrap();

        assert_eq!(url.as_str(), "ws://host:9000/api/ws/voices/");
    }

    #[test]
    fn test_build_url_escapes_authorization() {
        let config = ConnectionConfig::default().with_authorization("a&b=c/d");
        let url = config.build_url().unwrap();

        assert!(!url.as_str().contains("a&b=c/d"));
        assert_eq!(
            url.query_pairs().next().map(|(_, v)| v.into_owned()),
            Some("a&b=c/d".to_string())
        );
    }

    #[test]
    fn test_socket_url_overrides_base() {
        let config = ConnectionConfig::new("ws://ignored")
            .with_socket_url("ws://127.0.0.1:4000/custom")
            .with_authorization("unused");
        let url = config.build_url().unwrap();

        assert_eq!(url.as_str(), "ws://127.0.0.1:4000/custom");
    }

    #[test]
    fn test_build_url_rejects_other_schemes() {
        let config = ConnectionConfig::new("http://localhost:8000");
        assert!(matches!(
            config.build_url(),
            Err(NetworkError::InvalidConfig(_))
        ));

        let config = ConnectionConfig::new("not a url");
        assert!(matches!(config.build_url(), Err(NetworkError::InvalidUrl(_))));
    }

    #[test]
    fn test_redact_hides_authorization() {
        let url = ConnectionConfig::default()
            .with_authorization("Basic secret")
            .build_url()
            .unwrap();

        let redacted = redact(&url);
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("authorization="));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 9 (discard) is almost never listening on localhost
        let config = ConnectionConfig::new("ws://127.0.0.1:9").with_timeout(2000);
        let result = VoiceConnection::connect(&config).await;

        assert!(matches!(
            result,
            Err(NetworkError::ConnectionFailed(_)) | Err(NetworkError::Timeout(_))
        ));
    }
}
