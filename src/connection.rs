//! TCP and TLS connection management.
//!
//! This module provides the low-level connection to the log service over
//! TCP (and optionally TLS) streams, with buffered RESP protocol I/O and an
//! optional per-reply timeout.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::resp;
use crate::transport::Transport;
use crate::types::Value;

/// Default read/write buffer size (8 KB).
const DEFAULT_BUF_SIZE: usize = 8 * 1024;

/// Default server port.
const DEFAULT_PORT: u16 = 6379;

/// Configuration for connecting to the log service.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Optional username for AUTH (ACL style).
    pub username: Option<String>,
    /// Optional password for AUTH.
    pub password: Option<String>,
    /// Database index to SELECT on connect.
    pub database: u8,
    /// Read/write buffer size in bytes.
    pub buffer_size: usize,
    /// Enable TLS (requires the `tls` feature).
    pub tls: bool,
    /// Upper bound on how long a single reply may take to arrive.
    pub response_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            database: 0,
            buffer_size: DEFAULT_BUF_SIZE,
            tls: false,
            response_timeout: None,
        }
    }
}

impl ConnectionConfig {
    /// Create a config from a host and port.
    pub fn from_addr(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Parse a `redis://[[user]:password@]host[:port][/db]` URL.
    ///
    /// The `rediss://` scheme enables TLS.
    pub fn from_url(raw: &str) -> Result<Self> {
        let parsed = url::Url::parse(raw)
            .map_err(|e| Error::InvalidArgument(format!("invalid url {:?}: {}", raw, e)))?;

        let tls = match parsed.scheme() {
            "redis" => false,
            "rediss" => true,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unsupported url scheme: {}",
                    other
                )))
            }
        };

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidArgument(format!("url has no host: {}", raw)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let username = Some(parsed.username())
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let password = parsed.password().map(str::to_string);

        let database = match parsed.path().trim_start_matches('/') {
            "" => 0,
            db => db
                .parse::<u8>()
                .map_err(|_| Error::InvalidArgument(format!("invalid database index: {}", db)))?,
        };

        Ok(Self {
            host,
            port: parsed.port().unwrap_or(DEFAULT_PORT),
            username,
            password,
            database,
            tls,
            ..Default::default()
        })
    }

    /// Set the per-reply timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }
}

/// A wrapper around a TCP (or TLS) stream with buffered RESP I/O.
///
/// Dropping the connection closes the underlying socket.
///
/// Any failure other than a server error reply (I/O, timeout, malformed
/// reply) leaves the request/reply stream out of step, so the connection is
/// marked broken and every later [`execute`](Self::execute) returns
/// [`Error::ConnectionClosed`] without touching the socket.
pub struct Connection {
    stream: Stream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    response_timeout: Option<Duration>,
    broken: bool,
}

/// Abstraction over plain TCP and TLS streams.
enum Stream {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    /// Open a new connection using the given configuration.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let tcp = TcpStream::connect(&addr).await?;
        tcp.set_nodelay(true).map_err(Error::Io)?;

        let stream = if config.tls {
            #[cfg(feature = "tls")]
            {
                use std::sync::Arc;
                use tokio_rustls::TlsConnector;

                let mut root_store = rustls::RootCertStore::empty();
                root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

                let tls_config = rustls::ClientConfig::builder()
                    .with_root_certificates(root_store)
                    .with_no_client_auth();

                let connector = TlsConnector::from(Arc::new(tls_config));
                let domain = rustls::pki_types::ServerName::try_from(config.host.clone())
                    .map_err(|e| Error::Protocol(format!("invalid TLS server name: {}", e)))?;

                let tls_stream = connector.connect(domain, tcp).await.map_err(Error::Io)?;
                Stream::Tls(Box::new(tls_stream))
            }
            #[cfg(not(feature = "tls"))]
            {
                return Err(Error::Protocol(
                    "TLS support requires the `tls` feature".into(),
                ));
            }
        } else {
            Stream::Tcp(tcp)
        };

        let mut conn = Self {
            stream,
            read_buf: BytesMut::with_capacity(config.buffer_size),
            write_buf: BytesMut::with_capacity(config.buffer_size),
            response_timeout: config.response_timeout,
            broken: false,
        };

        if let Some(ref password) = config.password {
            let mut auth = vec![Bytes::from("AUTH")];
            if let Some(ref username) = config.username {
                auth.push(Bytes::copy_from_slice(username.as_bytes()));
            }
            auth.push(Bytes::copy_from_slice(password.as_bytes()));

            match conn.execute(&auth).await {
                Ok(Value::Status(ref s)) if s == "OK" => {}
                Ok(reply) => {
                    return Err(Error::Auth(format!("unexpected AUTH response: {}", reply)))
                }
                Err(Error::Server(msg)) => return Err(Error::Auth(msg)),
                Err(e) => return Err(e),
            }
        }

        if config.database != 0 {
            let reply = conn
                .execute(&[
                    Bytes::from("SELECT"),
                    Bytes::from(config.database.to_string()),
                ])
                .await?;
            match reply {
                Value::Status(ref s) if s == "OK" => {}
                _ => {
                    return Err(Error::Protocol(format!(
                        "unexpected SELECT response: {}",
                        reply
                    )))
                }
            }
        }

        Ok(conn)
    }

    /// Send a command and read the response.
    pub async fn execute(&mut self, args: &[Bytes]) -> Result<Value> {
        if self.broken {
            return Err(Error::ConnectionClosed);
        }
        let result = self.round_trip(args).await;
        if let Err(ref e) = result {
            if !matches!(e, Error::Server(_)) {
                warn!(error = %e, "connection out of sync, marking broken");
                self.broken = true;
            }
        }
        result
    }

    /// Whether an earlier failure made this connection unusable.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    async fn round_trip(&mut self, args: &[Bytes]) -> Result<Value> {
        self.send_command(args).await?;
        match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_response())
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => self.read_response().await,
        }
    }

    /// Send a raw RESP command without reading a response.
    pub async fn send_command(&mut self, args: &[Bytes]) -> Result<()> {
        self.write_buf.clear();
        resp::encode_command(args, &mut self.write_buf);
        trace!(bytes = self.write_buf.len(), "sending command");

        match &mut self.stream {
            Stream::Tcp(tcp) => {
                tcp.write_all(&self.write_buf).await?;
                tcp.flush().await?;
            }
            #[cfg(feature = "tls")]
            Stream::Tls(tls) => {
                tls.write_all(&self.write_buf).await?;
                tls.flush().await?;
            }
        }

        self.write_buf.clear();
        Ok(())
    }

    /// Read a single RESP response from the connection.
    pub async fn read_response(&mut self) -> Result<Value> {
        loop {
            if let Some(value) = resp::decode_value(&mut self.read_buf)? {
                return Ok(value);
            }

            let n = match &mut self.stream {
                Stream::Tcp(tcp) => tcp.read_buf(&mut self.read_buf).await?,
                #[cfg(feature = "tls")]
                Stream::Tls(tls) => tls.read_buf(&mut self.read_buf).await?,
            };

            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }
}

#[async_trait]
impl Transport for Connection {
    async fn execute(&mut self, args: &[Bytes]) -> Result<Value> {
        Connection::execute(self, args).await
    }
}
