use crate::error::TransportError;
use crate::http::client::ClientConfig;
use crate::http::proxy::{open_tunnel, ProxyPolicy};
use crate::http::resolver::resolve;
use crate::http::traced_io::{ConnTracer, TracedIo};
use crate::trace::{TraceEvent, TraceListener};
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::client::conn::http1;
use hyper::Uri;
use hyper_util::rt::TokioIo;
use pki_types::ServerName;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tower_service::Service;
use tracing::Instrument;
use url::{Host, Url};

pub type Sender = http1::SendRequest<Full<Bytes>>;

/// Everything that decides which physical connection a hop may use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub https: bool,
    /// Host without IPv6 brackets, as used for dialing and SNI.
    pub host: String,
    pub port: u16,
    pub proxy: Option<String>,
}

impl Route {
    pub fn from_url(url: &Url, proxy: &ProxyPolicy) -> Option<Self> {
        let https = match url.scheme() {
            "https" => true,
            "http" => false,
            _ => return None,
        };
        let host = match url.host()? {
            Host::Domain(domain) => domain.to_string(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        let port = url.port_or_known_default()?;
        let proxy = proxy.proxy_for(url.scheme(), &host);
        Some(Self {
            https,
            host,
            port,
            proxy,
        })
    }

    /// `host:port` of the destination, bracketed for IPv6.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// The endpoint actually dialed: the proxy when there is one.
    pub fn dial_address(&self) -> String {
        match &self.proxy {
            Some(proxy) => proxy.clone(),
            None => self.authority(),
        }
    }

    /// Plain http through a proxy sends absolute-form request targets.
    pub fn forwards_through_proxy(&self) -> bool {
        self.proxy.is_some() && !self.https
    }
}

/// An HTTP/1.1 connection ready to carry requests.
pub struct Connection {
    pub sender: Sender,
    pub tracer: ConnTracer,
}

/// Opens a new connection for `route`: resolve, dial, optional proxy tunnel
/// and TLS handshake, then the HTTP/1.1 handshake.
pub async fn connect(
    route: &Route,
    config: &ClientConfig,
    tls_config: &Arc<rustls::ClientConfig>,
    listener: &Arc<dyn TraceListener>,
) -> Result<Connection, TransportError> {
    let dialer = TimedDialer::new(config.connect_timeout, listener.clone());
    let stream = match (route.https, route.proxy.as_deref()) {
        (true, Some(proxy)) => {
            debug!("Opening tunnel to {} through {}", route.authority(), proxy);
            open_tunnel(dialer, proxy, &route.authority(), &config.user_agent).await?
        }
        (false, Some(proxy)) => {
            let (host, port) = split_host_port(proxy).ok_or_else(|| TransportError::Proxy {
                proxy: proxy.to_string(),
                message: "expected host:port".to_string(),
            })?;
            dialer.dial(&host, port).await?
        }
        (_, None) => dialer.dial(&route.host, route.port).await?,
    };
    let remote_addr = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| route.dial_address());

    let tracer = ConnTracer::new();
    let sender = if route.https {
        let tls_stream = tls_handshake(
            stream,
            &route.host,
            tls_config,
            config.tls_handshake_timeout,
            listener.as_ref(),
        )
        .await?;
        handshake(TracedIo::new(tls_stream, tracer.clone()), remote_addr).await?
    } else {
        handshake(TracedIo::new(stream, tracer.clone()), remote_addr).await?
    };

    Ok(Connection { sender, tracer })
}

/// Resolves and dials a `host:port`, reporting DNS and connect events.
///
/// As a `Service<Uri>` it is the inner connector of a proxy tunnel. The
/// connector error handed to the tunnel is untyped, so the typed failure
/// is parked in `failure` for [`TimedDialer::take_failure`].
#[derive(Clone)]
pub struct TimedDialer {
    connect_timeout: Duration,
    listener: Arc<dyn TraceListener>,
    failure: Arc<Mutex<Option<TransportError>>>,
}

impl TimedDialer {
    pub fn new(connect_timeout: Duration, listener: Arc<dyn TraceListener>) -> Self {
        Self {
            connect_timeout,
            listener,
            failure: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn dial(&self, host: &str, port: u16) -> Result<TcpStream, TransportError> {
        let addrs = resolve(host, port, self.listener.as_ref()).await?;
        dial(&addrs, self.connect_timeout, self.listener.as_ref()).await
    }

    pub fn take_failure(&self) -> Option<TransportError> {
        self.failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl Service<Uri> for TimedDialer {
    type Response = TokioIo<TcpStream>;
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let dialer = self.clone();
        Box::pin(async move {
            let host = dst
                .host()
                .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no host in proxy uri"))?;
            let port = dst.port_u16().unwrap_or(80);
            match dialer.dial(&host, port).await {
                Ok(stream) => Ok(TokioIo::new(stream)),
                Err(err) => {
                    let message = err.to_string();
                    *dialer
                        .failure
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(err);
                    Err(io::Error::other(message))
                }
            }
        })
    }
}

async fn dial(
    addrs: &[SocketAddr],
    connect_timeout: Duration,
    listener: &dyn TraceListener,
) -> Result<TcpStream, TransportError> {
    let mut last_error = None;
    for &addr in addrs {
        trace!("Connecting to {}", addr);
        listener.record(TraceEvent::ConnectStart { addr });
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                listener.record(TraceEvent::ConnectDone { addr, error: None });
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Ok(Err(source)) => {
                listener.record(TraceEvent::ConnectDone {
                    addr,
                    error: Some(source.to_string()),
                });
                last_error = Some(TransportError::Connect {
                    addr: addr.to_string(),
                    source,
                });
            }
            Err(_) => {
                listener.record(TraceEvent::ConnectDone {
                    addr,
                    error: Some("timed out".to_string()),
                });
                last_error = Some(TransportError::ConnectTimeout(addr.to_string()));
            }
        }
    }
    Err(last_error.unwrap_or_else(|| TransportError::NoAddresses(format!("{:?}", addrs))))
}

async fn tls_handshake(
    stream: TcpStream,
    host: &str,
    tls_config: &Arc<rustls::ClientConfig>,
    handshake_timeout: Duration,
    listener: &dyn TraceListener,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, TransportError> {
    let domain = ServerName::try_from(host)
        .map_err(|e| TransportError::Tls {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?
        .to_owned();
    let connector = TlsConnector::from(tls_config.clone());

    listener.record(TraceEvent::TlsStart);
    match timeout(handshake_timeout, connector.connect(domain, stream)).await {
        Ok(Ok(tls_stream)) => {
            listener.record(TraceEvent::TlsDone { error: None });
            Ok(tls_stream)
        }
        Ok(Err(source)) => {
            listener.record(TraceEvent::TlsDone {
                error: Some(source.to_string()),
            });
            Err(TransportError::Tls {
                host: host.to_string(),
                source,
            })
        }
        Err(_) => {
            listener.record(TraceEvent::TlsDone {
                error: Some("timed out".to_string()),
            });
            Err(TransportError::TlsTimeout(host.to_string()))
        }
    }
}

async fn handshake<S>(io: TracedIo<S>, remote_addr: String) -> Result<Sender, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake::<_, Full<Bytes>>(TokioIo::new(io)).await?;
    tokio::task::spawn(
        async move {
            if let Err(err) = conn.await {
                debug!("Connection closed with error: {:?}", err);
            }
        }
        .instrument(info_span!("connection", remoteAddr = %remote_addr)),
    );
    Ok(sender)
}

fn split_host_port(addr: &str) -> Option<(String, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}
