use crate::error::TransportError;
use crate::http::pool::Pool;
use crate::http::proxy::ProxyPolicy;
use crate::http::redirect::{self, HopRequest};
use crate::http::timing_connector::{connect, Connection, Route};
use crate::tls::build_tls_config;
use crate::trace::{TraceEvent, TraceListener};
use bytes::Bytes;
use http::header::{CONNECTION, HOST, LOCATION, USER_AGENT};
use http::{HeaderValue, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame, Incoming, SizeHint};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Settings shared by every request a [`Client`] issues.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound for a whole request: every hop plus reading the body.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub tls_handshake_timeout: Duration,
    pub max_redirects: usize,
    /// Keep connections open and reuse them. Off by default, so every hop
    /// pays for its own DNS, TCP and TLS setup.
    pub keep_alive: bool,
    pub max_idle_connections: usize,
    pub proxy: ProxyPolicy,
    pub insecure: bool,
    pub ca_file: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            tls_handshake_timeout: Duration::from_secs(5),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            keep_alive: false,
            max_idle_connections: 10,
            proxy: ProxyPolicy::FromEnv,
            insecure: false,
            ca_file: None,
            user_agent: concat!("reqstat/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP/1.1 client that reports connection lifecycle events while it works.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    tls: Arc<rustls::ClientConfig>,
    pool: Arc<Pool>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, anyhow::Error> {
        let tls = build_tls_config(config.ca_file.as_deref(), config.insecure)?;
        let pool = Arc::new(Pool::new(config.max_idle_connections));
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                tls: Arc::new(tls),
                pool,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn idle_connections(&self) -> usize {
        self.inner.pool.idle_count()
    }

    /// Sends `request`, following redirects, and returns the final response
    /// with its body unread. Every hop reports to `listener`.
    pub async fn execute(
        &self,
        request: HopRequest,
        listener: Arc<dyn TraceListener>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        let max_redirects = self.inner.config.max_redirects;
        let mut current = request;
        let mut redirects = 0;
        loop {
            let response = self.send(&current, &listener).await?;
            let status = response.status();
            if !redirect::is_redirect(status) {
                return Ok(response);
            }
            let location = response
                .headers()
                .get(LOCATION)
                .map(|value| value.to_str().map(str::to_owned));
            let location = match location {
                Some(Ok(location)) => location,
                Some(Err(e)) => {
                    return Err(TransportError::RedirectLocation {
                        location: String::from_utf8_lossy(
                            response.headers()[LOCATION].as_bytes(),
                        )
                        .into_owned(),
                        message: e.to_string(),
                    })
                }
                None => return Ok(response),
            };
            if redirects >= max_redirects {
                return Err(TransportError::TooManyRedirects(redirects));
            }

            let next = redirect::follow(&current, status, &location)?;
            response.into_body().collect().await?;
            redirects += 1;
            debug!(
                "Redirecting to: {} ({}/{})",
                next.url, redirects, max_redirects
            );
            current = next;
        }
    }

    async fn send(
        &self,
        request: &HopRequest,
        listener: &Arc<dyn TraceListener>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        let config = &self.inner.config;
        let route = Route::from_url(&request.url, &config.proxy).ok_or_else(|| {
            TransportError::RedirectLocation {
                location: request.url.to_string(),
                message: "not an http(s) url with a host".to_string(),
            }
        })?;

        listener.record(TraceEvent::ConnectionRequested {
            address: route.dial_address(),
        });
        let pooled = if config.keep_alive {
            self.inner.pool.checkout(&route).await
        } else {
            None
        };
        let reused = pooled.is_some();
        let Connection { mut sender, tracer } = match pooled {
            Some(connection) => connection,
            None => connect(&route, config, &self.inner.tls, listener).await?,
        };
        tracer.attach(listener.clone());
        listener.record(TraceEvent::ConnectionEstablished { reused });

        let outgoing = build_request(request, &route, config)?;
        debug!(
            "> {} {} {:?}",
            outgoing.method(),
            outgoing.uri(),
            outgoing.version()
        );
        for (key, value) in outgoing.headers().iter() {
            trace!("> {}: {:?}", key, value);
        }

        let response = sender.send_request(outgoing).await?;
        debug!("< {:?} {}", response.version(), response.status());
        for (key, value) in response.headers().iter() {
            trace!("< {}: {:?}", key, value);
        }

        let release = config.keep_alive.then(|| Release {
            pool: self.inner.pool.clone(),
            route,
            connection: Connection { sender, tracer },
        });
        Ok(response.map(|incoming| ResponseBody {
            inner: incoming,
            release,
        }))
    }
}

fn build_request(
    request: &HopRequest,
    route: &Route,
    config: &ClientConfig,
) -> Result<Request<Full<Bytes>>, TransportError> {
    let target = if route.forwards_through_proxy() {
        let mut absolute = request.url.clone();
        absolute.set_fragment(None);
        absolute.to_string()
    } else {
        let mut path = request.url.path().to_string();
        if let Some(query) = request.url.query() {
            path.push('?');
            path.push_str(query);
        }
        path
    };
    let uri: Uri = target
        .parse()
        .map_err(|e: http::uri::InvalidUri| TransportError::RedirectLocation {
            location: request.url.to_string(),
            message: e.to_string(),
        })?;

    let mut outgoing = Request::new(Full::new(request.body.clone()));
    *outgoing.method_mut() = request.method.clone();
    *outgoing.uri_mut() = uri;
    *outgoing.headers_mut() = request.headers.clone();

    let headers = outgoing.headers_mut();
    if !headers.contains_key(HOST) {
        let host = match request.url.port() {
            Some(port) => format!("{}:{}", request.url.host_str().unwrap_or_default(), port),
            None => request.url.host_str().unwrap_or_default().to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&host) {
            headers.insert(HOST, value);
        }
    }
    if !headers.contains_key(USER_AGENT) {
        if let Ok(value) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, value);
        }
    }
    if !config.keep_alive {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
    }
    Ok(outgoing)
}

struct Release {
    pool: Arc<Pool>,
    route: Route,
    connection: Connection,
}

/// Response body that hands its keep-alive connection back to the idle
/// list once the last frame has been read.
pub struct ResponseBody {
    inner: Incoming,
    release: Option<Release>,
}

impl ResponseBody {
    fn release_connection(&mut self) {
        if let Some(Release {
            pool,
            route,
            connection,
        }) = self.release.take()
        {
            connection.tracer.detach();
            pool.checkin(route, connection);
        }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let poll = Pin::new(&mut self.inner).poll_frame(cx);
        match &poll {
            Poll::Ready(None) => self.release_connection(),
            Poll::Ready(Some(Err(_))) => self.release = None,
            _ => {}
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use url::Url;

    fn hop(url: &str) -> HopRequest {
        HopRequest {
            method: Method::GET,
            url: Url::parse(url).unwrap(),
            headers: http::HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.tls_handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.max_redirects, 5);
        assert!(!config.keep_alive);
        assert!(config.user_agent.starts_with("reqstat/"));
    }

    #[test]
    fn origin_form_request() {
        let request = hop("http://example.com:8080/a/b?x=1#frag");
        let route = Route::from_url(&request.url, &ProxyPolicy::None).unwrap();
        let outgoing = build_request(&request, &route, &ClientConfig::default()).unwrap();
        assert_eq!(outgoing.uri(), "/a/b?x=1");
        assert_eq!(outgoing.headers()[HOST], "example.com:8080");
        assert_eq!(outgoing.headers()[CONNECTION], "close");
        assert!(outgoing.headers()[USER_AGENT]
            .to_str()
            .unwrap()
            .starts_with("reqstat/"));
    }

    #[test]
    fn absolute_form_through_http_proxy() {
        let request = hop("http://example.com/a#frag");
        let route =
            Route::from_url(&request.url, &ProxyPolicy::Fixed("proxy.local:3128".into())).unwrap();
        let config = ClientConfig {
            keep_alive: true,
            ..ClientConfig::default()
        };
        let outgoing = build_request(&request, &route, &config).unwrap();
        assert_eq!(outgoing.uri(), "http://example.com/a");
        assert_eq!(outgoing.headers()[HOST], "example.com");
        assert!(outgoing.headers().get(CONNECTION).is_none());
    }

    #[test]
    fn caller_user_agent_is_kept() {
        let mut request = hop("http://example.com/");
        request
            .headers
            .insert(USER_AGENT, HeaderValue::from_static("probe/1.0"));
        let route = Route::from_url(&request.url, &ProxyPolicy::None).unwrap();
        let outgoing = build_request(&request, &route, &ClientConfig::default()).unwrap();
        assert_eq!(outgoing.headers()[USER_AGENT], "probe/1.0");
    }
}
