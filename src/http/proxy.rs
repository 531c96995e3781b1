use crate::error::TransportError;
use crate::http::timing_connector::TimedDialer;
use http::header::USER_AGENT;
use http::uri::InvalidUri;
use http::{HeaderMap, HeaderValue, Uri};
use hyper_util::client::legacy::connect::proxy::Tunnel;
use std::net::IpAddr;
use tokio::net::TcpStream;
use tower_service::Service;

/// Where proxy settings come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxyPolicy {
    /// Always connect directly.
    None,
    /// `HTTP(S)_PROXY`, `ALL_PROXY` and `NO_PROXY`, upper or lower case.
    #[default]
    FromEnv,
    /// A fixed `host:port` proxy for every non-loopback destination.
    Fixed(String),
}

impl ProxyPolicy {
    /// The proxy `host:port` to use for `host` reached over `scheme`, if any.
    pub fn proxy_for(&self, scheme: &str, host: &str) -> Option<String> {
        if is_loopback(host) {
            return None;
        }
        match self {
            ProxyPolicy::None => None,
            ProxyPolicy::Fixed(addr) => Some(addr.clone()),
            ProxyPolicy::FromEnv => {
                let bypass = first_env(&["NO_PROXY", "no_proxy"])
                    .is_some_and(|list| should_bypass_proxy(&list, host));
                if bypass {
                    None
                } else {
                    proxy_from_env(scheme)
                }
            }
        }
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| std::env::var(name).ok())
}

/// Proxy configured for `scheme` in the environment. `ALL_PROXY` is the
/// fallback for both schemes.
pub fn proxy_from_env(scheme: &str) -> Option<String> {
    let names: &[&str] = match scheme {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        _ => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
    };
    let setting = first_env(names)?;
    debug!("Using proxy {} for {}", setting, scheme);
    parse_proxy_addr(&setting)
}

/// Turns a proxy setting into `host:port`.
///
/// Accepts `http://host[:port]` (port 80), `https://host[:port]` (port 443)
/// and a bare `host:port`. SOCKS proxies are not supported and yield `None`.
pub fn parse_proxy_addr(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let Ok(url) = url::Url::parse(value) else {
        return Some(value.to_string());
    };
    let default_port = match url.scheme() {
        "http" => 80,
        "https" => 443,
        // `host:port` also parses as a URL with `host` as its scheme.
        _ if url.cannot_be_a_base() => return Some(value.to_string()),
        _ => return None,
    };
    let host = url.host_str()?;
    Some(format!("{}:{}", host, url.port().unwrap_or(default_port)))
}

/// Whether a `NO_PROXY` list excludes `host`. Entries are `*`, an exact
/// host or IP, or `.domain` which matches the domain and its subdomains.
pub fn should_bypass_proxy(no_proxy: &str, host: &str) -> bool {
    no_proxy
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .any(|entry| match entry.strip_prefix('.') {
            _ if entry == "*" => true,
            Some(domain) => host == domain || host.ends_with(entry),
            None => host == entry,
        })
}

fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

/// Dials `proxy` through `dialer` and opens a `CONNECT` tunnel to
/// `authority` over it.
pub async fn open_tunnel(
    dialer: TimedDialer,
    proxy: &str,
    authority: &str,
    user_agent: &str,
) -> Result<TcpStream, TransportError> {
    let proxy_error = |message: String| TransportError::Proxy {
        proxy: proxy.to_string(),
        message,
    };
    let proxy_dst: Uri = format!("http://{}", proxy)
        .parse()
        .map_err(|e: InvalidUri| proxy_error(e.to_string()))?;
    let target: Uri = format!("https://{}", authority)
        .parse()
        .map_err(|e: InvalidUri| proxy_error(e.to_string()))?;

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }
    let mut tunnel = Tunnel::new(proxy_dst, dialer.clone()).with_headers(headers);
    match tunnel.call(target).await {
        Ok(io) => Ok(io.into_inner()),
        Err(e) => Err(dialer
            .take_failure()
            .unwrap_or_else(|| proxy_error(e.to_string()))),
    }
}
