use std::io;
use std::time::Duration;

/// Failure of one [`request`](crate::response::request::request) call.
///
/// No partial response is ever returned alongside an error.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The request could not be built: bad method, URL, scheme or header.
    #[error("invalid request: {0}")]
    Construction(String),
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("reading response body from {url} failed")]
    BodyRead {
        url: String,
        #[source]
        source: hyper::Error,
    },
}

impl RequestError {
    pub(crate) fn construction(msg: impl Into<String>) -> Self {
        Self::Construction(msg.into())
    }

    pub(crate) fn transport(url: &url::Url, source: TransportError) -> Self {
        Self::Transport {
            url: url.to_string(),
            source,
        }
    }

    pub fn is_construction(&self) -> bool {
        matches!(self, Self::Construction(_))
    }

    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised by the client while acquiring connections and exchanging
/// messages.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("dns lookup for {host} failed")]
    Dns {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("no addresses found for host {0}")]
    NoAddresses(String),
    #[error("connect to {addr} failed")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),
    #[error("tls handshake with {host} failed")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("tls handshake with {0} timed out")]
    TlsTimeout(String),
    #[error("proxy {proxy}: {message}")]
    Proxy { proxy: String, message: String },
    #[error(transparent)]
    Http(#[from] hyper::Error),
    #[error("too many redirects (stopped after {0})")]
    TooManyRedirects(usize),
    #[error("invalid redirect location {location:?}: {message}")]
    RedirectLocation { location: String, message: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_chain_names_each_cause_once() {
        let url = url::Url::parse("http://127.0.0.1:1/").unwrap();
        let err = RequestError::transport(
            &url,
            TransportError::Connect {
                addr: "127.0.0.1:1".to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            },
        );
        assert_eq!(
            format!("{:#}", anyhow::Error::from(err)),
            "request to http://127.0.0.1:1/ failed: connect to 127.0.0.1:1 failed: connection refused"
        );
    }

    #[test]
    fn redirect_cap_message() {
        let err = TransportError::TooManyRedirects(5);
        assert_eq!(err.to_string(), "too many redirects (stopped after 5)");
    }
}
