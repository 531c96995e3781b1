use crate::error::TransportError;
use bytes::Bytes;
use http::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, PROXY_AUTHORIZATION, REFERER,
    WWW_AUTHENTICATE,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use url::Url;

/// One request as sent on one hop.
#[derive(Debug, Clone)]
pub struct HopRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Builds the request for the hop that follows a redirect of `previous`.
///
/// 301/302/303 continue with GET (HEAD stays HEAD) and no body; 307/308 repeat
/// method and body. Credentials are not forwarded to another host.
pub fn follow(
    previous: &HopRequest,
    status: StatusCode,
    location: &str,
) -> Result<HopRequest, TransportError> {
    let location_error = |message: &str| TransportError::RedirectLocation {
        location: location.to_string(),
        message: message.to_string(),
    };
    let url = previous
        .url
        .join(location)
        .map_err(|e| location_error(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(location_error("unsupported protocol scheme"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(location_error("missing host"));
    }

    let mut headers = previous.headers.clone();
    let (method, body) = match status.as_u16() {
        307 | 308 => (previous.method.clone(), previous.body.clone()),
        _ => {
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
            let method = if previous.method == Method::HEAD {
                Method::HEAD
            } else {
                Method::GET
            };
            (method, Bytes::new())
        }
    };

    if url.host_str() != previous.url.host_str() {
        for name in [AUTHORIZATION, PROXY_AUTHORIZATION, WWW_AUTHENTICATE, COOKIE] {
            headers.remove(name);
        }
    }

    headers.remove(REFERER);
    if let Some(referer) = referer_for(&previous.url, &url) {
        headers.insert(REFERER, referer);
    }

    Ok(HopRequest {
        method,
        url,
        headers,
        body,
    })
}

fn referer_for(from: &Url, to: &Url) -> Option<HeaderValue> {
    if from.scheme() == "https" && to.scheme() == "http" {
        return None;
    }
    let mut referer = from.clone();
    referer.set_fragment(None);
    let _ = referer.set_username("");
    let _ = referer.set_password(None);
    HeaderValue::from_str(referer.as_str()).ok()
}
