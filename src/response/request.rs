use crate::error::{RequestError, TransportError};
use crate::http::redirect::HopRequest;
use crate::http::{Client, ClientConfig};
use crate::response::res::Response;
use crate::trace::TraceRecorder;
use bytes::Bytes;
use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use hyper::body::Body;
use std::future::Future;
use std::sync::Arc;
use tokio::time::error::Elapsed;
use tokio::time::{timeout_at, Instant};
use url::Url;

/// Issues one request with a default [`Client`].
pub async fn request(
    method: &str,
    url: &str,
    headers: Option<&HeaderMap>,
    body: Option<Bytes>,
) -> Result<Response, RequestError> {
    let client = Client::new(ClientConfig::default())
        .map_err(|e| RequestError::construction(format!("{:#}", e)))?;
    request_with_client(&client, method, url, headers, body).await
}

/// Issues one request through `client`, records its hops and drains the
/// final body.
pub async fn request_with_client(
    client: &Client,
    method: &str,
    url: &str,
    headers: Option<&HeaderMap>,
    body: Option<Bytes>,
) -> Result<Response, RequestError> {
    let hop = prepare(method, url, headers, body)?;
    let target = hop.url.clone();
    let recorder = Arc::new(TraceRecorder::new());
    let limit = client.config().timeout;
    // `None` when the limit is beyond what an `Instant` can represent.
    let deadline = Instant::now().checked_add(limit);

    let response = match within(deadline, client.execute(hop, recorder.clone())).await {
        Ok(Ok(response)) => response,
        Ok(Err(source)) => return Err(RequestError::transport(&target, source)),
        Err(_) => {
            return Err(RequestError::transport(
                &target,
                TransportError::Timeout(limit),
            ))
        }
    };

    let (parts, mut body) = response.into_parts();
    let body_size = match within(deadline, count_body(&mut body)).await {
        Ok(Ok(size)) => size,
        Ok(Err(source)) => {
            return Err(RequestError::BodyRead {
                url: target.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(RequestError::transport(
                &target,
                TransportError::Timeout(limit),
            ))
        }
    };
    drop(body);

    Ok(Response::new(
        parts.status,
        parts.headers,
        body_size,
        recorder.traces(),
    ))
}

impl Client {
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Option<Bytes>,
    ) -> Result<Response, RequestError> {
        request_with_client(self, method, url, headers, body).await
    }
}

fn prepare(
    method: &str,
    url: &str,
    headers: Option<&HeaderMap>,
    body: Option<Bytes>,
) -> Result<HopRequest, RequestError> {
    let parsed_method = Method::from_bytes(method.as_bytes())
        .map_err(|e| RequestError::construction(format!("invalid method {:?}: {}", method, e)))?;
    let parsed_url = Url::parse(url)
        .map_err(|e| RequestError::construction(format!("invalid url {:?}: {}", url, e)))?;
    match parsed_url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RequestError::construction(format!(
                "unsupported protocol scheme {:?}",
                other
            )))
        }
    }
    if parsed_url.host_str().map_or(true, str::is_empty) {
        return Err(RequestError::construction(format!(
            "no host in url {:?}",
            url
        )));
    }

    // Insert, not append: the last value given for a name wins.
    let mut merged = HeaderMap::new();
    if let Some(headers) = headers {
        for (name, value) in headers.iter() {
            merged.insert(name.clone(), value.clone());
        }
    }

    Ok(HopRequest {
        method: parsed_method,
        url: parsed_url,
        headers: merged,
        body: body.unwrap_or_default(),
    })
}

async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Result<F::Output, Elapsed> {
    match deadline {
        Some(deadline) => timeout_at(deadline, fut).await,
        None => Ok(fut.await),
    }
}

/// Reads the body to its end, keeping only the byte count.
async fn count_body<B>(body: &mut B) -> Result<u64, B::Error>
where
    B: Body<Data = Bytes> + Unpin,
{
    let mut size = 0u64;
    while let Some(frame) = body.frame().await {
        if let Some(data) = frame?.data_ref() {
            size += data.len() as u64;
        }
    }
    Ok(size)
}
