//! HTTP transport shared by both backends.

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClusterError;

/// Timeout applied to every backend request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Header carrying the API token on every authenticated request.
pub(crate) const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

const USER_AGENT: &str = concat!("carina/", env!("CARGO_PKG_VERSION"));

/// Build a fresh client with the request timeout and default headers.
pub(crate) fn build_client() -> Result<Client, ClusterError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .map_err(ClusterError::from)
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, ClusterError> {
    let mut url = Url::parse(base).map_err(|e| ClusterError::InvalidArgument {
        message: format!("invalid endpoint URL '{base}': {e}"),
    })?;
    url.path_segments_mut()
        .map_err(|()| ClusterError::InvalidArgument {
            message: format!("endpoint URL '{base}' cannot carry a path"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Send a request and map unsuccessful statuses to [`ClusterError`].
///
/// `cluster` names the cluster the request addresses, so that a 404 becomes
/// [`ClusterError::NotFound`].
pub(crate) async fn send(
    client: &Client,
    request: RequestBuilder,
    cluster: Option<&str>,
) -> Result<Response, ClusterError> {
    let response = send_unchecked(client, request).await?;
    check_status(response, cluster).await
}

/// Send a request without inspecting the response status.
pub(crate) async fn send_unchecked(
    client: &Client,
    request: RequestBuilder,
) -> Result<Response, ClusterError> {
    let request = request.build()?;
    debug!(method = %request.method(), url = %request.url(), "sending backend request");
    let response = client.execute(request).await?;
    debug!(status = response.status().as_u16(), "backend responded");
    Ok(response)
}

async fn check_status(response: Response, cluster: Option<&str>) -> Result<Response, ClusterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match (status, cluster) {
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
            ClusterError::AuthenticationFailed {
                message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            }
        }
        (StatusCode::NOT_FOUND, Some(name)) => ClusterError::NotFound {
            name: name.to_owned(),
        },
        _ => ClusterError::Status {
            status: status.as_u16(),
            body,
        },
    })
}

/// Decode a JSON response body.
pub(crate) async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ClusterError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ClusterError::backend(format!("unexpected response body: {e}")))
}
