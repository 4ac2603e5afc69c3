//! Outbound HTTP for the `fetch` host function.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use sb_error::HostError;
use tracing::debug;

/// A request as described by script arguments.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// MIME-style header block, one `Name: value` per line
    pub headers: String,
    pub method: String,
    /// Request body; sent only when non-empty
    pub payload: String,
}

/// Status and decoded body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// Parses a MIME-style header block.
///
/// The block is trimmed first and parsing stops at the first blank line.
/// Lines starting with a space or tab continue the previous header's value.
pub fn parse_header_block(block: &str) -> Result<HeaderMap, HostError> {
    let mut headers = HeaderMap::new();
    let mut current: Option<(HeaderName, String)> = None;

    for line in block.trim().lines() {
        if line.trim().is_empty() {
            break;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            match current.as_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(line.trim());
                    continue;
                }
                None => {
                    return Err(HostError::InvalidHeaders(format!(
                        "continuation line without a header: {line:?}"
                    )))
                }
            }
        }

        if let Some((name, value)) = current.take() {
            append_header(&mut headers, name, &value)?;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HostError::InvalidHeaders(format!("missing colon: {line:?}")))?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HostError::InvalidHeaders(format!("invalid header name: {name:?}")))?;
        current = Some((name, value.trim().to_string()));
    }

    if let Some((name, value)) = current {
        append_header(&mut headers, name, &value)?;
    }

    Ok(headers)
}

fn append_header(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), HostError> {
    let value = HeaderValue::from_str(value).map_err(|_| {
        HostError::InvalidHeaders(format!("invalid value for header {name}: {value:?}"))
    })?;
    headers.append(name, value);
    Ok(())
}

/// Performs the request and reads the whole response body.
pub async fn fetch(client: &Client, request: &FetchRequest) -> Result<FetchResponse, HostError> {
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|_| HostError::Http(format!("invalid method: {:?}", request.method)))?;
    let headers = parse_header_block(&request.headers)?;

    debug!(url = %request.url, method = %method, "Sending fetch request");

    let mut builder = client.request(method, request.url.as_str()).headers(headers);
    if !request.payload.is_empty() {
        builder = builder.body(request.payload.clone());
    }

    let response = builder
        .send()
        .await
        .map_err(|e| HostError::Http(e.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| HostError::Http(format!("failed to read response body: {e}")))?;

    Ok(FetchResponse {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
