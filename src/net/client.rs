//! Network access behind a trait so policy and replay logic are testable.

use color_eyre::{eyre::eyre, Result};

use super::types::{FetchRequest, FetchResponse};

/// Something that can put a request on the wire.
///
/// An `Err` means no response at all (DNS failure, connection refused, the
/// device is offline). HTTP error statuses are returned as `Ok` responses;
/// classifying them is the caller's job.
pub trait NetworkClient: Send + Sync + 'static {
  fn fetch(
    &self,
    request: &FetchRequest,
  ) -> impl std::future::Future<Output = Result<FetchResponse>> + Send;
}

/// reqwest-backed client used outside of tests.
#[derive(Clone)]
pub struct ReqwestClient {
  http: reqwest::Client,
}

impl ReqwestClient {
  pub fn new() -> Result<Self> {
    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { http })
  }
}

impl NetworkClient for ReqwestClient {
  async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid HTTP method {}: {}", request.method, e))?;

    let mut builder = self.http.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Network fetch failed for {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", request.url, e))?
      .to_vec();

    Ok(FetchResponse::new(status, headers, body))
  }
}
