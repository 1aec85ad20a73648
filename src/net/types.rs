//! Request and response snapshot types used across the offline layer.

use sha2::{Digest, Sha256};
use url::Url;

/// An intercepted outgoing request.
///
/// The layer only looks at method, URL and navigation-ness to classify a
/// request; headers and body pass through untouched.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  /// Uppercase HTTP method
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  /// Whether this is a full-page load (navigation) rather than a subresource
  pub is_navigation: bool,
}

impl FetchRequest {
  /// A plain GET for a subresource.
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      headers: Vec::new(),
      body: None,
      is_navigation: false,
    }
  }

  /// A full-page navigation GET.
  pub fn navigation(url: Url) -> Self {
    Self {
      is_navigation: true,
      ..Self::get(url)
    }
  }

  /// A write request with a body.
  pub fn write(method: &str, url: Url, body: Vec<u8>) -> Self {
    Self {
      method: method.to_uppercase(),
      url,
      headers: Vec::new(),
      body: Some(body),
      is_navigation: false,
    }
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  /// Canonical fingerprint of method + URL.
  ///
  /// SHA256 hash for stable, fixed-length keys. Fragments never reach the
  /// network, so they are excluded from the fingerprint.
  pub fn request_key(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);

    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response snapshot, either straight from the network or rehydrated from
/// the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl FetchResponse {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// Synthesized empty failure response for "no data available".
  ///
  /// Distinguishable by status so callers can detect that neither network
  /// nor cache produced anything.
  pub fn request_timeout() -> Self {
    Self {
      status: 408,
      headers: Vec::new(),
      body: Vec::new(),
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_server_error(&self) -> bool {
    (500..600).contains(&self.status)
  }

  pub fn is_client_error(&self) -> bool {
    (400..500).contains(&self.status)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_request_key_stable_across_fragments() {
    let a = FetchRequest::get(url("https://example.com/menu#section"));
    let b = FetchRequest::get(url("https://example.com/menu"));
    assert_eq!(a.request_key(), b.request_key());
  }

  #[test]
  fn test_request_key_distinguishes_method() {
    let get = FetchRequest::get(url("https://example.com/api/menu"));
    let post = FetchRequest::write("POST", url("https://example.com/api/menu"), Vec::new());
    assert_ne!(get.request_key(), post.request_key());
  }

  #[test]
  fn test_request_key_distinguishes_query() {
    let a = FetchRequest::get(url("https://example.com/api/menu?page=1"));
    let b = FetchRequest::get(url("https://example.com/api/menu?page=2"));
    assert_ne!(a.request_key(), b.request_key());
  }

  #[test]
  fn test_timeout_response_is_distinguishable() {
    let resp = FetchResponse::request_timeout();
    assert_eq!(resp.status, 408);
    assert!(!resp.is_success());
    assert!(resp.body.is_empty());
  }
}
