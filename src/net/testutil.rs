//! Scripted in-memory network for tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

use super::client::NetworkClient;
use super::types::{FetchRequest, FetchResponse};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
  Response(FetchResponse),
  /// Simulates no response at all (offline, connection refused)
  NetworkError,
}

/// A request the fake observed, in arrival order.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

/// Fake network with per-URL scripted replies and a full request log.
///
/// Replies queued for a URL are consumed front-first; the last one repeats
/// once the queue is down to a single entry. URLs with no script fall back
/// to the default reply (a 200 with an empty body unless overridden).
pub struct FakeNetwork {
  scripts: Mutex<HashMap<String, Vec<Reply>>>,
  default: Mutex<Reply>,
  log: Mutex<Vec<RecordedRequest>>,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self {
      scripts: Mutex::new(HashMap::new()),
      default: Mutex::new(Reply::Response(FetchResponse::new(
        200,
        Vec::new(),
        Vec::new(),
      ))),
      log: Mutex::new(Vec::new()),
    }
  }

  /// Every unscripted URL behaves as if the device were offline.
  pub fn offline() -> Self {
    let fake = Self::new();
    *fake.default.lock().unwrap() = Reply::NetworkError;
    fake
  }

  /// Script a single repeating response for a URL.
  pub fn respond(&self, url: &str, status: u16, body: &[u8]) {
    self.script(url, vec![Reply::Response(FetchResponse::new(
      status,
      Vec::new(),
      body.to_vec(),
    ))]);
  }

  /// Script a repeating network error for a URL.
  pub fn fail(&self, url: &str) {
    self.script(url, vec![Reply::NetworkError]);
  }

  /// Script an explicit reply sequence for a URL (last entry repeats).
  pub fn script(&self, url: &str, replies: Vec<Reply>) {
    self.scripts.lock().unwrap().insert(url.to_string(), replies);
  }

  /// All requests observed so far, in order.
  pub fn requests(&self) -> Vec<RecordedRequest> {
    self.log.lock().unwrap().clone()
  }

  /// How many requests hit the given URL.
  pub fn hits(&self, url: &str) -> usize {
    self
      .log
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url.as_str() == url)
      .count()
  }

  fn next_reply(&self, url: &str) -> Reply {
    let mut scripts = self.scripts.lock().unwrap();
    if let Some(queue) = scripts.get_mut(url) {
      if queue.len() > 1 {
        return queue.remove(0);
      }
      if let Some(last) = queue.first() {
        return last.clone();
      }
    }
    self.default.lock().unwrap().clone()
  }
}

impl NetworkClient for FakeNetwork {
  async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
    self.log.lock().unwrap().push(RecordedRequest {
      method: request.method.clone(),
      url: request.url.clone(),
      headers: request.headers.clone(),
      body: request.body.clone(),
    });

    match self.next_reply(request.url.as_str()) {
      Reply::Response(response) => Ok(response),
      Reply::NetworkError => Err(eyre!("connection refused: {}", request.url)),
    }
  }
}
