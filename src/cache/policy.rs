//! Per-route cache policy engine.
//!
//! Every intercepted request is classified against the route table and served
//! under that class's strategy. `handle` never returns an error: total
//! failure synthesizes a 408 response (or the offline placeholder for
//! navigations) so a page render can always proceed.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::config::RoutesConfig;
use crate::net::{FetchRequest, FetchResponse, NetworkClient};

use super::bucket::{Bucket, BucketStore, CacheGeneration};

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
  /// Cross-origin: not intercepted, forwarded as-is
  Passthrough,
  /// Never cached, never served from cache (writes, always-fresh paths)
  FetchOnly,
  /// Immutable shell: cached copy wins, network fills misses
  CacheFirst,
  /// Fresh when possible, cached copy on network failure
  NetworkFirst,
  /// No rule matched
  Unmatched,
}

/// Route table derived from configuration.
///
/// Path patterns are either exact (`/manifest.webmanifest`) or, when they end
/// in `/`, prefixes (`/icons/`). The longest matching pattern wins; ties are
/// broken in rule order (always-fresh, shell, network-first).
pub struct RouteTable {
  origin: Url,
  always_fresh: Vec<String>,
  shell: Vec<String>,
  network_first: Vec<String>,
  offline_fallback: String,
}

impl RouteTable {
  pub fn new(origin: Url, routes: &RoutesConfig) -> Self {
    Self {
      origin,
      always_fresh: routes.always_fresh.clone(),
      shell: routes.shell.clone(),
      network_first: routes.network_first.clone(),
      offline_fallback: routes.offline_fallback.clone(),
    }
  }

  pub fn origin(&self) -> &Url {
    &self.origin
  }

  /// Absolute URLs of the immutable shell, precached at install time.
  ///
  /// The offline placeholder is always part of the shell, whether or not the
  /// configuration lists it explicitly.
  pub fn shell_urls(&self) -> Vec<Url> {
    let mut paths: Vec<&str> = self.shell.iter().map(String::as_str).collect();
    if !paths.contains(&self.offline_fallback.as_str()) {
      paths.push(&self.offline_fallback);
    }

    paths
      .iter()
      .filter_map(|path| self.origin.join(path).ok())
      .collect()
  }

  /// The reserved navigation fallback, served when nothing else can be.
  pub fn offline_fallback_url(&self) -> Option<Url> {
    self.origin.join(&self.offline_fallback).ok()
  }

  pub fn same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }

  /// Classify a request. Method and origin checks come first; path rules are
  /// resolved by longest match.
  pub fn classify(&self, request: &FetchRequest) -> RouteClass {
    if !request.is_get() {
      return RouteClass::FetchOnly;
    }
    if !self.same_origin(&request.url) {
      return RouteClass::Passthrough;
    }

    let path = request.url.path();
    let candidates = [
      (RouteClass::FetchOnly, &self.always_fresh),
      (RouteClass::CacheFirst, &self.shell),
      (RouteClass::NetworkFirst, &self.network_first),
    ];

    let mut best: Option<(RouteClass, usize)> = None;
    for (class, patterns) in candidates {
      for pattern in patterns {
        if !pattern_matches(pattern, path) {
          continue;
        }
        // Strictly-longer wins; equal length keeps the earlier rule
        if best.map_or(true, |(_, len)| pattern.len() > len) {
          best = Some((class, pattern.len()));
        }
      }
    }

    best.map_or(RouteClass::Unmatched, |(class, _)| class)
  }
}

/// Exact match, or prefix match for patterns ending in `/`.
fn pattern_matches(pattern: &str, path: &str) -> bool {
  if pattern.ends_with('/') && pattern.len() > 1 {
    path == pattern.trim_end_matches('/') || path.starts_with(pattern)
  } else {
    path == pattern
  }
}

/// The engine itself: route table + bucket + network + connectivity.
pub struct PolicyEngine<N: NetworkClient> {
  routes: Arc<RouteTable>,
  /// None when the persistent store failed to open: degraded to passthrough
  bucket: Option<Bucket>,
  network: Arc<N>,
  connectivity: watch::Receiver<bool>,
}

impl<N: NetworkClient> PolicyEngine<N> {
  /// Build an engine over one cache generation.
  ///
  /// A store that cannot be opened degrades the engine to network-only
  /// passthrough instead of failing construction.
  pub fn new(
    routes: Arc<RouteTable>,
    generation: &CacheGeneration,
    store: Option<&BucketStore>,
    network: Arc<N>,
    connectivity: watch::Receiver<bool>,
  ) -> Self {
    let bucket = store.and_then(|s| match s.open(generation) {
      Ok(bucket) => Some(bucket),
      Err(e) => {
        warn!("Cache store unavailable, degrading to passthrough: {}", e);
        None
      }
    });

    Self {
      routes,
      bucket,
      network,
      connectivity,
    }
  }

  fn online(&self) -> bool {
    *self.connectivity.borrow()
  }

  /// Serve an intercepted request. Never fails.
  pub async fn handle(&self, request: &FetchRequest) -> FetchResponse {
    let class = self.routes.classify(request);
    debug!("{} {} classified {:?}", request.method, request.url, class);

    match (class, &self.bucket) {
      // Degraded store or uncacheable class: straight to the network
      (RouteClass::Passthrough, _) | (RouteClass::FetchOnly, _) | (_, None) => {
        self.fetch_through(request).await
      }
      (RouteClass::CacheFirst, Some(bucket)) => self.cache_first(bucket, request).await,
      (RouteClass::NetworkFirst, Some(bucket)) => self.network_first(bucket, request).await,
      (RouteClass::Unmatched, Some(_)) => self.fallback(request),
    }
  }

  /// Fetch without touching the cache in either direction.
  async fn fetch_through(&self, request: &FetchRequest) -> FetchResponse {
    if !self.online() {
      return self.fallback(request);
    }

    match self.network.fetch(request).await {
      Ok(response) => response,
      Err(e) => {
        debug!("Fetch-only request to {} failed: {}", request.url, e);
        self.fallback(request)
      }
    }
  }

  /// Shell strategy: cached copy wins; a miss is fetched, stored, returned.
  async fn cache_first(&self, bucket: &Bucket, request: &FetchRequest) -> FetchResponse {
    let key = request.request_key();

    match bucket.get(&key) {
      Ok(Some(entry)) => return entry.into_response(),
      Ok(None) => {}
      Err(e) => warn!("Cache read failed for {}: {}", request.url, e),
    }

    if !self.online() {
      return self.fallback(request);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        self.store_if_eligible(bucket, request, &response);
        response
      }
      Err(e) => {
        debug!("Shell fetch for {} failed: {}", request.url, e);
        self.fallback(request)
      }
    }
  }

  /// Dynamic strategy: fresh network copy preferred and stored; the prior
  /// entry backs up network failure.
  async fn network_first(&self, bucket: &Bucket, request: &FetchRequest) -> FetchResponse {
    let key = request.request_key();

    if self.online() {
      match self.network.fetch(request).await {
        Ok(response) => {
          self.store_if_eligible(bucket, request, &response);
          return response;
        }
        Err(e) => debug!("Network-first fetch for {} failed: {}", request.url, e),
      }
    }

    match bucket.get(&key) {
      Ok(Some(entry)) => entry.into_response(),
      Ok(None) => self.fallback(request),
      Err(e) => {
        warn!("Cache read failed for {}: {}", request.url, e);
        self.fallback(request)
      }
    }
  }

  /// Store a response snapshot if it qualifies. Best-effort: a failed write
  /// is logged and the response is served regardless.
  fn store_if_eligible(&self, bucket: &Bucket, request: &FetchRequest, response: &FetchResponse) {
    // Only complete same-origin 200s are snapshotted
    if response.status != 200 || !self.routes.same_origin(&request.url) {
      return;
    }

    let key = request.request_key();
    if let Err(e) = bucket.put(&key, request.url.as_str(), response) {
      warn!("Cache write failed for {}: {}", request.url, e);
    }
  }

  /// Rule 6: the offline placeholder for navigations, a synthesized 408 for
  /// everything else.
  fn fallback(&self, request: &FetchRequest) -> FetchResponse {
    if request.is_navigation {
      if let Some(placeholder) = self.offline_placeholder() {
        return placeholder;
      }
    }
    FetchResponse::request_timeout()
  }

  fn offline_placeholder(&self) -> Option<FetchResponse> {
    let bucket = self.bucket.as_ref()?;
    let url = self.routes.offline_fallback_url()?;
    let key = FetchRequest::get(url).request_key();

    match bucket.get(&key) {
      Ok(Some(entry)) => Some(entry.into_response()),
      Ok(None) => None,
      Err(e) => {
        warn!("Offline placeholder lookup failed: {}", e);
        None
      }
    }
  }
}
