//! Install/activate lifecycle of the background worker.
//!
//! Modeled as an explicit state machine rather than scattered event handlers:
//! `Installing -> Waiting -> Active -> Redundant`. Installing pre-warms the
//! new cache generation with the shell; activating garbage-collects every
//! other generation and claims the open pages.

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cache::{BucketStore, CacheGeneration, RouteTable};
use crate::net::{FetchRequest, NetworkClient};

/// Lifecycle phase of one worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Installing,
  Waiting,
  Active,
  Redundant,
}

/// Owns generation rollover for the cache bucket store.
pub struct LifecycleManager<N: NetworkClient> {
  state: WorkerState,
  generation: CacheGeneration,
  store: BucketStore,
  network: Arc<N>,
  routes: Arc<RouteTable>,
  skip_waiting: bool,
  /// Pages watch this to learn which generation controls them; `None` until
  /// the first activation
  controller: watch::Sender<Option<CacheGeneration>>,
}

impl<N: NetworkClient> LifecycleManager<N> {
  pub fn new(
    generation: CacheGeneration,
    store: BucketStore,
    network: Arc<N>,
    routes: Arc<RouteTable>,
  ) -> Self {
    let (controller, _) = watch::channel(None);

    Self {
      state: WorkerState::Installing,
      generation,
      store,
      network,
      routes,
      skip_waiting: false,
      controller,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn generation(&self) -> &CacheGeneration {
    &self.generation
  }

  /// Watch handle announcing the controlling generation to open pages.
  pub fn controller(&self) -> watch::Receiver<Option<CacheGeneration>> {
    self.controller.subscribe()
  }

  /// Pre-warm the new generation with the immutable shell.
  ///
  /// Each resource is fetched independently; one failure does not abort the
  /// rest. Partial success is logged and accepted. Transitions to `Waiting`.
  pub async fn install(&mut self) -> Result<()> {
    if self.state != WorkerState::Installing {
      return Err(eyre!("install called in state {:?}", self.state));
    }

    let bucket = self.store.open(&self.generation)?;
    let shell = self.routes.shell_urls();

    let fetches = shell.iter().map(|url| {
      let request = FetchRequest::get(url.clone());
      let network = Arc::clone(&self.network);
      async move {
        let result = network.fetch(&request).await;
        (request, result)
      }
    });

    let mut cached = 0usize;
    for (request, result) in join_all(fetches).await {
      match result {
        Ok(response) if response.status == 200 => {
          match bucket.put(&request.request_key(), request.url.as_str(), &response) {
            Ok(()) => cached += 1,
            Err(e) => warn!("Failed to precache {}: {}", request.url, e),
          }
        }
        Ok(response) => {
          warn!("Skipping precache of {} (status {})", request.url, response.status);
        }
        Err(e) => warn!("Failed to fetch shell resource {}: {}", request.url, e),
      }
    }

    info!(
      "Generation {} installed: {}/{} shell resources cached",
      self.generation,
      cached,
      shell.len()
    );
    self.state = WorkerState::Waiting;
    Ok(())
  }

  /// "Take over now" signal from a page.
  pub fn skip_waiting(&mut self) {
    self.skip_waiting = true;
  }

  pub fn wants_immediate_takeover(&self) -> bool {
    self.skip_waiting
  }

  /// Become the active worker: delete every generation except this one, then
  /// claim the open pages so requests route through the new engine without a
  /// reload.
  pub async fn activate(&mut self) -> Result<()> {
    if self.state != WorkerState::Waiting {
      return Err(eyre!("activate called in state {:?}", self.state));
    }

    for name in self.store.list_generation_names()? {
      if name != self.generation.name() {
        info!("Garbage-collecting stale generation {}", name);
        self.store.delete_generation(&name)?;
      }
    }

    self.controller.send_replace(Some(self.generation.clone()));
    self.state = WorkerState::Active;
    info!("Generation {} active", self.generation);
    Ok(())
  }

  /// Mark this instance superseded. A redundant instance performs no work.
  pub fn retire(&mut self) {
    self.state = WorkerState::Redundant;
  }
}
