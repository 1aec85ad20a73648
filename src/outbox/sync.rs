//! Replay of queued writes once connectivity allows it.
//!
//! A replay cycle walks the outbox in FIFO order and stops at the first
//! failure, so dependent writes are never reordered. Cycles are triggered by
//! an offline-to-online transition, by the bridge's sync signal (enqueue
//! while offline, explicit retry), or by a periodic backoff timer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::Result;
use tokio::time;
use tracing::{debug, info, warn};
use url::Url;

use crate::bridge::UiBridge;
use crate::net::{FetchRequest, NetworkClient};

use super::store::{OutboxItem, OutboxStore};

/// Header carrying the item id so the server can deduplicate redelivery.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
  /// Named sync tag, for log correlation with the registering bridge
  pub tag: String,
  /// Delivery attempts after which a rejected item is dead-lettered
  pub retry_ceiling: u32,
  pub backoff_min: Duration,
  pub backoff_max: Duration,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "contact-form".to_string(),
      retry_ceiling: 5,
      backoff_min: Duration::from_secs(5),
      backoff_max: Duration::from_secs(300),
    }
  }
}

/// Per-cycle state, `Idle -> Replaying -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
  Idle,
  Replaying,
}

/// What one replay cycle accomplished.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
  pub delivered: usize,
  pub dead_lettered: usize,
  /// Set when the cycle stopped before draining, with the blocking error
  pub stopped_on: Option<String>,
}

/// Bounded exponential backoff for the periodic timer fallback.
#[derive(Debug)]
struct Backoff {
  current: Duration,
  min: Duration,
  max: Duration,
}

impl Backoff {
  fn new(min: Duration, max: Duration) -> Self {
    Self {
      current: min,
      min,
      max,
    }
  }

  fn delay(&self) -> Duration {
    self.current
  }

  fn advance(&mut self) {
    self.current = (self.current * 2).min(self.max);
  }

  fn reset(&mut self) {
    self.current = self.min;
  }
}

/// Drives the outbox against the network.
pub struct SyncCoordinator<N: NetworkClient> {
  outbox: OutboxStore,
  network: Arc<N>,
  bridge: Arc<UiBridge>,
  config: SyncConfig,
  state: Mutex<CycleState>,
}

impl<N: NetworkClient> SyncCoordinator<N> {
  pub fn new(
    outbox: OutboxStore,
    network: Arc<N>,
    bridge: Arc<UiBridge>,
    config: SyncConfig,
  ) -> Self {
    Self {
      outbox,
      network,
      bridge,
      config,
      state: Mutex::new(CycleState::Idle),
    }
  }

  pub fn state(&self) -> CycleState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Run until the bridge goes away. Intended to be spawned once.
  pub async fn run(self: Arc<Self>) {
    let mut connectivity = self.bridge.connectivity();
    let nudge = self.bridge.sync_signal();
    let mut backoff = Backoff::new(self.config.backoff_min, self.config.backoff_max);

    info!("Sync coordinator running (tag '{}')", self.config.tag);
    loop {
      tokio::select! {
        changed = connectivity.changed() => {
          if changed.is_err() {
            break;
          }
          if *connectivity.borrow_and_update() {
            self.cycle(&mut backoff).await;
          }
        }
        _ = nudge.notified() => {
          self.cycle(&mut backoff).await;
        }
        // Timer fallback for platforms with no connectivity-regained signal
        _ = time::sleep(backoff.delay()) => {
          if self.bridge.is_online() {
            self.cycle(&mut backoff).await;
          } else {
            backoff.advance();
          }
        }
      }
    }
    info!("Sync coordinator stopped");
  }

  async fn cycle(&self, backoff: &mut Backoff) {
    match self.replay_cycle().await {
      Ok(outcome) => {
        if outcome.delivered > 0 {
          backoff.reset();
        } else {
          backoff.advance();
        }
      }
      Err(e) => {
        warn!("Replay cycle unavailable: {}", e);
        self.bridge.publish_sync_unavailable();
        backoff.advance();
      }
    }
  }

  /// One full replay pass, strictly FIFO, stopping at the first item that
  /// cannot be confirmed.
  pub async fn replay_cycle(&self) -> Result<CycleOutcome> {
    {
      let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
      if *state == CycleState::Replaying {
        // Re-entrant trigger while a cycle is in flight; that cycle covers it
        return Ok(CycleOutcome::default());
      }
      *state = CycleState::Replaying;
    }

    let outcome = self.drain().await;

    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = CycleState::Idle;
    outcome
  }

  async fn drain(&self) -> Result<CycleOutcome> {
    let items = self.outbox.list_pending()?;
    let mut outcome = CycleOutcome::default();

    for item in items {
      match self.deliver(&item).await {
        Delivery::Confirmed => {
          self.outbox.remove(&item.id)?;
          outcome.delivered += 1;
          self.bridge.publish_pending_count();
        }
        Delivery::Transient(error) => {
          // Same item is retried first next cycle; never reorder
          self.outbox.mark_attempt(&item.id, &error)?;
          debug!("Replay of {} blocked: {}", item.id, error);
          outcome.stopped_on = Some(error);
          break;
        }
        Delivery::Rejected(error) => {
          self.outbox.mark_attempt(&item.id, &error)?;
          let attempts = item.attempts + 1;
          if attempts >= self.config.retry_ceiling {
            warn!(
              "Dead-lettering {} after {} attempts: {}",
              item.id, attempts, error
            );
            self.outbox.dead_letter(&item.id)?;
            outcome.dead_lettered += 1;
            self.bridge.publish_dead_letter(&item.id);
            self.bridge.publish_pending_count();
          } else {
            // Possibly transient on the client side too (stale auth token)
            outcome.stopped_on = Some(error);
            break;
          }
        }
      }
    }

    if outcome.delivered > 0 || outcome.dead_lettered > 0 {
      info!(
        "Replay cycle: {} delivered, {} dead-lettered",
        outcome.delivered, outcome.dead_lettered
      );
    }
    Ok(outcome)
  }

  async fn deliver(&self, item: &OutboxItem) -> Delivery {
    let url = match Url::parse(&item.target_url) {
      Ok(url) => url,
      // An unparseable target can never succeed; count it toward the ceiling
      Err(e) => return Delivery::Rejected(format!("invalid target URL: {}", e)),
    };

    let request = FetchRequest {
      method: item.method.clone(),
      url,
      headers: vec![(IDEMPOTENCY_HEADER.to_string(), item.id.clone())],
      body: item.body.clone(),
      is_navigation: false,
    };

    match self.network.fetch(&request).await {
      Ok(response) if response.is_success() => Delivery::Confirmed,
      Ok(response) if response.is_server_error() => {
        Delivery::Transient(format!("server error {}", response.status))
      }
      Ok(response) => Delivery::Rejected(format!("rejected with status {}", response.status)),
      Err(e) => Delivery::Transient(format!("network error: {}", e)),
    }
  }
}

enum Delivery {
  Confirmed,
  /// No response or 5xx: retried indefinitely with backoff
  Transient(String),
  /// 4xx-class rejection: counts toward the dead-letter ceiling
  Rejected(String),
}
