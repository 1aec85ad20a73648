//! Bridge between the foreground UI and the offline layer.
//!
//! The UI proposes outbox additions and observes state; it never mutates
//! queued items in place. Connectivity is a single process-wide flag,
//! initialized from the platform signal and mutated only on transitions.

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, info};
use url::Url;

use crate::outbox::{DeadLetter, OutboxStore};

/// Events surfaced to the foreground UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
  ConnectivityChanged(bool),
  PendingCountChanged(usize),
  /// A queued write was permanently rejected and will not be retried
  ItemDeadLettered(String),
  /// The persistent store is unusable; queued delivery cannot be offered
  SyncUnavailable,
}

/// Foreground-facing handle over connectivity, the outbox and the event
/// stream. Shared across tabs and the sync coordinator via `Arc`.
pub struct UiBridge {
  connectivity: watch::Sender<bool>,
  events: broadcast::Sender<BridgeEvent>,
  /// None when the store failed to open: enqueue reports sync unavailable
  outbox: Option<OutboxStore>,
  /// Nudged when a replay cycle should run now (enqueue-while-offline
  /// registration, explicit UI retry)
  sync_nudge: Arc<Notify>,
  sync_tag: String,
}

impl UiBridge {
  pub fn new(initially_online: bool, outbox: Option<OutboxStore>, sync_tag: &str) -> Self {
    let (connectivity, _) = watch::channel(initially_online);
    let (events, _) = broadcast::channel(64);

    Self {
      connectivity,
      events,
      outbox,
      sync_nudge: Arc::new(Notify::new()),
      sync_tag: sync_tag.to_string(),
    }
  }

  /// Subscribe to UI events. Each subscriber gets every event from the point
  /// of subscription onward.
  pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
    self.events.subscribe()
  }

  /// Watch handle over the connectivity flag.
  pub fn connectivity(&self) -> watch::Receiver<bool> {
    self.connectivity.subscribe()
  }

  pub fn is_online(&self) -> bool {
    *self.connectivity.borrow()
  }

  /// Record a connectivity transition. Non-transitions are ignored.
  pub fn set_online(&self, online: bool) {
    if *self.connectivity.borrow() == online {
      return;
    }

    info!("Connectivity changed: online={}", online);
    // send_replace stores the value even with no receivers subscribed yet
    self.connectivity.send_replace(online);
    self.emit(BridgeEvent::ConnectivityChanged(online));
  }

  /// Queue a state-changing submission for replay and return its id.
  ///
  /// The id is the idempotency token the coordinator later sends with every
  /// delivery attempt.
  pub fn enqueue_write(&self, target_url: &Url, method: &str, body: Option<Vec<u8>>) -> Result<String> {
    let outbox = match &self.outbox {
      Some(outbox) => outbox,
      None => {
        self.emit(BridgeEvent::SyncUnavailable);
        return Err(eyre!("Sync unavailable: persistent store failed to open"));
      }
    };

    let id = outbox.enqueue(target_url, method, body)?;
    self.publish_pending_count();

    if self.is_online() {
      self.sync_nudge.notify_one();
    } else {
      // The platform analogue of registering a named background-sync tag
      debug!("Registered sync tag '{}' for item {}", self.sync_tag, id);
    }

    Ok(id)
  }

  /// Explicit UI-initiated retry.
  pub fn request_sync(&self) {
    self.sync_nudge.notify_one();
  }

  /// Items still waiting for delivery.
  pub fn pending_count(&self) -> usize {
    self
      .outbox
      .as_ref()
      .and_then(|outbox| outbox.pending_count().ok())
      .unwrap_or(0)
  }

  /// Permanently failed submissions, for the UI's failure notice.
  pub fn dead_letters(&self) -> Vec<DeadLetter> {
    self
      .outbox
      .as_ref()
      .and_then(|outbox| outbox.list_dead_letters().ok())
      .unwrap_or_default()
  }

  /// Signal the coordinator waits on for immediate replay requests.
  pub(crate) fn sync_signal(&self) -> Arc<Notify> {
    Arc::clone(&self.sync_nudge)
  }

  pub(crate) fn publish_pending_count(&self) {
    self.emit(BridgeEvent::PendingCountChanged(self.pending_count()));
  }

  pub(crate) fn publish_dead_letter(&self, id: &str) {
    self.emit(BridgeEvent::ItemDeadLettered(id.to_string()));
  }

  pub(crate) fn publish_sync_unavailable(&self) {
    self.emit(BridgeEvent::SyncUnavailable);
  }

  fn emit(&self, event: BridgeEvent) {
    // No subscribers is fine; events are advisory
    let _ = self.events.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;

  fn bridge() -> UiBridge {
    let outbox = OutboxStore::new(Database::open_in_memory().unwrap());
    UiBridge::new(true, Some(outbox), "contact-form")
  }

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[tokio::test]
  async fn test_enqueue_emits_pending_count() {
    let bridge = bridge();
    let mut events = bridge.subscribe();

    bridge
      .enqueue_write(&url("https://example.com/api/contact"), "POST", None)
      .unwrap();

    assert_eq!(events.recv().await.unwrap(), BridgeEvent::PendingCountChanged(1));
    assert_eq!(bridge.pending_count(), 1);
  }

  #[tokio::test]
  async fn test_connectivity_transition_emits_once() {
    let bridge = bridge();
    let mut events = bridge.subscribe();

    bridge.set_online(true); // already online, no transition
    bridge.set_online(false);
    bridge.set_online(false); // repeat, no transition
    bridge.set_online(true);

    assert_eq!(events.recv().await.unwrap(), BridgeEvent::ConnectivityChanged(false));
    assert_eq!(events.recv().await.unwrap(), BridgeEvent::ConnectivityChanged(true));
    assert!(events.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_enqueue_without_store_reports_sync_unavailable() {
    let bridge = UiBridge::new(true, None, "contact-form");
    let mut events = bridge.subscribe();

    let result = bridge.enqueue_write(&url("https://example.com/api/contact"), "POST", None);
    assert!(result.is_err());
    assert_eq!(events.recv().await.unwrap(), BridgeEvent::SyncUnavailable);
  }

  #[tokio::test]
  async fn test_connectivity_watch_follows_transitions() {
    let bridge = bridge();
    let rx = bridge.connectivity();

    assert!(*rx.borrow());
    bridge.set_online(false);
    assert!(!*rx.borrow());
  }
}
