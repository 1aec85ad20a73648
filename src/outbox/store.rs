//! Durable FIFO of pending write operations.
//!
//! Each enqueue is a single-row INSERT, so concurrent foreground tabs can
//! append without a read-modify-write race over the whole collection. Items
//! leave the queue only on a confirmed 2xx or an explicit dead-letter.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use url::Url;

use crate::db::Database;

/// One queued write operation.
#[derive(Debug, Clone)]
pub struct OutboxItem {
  /// Client-generated token, assigned at creation and never reused. Doubles
  /// as the server-side idempotency key during replay.
  pub id: String,
  pub target_url: String,
  pub method: String,
  pub body: Option<Vec<u8>>,
  pub created_at: DateTime<Utc>,
  pub attempts: u32,
  pub last_error: Option<String>,
}

/// A write that was permanently rejected and removed from the queue.
#[derive(Debug, Clone)]
pub struct DeadLetter {
  pub id: String,
  pub target_url: String,
  pub method: String,
  pub attempts: u32,
  pub last_error: Option<String>,
  pub failed_at: DateTime<Utc>,
}

/// SQLite-backed outbox. Shared by all tabs of the origin; the store owns
/// item lifetime, callers only propose additions and observe counts.
#[derive(Clone)]
pub struct OutboxStore {
  db: Database,
}

impl OutboxStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  /// Append a write and return its id, persisted before returning.
  pub fn enqueue(&self, target_url: &Url, method: &str, body: Option<Vec<u8>>) -> Result<String> {
    let id = hex::encode(rand::random::<[u8; 16]>());
    let created_at = Utc::now().to_rfc3339();

    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT INTO outbox (id, url, method, body, created_at) VALUES (?, ?, ?, ?, ?)",
        params![id, target_url.as_str(), method.to_uppercase(), body, created_at],
      )
      .map_err(|e| eyre!("Failed to enqueue write to {}: {}", target_url, e))?;

    Ok(id)
  }

  /// All pending items in creation order. This ordering is the replay order.
  pub fn list_pending(&self) -> Result<Vec<OutboxItem>> {
    let conn = self.db.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, url, method, body, created_at, attempts, last_error
         FROM outbox ORDER BY rowid",
      )
      .map_err(|e| eyre!("Failed to prepare outbox query: {}", e))?;

    let items = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, Option<Vec<u8>>>(3)?,
          row.get::<_, String>(4)?,
          row.get::<_, u32>(5)?,
          row.get::<_, Option<String>>(6)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query outbox: {}", e))?
      .collect::<std::result::Result<Vec<_>, _>>()
      .map_err(|e| eyre!("Failed to read outbox row: {}", e))?;

    items
      .into_iter()
      .map(|(id, target_url, method, body, created_at, attempts, last_error)| {
        let created_at = parse_timestamp(&created_at)?;
        Ok(OutboxItem {
          id,
          target_url,
          method,
          body,
          created_at,
          attempts,
          last_error,
        })
      })
      .collect()
  }

  /// Number of items still waiting for replay.
  pub fn pending_count(&self) -> Result<usize> {
    let conn = self.db.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count outbox: {}", e))?;

    Ok(count as usize)
  }

  /// Remove a confirmed item. Removing a nonexistent id is a no-op.
  pub fn remove(&self, id: &str) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute("DELETE FROM outbox WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove outbox item {}: {}", id, e))?;

    Ok(())
  }

  /// Record a failed delivery attempt. Attempts only ever increase.
  pub fn mark_attempt(&self, id: &str, error: &str) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute(
        "UPDATE outbox SET attempts = attempts + 1, last_error = ? WHERE id = ?",
        params![error, id],
      )
      .map_err(|e| eyre!("Failed to mark attempt on {}: {}", id, e))?;

    Ok(())
  }

  /// Move a permanently rejected item out of the queue into the durable
  /// dead-letter record, atomically.
  pub fn dead_letter(&self, id: &str) -> Result<()> {
    let failed_at = Utc::now().to_rfc3339();

    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR REPLACE INTO dead_letters
         (id, url, method, body, created_at, attempts, last_error, failed_at)
       SELECT id, url, method, body, created_at, attempts, last_error, ?
       FROM outbox WHERE id = ?",
      params![failed_at, id],
    )
    .map_err(|e| eyre!("Failed to record dead letter {}: {}", id, e))?;
    tx.execute("DELETE FROM outbox WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove dead-lettered item {}: {}", id, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit dead letter: {}", e))
  }

  /// Permanently failed items, most recent first.
  pub fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
    let conn = self.db.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, url, method, attempts, last_error, failed_at
         FROM dead_letters ORDER BY rowid DESC",
      )
      .map_err(|e| eyre!("Failed to prepare dead-letter query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, u32>(3)?,
          row.get::<_, Option<String>>(4)?,
          row.get::<_, String>(5)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query dead letters: {}", e))?
      .collect::<std::result::Result<Vec<_>, _>>()
      .map_err(|e| eyre!("Failed to read dead-letter row: {}", e))?;

    rows
      .into_iter()
      .map(|(id, target_url, method, attempts, last_error, failed_at)| {
        let failed_at = parse_timestamp(&failed_at)?;
        Ok(DeadLetter {
          id,
          target_url,
          method,
          attempts,
          last_error,
          failed_at,
        })
      })
      .collect()
  }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse timestamp '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store() -> OutboxStore {
    OutboxStore::new(Database::open_in_memory().unwrap())
  }

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_enqueue_assigns_unique_ids() {
    let store = store();
    let a = store.enqueue(&url("https://example.com/api/contact"), "POST", None).unwrap();
    let b = store.enqueue(&url("https://example.com/api/contact"), "POST", None).unwrap();
    assert_ne!(a, b);
  }

  #[test]
  fn test_list_pending_is_fifo() {
    let store = store();
    let a = store.enqueue(&url("https://example.com/a"), "POST", None).unwrap();
    let b = store.enqueue(&url("https://example.com/b"), "PUT", None).unwrap();
    let c = store.enqueue(&url("https://example.com/c"), "POST", None).unwrap();

    let ids: Vec<String> = store.list_pending().unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![a, b, c]);
  }

  #[test]
  fn test_remove_is_idempotent() {
    let store = store();
    let id = store.enqueue(&url("https://example.com/a"), "POST", None).unwrap();

    store.remove(&id).unwrap();
    store.remove(&id).unwrap();
    store.remove("never-existed").unwrap();
    assert_eq!(store.pending_count().unwrap(), 0);
  }

  #[test]
  fn test_mark_attempt_increments_and_records_error() {
    let store = store();
    let id = store.enqueue(&url("https://example.com/a"), "POST", None).unwrap();

    store.mark_attempt(&id, "503 from upstream").unwrap();
    store.mark_attempt(&id, "timeout").unwrap();

    let item = &store.list_pending().unwrap()[0];
    assert_eq!(item.attempts, 2);
    assert_eq!(item.last_error.as_deref(), Some("timeout"));
  }

  #[test]
  fn test_dead_letter_moves_item_out_of_queue() {
    let store = store();
    let id = store
      .enqueue(&url("https://example.com/a"), "POST", Some(b"{}".to_vec()))
      .unwrap();
    store.mark_attempt(&id, "400 Bad Request").unwrap();

    store.dead_letter(&id).unwrap();

    assert_eq!(store.pending_count().unwrap(), 0);
    let dead = store.list_dead_letters().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, id);
    assert_eq!(dead[0].last_error.as_deref(), Some("400 Bad Request"));
  }

  #[test]
  fn test_contents_survive_reopen() {
    let path = std::env::temp_dir().join(format!(
      "outpost-outbox-test-{}.db",
      hex::encode(rand::random::<[u8; 8]>())
    ));

    {
      let store = OutboxStore::new(Database::open_at(&path).unwrap());
      store.enqueue(&url("https://example.com/a"), "POST", None).unwrap();
    }

    let reopened = OutboxStore::new(Database::open_at(&path).unwrap());
    assert_eq!(reopened.pending_count().unwrap(), 1);

    let _ = std::fs::remove_file(&path);
  }

  #[test]
  fn test_concurrent_enqueue_loses_nothing() {
    let store = store();
    let mut handles = Vec::new();

    for i in 0..8 {
      let store = store.clone();
      handles.push(std::thread::spawn(move || {
        for j in 0..5 {
          let target = Url::parse(&format!("https://example.com/api/{}/{}", i, j)).unwrap();
          store.enqueue(&target, "POST", None).unwrap();
        }
      }));
    }
    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(store.pending_count().unwrap(), 40);
  }
}
