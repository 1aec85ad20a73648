//! Named, versioned response store backing the cache policy engine.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;

use crate::db::Database;
use crate::net::FetchResponse;

/// Identifier of one cache generation.
///
/// Exactly one generation is current at a time; the value is threaded
/// through every bucket call rather than living in a module constant so
/// that two generations can coexist during rollover.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheGeneration(String);

impl CacheGeneration {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn name(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for CacheGeneration {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// A stored response snapshot.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub request_key: String,
  pub url: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub stored_at: DateTime<Utc>,
  pub generation: CacheGeneration,
}

impl CachedEntry {
  /// Rehydrate the snapshot into a servable response.
  pub fn into_response(self) -> FetchResponse {
    FetchResponse::new(self.status, self.headers, self.body)
  }
}

/// Store of all cache generations for this origin.
#[derive(Clone)]
pub struct BucketStore {
  db: Database,
}

impl BucketStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  /// Open a bucket for one generation, registering the generation name.
  ///
  /// Registration happens even before the first entry is written so that
  /// garbage collection sees empty generations too.
  pub fn open(&self, generation: &CacheGeneration) -> Result<Bucket> {
    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
        params![generation.name()],
      )
      .map_err(|e| eyre!("Failed to register generation {}: {}", generation, e))?;
    drop(conn);

    Ok(Bucket {
      db: self.db.clone(),
      generation: generation.clone(),
    })
  }

  /// All known generation names, oldest first.
  pub fn list_generation_names(&self) -> Result<Vec<String>> {
    let conn = self.db.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare generation query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .collect::<std::result::Result<Vec<String>, _>>()
      .map_err(|e| eyre!("Failed to read generation row: {}", e))?;

    Ok(names)
  }

  /// Delete a generation and every entry stored under it.
  ///
  /// Once a generation is deleted its entries are unreachable; `get` is
  /// always scoped by generation.
  pub fn delete_generation(&self, name: &str) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE generation = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of generation {}: {}", name, e))?;
    tx.execute("DELETE FROM cache_generations WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete generation {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit generation delete: {}", e))
  }
}

/// Per-generation view over the entry table.
#[derive(Clone)]
pub struct Bucket {
  db: Database,
  generation: CacheGeneration,
}

impl Bucket {
  pub fn generation(&self) -> &CacheGeneration {
    &self.generation
  }

  /// Look up a stored snapshot by request fingerprint.
  pub fn get(&self, request_key: &str) -> Result<Option<CachedEntry>> {
    let conn = self.db.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT url, status, headers, body, stored_at FROM cache_entries
         WHERE generation = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare entry query: {}", e))?;

    let row: Option<(String, u16, String, Vec<u8>, String)> = stmt
      .query_row(params![self.generation.name(), request_key], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
        ))
      })
      .ok();

    match row {
      Some((url, status, headers_json, body, stored_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)
          .map_err(|e| eyre!("Failed to parse stored headers: {}", e))?;
        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
          .map_err(|e| eyre!("Failed to parse stored_at '{}': {}", stored_at, e))?
          .with_timezone(&Utc);

        Ok(Some(CachedEntry {
          request_key: request_key.to_string(),
          url,
          status,
          headers,
          body,
          stored_at,
          generation: self.generation.clone(),
        }))
      }
      None => Ok(None),
    }
  }

  /// Store a snapshot, overwriting any existing entry for the key.
  ///
  /// Last-write-wins; the entry is stamped with this bucket's generation.
  pub fn put(&self, request_key: &str, url: &str, response: &FetchResponse) -> Result<()> {
    let headers_json = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
    let stored_at = Utc::now().to_rfc3339();

    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (generation, request_key, url, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          self.generation.name(),
          request_key,
          url,
          response.status,
          headers_json,
          response.body,
          stored_at
        ],
      )
      .map_err(|e| eyre!("Failed to store entry for {}: {}", url, e))?;

    Ok(())
  }

  /// Remove one entry. Removing a missing key is a no-op.
  pub fn delete(&self, request_key: &str) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute(
        "DELETE FROM cache_entries WHERE generation = ? AND request_key = ?",
        params![self.generation.name(), request_key],
      )
      .map_err(|e| eyre!("Failed to delete entry: {}", e))?;

    Ok(())
  }
}
