//! Token store over an abstract key-value storage backend
//!
//! The store is the single shared mutable resource of the auth layer. It
//! keeps the credential pair in memory behind a tokio Mutex and writes
//! through a pluggable `Storage` backend using four fixed keys. The pair is
//! always written and cleared as one unit; partial updates do not exist.
//!
//! Every mutation publishes a snapshot on a watch channel so the session
//! layer can re-derive its state, including mutations made by another
//! browsing context and signalled through `reload()`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::pair::CredentialPair;

/// Storage key for the access token string.
pub const KEY_ACCESS_TOKEN: &str = "access_token";
/// Storage key for the refresh token string.
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
/// Storage key for the access token expiry (unix ms, decimal string).
pub const KEY_ACCESS_EXPIRES_AT: &str = "access_token_expires_at";
/// Storage key for the refresh token expiry (unix ms, decimal string).
pub const KEY_REFRESH_EXPIRES_AT: &str = "refresh_token_expires_at";

const ALL_KEYS: [&str; 4] = [
    KEY_ACCESS_TOKEN,
    KEY_REFRESH_TOKEN,
    KEY_ACCESS_EXPIRES_AT,
    KEY_REFRESH_EXPIRES_AT,
];

/// Abstract persisted key-value storage (get/set/remove).
///
/// Implementations only need per-key semantics; the one-unit guarantee for
/// the credential pair is enforced above this trait by `TokenStore`, which
/// holds its own lock across a full pair write or clear.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory storage backend for tests and embedding.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// File-backed storage: one JSON object holding all keys.
///
/// All writes use atomic temp-file + rename to prevent corruption on crash,
/// and the file is chmod 0600 since it contains bearer tokens.
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Load storage from the given file path, creating an empty file if it
    /// doesn't exist yet.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Storage(format!("reading storage file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing storage file: {e}")))?;
            debug!(path = %path.display(), entries = entries.len(), "loaded storage file");
            entries
        } else {
            info!(path = %path.display(), "storage file not found, starting empty");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        write_atomic(&self.path, &entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            write_atomic(&self.path, &entries).await?;
        }
        Ok(())
    }
}

/// Write the storage map to a file atomically (temp file + rename, 0600).
async fn write_atomic(path: &Path, entries: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| Error::Parse(format!("serializing storage: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage("storage path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp storage file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting storage file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp storage file: {e}")))?;

    Ok(())
}

/// Thread-safe holder of the credential pair.
///
/// Reads clone the in-memory snapshot; writes go through the backend and
/// then publish on the watch channel, so a subscriber never observes the
/// channel ahead of the backend.
pub struct TokenStore {
    storage: Arc<dyn Storage>,
    state: Mutex<Option<CredentialPair>>,
    watch_tx: watch::Sender<Option<CredentialPair>>,
}

impl TokenStore {
    /// Build a store from a backend, reading any persisted pair.
    ///
    /// A pair exists if the access token key is present. Missing expiry
    /// entries parse as zero (never-expiring), matching the storage layout
    /// in §6 of the data model.
    pub async fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        let pair = read_pair(storage.as_ref()).await?;
        if pair.is_some() {
            info!("token store loaded with persisted credentials");
        } else {
            debug!("token store loaded empty");
        }
        let (watch_tx, _) = watch::channel(pair.clone());
        Ok(Self {
            storage,
            state: Mutex::new(pair),
            watch_tx,
        })
    }

    /// Snapshot of the current pair.
    pub async fn pair(&self) -> Option<CredentialPair> {
        self.state.lock().await.clone()
    }

    /// Replace the stored pair with a new one (login or refresh result).
    ///
    /// The whole pair is written before the watch channel is updated, so a
    /// reader woken by the channel sees the new tokens.
    pub async fn replace(&self, pair: CredentialPair) -> Result<()> {
        let mut state = self.state.lock().await;
        self.storage
            .set(KEY_ACCESS_TOKEN, pair.access_token.clone())
            .await?;
        self.storage
            .set(KEY_REFRESH_TOKEN, pair.refresh_token.clone())
            .await?;
        self.storage
            .set(KEY_ACCESS_EXPIRES_AT, pair.access_expires_at.to_string())
            .await?;
        self.storage
            .set(KEY_REFRESH_EXPIRES_AT, pair.refresh_expires_at.to_string())
            .await?;
        *state = Some(pair.clone());
        debug!("credential pair replaced");
        let _ = self.watch_tx.send(Some(pair));
        Ok(())
    }

    /// Erase the pair from memory and storage.
    ///
    /// Returns whether anything was actually cleared. Callers use this to
    /// emit forced-logout notifications at most once when several requests
    /// hit an unrecoverable failure from the same refresh chain.
    pub async fn clear(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let had_pair = state.is_some();
        for key in ALL_KEYS {
            self.storage.remove(key).await?;
        }
        *state = None;
        if had_pair {
            info!("credential pair cleared");
            let _ = self.watch_tx.send(None);
        }
        Ok(had_pair)
    }

    /// Re-read the backend after an external mutation (another browsing
    /// context wrote or cleared the tokens) and publish the new snapshot.
    /// No network call is involved.
    pub async fn reload(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let pair = read_pair(self.storage.as_ref()).await?;
        debug!(present = pair.is_some(), "token store reloaded from backend");
        *state = pair.clone();
        let _ = self.watch_tx.send(pair);
        Ok(())
    }

    /// Subscribe to pair snapshots. The receiver sees the value at
    /// subscription time plus every subsequent mutation.
    pub fn subscribe(&self) -> watch::Receiver<Option<CredentialPair>> {
        self.watch_tx.subscribe()
    }
}

async fn read_pair(storage: &dyn Storage) -> Result<Option<CredentialPair>> {
    let access_token = match storage.get(KEY_ACCESS_TOKEN).await? {
        Some(token) => token,
        None => return Ok(None),
    };
    let refresh_token = storage.get(KEY_REFRESH_TOKEN).await?.unwrap_or_default();
    let access_expires_at = parse_millis(storage.get(KEY_ACCESS_EXPIRES_AT).await?);
    let refresh_expires_at = parse_millis(storage.get(KEY_REFRESH_EXPIRES_AT).await?);
    Ok(Some(CredentialPair {
        access_token,
        refresh_token,
        access_expires_at,
        refresh_expires_at,
    }))
}

fn parse_millis(value: Option<String>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}
