use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use futures_util::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{MazeStatePatch, PersistedMazeState};

const STORE_FILE_VERSION: u8 = 1;

pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, StoreError>>;

/// Per-user maze persistence keyed by user id, gated by a bearer credential.
pub trait MazeStore: Send + Sync {
    fn load<'a>(&'a self, user_id: &'a str, credential: &'a str)
        -> StoreFuture<'a, PersistedMazeState>;

    /// Full patches replace the record; position-only patches need one to exist.
    fn save<'a>(
        &'a self,
        user_id: &'a str,
        credential: &'a str,
        patch: MazeStatePatch,
    ) -> StoreFuture<'a, ()>;
}

fn check_credential(credential: &str) -> Result<(), StoreError> {
    if credential.trim().is_empty() {
        return Err(StoreError::Unauthorized);
    }
    Ok(())
}

fn store_key(user_id: &str) -> String {
    user_id.trim().to_string()
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Transport("store lock poisoned".to_string()))
}

/// In-process store. Records every accepted write so callers can assert on
/// what reached the backend.
#[derive(Default)]
pub struct MemoryMazeStore {
    states: Mutex<HashMap<String, PersistedMazeState>>,
    writes: Mutex<Vec<(String, MazeStatePatch)>>,
    offline: AtomicBool,
}

impl MemoryMazeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(user_id: &str, state: PersistedMazeState) -> Self {
        let store = Self::new();
        if let Ok(mut states) = store.states.lock() {
            states.insert(store_key(user_id), state);
        }
        store
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(String, MazeStatePatch)> {
        self.writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }

    pub fn stored(&self, user_id: &str) -> Option<PersistedMazeState> {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(&store_key(user_id)).cloned())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("memory store offline".to_string()));
        }
        Ok(())
    }

    fn load_now(&self, user_id: &str, credential: &str) -> Result<PersistedMazeState, StoreError> {
        check_credential(credential)?;
        self.check_online()?;
        lock(&self.states)?
            .get(&store_key(user_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn save_now(
        &self,
        user_id: &str,
        credential: &str,
        patch: MazeStatePatch,
    ) -> Result<(), StoreError> {
        check_credential(credential)?;
        self.check_online()?;
        let key = store_key(user_id);
        let mut states = lock(&self.states)?;
        let merged = patch
            .clone()
            .apply_to(states.remove(&key))
            .ok_or(StoreError::NotFound)?;
        states.insert(key.clone(), merged);
        lock(&self.writes)?.push((key, patch));
        Ok(())
    }
}

impl MazeStore for MemoryMazeStore {
    fn load<'a>(
        &'a self,
        user_id: &'a str,
        credential: &'a str,
    ) -> StoreFuture<'a, PersistedMazeState> {
        future::ready(self.load_now(user_id, credential)).boxed()
    }

    fn save<'a>(
        &'a self,
        user_id: &'a str,
        credential: &'a str,
        patch: MazeStatePatch,
    ) -> StoreFuture<'a, ()> {
        future::ready(self.save_now(user_id, credential, patch)).boxed()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredMaze {
    #[serde(rename = "mazeState", alias = "maze_state")]
    maze_state: PersistedMazeState,
    #[serde(rename = "updatedAtMs", alias = "updated_at_ms")]
    updated_at_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
struct MazeStoreFile<'a> {
    version: u8,
    #[serde(rename = "savedAt")]
    saved_at: String,
    users: &'a HashMap<String, StoredMaze>,
}

#[derive(Clone, Debug, Deserialize)]
struct MazeStoreFileRaw {
    version: u8,
    users: HashMap<String, serde_json::Value>,
}

/// Single JSON document holding every user's maze. The whole file is rewritten
/// on each save.
pub struct FileMazeStore {
    file_path: PathBuf,
    users: Mutex<HashMap<String, StoredMaze>>,
}

impl FileMazeStore {
    pub fn new(file_path: PathBuf) -> Self {
        let users = load_users(&file_path);
        tracing::info!(
            path = %file_path.display(),
            users = users.len(),
            "maze store opened"
        );
        Self {
            file_path,
            users: Mutex::new(users),
        }
    }

    fn load_now(&self, user_id: &str, credential: &str) -> Result<PersistedMazeState, StoreError> {
        check_credential(credential)?;
        lock(&self.users)?
            .get(&store_key(user_id))
            .map(|entry| entry.maze_state.clone())
            .ok_or(StoreError::NotFound)
    }

    fn save_now(
        &self,
        user_id: &str,
        credential: &str,
        patch: MazeStatePatch,
    ) -> Result<(), StoreError> {
        check_credential(credential)?;
        let key = store_key(user_id);
        let mut users = lock(&self.users)?;
        let current = users.get(&key).map(|entry| entry.maze_state.clone());
        let merged = patch.apply_to(current).ok_or(StoreError::NotFound)?;
        // Memory only moves forward once the document is on disk.
        let mut next = users.clone();
        next.insert(
            key,
            StoredMaze {
                maze_state: merged,
                updated_at_ms: now_ms(),
            },
        );
        self.write_file(&next)?;
        *users = next;
        Ok(())
    }

    fn write_file(&self, users: &HashMap<String, StoredMaze>) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                tracing::warn!(path = %parent.display(), %error, "failed to create store dir");
                StoreError::Transport(error.to_string())
            })?;
        }

        let payload = MazeStoreFile {
            version: STORE_FILE_VERSION,
            saved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            users,
        };
        let text = serde_json::to_string_pretty(&payload).map_err(|error| {
            tracing::warn!(path = %self.file_path.display(), %error, "failed to serialize store");
            StoreError::Transport(error.to_string())
        })?;
        fs::write(&self.file_path, text).map_err(|error| {
            tracing::warn!(path = %self.file_path.display(), %error, "failed to write store");
            StoreError::Transport(error.to_string())
        })
    }
}

impl MazeStore for FileMazeStore {
    fn load<'a>(
        &'a self,
        user_id: &'a str,
        credential: &'a str,
    ) -> StoreFuture<'a, PersistedMazeState> {
        future::ready(self.load_now(user_id, credential)).boxed()
    }

    fn save<'a>(
        &'a self,
        user_id: &'a str,
        credential: &'a str,
        patch: MazeStatePatch,
    ) -> StoreFuture<'a, ()> {
        future::ready(self.save_now(user_id, credential, patch)).boxed()
    }
}

fn load_users(path: &Path) -> HashMap<String, StoredMaze> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), %error, "failed to read maze store");
            }
            return HashMap::new();
        }
    };
    let parsed = match serde_json::from_str::<MazeStoreFileRaw>(&text) {
        Ok(value) if value.version == STORE_FILE_VERSION => value,
        Ok(value) => {
            tracing::warn!(
                path = %path.display(),
                version = value.version,
                "unsupported maze store version"
            );
            return HashMap::new();
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to parse maze store");
            return HashMap::new();
        }
    };

    let mut sanitized = HashMap::new();
    for (user_id, raw_value) in parsed.users {
        let entry: StoredMaze = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(user_id = %user_id, %error, "skipping unreadable maze entry");
                continue;
            }
        };
        let key = store_key(&user_id);
        if key.is_empty() || !is_well_shaped(&entry.maze_state) {
            tracing::warn!(user_id = %user_id, "skipping malformed maze entry");
            continue;
        }
        sanitized.insert(key, entry);
    }
    sanitized
}

/// All three grids are square and agree on their side length.
fn is_well_shaped(state: &PersistedMazeState) -> bool {
    let size = state.maze.size();
    size > 0
        && state.maze.is_square_of(size)
        && state.visible_maze.is_square_of(size)
        && state.fog_groups.is_square_of(size)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
