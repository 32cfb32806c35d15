//! Owner of the configuration document.
//!
//! Readers take an `Arc<Configuration>` snapshot that never changes under
//! them. Writers are serialized by a single mutex: each mutation clones the
//! current document, applies the change, persists it and only then publishes
//! the new snapshot. A failed write leaves both the file and the in-memory
//! state as they were.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use tracing::{debug, info, warn};

use crate::{domain::UserId, errors::Error, model::Configuration, Result};

pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Configuration>>,
    writer: Mutex<()>,
}

impl ConfigStore {
    /// Load the document at `path` (falling back to defaults) and own it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cfg = load(&path);
        Self::with_config(path, cfg)
    }

    pub fn with_config(path: impl Into<PathBuf>, cfg: Configuration) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Arc::new(cfg)),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consistent snapshot of the current document.
    pub fn get(&self) -> Arc<Configuration> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f` to a copy of the document, persist it, then publish it.
    ///
    /// If `f` returns an error nothing is written.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut Configuration) -> Result<T>) -> Result<T> {
        let guard = self.lock_writer();
        let mut next = (*self.get()).clone();
        let out = f(&mut next)?;
        self.commit(&guard, next)?;
        Ok(out)
    }

    /// Record a user as a broadcast recipient.
    ///
    /// Returns `Ok(true)` when the user was new (and the document was saved).
    pub fn add_subscriber(&self, user_id: UserId) -> Result<bool> {
        if self.get().subscribers.contains(&user_id) {
            return Ok(false);
        }

        let guard = self.lock_writer();
        // Re-check under the writer lock: another task may have won the race.
        let current = self.get();
        if current.subscribers.contains(&user_id) {
            return Ok(false);
        }
        let mut next = (*current).clone();
        next.subscribers.insert(user_id);
        self.commit(&guard, next)?;
        debug!(user_id = user_id.0, "new subscriber recorded");
        Ok(true)
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, _writer: &MutexGuard<'_, ()>, next: Configuration) -> Result<()> {
        save(&self.path, &next)?;
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(next);
        Ok(())
    }
}

/// Read the document, substituting defaults when it is absent or unusable.
pub fn load(path: &Path) -> Configuration {
    match try_load(path) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            info!(path = %path.display(), "no config file found, using defaults");
            Configuration::default()
        }
        Err(e) => {
            warn!("{e}; using defaults");
            Configuration::default()
        }
    }
}

pub fn try_load(path: &Path) -> Result<Option<Configuration>> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = fs::read_to_string(path).map_err(|source| Error::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    let cfg = serde_json::from_str(&txt).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(cfg))
}

/// Write the document through a sibling temp file and rename it into place.
pub fn save(path: &Path, cfg: &Configuration) -> Result<()> {
    let txt = serde_json::to_string_pretty(cfg)?;
    let tmp = temp_path(path);
    let io_err = |source| Error::ConfigIo {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, txt).map_err(io_err)?;
    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(source));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "config".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{ChannelDef, CommandDef, TOKEN_PLACEHOLDER},
        testing::tmp_path as tmp_file,
    };

    #[test]
    fn missing_file_yields_defaults() {
        let path = tmp_file("tbb-store-missing");
        let store = ConfigStore::open(&path);
        assert_eq!(*store.get(), Configuration::default());
        assert!(!path.exists());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let path = tmp_file("tbb-store-malformed");
        fs::write(&path, "{ \"token\": ").unwrap();
        let cfg = load(&path);
        assert_eq!(cfg.token, TOKEN_PLACEHOLDER);
        assert!(cfg.commands.is_empty());
        assert!(matches!(try_load(&path), Err(Error::ConfigParse { .. })));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn round_trips_non_ascii_content() {
        let path = tmp_file("tbb-store-roundtrip");
        let store = ConfigStore::open(&path);
        store
            .mutate(|cfg| {
                cfg.token = "123:abc".to_string();
                cfg.commands
                    .insert("hello".to_string(), CommandDef::text("Привет, мир 👋"));
                cfg.channels.insert(
                    "-1005".to_string(),
                    ChannelDef {
                        name: "Новости".to_string(),
                        id: "-1005".to_string(),
                        username: Some("novosti".to_string()),
                    },
                );
                Ok(())
            })
            .unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Привет, мир 👋"));

        let reloaded = ConfigStore::open(&path);
        assert_eq!(*reloaded.get(), *store.get());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn subscriber_append_is_idempotent() {
        let path = tmp_file("tbb-store-subs");
        let store = ConfigStore::open(&path);
        assert!(store.add_subscriber(UserId(7)).unwrap());
        assert!(!store.add_subscriber(UserId(7)).unwrap());
        assert_eq!(store.get().subscribers.len(), 1);
        assert_eq!(load(&path).subscribers.len(), 1);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn rejected_mutation_writes_nothing() {
        let path = tmp_file("tbb-store-reject");
        let store = ConfigStore::open(&path);
        let res: Result<()> = store.mutate(|cfg| {
            cfg.token = "changed".to_string();
            Err(Error::Validation("nope".to_string()))
        });
        assert!(matches!(res, Err(Error::Validation(_))));
        assert_eq!(store.get().token, TOKEN_PLACEHOLDER);
        assert!(!path.exists());
    }

    #[test]
    fn failed_write_keeps_previous_snapshot() {
        let path = PathBuf::from(format!(
            "/tmp/tbb-no-such-dir-{}/cfg.json",
            std::process::id()
        ));
        let store = ConfigStore::open(&path);
        let res = store.mutate(|cfg| {
            cfg.commands.insert("a".to_string(), CommandDef::text("x"));
            Ok(())
        });
        assert!(matches!(res, Err(Error::ConfigIo { .. })));
        assert!(store.get().commands.is_empty());
    }

    #[test]
    fn concurrent_additions_are_not_lost() {
        const N: usize = 32;
        let path = tmp_file("tbb-store-concurrent");
        let store = Arc::new(ConfigStore::open(&path));

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .mutate(|cfg| {
                            cfg.commands
                                .insert(format!("cmd{i}"), CommandDef::text(format!("reply {i}")));
                            Ok(())
                        })
                        .unwrap();
                    store.add_subscriber(UserId(i as i64 % 4)).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.get().commands.len(), N);
        assert_eq!(store.get().subscribers.len(), 4);
        assert_eq!(load(&path).commands.len(), N);
        let _ = fs::remove_file(&path);
    }
}
