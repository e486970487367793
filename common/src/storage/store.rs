use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::debug;

use crate::{
    error::AppError,
    storage::dataset::{load_dataset_async, Dataset},
    utils::config::AppConfig,
};

/// Hands out loaded datasets, optionally caching them per root.
///
/// A cached dataset is never served while an index build for the same root
/// is in flight, and a build's start and end both invalidate the root, so a
/// reader sees either the tables from before the build or the ones it wrote.
/// Loads that raced a build are returned to their caller but never cached.
#[derive(Clone, Debug)]
pub struct DatasetStore {
    caching: bool,
    state: Arc<Mutex<CacheState>>,
}

/// Generations come from one store-wide counter and are never reused, so a
/// slot that was removed and recreated cannot match an older snapshot.
#[derive(Debug, Default)]
struct CacheState {
    epoch: u64,
    /// Generation reported for roots without a slot. Raised whenever a slot
    /// is removed.
    floor: u64,
    slots: HashMap<PathBuf, CacheSlot>,
}

#[derive(Debug, Default)]
struct CacheSlot {
    generation: u64,
    builds_in_flight: usize,
    dataset: Option<Arc<Dataset>>,
}

impl CacheState {
    fn next_generation(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    fn generation(&self, key: &Path) -> u64 {
        self.slots.get(key).map_or(self.floor, |slot| slot.generation)
    }

    /// Bumps the generation of `key` and drops its tables. The slot itself
    /// goes away once no build holds it.
    fn invalidate(&mut self, key: &Path) {
        let generation = self.next_generation();
        if let Some(slot) = self
            .slots
            .get_mut(key)
            .filter(|slot| slot.builds_in_flight > 0)
        {
            slot.generation = generation;
            slot.dataset = None;
            return;
        }
        self.slots.remove(key);
        self.floor = generation;
    }
}

impl DatasetStore {
    pub fn new(caching: bool) -> Self {
        Self {
            caching,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.dataset_cache)
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads all tables below `root`, from the cache when allowed.
    pub async fn load(&self, root: &Path) -> Result<Arc<Dataset>, AppError> {
        if !self.caching {
            return Ok(Arc::new(load_dataset_async(root).await?));
        }

        let key = cache_key(root);
        let generation = match self.lookup(&key) {
            Ok(dataset) => {
                debug!(root = %key.display(), "Serving cached dataset");
                return Ok(dataset);
            }
            Err(generation) => generation,
        };

        let dataset = Arc::new(load_dataset_async(root).await?);
        self.store_if_current(key, generation, &dataset);
        Ok(dataset)
    }

    /// The cached tables for `key`, or the generation a fresh load must
    /// still observe before it may fill the cache.
    fn lookup(&self, key: &Path) -> Result<Arc<Dataset>, u64> {
        let state = self.state();
        match state.slots.get(key) {
            Some(slot) if slot.builds_in_flight == 0 => {
                slot.dataset.as_ref().map(Arc::clone).ok_or(slot.generation)
            }
            _ => Err(state.generation(key)),
        }
    }

    fn store_if_current(&self, key: PathBuf, generation: u64, dataset: &Arc<Dataset>) -> bool {
        let mut state = self.state();
        if state.generation(&key) != generation {
            return false;
        }
        let slot = state.slots.entry(key).or_insert_with(|| CacheSlot {
            generation,
            ..CacheSlot::default()
        });
        if slot.builds_in_flight > 0 {
            return false;
        }
        slot.dataset = Some(Arc::clone(dataset));
        true
    }

    /// Drops any cached tables for `root`.
    pub fn invalidate(&self, root: &Path) {
        self.state().invalidate(&cache_key(root));
    }

    /// Marks `root` as being rebuilt until the returned guard is dropped.
    pub fn begin_build(&self, root: &Path) -> BuildGuard {
        let key = cache_key(root);
        {
            let mut state = self.state();
            let generation = state.next_generation();
            let slot = state.slots.entry(key.clone()).or_default();
            slot.builds_in_flight = slot.builds_in_flight.saturating_add(1);
            slot.generation = generation;
            slot.dataset = None;
        }
        debug!(root = %key.display(), "Index build started, cache invalidated");
        BuildGuard {
            store: self.clone(),
            root: key,
        }
    }

    pub fn is_cached(&self, root: &Path) -> bool {
        self.state()
            .slots
            .get(&cache_key(root))
            .is_some_and(|slot| slot.dataset.is_some())
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.state().slots.len()
    }
}

/// Ends a build on drop, including when the request is cancelled.
#[derive(Debug)]
pub struct BuildGuard {
    store: DatasetStore,
    root: PathBuf,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        {
            let mut state = self.store.state();
            if let Some(slot) = state.slots.get_mut(&self.root) {
                slot.builds_in_flight = slot.builds_in_flight.saturating_sub(1);
            }
        }
        self.store.invalidate(&self.root);
        debug!(root = %self.root.display(), "Index build finished, cache invalidated");
    }
}

// "./out" and "out" must share a slot.
fn cache_key(root: &Path) -> PathBuf {
    root.canonicalize()
        .or_else(|_| std::path::absolute(root))
        .unwrap_or_else(|_| root.to_path_buf())
}
