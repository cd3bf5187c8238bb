//! Bounded least-recently-used cache for domain classifications

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct Entry {
    value: String,
    tick: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Access order: oldest tick first
    order: BTreeMap<u64, String>,
    clock: u64,
}

impl Inner {
    fn touch(&mut self, key: &str) -> Option<String> {
        self.clock += 1;
        let tick = self.clock;
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, key.to_string());
        Some(entry.value.clone())
    }
}

/// Thread-safe LRU map from exact prompt text to domain name
///
/// Owned by the classifier rather than shared process-wide, so each router
/// (and each test) gets its own isolated cache.
#[derive(Debug)]
pub struct ClassificationCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ClassificationCache {
    /// Default number of cached prompts
    pub const DEFAULT_CAPACITY: usize = 5000;

    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-update can at worst leave a stale entry behind
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a prompt, marking it as most recently used
    pub fn get(&self, prompt: &str) -> Option<String> {
        self.lock().touch(prompt)
    }

    /// Store a classification, evicting the least recently used entry if full
    pub fn insert(&self, prompt: impl Into<String>, domain: impl Into<String>) {
        let prompt = prompt.into();
        let domain = domain.into();
        let mut inner = self.lock();

        inner.clock += 1;
        let tick = inner.clock;

        if let Some(old) = inner.entries.insert(
            prompt.clone(),
            Entry {
                value: domain,
                tick,
            },
        ) {
            inner.order.remove(&old.tick);
        }
        inner.order.insert(tick, prompt);

        while inner.entries.len() > self.capacity {
            let Some((_, oldest)) = inner.order.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    /// Number of cached prompts
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
