/// Local image registry
///
/// The ordered list of uploaded image URLs, persisted as a JSON array under a
/// single key. Every mutation is written to the store before it is applied to
/// the in-memory list, so the two never diverge.
use tracing::{error, info, warn};

use super::store::{KeyValueStore, StoreResult};

/// Key under which the registry is stored
pub const REGISTRY_KEY: &str = "images";

pub struct ImageRegistry {
    store: Box<dyn KeyValueStore>,
    urls: Vec<String>,
}

impl ImageRegistry {
    /// Load the registry from `store`.
    ///
    /// An absent value yields an empty registry. A read error or a value that
    /// is not a JSON array of strings is logged and also yields an empty
    /// registry; the stored value is left untouched until the next mutation.
    pub fn load(store: Box<dyn KeyValueStore>) -> Self {
        let urls = match read_urls(store.as_ref()) {
            Ok(urls) => urls,
            Err(e) => {
                warn!("Could not load image registry, starting empty: {}", e);
                Vec::new()
            }
        };

        info!("🖼️  Image registry loaded with {} entries", urls.len());

        Self { store, urls }
    }

    /// The current sequence, in upload order
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Append a URL and persist the new sequence
    pub fn append(&mut self, url: String) -> StoreResult<()> {
        let mut updated = self.urls.clone();
        updated.push(url);
        self.commit(updated)
    }

    /// Remove the entry at `index` and persist the new sequence.
    ///
    /// Returns the removed URL, or `None` if `index` is out of bounds (in which
    /// case nothing is written).
    pub fn remove_at(&mut self, index: usize) -> StoreResult<Option<String>> {
        if index >= self.urls.len() {
            return Ok(None);
        }
        let mut updated = self.urls.clone();
        let removed = updated.remove(index);
        self.commit(updated)?;
        Ok(Some(removed))
    }

    /// Read-only access to the backing store
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    fn commit(&mut self, updated: Vec<String>) -> StoreResult<()> {
        let json = serde_json::to_string(&updated)?;
        if let Err(e) = self.store.set(REGISTRY_KEY, &json) {
            error!("Failed to persist image registry: {}", e);
            return Err(e);
        }
        self.urls = updated;
        Ok(())
    }
}

impl std::fmt::Debug for ImageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRegistry")
            .field("urls", &self.urls)
            .finish()
    }
}

/// Read and decode the stored sequence; `Ok(vec![])` when nothing is stored
pub fn read_urls(store: &dyn KeyValueStore) -> StoreResult<Vec<String>> {
    match store.get(REGISTRY_KEY)? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}
