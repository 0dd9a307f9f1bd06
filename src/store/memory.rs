//! Thread-safe in-memory [`KeyValueStore`] for tests, demos, and ephemeral sessions.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreBatch, StoreError},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// In-process backend; clones share the same map, which mimics a page reload reading the same
/// browser storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns a copy of every stored entry.
	pub fn snapshot(&self) -> HashMap<String, String> {
		self.0.read().clone()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn apply(&self, batch: StoreBatch) -> Result<(), StoreError> {
		batch.apply_to(&mut self.0.write());

		Ok(())
	}
}
