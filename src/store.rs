//! Key-value persistence contract and built-in backends for the persisted session.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Key names used for the persisted session. Values are always strings.
pub mod keys {
	/// Raw access token.
	pub const ACCESS_TOKEN: &str = "token";
	/// Raw refresh token.
	pub const REFRESH_TOKEN: &str = "refresh_token";
	/// Expiry instant as Unix epoch milliseconds.
	pub const EXPIRES_AT: &str = "expires_at";
	/// JSON-encoded session profile (username, company, roles).
	pub const USER: &str = "user";

	/// Every key owned by the session store.
	pub const ALL: [&str; 4] = [ACCESS_TOKEN, REFRESH_TOKEN, EXPIRES_AT, USER];
}

/// String key-value persistence backend (browser storage, a file, a keychain, ...).
///
/// [`apply`](KeyValueStore::apply) must commit the whole batch or nothing; the session store
/// relies on it so no reader ever observes half of a session.
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Reads a single value.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Applies every write and removal in `batch` atomically.
	fn apply(&self, batch: StoreBatch) -> Result<(), StoreError>;
}

/// Ordered set of writes (`Some`) and removals (`None`) applied as one unit.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StoreBatch(Vec<(String, Option<String>)>);
impl StoreBatch {
	/// Creates an empty batch.
	pub fn new() -> Self {
		Self::default()
	}

	/// Queues a write.
	pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.0.push((key.into(), Some(value.into())));

		self
	}

	/// Queues a removal.
	pub fn remove(mut self, key: impl Into<String>) -> Self {
		self.0.push((key.into(), None));

		self
	}

	/// Returns `true` when nothing is queued.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterates queued operations in insertion order.
	pub fn ops(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
		self.0.iter().map(|(key, value)| (key.as_str(), value.as_deref()))
	}

	pub(crate) fn apply_to(self, map: &mut HashMap<String, String>) {
		for (key, value) in self.0 {
			match value {
				Some(value) => {
					map.insert(key, value);
				},
				None => {
					map.remove(&key);
				},
			}
		}
	}
}
impl Debug for StoreBatch {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		// Values hold tokens; only keys are printed.
		f.debug_list()
			.entries(self.0.iter().map(|(key, value)| match value {
				Some(_) => format!("set {key}"),
				None => format!("remove {key}"),
			}))
			.finish()
	}
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "quota exceeded".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("quota exceeded"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn batch_applies_in_order_and_later_ops_win() {
		let mut map = HashMap::from([(keys::USER.to_owned(), "stale".to_owned())]);

		StoreBatch::new()
			.set(keys::ACCESS_TOKEN, "a-1")
			.remove(keys::USER)
			.set(keys::ACCESS_TOKEN, "a-2")
			.apply_to(&mut map);

		assert_eq!(map.get(keys::ACCESS_TOKEN).map(String::as_str), Some("a-2"));
		assert!(!map.contains_key(keys::USER));
	}

	#[test]
	fn batch_debug_hides_values() {
		let batch = StoreBatch::new().set(keys::ACCESS_TOKEN, "very-secret").remove(keys::USER);
		let rendered = format!("{batch:?}");

		assert!(!rendered.contains("very-secret"));
		assert!(rendered.contains("set token"));
		assert!(rendered.contains("remove user"));
	}
}
