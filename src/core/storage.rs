use std::{
	collections::HashMap,
	sync::{Arc, RwLock}
};
use super::keyspace::{Keyspace, Digest, in_range_inc};

pub type Key = Vec<u8>;
pub type Value = Vec<u8>;

/// Thread-safe key-value store of a single node.
/// All entries live in memory for the node's lifetime only.
#[derive(Clone)]
pub struct Storage {
	keyspace: Keyspace,
	data: Arc<RwLock<HashMap<Key, Value>>>
}

impl Storage {
	pub fn new(keyspace: Keyspace) -> Self {
		Storage {
			keyspace,
			data: Arc::new(RwLock::new(HashMap::new()))
		}
	}

	pub fn get(&self, key: &Key) -> Option<Value> {
		self.data.read().unwrap().get(key).cloned()
	}

	/// Insert or update
	pub fn add(&self, key: Key, value: Value) {
		self.data.write().unwrap().insert(key, value);
	}

	/// Removing a missing key is a no-op (returns false),
	/// so retried removals and re-requested handovers stay idempotent.
	pub fn remove(&self, key: &Key) -> bool {
		self.data.write().unwrap().remove(key).is_some()
	}

	pub fn values(&self) -> Vec<Value> {
		self.data.read().unwrap().values().cloned().collect()
	}

	pub fn entries(&self) -> Vec<(Key, Value)> {
		self.data.read().unwrap()
			.iter()
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect()
	}

	pub fn len(&self) -> usize {
		self.data.read().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.read().unwrap().is_empty()
	}

	pub fn clear(&self) {
		self.data.write().unwrap().clear();
	}

	/// Install entries received from a neighbor during handover
	pub fn install(&self, entries: HashMap<Key, Value>) {
		let mut data = self.data.write().unwrap();
		for (k, v) in entries {
			data.insert(k, v);
		}
	}

	/// Remove and return every entry whose key hashes into (start, end].
	/// Runs under a single write lock: a key is never visible on both
	/// sides of a handover, and draining the same range twice yields
	/// an empty map.
	pub fn take_range(&self, start: Digest, end: Digest) -> HashMap<Key, Value> {
		let mut data = self.data.write().unwrap();
		let keys: Vec<Key> = data.keys()
			.filter(|k| in_range_inc(self.keyspace.hash(k.as_slice()), start, end))
			.cloned()
			.collect();

		let mut moved = HashMap::new();
		for k in keys {
			if let Some(v) = data.remove(&k) {
				moved.insert(k, v);
			}
		}
		moved
	}
}
