use std::{
	collections::hash_map::DefaultHasher,
	hash::{Hash, Hasher}
};

pub type Digest = u64;

/// Identifier space of the ring: integers modulo 2^bits.
/// Nodes and keys hash into the same space with the same function,
/// so every node agrees on placement.
#[derive(Clone, Copy, Debug)]
pub struct Keyspace {
	bits: u32
}

impl Default for Keyspace {
	fn default() -> Self {
		Keyspace { bits: Keyspace::MAX_BITS }
	}
}

impl Keyspace {
	pub const MAX_BITS: u32 = (std::mem::size_of::<Digest>() * 8) as u32;

	pub fn new(bits: u32) -> Self {
		assert!(bits >= 1 && bits <= Self::MAX_BITS, "keyspace bits out of range");
		Keyspace { bits }
	}

	pub fn bits(&self) -> u32 {
		self.bits
	}

	pub fn mask(&self) -> Digest {
		if self.bits == Self::MAX_BITS {
			Digest::MAX
		} else {
			(1 << self.bits) - 1
		}
	}

	pub fn hash(&self, data: &[u8]) -> Digest {
		let mut hasher = DefaultHasher::new();
		data.hash(&mut hasher);
		hasher.finish() & self.mask()
	}

	// Start field of finger k: (id + 2^k) mod 2^bits (see Table 1)
	// k in [0, bits)
	pub fn finger_start(&self, id: Digest, k: u32) -> Digest {
		debug_assert!(k < self.bits);
		id.wrapping_add(1 << k) & self.mask()
	}
}

// Strictly in range: id in (start, end)
pub fn in_range(id: Digest, start: Digest, end: Digest) -> bool {
	if end > start {
		// (start, id, end)
		id > start && id < end
	}
	else {
		// end <= start
		// case 1: (start, id, end + MAX_VAL)
		// case 2: (start, id + MAX_VAL, end + MAX_VAL)
		id > start || id < end
	}
}

// Ownership range: id in (start, end]
// (n, n] covers the whole space, so a sole node owns every key
pub fn in_range_inc(id: Digest, start: Digest, end: Digest) -> bool {
	in_range(id, start, end) || id == end
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_in_range() {
		assert!(in_range(5, 0, 10));
		assert!(!in_range(0, 0, 10));
		assert!(!in_range(10, 0, 10));
		// wrap-around
		assert!(in_range(31, 30, 2));
		assert!(in_range(1, 30, 2));
		assert!(!in_range(2, 30, 2));
		assert!(!in_range(15, 30, 2));
		// empty open interval around a single point
		assert!(in_range(5, 10, 10));
		assert!(!in_range(10, 10, 10));
	}

	#[test]
	fn test_in_range_inc() {
		assert!(in_range_inc(10, 0, 10));
		assert!(!in_range_inc(0, 0, 10));
		assert!(in_range_inc(2, 30, 2));
		// sole node owns everything, including its own id
		assert!(in_range_inc(10, 10, 10));
		assert!(in_range_inc(0, 10, 10));
	}

	#[test]
	fn test_mask_and_hash() {
		let ks = Keyspace::new(5);
		assert_eq!(ks.mask(), 31);
		for key in [b"a".as_slice(), b"hello", b"chord"] {
			assert!(ks.hash(key) < 32);
			// deterministic
			assert_eq!(ks.hash(key), ks.hash(key));
		}

		let full = Keyspace::default();
		assert_eq!(full.mask(), u64::MAX);
	}

	#[test]
	fn test_finger_start() {
		let ks = Keyspace::new(5);
		assert_eq!(ks.finger_start(0, 0), 1);
		assert_eq!(ks.finger_start(0, 4), 16);
		assert_eq!(ks.finger_start(20, 4), 4);
		// wraps modulo 2^bits
		assert_eq!(ks.finger_start(30, 2), 2);
	}
}
