use super::{
	keyspace::{Keyspace, Digest, in_range},
	node::Node
};

/// Routing shortcuts: entry k points at the first live node at or
/// after (id + 2^k) mod 2^bits.
///
/// The table is rebuilt wholesale from a full membership snapshot
/// rather than fixed one finger at a time from a partial view.
/// Staleness is therefore bounded by the snapshot refresh interval.
#[derive(Clone)]
pub struct FingerTable {
	keyspace: Keyspace,
	entries: Vec<Node>
}

impl FingerTable {
	pub fn new(keyspace: Keyspace, node: Node) -> Self {
		// a lone node points every entry at itself
		// (second part of n.join in Figure 6)
		let entries = vec![node; keyspace.bits() as usize];
		FingerTable { keyspace, entries }
	}

	pub fn entries(&self) -> &[Node] {
		&self.entries
	}

	/// Recompute every entry from the full node list.
	pub fn rebuild(&mut self, own: &Node, nodes: &[Node]) {
		let mut members: Vec<Node> = nodes.to_vec();
		members.sort_by_key(|n| n.id);
		members.dedup_by_key(|n| n.id);
		if members.is_empty() {
			members.push(own.clone());
		}

		for k in 0..self.keyspace.bits() {
			let start = self.keyspace.finger_start(own.id, k);
			let target = members.iter()
				.find(|n| n.id >= start)
				// wrap around to the smallest identifier
				.unwrap_or(&members[0]);
			self.entries[k as usize] = target.clone();
		}
	}

	/// Fingers strictly inside (own, id), furthest-reaching first.
	/// All qualifying entries are kept so the router can fall back
	/// past an unreachable one. (Figure 4: n.closest_preceding_finger)
	pub fn preceding_candidates(&self, own: Digest, id: Digest) -> Vec<Node> {
		let mut candidates: Vec<Node> = Vec::new();
		for f in self.entries.iter().rev() {
			if !in_range(f.id, own, id) {
				continue;
			}
			if candidates.iter().any(|c| c.id == f.id) {
				continue;
			}
			candidates.push(f.clone());
		}
		candidates
	}
}
