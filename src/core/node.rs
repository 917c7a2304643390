use std::{
	collections::HashMap,
	sync::{Arc, RwLock}
};
use tarpc::{
	context,
	tokio_serde::formats::Bincode,
	server::Channel,
	serde::Serialize,
	serde::Deserialize
};
use futures::{future, prelude::*};
use log::{info, warn, debug, error};
use super::{
	keyspace::*,
	finger::FingerTable,
	storage::*,
	config::*,
	error::{
		*,
		DhtError::*
	}
};
use crate::{rpc::*, server::ServerHandle};

// Data part of the node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
	pub id: Digest,
	pub addr: String
}

impl std::fmt::Display for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Node({}, {})", self.id, self.addr)
	}
}

#[derive(Clone)]
pub struct NodeServer {
	node: Node,
	store: Storage,
	config: Config,
	keyspace: Keyspace,
	// always set; a lone node is its own successor
	successor: Arc<RwLock<Node>>,
	// None transiently after the predecessor dies
	predecessor: Arc<RwLock<Option<Node>>>,
	fingers: Arc<RwLock<FingerTable>>,
	// connection to remote nodes
	connections: Arc<RwLock<HashMap<Digest, NodeServiceClient>>>
}

impl NodeServer {
	pub fn new(node: Node, config: Config) -> Self {
		let keyspace = config.keyspace();
		assert!(node.id <= keyspace.mask(), "node id outside the keyspace");

		// init a ring with only one node
		// (see second part of n.join in Figure 6)
		NodeServer {
			store: Storage::new(keyspace),
			successor: Arc::new(RwLock::new(node.clone())),
			predecessor: Arc::new(RwLock::new(Some(node.clone()))),
			fingers: Arc::new(RwLock::new(FingerTable::new(keyspace, node.clone()))),
			connections: Arc::new(RwLock::new(HashMap::new())),
			keyspace,
			config,
			node
		}
	}

	pub fn get_key(&self) -> Digest {
		self.node.id
	}

	pub fn keyspace(&self) -> Keyspace {
		self.keyspace
	}

	pub fn get_successor(&self) -> Node {
		self.successor.read().unwrap().clone()
	}

	pub fn set_successor(&self, node: Node) {
		*self.successor.write().unwrap() = node;
	}

	pub fn get_predecessor(&self) -> Option<Node> {
		self.predecessor.read().unwrap().clone()
	}

	pub fn set_predecessor(&self, node: Option<Node>) {
		*self.predecessor.write().unwrap() = node;
	}

	pub fn finger_entries(&self) -> Vec<Node> {
		self.fingers.read().unwrap().entries().to_vec()
	}

	pub fn update_fingers(&self, nodes: &[Node]) {
		self.fingers.write().unwrap().rebuild(&self.node, nodes);
	}

	/// Start the server
	/// Returns once the listener is up and the join (if any) completed
	pub async fn start(&mut self, join_node: Option<Node>) -> DhtResult<ServerHandle> {
		// channel used to shutdown (true means shutdown)
		let (tx, rx) = tokio::sync::watch::channel(false);

		// Listen locally first
		let mut listener = tarpc::serde_transport::tcp::listen(&self.node.addr, Bincode::default).await?;
		let server = self.clone();
		let mut listener_rx = rx.clone();
		// Listen for rpc calls
		let listener_handle = tokio::spawn(async move {
			listener.config_mut().max_frame_length(usize::MAX);
			let listener_fut = listener
				.filter_map(|r| future::ready(r.ok()))
				.map(tarpc::server::BaseChannel::with_defaults)
				.map(|channel| async {
					// Clone a new server to share the data in Arc
					channel.execute(server.clone().serve()).await;
				})
				.buffer_unordered(server.config.max_connections as usize)
				.for_each(|_| async {});

			debug!("{}: listening", server.node);

			tokio::select! {
				_ = listener_fut => {
					warn!("{}: listener terminated", server.node);
				},
				_ = listener_rx.changed() => {
					debug!("{}: listener stopped gracefully", server.node);
				}
			};
		});

		// Join after the listener starts
		if let Some(n) = join_node.as_ref() {
			if let Err(e) = self.join(n).await {
				return Err(JoinFailure {
					node: n.clone(),
					message: e.to_string()
				});
			}
		}

		// Periodically stabilize
		let mut server = self.clone();
		let mut stabilize_rx = rx.clone();
		let stabilize_interval = self.config.stabilize_interval;
		let stabilize_handle = tokio::spawn(async move {
			if stabilize_interval > 0 {
				let mut interval = tokio::time::interval(
					tokio::time::Duration::from_millis(stabilize_interval)
				);

				tokio::select! {
					_ = async {
						loop {
							interval.tick().await;
							server.stabilize().await;
						}
					} => (),
					_ = stabilize_rx.changed() => {
						debug!("{}: stabilize task stopped gracefully", server.node);
					}
				};
			}
		});

		// Periodically walk the ring and rebuild finger tables
		let mut server = self.clone();
		let mut refresh_rx = rx.clone();
		let refresh_interval = self.config.refresh_interval;
		let refresh_handle = tokio::spawn(async move {
			if refresh_interval > 0 {
				let mut interval = tokio::time::interval(
					tokio::time::Duration::from_millis(refresh_interval)
				);

				tokio::select! {
					_ = async {
						loop {
							interval.tick().await;
							server.refresh_fingers().await;
						}
					} => (),
					_ = refresh_rx.changed() => {
						debug!("{}: refresh task stopped gracefully", server.node);
					}
				};
			}
		});

		info!("{}: listening at {}", self.node, self.node.addr);
		// An aggregated handle for all tasks
		let joined_handle = future::join_all(vec![
			listener_handle,
			stabilize_handle,
			refresh_handle
		]);

		Ok(ServerHandle {
			handle: joined_handle,
			shutdown: tx
		})
	}

	async fn get_connection(&mut self, node: &Node) -> DhtResult<NodeServiceClient> {
		// Use block to drop map immediately after use
		{
			let map = self.connections.read().unwrap();
			if let Some(c) = map.get(&node.id) {
				// client can be cloned with low cost
				return Ok(c.clone());
			}
		}
		{
			debug!("{}: connecting to {}", self.node, node);
			let c = crate::client::setup_client(&node.addr).await
				.map_err(|e| ConnectFailure {
					addr: node.addr.clone(),
					source: e
				})?;
			debug!("{}: connected to {}", self.node, node);
			let mut map = self.connections.write().unwrap();
			map.insert(node.id, c.clone());
			Ok(c)
		}
	}

	// Evict a cached connection so the next use reconnects
	fn drop_connection(&self, id: Digest) {
		self.connections.write().unwrap().remove(&id);
	}

	async fn ping(&mut self, node: &Node) -> bool {
		match self.get_connection(node).await {
			Ok(c) => match c.get_key_rpc(context::current()).await {
				Ok(_) => true,
				Err(_) => {
					self.drop_connection(node.id);
					false
				}
			},
			Err(_) => false
		}
	}

	/// Insert this node into an existing ring via a contact node:
	/// find the current owner of our identifier, splice in before it
	/// and pull the key range we now own. (Figure 7: n.join)
	pub async fn join(&mut self, contact: &Node) -> DhtResult<()> {
		debug!("{}: joining via {}", self.node, contact);
		let ctx = context::current();

		let c = self.get_connection(contact).await?;
		let owner = c.lookup_rpc(ctx, self.node.id, 0).await??;
		if owner.id == self.node.id {
			return Err(IdCollision(owner.id));
		}

		let oc = self.get_connection(&owner).await?;
		let old_pred = oc.get_predecessor_rpc(ctx).await?;

		self.set_successor(owner.clone());
		self.set_predecessor(old_pred.clone());

		// pull the key range this node now owns
		let start = old_pred.map(|n| n.id).unwrap_or(owner.id);
		let moved = oc.handover_rpc(ctx, start, self.node.id).await??;
		let count = moved.len();
		self.store.install(moved);

		oc.set_predecessor_rpc(ctx, self.node.clone()).await?;
		info!("{}: joined before {}, took over {} keys", self.node, owner, count);
		Ok(())
	}

	/// Leave the ring gracefully: push all stored entries to the
	/// successor, then splice the neighbors together.
	pub async fn leave(&mut self) -> DhtResult<()> {
		let succ = self.get_successor();
		if succ.id == self.node.id {
			// sole member, nothing to hand over
			return Ok(());
		}
		let ctx = context::current();
		let c = self.get_connection(&succ).await?;

		// move storage before unlinking so no key goes unowned
		for (k, v) in self.store.entries() {
			c.add_stored_rpc(ctx, k, v).await?;
		}
		self.store.clear();

		if let Some(pred) = self.get_predecessor() {
			if pred.id != self.node.id {
				c.set_predecessor_rpc(ctx, pred.clone()).await?;
				let pc = self.get_connection(&pred).await?;
				pc.set_successor_rpc(ctx, succ.clone()).await?;
			}
		}
		info!("{}: left the ring, storage moved to {}", self.node, succ);
		Ok(())
	}

	// Repair the successor pointer if the current one is dead:
	// substitute the first reachable finger entry.
	async fn find_live_successor(&mut self) -> Node {
		let succ = self.get_successor();
		if succ.id == self.node.id || self.ping(&succ).await {
			return succ;
		}
		warn!("{}: successor {} unreachable", self.node, succ);
		self.drop_connection(succ.id);

		let entries = self.finger_entries();
		let mut seen = vec![self.node.id, succ.id];
		for f in entries {
			if seen.contains(&f.id) {
				continue;
			}
			seen.push(f.id);
			if self.ping(&f).await {
				info!("{}: substituting successor {}", self.node, f);
				self.set_successor(f.clone());
				return f;
			}
		}

		// nobody reachable: fall back to a ring of one
		warn!("{}: no live successor candidate, reverting to self", self.node);
		self.set_successor(self.node.clone());
		self.set_predecessor(Some(self.node.clone()));
		self.node.clone()
	}

	/// One stabilization round (Figure 7: n.stabilize).
	/// Repeated rounds are idempotent on a stable ring.
	pub async fn stabilize(&mut self) {
		// drop a dead predecessor so a live candidate can replace it
		if let Some(p) = self.get_predecessor() {
			if p.id != self.node.id && !self.ping(&p).await {
				warn!("{}: predecessor {} unreachable, clearing", self.node, p);
				self.set_predecessor(None);
			}
		}

		let mut succ = self.find_live_successor().await;

		// the successor's predecessor may have slipped in between us;
		// for a lone node its own predecessor plays that role.
		// One fetch serves both the adoption and the acceptance test.
		let mut succ_pred = if succ.id == self.node.id {
			self.get_predecessor()
		} else {
			match self.fetch_predecessor(&succ).await {
				Ok(p) => p,
				Err(e) => {
					error!("{}: fail to stabilize: {}", self.node, e);
					return;
				}
			}
		};

		if let Some(x) = succ_pred.clone() {
			// (n, n) covers everything but n, so a lone node adopts
			// any predecessor it has learned about
			if x.id != self.node.id
				&& in_range(x.id, self.node.id, succ.id)
				&& self.ping(&x).await
			{
				debug!("{}: adopting closer successor {}", self.node, x);
				self.set_successor(x.clone());
				succ = x;
				// the adopted successor's own predecessor is unknown here
				succ_pred = match self.fetch_predecessor(&succ).await {
					Ok(p) => p,
					Err(e) => {
						error!("{}: fail to stabilize: {}", self.node, e);
						return;
					}
				};
			}
		}

		if succ.id == self.node.id {
			// sole member: close the loop on itself
			if self.get_predecessor().is_none() {
				self.set_predecessor(Some(self.node.clone()));
			}
			return;
		}

		// announce self as a predecessor candidate; the successor
		// accepts unless it already has a closer one
		let accept = match succ_pred {
			None => true,
			Some(p) => in_range(self.node.id, p.id, succ.id)
		};
		if accept {
			let conn = match self.get_connection(&succ).await {
				Ok(c) => c,
				Err(e) => {
					error!("{}: fail to stabilize: {}", self.node, e);
					return;
				}
			};
			if let Err(e) = conn.set_predecessor_rpc(context::current(), self.node.clone()).await {
				error!("{}: fail to notify {}: {}", self.node, succ, e);
				self.drop_connection(succ.id);
			}
		}
	}

	async fn fetch_predecessor(&mut self, node: &Node) -> DhtResult<Option<Node>> {
		let c = self.get_connection(node).await?;
		match c.get_predecessor_rpc(context::current()).await {
			Ok(p) => Ok(p),
			Err(e) => {
				self.drop_connection(node.id);
				Err(e.into())
			}
		}
	}

	/// Walk the successor chain and collect the full membership.
	/// A repeated identifier before closing the loop means the ring
	/// is inconsistent and the snapshot is abandoned.
	pub async fn collect_ring(&mut self) -> DhtResult<Vec<Node>> {
		let ctx = context::current();
		let mut nodes = vec![self.node.clone()];
		let mut cur = self.get_successor();

		while cur.id != self.node.id {
			if nodes.iter().any(|n| n.id == cur.id) {
				return Err(RoutingInconsistency(nodes.len() as u32));
			}
			let c = self.get_connection(&cur).await?;
			let next = c.get_successor_rpc(ctx).await?;
			nodes.push(cur);
			cur = next;
		}
		Ok(nodes)
	}

	/// Rebuild the local finger table from a fresh membership walk
	/// and share the snapshot with the rest of the ring.
	pub async fn refresh_fingers(&mut self) {
		let nodes = match self.collect_ring().await {
			Ok(nodes) => nodes,
			Err(e) => {
				error!("{}: membership walk failed: {}", self.node, e);
				return;
			}
		};
		debug!("{}: rebuilding fingers from {} members", self.node, nodes.len());
		self.update_fingers(&nodes);

		let ctx = context::current();
		let own_id = self.node.id;
		for n in nodes.iter().filter(|n| n.id != own_id) {
			match self.get_connection(n).await {
				Ok(c) => {
					if let Err(e) = c.update_fingers_rpc(ctx, nodes.clone()).await {
						warn!("{}: fail to push snapshot to {}: {}", self.node, n, e);
						self.drop_connection(n.id);
					}
				},
				Err(e) => {
					warn!("{}: fail to push snapshot to {}: {}", self.node, n, e);
				}
			};
		}
	}

	// Find the owner of an identifier: the node whose range
	// (predecessor, self] covers it. Forwards through the closest
	// preceding finger, falling back towards the successor when a
	// hop is unreachable.
	async fn lookup(&mut self, id: Digest, hops: u32) -> DhtResult<Node> {
		match self.get_predecessor() {
			Some(pred) => {
				if in_range_inc(id, pred.id, self.node.id) {
					return Ok(self.node.clone());
				}
			},
			// a cleared predecessor leaves the lower bound of the
			// owned range unknown; forwarding is safe, claiming is not
			None => {
				if self.get_successor().id == self.node.id {
					return Ok(self.node.clone());
				}
			}
		}

		if hops >= self.config.hop_limit.saturating_mul(2) {
			return Err(RoutingInconsistency(hops));
		}

		let mut candidates = if hops < self.config.hop_limit {
			self.fingers.read().unwrap().preceding_candidates(self.node.id, id)
		} else {
			// stale fingers may loop; a plain successor walk cannot
			warn!("{}: hop limit hit towards {}, successor-only routing", self.node, id);
			Vec::new()
		};
		let succ = self.get_successor();
		if succ.id != self.node.id && !candidates.iter().any(|c| c.id == succ.id) {
			candidates.push(succ);
		}

		let ctx = context::current();
		for target in candidates {
			let conn = match self.get_connection(&target).await {
				Ok(c) => c,
				Err(e) => {
					warn!("{}: skipping unreachable hop {}: {}", self.node, target, e);
					continue;
				}
			};
			match conn.lookup_rpc(ctx, id, hops + 1).await {
				Ok(result) => return result.map_err(DhtError::from),
				Err(e) => {
					// dead hop costs latency, not correctness
					warn!("{}: forwarding to {} failed: {}", self.node, target, e);
					self.drop_connection(target.id);
				}
			};
		}

		Err(NoLiveRoute(id))
	}

	/// Send a probe around the ring; every node logs it and the
	/// origin logs the final hop count.
	pub async fn probe(&mut self) -> DhtResult<()> {
		let succ = self.get_successor();
		if succ.id == self.node.id {
			info!("{}: probe stayed local, ring of one", self.node);
			return Ok(());
		}
		let c = self.get_connection(&succ).await?;
		c.probe_rpc(context::current(), self.node.id, 1).await?;
		Ok(())
	}

	async fn forward_probe(&mut self, origin: Digest, count: u32) {
		if origin == self.node.id {
			info!("{}: probe returned, {} nodes on the ring", self.node, count);
			return;
		}
		info!("{}: probe from {} passing through (hop {})", self.node, origin, count);

		let succ = self.find_live_successor().await;
		if succ.id == self.node.id {
			warn!("{}: dropping probe from {}, no live successor", self.node, origin);
			return;
		}
		match self.get_connection(&succ).await {
			Ok(c) => {
				if let Err(e) = c.probe_rpc(context::current(), origin, count + 1).await {
					error!("{}: fail to forward probe to {}: {}", self.node, succ, e);
				}
			},
			Err(e) => {
				error!("{}: fail to forward probe to {}: {}", self.node, succ, e);
			}
		};
	}
}

#[tarpc::server]
impl NodeService for NodeServer {
	async fn get_key_rpc(self, _: context::Context) -> Digest {
		self.get_key()
	}

	async fn get_node_rpc(self, _: context::Context) -> Node {
		self.node.clone()
	}

	async fn get_successor_rpc(self, _: context::Context) -> Node {
		self.get_successor()
	}

	async fn get_predecessor_rpc(self, _: context::Context) -> Option<Node> {
		self.get_predecessor()
	}

	async fn set_successor_rpc(self, _: context::Context, node: Node) {
		debug!("{}: successor set remotely to {}", self.node, node);
		self.set_successor(node);
	}

	async fn set_predecessor_rpc(self, _: context::Context, node: Node) {
		debug!("{}: predecessor set remotely to {}", self.node, node);
		self.set_predecessor(Some(node));
	}

	async fn lookup_rpc(mut self, _: context::Context, id: Digest, hops: u32) -> Result<Node, Fault> {
		match self.lookup(id, hops).await {
			Ok(owner) => Ok(owner),
			Err(KeyNotFound) => Err(Fault::KeyNotFound),
			Err(NoLiveRoute(d)) => Err(Fault::NoLiveRoute(d)),
			Err(RoutingInconsistency(h)) => Err(Fault::RoutingInconsistency(h)),
			Err(HandoverConflict { start, end }) => Err(Fault::HandoverConflict { start, end }),
			Err(e) => {
				error!("{}: lookup for {} failed: {}", self.node, id, e);
				Err(Fault::NoLiveRoute(id))
			}
		}
	}

	async fn probe_rpc(mut self, _: context::Context, origin: Digest, count: u32) {
		self.forward_probe(origin, count).await
	}

	async fn get_stored_rpc(self, _: context::Context, key: Key) -> Result<Value, Fault> {
		self.store.get(&key).ok_or(Fault::KeyNotFound)
	}

	async fn add_stored_rpc(self, _: context::Context, key: Key, value: Value) {
		self.store.add(key, value)
	}

	async fn remove_stored_rpc(self, _: context::Context, key: Key) {
		if !self.store.remove(&key) {
			debug!("{}: remove of absent key", self.node);
		}
	}

	async fn get_values_rpc(self, _: context::Context) -> Vec<Value> {
		self.store.values()
	}

	async fn handover_rpc(
		self,
		_: context::Context,
		old_pred: Digest,
		new_pred: Digest
	) -> Result<HashMap<Key, Value>, Fault> {
		if old_pred == new_pred {
			// degenerate empty range
			return Ok(HashMap::new());
		}
		if !in_range_inc(new_pred, old_pred, self.node.id) {
			warn!(
				"{}: refusing handover of ({}, {}], outside owned range",
				self.node, old_pred, new_pred
			);
			return Err(Fault::HandoverConflict {
				start: old_pred,
				end: new_pred
			});
		}
		let moved = self.store.take_range(old_pred, new_pred);
		info!(
			"{}: handed over {} keys in ({}, {}]",
			self.node, moved.len(), old_pred, new_pred
		);
		Ok(moved)
	}

	async fn update_fingers_rpc(self, _: context::Context, nodes: Vec<Node>) {
		debug!("{}: finger rebuild from snapshot of {} nodes", self.node, nodes.len());
		self.update_fingers(&nodes);
	}
}
