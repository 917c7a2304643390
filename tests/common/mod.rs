use chord_ring::{
	core::{
		keyspace::{Keyspace, Digest, in_range_inc},
		storage::{Key, Value},
		error::Fault,
		Config,
		Node,
		NodeServer
	},
	client::setup_client,
	rpc::NodeServiceClient,
	server::ServerHandle
};
use rand::Rng;
use tarpc::context;

// Disable timers so tests drive stabilization and refresh by hand
#[allow(dead_code)]
pub fn test_config(bits: u32) -> Config {
	Config {
		bits,
		stabilize_interval: 0,
		refresh_interval: 0,
		..Config::default()
	}
}

#[allow(dead_code)]
pub async fn start_node(
	addr: &str,
	id: Digest,
	config: &Config,
	join: Option<Node>
) -> anyhow::Result<(NodeServer, ServerHandle, NodeServiceClient)> {
	let node = Node {
		addr: addr.to_string(),
		id
	};
	let mut server = NodeServer::new(node, config.clone());
	let handle = server.start(join).await?;
	let client = setup_client(addr).await?;
	Ok((server, handle, client))
}

// Generate a key whose digest is in range (start, end]
#[allow(dead_code)]
pub fn generate_key_in_range<T: Rng>(
	keyspace: &Keyspace,
	rng: &mut T,
	start: Digest,
	end: Digest
) -> Key {
	// gen 8-byte key
	loop {
		let key = rng.gen::<[u8; 8]>();
		if in_range_inc(keyspace.hash(&key), start, end) {
			return Vec::from(key);
		}
	}
}

// Store a key on whichever node owns it, routing from `entry`
#[allow(dead_code)]
pub async fn ring_put(
	entry: &NodeServiceClient,
	keyspace: &Keyspace,
	key: Key,
	value: Value
) -> anyhow::Result<Node> {
	let ctx = context::current();
	let owner = entry.lookup_rpc(ctx, keyspace.hash(&key), 0).await??;
	let oc = setup_client(&owner.addr).await?;
	oc.add_stored_rpc(ctx, key, value).await?;
	Ok(owner)
}

// Read a key from its owner, routing from `entry`.
// The inner result keeps "not found" distinct from transport failure.
#[allow(dead_code)]
pub async fn ring_get(
	entry: &NodeServiceClient,
	keyspace: &Keyspace,
	key: &Key
) -> anyhow::Result<Result<Value, Fault>> {
	let ctx = context::current();
	let owner = entry.lookup_rpc(ctx, keyspace.hash(key), 0).await??;
	let oc = setup_client(&owner.addr).await?;
	Ok(oc.get_stored_rpc(ctx, key.clone()).await?)
}

// Follow successor pointers once around and return the visited ids
#[allow(dead_code)]
pub async fn walk_ring(entry: &NodeServiceClient, max_hops: usize) -> anyhow::Result<Vec<Digest>> {
	let ctx = context::current();
	let start = entry.get_key_rpc(ctx).await?;
	let mut ids = Vec::new();
	let mut cur = entry.get_successor_rpc(ctx).await?;
	while cur.id != start && ids.len() < max_hops {
		ids.push(cur.id);
		let c = setup_client(&cur.addr).await?;
		cur = c.get_successor_rpc(ctx).await?;
	}
	ids.push(cur.id);
	Ok(ids)
}
