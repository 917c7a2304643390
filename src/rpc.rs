use std::collections::HashMap;
use crate::core::{
	keyspace::Digest,
	storage::{Key, Value},
	error::Fault,
	Node
};

#[tarpc::service]
pub trait NodeService {
	// Ring state at this node
	async fn get_key_rpc() -> Digest;
	async fn get_node_rpc() -> Node;
	async fn get_successor_rpc() -> Node;
	async fn get_predecessor_rpc() -> Option<Node>;
	async fn set_successor_rpc(node: Node);
	async fn set_predecessor_rpc(node: Node);

	// Routing: find the node owning the given identifier
	async fn lookup_rpc(id: Digest, hops: u32) -> Result<Node, Fault>;

	// Diagnostic ring walk
	async fn probe_rpc(origin: Digest, count: u32);

	// Storage on the owning node
	async fn get_stored_rpc(key: Key) -> Result<Value, Fault>;
	async fn add_stored_rpc(key: Key, value: Value);
	async fn remove_stored_rpc(key: Key);
	async fn get_values_rpc() -> Vec<Value>;

	// Key-range migration towards a new predecessor
	async fn handover_rpc(old_pred: Digest, new_pred: Digest) -> Result<HashMap<Key, Value>, Fault>;

	// Full finger-table rebuild from a membership snapshot
	async fn update_fingers_rpc(nodes: Vec<Node>);
}
