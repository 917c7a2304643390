pub mod keyspace;
pub mod finger;
pub mod node;
pub mod storage;
pub mod config;
pub mod error;

pub use node::*;
pub use config::*;
pub use error::*;

use keyspace::Keyspace;

pub fn construct_node(addr: &str, keyspace: &Keyspace) -> Node {
	Node {
		addr: addr.to_string(),
		id: keyspace.hash(addr.as_bytes())
	}
}
