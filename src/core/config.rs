use std::default::Default;
use super::keyspace::Keyspace;

#[derive(Clone)]
pub struct Config {
	/// width of the identifier space (ids in [0, 2^bits))
	pub bits: u32,
	// interval in ms, 0 disables the task
	pub stabilize_interval: u64,
	// membership walk + finger rebuild interval in ms, 0 disables
	pub refresh_interval: u64,
	/// max number of concurrent connections buffered
	pub max_connections: u64,
	/// hops after which lookup drops to successor-only routing;
	/// twice this is a hard failure
	pub hop_limit: u32
}

impl Default for Config {
	fn default() -> Self {
		Self {
			bits: Keyspace::MAX_BITS,
			stabilize_interval: 200,
			refresh_interval: 500,
			max_connections: 16,
			hop_limit: 64
		}
	}
}

impl Config {
	pub fn keyspace(&self) -> Keyspace {
		Keyspace::new(self.bits)
	}
}
