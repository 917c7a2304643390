use thiserror::Error;
use std::result::Result;
use tarpc::serde::{Serialize, Deserialize};
use super::keyspace::Digest;
use super::node::Node;

#[derive(Error, Debug)]
pub enum DhtError {
	#[error("peer unreachable: {0}")]
	PeerUnreachable(#[from] tarpc::client::RpcError),
	#[error("cannot reach {addr}: {source}")]
	ConnectFailure {
		addr: String,
		source: std::io::Error
	},
	#[error("key not found")]
	KeyNotFound,
	#[error("no live route towards {0}")]
	NoLiveRoute(Digest),
	#[error("routing gave up after {0} hops")]
	RoutingInconsistency(u32),
	#[error("handover range ({start}, {end}] outside owned range")]
	HandoverConflict {
		start: Digest,
		end: Digest
	},
	#[error("identifier collision at {0}")]
	IdCollision(Digest),
	#[error("failed to join via {node}: {message}")]
	JoinFailure {
		node: Node,
		message: String
	},
	#[error("IO error")]
	IoError(#[from] std::io::Error),
	#[error("shutdown channel closed")]
	ShutdownFailure(#[from] tokio::sync::watch::error::SendError<bool>),
	#[error("task failed")]
	TaskFailure(#[from] tokio::task::JoinError)
}

impl DhtError {
	/// Transport-level failures: the peer is treated as dead and
	/// the caller reroutes instead of giving up.
	pub fn is_unreachable(&self) -> bool {
		matches!(self, DhtError::PeerUnreachable(_) | DhtError::ConnectFailure { .. })
	}
}

pub type DhtResult<T> = Result<T, DhtError>;

/// Errors that cross the wire as RPC payloads, so that a remote
/// "key not found" never looks like a dead peer to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
	#[error("key not found")]
	KeyNotFound,
	#[error("no live route towards {0}")]
	NoLiveRoute(Digest),
	#[error("routing gave up after {0} hops")]
	RoutingInconsistency(u32),
	#[error("handover range ({start}, {end}] outside owned range")]
	HandoverConflict {
		start: Digest,
		end: Digest
	}
}

impl From<Fault> for DhtError {
	fn from(fault: Fault) -> Self {
		match fault {
			Fault::KeyNotFound => DhtError::KeyNotFound,
			Fault::NoLiveRoute(id) => DhtError::NoLiveRoute(id),
			Fault::RoutingInconsistency(hops) => DhtError::RoutingInconsistency(hops),
			Fault::HandoverConflict { start, end } => DhtError::HandoverConflict { start, end }
		}
	}
}
