use crate::core::error::*;
use futures::future;

/// Aggregated handle for a node's background tasks
/// (listener, stabilizer, finger refresh).
pub struct ServerHandle {
	pub handle: future::JoinAll<tokio::task::JoinHandle<()>>,
	pub shutdown: tokio::sync::watch::Sender<bool>
}

impl ServerHandle {
	/// Wait for the node's tasks to terminate
	pub async fn wait(self) -> DhtResult<()> {
		self.handle.await
			.into_iter()
			.collect::<Result<Vec<_>, tokio::task::JoinError>>()?;

		Ok(())
	}

	/// Stop the node gracefully
	pub async fn stop(self) -> DhtResult<()> {
		self.shutdown.send(true)?;
		self.wait().await
	}
}
