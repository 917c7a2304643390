use crate::rpc::NodeServiceClient;

use tarpc::tokio_serde::formats::Bincode;

/// Connect to a node. A connect failure means the peer is unreachable.
pub async fn setup_client(addr: &str) -> std::io::Result<NodeServiceClient> {
	let transport = tarpc::serde_transport::tcp::connect(addr, Bincode::default).await?;
	Ok(NodeServiceClient::new(tarpc::client::Config::default(), transport).spawn())
}
