use chord_ring::core::{
	self,
	config::*,
	NodeServer,
	Node
};
use clap::Parser;
use log::error;

#[derive(Parser)]
struct Args {
	/// Local addr to bind (<host>:<port>)
	addr: String,

	/// Join an existing node on init (<host>:<port>)
	#[clap(short, long)]
	join: Option<String>
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();

	let config = Config::default();
	let keyspace = config.keyspace();
	let node = core::construct_node(&args.addr, &keyspace);
	let join_node: Option<Node> = args.join.as_ref()
		.map(|n| core::construct_node(n, &keyspace));

	let mut s = NodeServer::new(node, config);
	let handle = s.start(join_node).await?;

	// hand storage to the successor before going down
	tokio::signal::ctrl_c().await?;
	if let Err(e) = s.leave().await {
		error!("graceful leave failed: {}", e);
	}
	handle.stop().await?;
	Ok(())
}
