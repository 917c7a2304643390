use chord_ring::{
	client::setup_client,
	core::Config,
	rpc::NodeServiceClient
};
use tarpc::context;
use clap::Parser;
use inquire::{Text, CustomUserError};
use anyhow::anyhow;

#[derive(Parser)]
struct Args {
	/// Server addr to connect to (<host>:<port>)
	addr: String,
}

const COMMANDS: [&str; 5] = [
	"get",
	"put",
	"remove",
	"values",
	"probe"
];

fn suggest_command(v: &str) -> Result<Vec<String>, CustomUserError> {
	let mut result = Vec::new();
	for command in COMMANDS {
		if v.len() > 0 && command.starts_with(v) {
			result.push(command.to_string());
		}
	}
	Ok(result)
}

fn complete_command(v: &str) -> Result<Option<String>, CustomUserError> {
	let result = suggest_command(v)?;
	let command = if result.len() > 0 {
		Some(result[0].clone() + " ")
	}
	else {
		None
	};
	Ok(command)
}

// Route to the owner of the key, then talk to it directly.
// Digests must match the server side: both ends derive the keyspace
// from the default config, as neither exposes `bits` on the CLI.
async fn lookup_owner(client: &NodeServiceClient, key: &str) -> anyhow::Result<NodeServiceClient> {
	let keyspace = Config::default().keyspace();
	let id = keyspace.hash(key.as_bytes());
	let owner = client.lookup_rpc(context::current(), id, 0).await??;
	Ok(setup_client(&owner.addr).await?)
}

async fn execute_command(client: &NodeServiceClient, command: &str) -> anyhow::Result<()> {
	let words: Vec<_> = command.split_whitespace().collect();
	if words.len() == 0 {
		return Err(anyhow!("invalid command"));
	}

	let ctx = context::current();
	match words[0] {
		"get" => {
			if words.len() != 2 {
				return Err(anyhow!("get: invalid number of arguments"));
			}
			let owner = lookup_owner(client, words[1]).await?;
			let value = owner.get_stored_rpc(
				ctx,
				words[1].as_bytes().to_vec()
			).await??;
			println!("{}", String::from_utf8(value)?);
		},
		"put" => {
			if words.len() != 3 {
				return Err(anyhow!("put: invalid number of arguments"));
			}
			let owner = lookup_owner(client, words[1]).await?;
			owner.add_stored_rpc(
				ctx,
				words[1].as_bytes().to_vec(),
				words[2].as_bytes().to_vec()
			).await?;
		},
		"remove" => {
			if words.len() != 2 {
				return Err(anyhow!("remove: invalid number of arguments"));
			}
			let owner = lookup_owner(client, words[1]).await?;
			owner.remove_stored_rpc(
				ctx,
				words[1].as_bytes().to_vec()
			).await?;
		},
		"values" => {
			if words.len() != 1 {
				return Err(anyhow!("values: invalid number of arguments"));
			}
			for value in client.get_values_rpc(ctx).await? {
				println!("{}", String::from_utf8(value)?);
			}
		},
		"probe" => {
			if words.len() != 1 {
				return Err(anyhow!("probe: invalid number of arguments"));
			}
			// start the walk at the server's successor so the
			// probe terminates back at the server itself
			let key = client.get_key_rpc(ctx).await?;
			let succ = client.get_successor_rpc(ctx).await?;
			let sc = setup_client(&succ.addr).await?;
			sc.probe_rpc(ctx, key, 1).await?;
		},
		_ => {
			return Err(anyhow!("invalid command"));
		}
	};
	Ok(())
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();
	let client = setup_client(&args.addr).await?;

	loop {
		let command = Text::new("")
			.with_suggester(&suggest_command)
			.with_completer(&complete_command)
			.prompt()?;

		match execute_command(&client, &command).await {
			Ok(_) => (),
			Err(e) => println!("Error: {}", e)
		};
	}
}
