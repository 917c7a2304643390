use chord_ring::core::{
	keyspace::Keyspace,
	error::Fault,
	Node
};
use rand::prelude::*;
use tarpc::context;

mod common;
use common::*;

/// A 32-slot ring (5 bits) with nodes at {0, 10, 20, 30}:
/// finger tables, ring closure, owner lookup from any entry point,
/// then a node inserted at 25 with the matching handover.
#[tokio::test]
async fn test_ring_and_handover() -> anyhow::Result<()> {
	let _ = env_logger::try_init();
	let config = test_config(5);
	let ks = Keyspace::new(5);
	let ctx = context::current();

	let n0 = Node {
		addr: "localhost:9820".to_string(),
		id: 0
	};
	let (mut s0, m0, c0) = start_node(&n0.addr, 0, &config, None).await?;
	s0.stabilize().await;
	// single-node ring
	assert_eq!(s0.get_predecessor().unwrap().id, 0);
	assert_eq!(s0.get_successor().id, 0);

	// Nodes 10, 20 and 30 join through node 0
	let (mut s10, m10, c10) = start_node("localhost:9821", 10, &config, Some(n0.clone())).await?;
	s10.stabilize().await;
	s0.stabilize().await;
	assert_eq!(s0.get_successor().id, 10);
	assert_eq!(s10.get_successor().id, 0);

	let (mut s20, m20, _c20) = start_node("localhost:9822", 20, &config, Some(n0.clone())).await?;
	s20.stabilize().await;
	s10.stabilize().await;
	s0.stabilize().await;

	let (mut s30, m30, c30) = start_node("localhost:9823", 30, &config, Some(n0.clone())).await?;
	s30.stabilize().await;
	s20.stabilize().await;
	s10.stabilize().await;
	s0.stabilize().await;

	// one walk collects the membership and broadcasts it ring-wide
	s0.refresh_fingers().await;

	// successors form a single cycle over all four nodes
	assert_eq!(walk_ring(&c0, 8).await?, vec![10, 20, 30, 0]);
	assert_eq!(walk_ring(&c30, 8).await?, vec![0, 10, 20, 30]);

	// finger entries follow the closest-successor rule
	let ids: Vec<u64> = s0.finger_entries().iter().map(|n| n.id).collect();
	assert_eq!(ids, vec![10, 10, 10, 10, 20]);
	let ids: Vec<u64> = s20.finger_entries().iter().map(|n| n.id).collect();
	assert_eq!(ids, vec![30, 30, 30, 30, 10]);

	// identifier 25 is owned by node 30, wherever the lookup starts
	assert_eq!(c0.lookup_rpc(ctx, 25, 0).await??.id, 30);
	assert_eq!(c10.lookup_rpc(ctx, 25, 0).await??.id, 30);
	assert_eq!(c30.lookup_rpc(ctx, 25, 0).await??.id, 30);
	// wrap-around: 31 belongs to node 0
	assert_eq!(c10.lookup_rpc(ctx, 31, 0).await??.id, 0);

	// store keys on both sides of the future split point
	let mut rng = StdRng::seed_from_u64(1);
	let mut low_keys = Vec::new();
	let mut high_keys = Vec::new();
	for i in 0..3u8 {
		let k = generate_key_in_range(&ks, &mut rng, 20, 25);
		let owner = ring_put(&c0, &ks, k.clone(), vec![i]).await?;
		assert_eq!(owner.id, 30);
		low_keys.push((k, vec![i]));

		let k = generate_key_in_range(&ks, &mut rng, 25, 30);
		let owner = ring_put(&c0, &ks, k.clone(), vec![i + 10]).await?;
		assert_eq!(owner.id, 30);
		high_keys.push((k, vec![i + 10]));
	}

	// node 25 inserts itself between 20 and 30 and pulls (20, 25]
	let (mut s25, m25, c25) = start_node("localhost:9824", 25, &config, Some(n0.clone())).await?;
	s25.stabilize().await;
	s20.stabilize().await;
	s0.stabilize().await;
	s0.refresh_fingers().await;

	assert_eq!(s25.get_predecessor().unwrap().id, 20);
	assert_eq!(s25.get_successor().id, 30);
	assert_eq!(s30.get_predecessor().unwrap().id, 25);
	assert_eq!(s20.get_successor().id, 25);
	assert_eq!(walk_ring(&c0, 8).await?, vec![10, 20, 25, 30, 0]);

	// ownership of 25 moved to the new node
	assert_eq!(c0.lookup_rpc(ctx, 25, 0).await??.id, 25);
	assert_eq!(c10.lookup_rpc(ctx, 25, 0).await??.id, 25);

	// handover moved exactly the keys in (20, 25]: present on 25,
	// gone from 30, and the high half untouched
	for (k, v) in &low_keys {
		assert_eq!(c25.get_stored_rpc(ctx, k.clone()).await?, Ok(v.clone()));
		assert_eq!(c30.get_stored_rpc(ctx, k.clone()).await?, Err(Fault::KeyNotFound));
	}
	for (k, v) in &high_keys {
		assert_eq!(c30.get_stored_rpc(ctx, k.clone()).await?, Ok(v.clone()));
		assert_eq!(c25.get_stored_rpc(ctx, k.clone()).await?, Err(Fault::KeyNotFound));
	}

	// re-requesting an already-transferred range yields nothing
	let again = c30.handover_rpc(ctx, 20, 25).await??;
	assert!(again.is_empty());

	// a range reaching past the callee's own identifier is refused
	assert_eq!(
		c30.handover_rpc(ctx, 20, 31).await?,
		Err(Fault::HandoverConflict { start: 20, end: 31 })
	);

	// diagnostic walk terminates back at the origin
	s0.probe().await?;

	m0.stop().await?;
	m10.stop().await?;
	m20.stop().await?;
	m25.stop().await?;
	m30.stop().await?;
	Ok(())
}

/// Routing degrades instead of looping: past the hop limit lookups
/// fall back to plain successor hops, twice the limit is a hard
/// error, and dead finger entries are skipped.
#[tokio::test]
async fn test_routing_limits() -> anyhow::Result<()> {
	let _ = env_logger::try_init();
	let config = test_config(5);
	let ctx = context::current();

	let n0 = Node {
		addr: "localhost:9825".to_string(),
		id: 0
	};
	let (mut s0, m0, c0) = start_node(&n0.addr, 0, &config, None).await?;
	s0.stabilize().await;

	let (mut s10, m10, _c10) = start_node("localhost:9826", 10, &config, Some(n0.clone())).await?;
	s10.stabilize().await;
	s0.stabilize().await;

	let (mut s20, m20, _c20) = start_node("localhost:9827", 20, &config, Some(n0.clone())).await?;
	s20.stabilize().await;
	s10.stabilize().await;
	s0.stabilize().await;

	let (mut s30, m30, _c30) = start_node("localhost:9828", 30, &config, Some(n0.clone())).await?;
	s30.stabilize().await;
	s20.stabilize().await;
	s10.stabilize().await;
	s0.stabilize().await;

	s0.refresh_fingers().await;

	// at the hop limit fingers are ignored; the successor chain alone
	// still reaches the owner
	let limit = config.hop_limit;
	assert_eq!(c0.lookup_rpc(ctx, 25, limit).await??.id, 30);

	// twice the limit is a routing failure, not a wrong owner
	let err = c0.lookup_rpc(ctx, 25, limit * 2).await?.unwrap_err();
	assert_eq!(err, Fault::RoutingInconsistency(limit * 2));

	// node 20 dies; repair the ring but leave the finger tables stale
	m20.stop().await?;
	s10.stabilize().await;
	s0.stabilize().await;

	// fingers still point at the dead node; the lookup skips it and
	// lands on the live owner
	assert_eq!(c0.lookup_rpc(ctx, 25, 0).await??.id, 30);

	m0.stop().await?;
	m10.stop().await?;
	m30.stop().await?;
	Ok(())
}
