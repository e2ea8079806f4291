//! End-to-end behavior of the sync paths over an in-process network.
//!
//! Most tests run with Tokio's clock paused: sleeps complete as soon as every
//! task is idle, so backoff and poll intervals cost no wall time and
//! schedules are deterministic.

use std::time::Duration;

use crdt_tally::prelude::*;
use tokio::time::{sleep, timeout};

fn actors(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("host-{i}")).collect()
}

fn cluster(net: &LoopbackNetwork, n: usize) -> Vec<SyncCounter> {
    let actors = actors(n);
    (0..n)
        .map(|i| net.counter("hits", &actors, i, SyncConfig::default()).unwrap())
        .collect()
}

async fn shutdown_all(nodes: &[SyncCounter]) {
    for node in nodes {
        node.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn add_is_local_until_synced() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 3);

    nodes[0].add(5);
    assert_eq!(nodes[0].local_value(), 5);
    assert_eq!(nodes[1].local_value(), 0);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn add_pushes_to_every_peer() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 3);

    nodes[0].add(5);
    sleep(Duration::from_millis(100)).await;

    for node in &nodes {
        assert_eq!(node.local_value(), 5);
    }
    assert_eq!(net.pushes_to("host-1"), 1);
    assert_eq!(net.pushes_to("host-2"), 1);
    assert_eq!(net.pushes_to("host-0"), 0);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn poll_loop_converges_without_writes() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 3);

    // State that arrived out of band: no push is triggered.
    nodes[0].apply_snapshot(&Snapshot::from(vec![5, 0, 2])).unwrap();
    nodes[1].start();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(nodes[1].local_value(), 7);
    assert!(net.pulls_from("host-0") >= 1);
    assert!(net.pulls_from("host-2") >= 1);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn poll_retries_after_failed_pull() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 2);

    nodes[0].apply_snapshot(&Snapshot::from(vec![3, 0])).unwrap();
    net.fail_next("host-0", 3);
    nodes[1].start();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(nodes[1].local_value(), 3);
    assert!(net.pulls_from("host-0") > 3);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn global_value_contacts_every_peer_even_when_converged() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 3);

    nodes[1].add(2);
    nodes[2].add(1);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(nodes[0].local_value(), 3);

    let before = [net.pulls_from("host-1"), net.pulls_from("host-2")];
    assert_eq!(nodes[0].global_value().await, Ok(3));
    assert_eq!(net.pulls_from("host-1"), before[0] + 1);
    assert_eq!(net.pulls_from("host-2"), before[1] + 1);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn full_sync_retries_each_peer_until_it_answers() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 3);
    nodes[2].apply_snapshot(&Snapshot::from(vec![0, 0, 4])).unwrap();

    net.fail_next("host-2", 5);
    assert_eq!(nodes[0].global_value().await, Ok(4));
    assert_eq!(net.pulls_from("host-2"), 6);
    assert_eq!(net.pulls_from("host-1"), 1);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_push_triggers_collapse_into_one_retry_loop() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 2);
    net.partition("host-1");

    nodes[0].add(1);
    for _ in 0..9 {
        nodes[0].push_to_all();
    }
    sleep(Duration::from_millis(1)).await;

    // Ten triggers, one attempt: the others found the flag taken.
    assert_eq!(net.pushes_to("host-1"), 1);
    assert!(nodes[0].push_in_flight(1));

    nodes[0].push_to_all();
    sleep(Duration::from_secs(2)).await;

    // A single loop backing off from 10 ms makes at most eight attempts in
    // two seconds; ten loops would have made ten right away.
    let attempts = net.pushes_to("host-1");
    assert!((2..=8).contains(&attempts), "{attempts} attempts");

    net.heal("host-1");
    sleep(Duration::from_secs(5)).await;
    assert!(!nodes[0].push_in_flight(1));
    assert_eq!(nodes[1].local_value(), 1);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn push_delivers_state_added_while_retrying() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 2);
    net.partition("host-1");

    nodes[0].add(1);
    sleep(Duration::from_millis(50)).await;
    nodes[0].add(2);
    nodes[0].add(3);

    net.heal("host-1");
    sleep(Duration::from_secs(5)).await;
    assert_eq!(nodes[1].local_value(), 6);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn add_during_inflight_push_is_delivered_by_that_push() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 2);
    net.set_latency("host-1", Duration::from_secs(1));

    nodes[0].add(1);
    sleep(Duration::from_millis(10)).await;
    assert!(nodes[0].push_in_flight(1));
    // The attempt in flight already read [1, 0].
    nodes[0].add(2);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(nodes[1].local_value(), 3);
    assert_eq!(net.pushes_to("host-1"), 2);
    assert!(!nodes[0].push_in_flight(1));

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn quiet_push_stops_after_one_delivery() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 2);

    nodes[0].add(4);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(nodes[1].local_value(), 4);
    assert_eq!(net.pushes_to("host-1"), 1);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn poll_pulls_are_deduplicated() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 2);
    net.set_latency("host-1", Duration::from_secs(1));

    for _ in 0..5 {
        nodes[0].pull_from_all();
    }
    sleep(Duration::from_millis(10)).await;
    assert_eq!(net.pulls_from("host-1"), 1);
    assert!(nodes[0].pull_in_flight(1));

    sleep(Duration::from_secs(2)).await;
    assert!(!nodes[0].pull_in_flight(1));

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn push_and_pull_guards_are_independent() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 2);
    net.set_latency("host-1", Duration::from_secs(1));

    nodes[0].add(1);
    sleep(Duration::from_millis(10)).await;
    assert!(nodes[0].push_in_flight(1));

    nodes[0].pull_from_all();
    sleep(Duration::from_millis(10)).await;
    assert!(nodes[0].pull_in_flight(1));
    assert_eq!(net.pulls_from("host-1"), 1);

    sleep(Duration::from_secs(2)).await;
    assert!(!nodes[0].push_in_flight(1));
    assert!(!nodes[0].pull_in_flight(1));
    assert_eq!(nodes[1].local_value(), 1);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn partitioned_peer_blocks_global_but_not_local_reads() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 3);
    for node in &nodes {
        node.start();
    }
    net.partition("host-2");

    nodes[0].add(3);
    nodes[1].add(4);
    nodes[2].add(10);
    sleep(Duration::from_secs(2)).await;

    assert_eq!(nodes[0].local_value(), 7);
    assert!(
        timeout(Duration::from_secs(5), nodes[0].global_value())
            .await
            .is_err(),
        "global read returned while a peer was unreachable"
    );
    assert_eq!(nodes[0].local_value(), 7);

    net.heal("host-2");
    assert_eq!(nodes[0].global_value().await, Ok(17));

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_waiting_global_read() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 2);
    net.partition("host-1");

    let node = nodes[0].clone();
    let waiting = tokio::spawn(async move { node.global_value().await });
    sleep(Duration::from_secs(1)).await;
    assert!(!waiting.is_finished());

    nodes[0].shutdown().await;
    assert_eq!(waiting.await.unwrap(), Err(CounterError::ShutDown));

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_polling() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 2);
    nodes[0].start();
    sleep(Duration::from_secs(2)).await;

    nodes[0].shutdown().await;
    let pulls = net.pulls_from("host-1");
    assert!(pulls >= 2);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(net.pulls_from("host-1"), pulls);

    shutdown_all(&nodes).await;
}

#[tokio::test(start_paused = true)]
async fn mismatched_peer_state_is_never_merged() {
    let net = LoopbackNetwork::new();
    let two = actors(2);
    let a = net.counter("hits", &two, 0, SyncConfig::default()).unwrap();
    // Same name, wrong membership.
    let b = net
        .counter("hits", &[two[0].clone(), two[1].clone(), "host-x".into()], 1, SyncConfig::default())
        .unwrap();
    b.apply_snapshot(&Snapshot::from(vec![0, 9, 9])).unwrap();

    assert!(timeout(Duration::from_secs(1), a.global_value())
        .await
        .is_err());
    assert_eq!(a.local_value(), 0);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_agree_on_global_value() {
    let net = LoopbackNetwork::new();
    let nodes = cluster(&net, 4);
    for node in &nodes {
        node.start();
    }

    let writers: Vec<_> = nodes
        .iter()
        .cloned()
        .map(|node| {
            tokio::spawn(async move {
                for _ in 0..100 {
                    node.add(1);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    for node in &nodes {
        assert_eq!(node.global_value().await, Ok(400));
    }

    shutdown_all(&nodes).await;
}
