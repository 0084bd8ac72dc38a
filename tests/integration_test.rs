use quorum::{ElectionEvent, IncrementError, NodeEvent, NodeHandle};
use slog::Drain;
use std::collections::HashMap;
use std::error::Error;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::time::{Duration, Instant};

const NUM_MEMBERS: u32 = 3;

#[tokio::test]
async fn leader_election_and_redirect() -> Result<(), Box<dyn Error>> {
    let nodes = start_cluster(17100).await?;

    let leader_sid = wait_for_stable_leader(&nodes, Duration::from_secs(10)).await;
    let follower_sid = (1..=NUM_MEMBERS).find(|sid| *sid != leader_sid).unwrap();

    // Followers redirect writes to the leader's client address.
    match nodes[&follower_sid].increment("order", "ORD-#incr").await {
        Err(IncrementError::NotLeader(leader)) => {
            assert_eq!(leader_sid, leader.sid.as_u32());
            assert_eq!(client_addr(17100, leader_sid), leader.client_addr);
        }
        other => panic!("Expected redirect, got {:?}", other),
    }

    let leader = &nodes[&leader_sid];
    let first = leader.increment("order", "ORD-#incr").await?;
    let second = leader.increment("order", "ORD-#incr").await?;
    assert_eq!(1, first.incr);
    assert_eq!(2, second.incr);
    assert!(second.physical_offset > first.physical_offset);

    // Empty keys never reach the store.
    assert!(matches!(
        leader.increment("", "x").await,
        Err(IncrementError::Rejected(_))
    ));

    Ok(())
}

#[tokio::test]
async fn followers_replicate_leader_writes() -> Result<(), Box<dyn Error>> {
    let nodes = start_cluster(17300).await?;
    let leader_sid = wait_for_stable_leader(&nodes, Duration::from_secs(10)).await;

    let leader = &nodes[&leader_sid];
    for _ in 0..5 {
        leader.increment("invoice", "INV-#incr").await?;
    }
    let removed = leader.remove("invoice").await?;
    assert_eq!(quorum::RecordStatus::Deleted, removed.status);
    assert_eq!(5, removed.incr);
    let last = leader.increment("order", "ORD-#incr").await?;

    for (sid, node) in nodes.iter() {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let replicated = node.lookup("order").await?;
            if replicated.as_ref() == Some(&last) {
                break;
            }
            assert!(Instant::now() < deadline, "Node {} never caught up: {:?}", sid, replicated);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        // Tombstoned on every replica.
        assert_eq!(None, node.lookup("invoice").await?);
    }

    Ok(())
}

#[tokio::test]
async fn route_client_discovers_cluster_and_increments() -> Result<(), Box<dyn Error>> {
    let port_base = 17500;
    let nodes = start_cluster(port_base).await?;
    let leader_sid = wait_for_stable_leader(&nodes, Duration::from_secs(10)).await;

    let bootstrap = (1..=NUM_MEMBERS)
        .map(|sid| client_addr(port_base, sid).to_string())
        .collect::<Vec<_>>()
        .join(",");
    let client = quorum::RouteClient::new(quorum::RouteClientConfig {
        cluster_name: "integration".to_string(),
        bootstrap,
        strategy: None,
        request_timeout: Some(Duration::from_millis(500)),
        info_logger: create_root_logger_for_stdout("client".to_string()),
    })?;

    let record = client.increment("order", "ORD-#incr", 10).await?;
    assert_eq!(1, record.incr);
    assert_eq!(Some(client_addr(port_base, leader_sid).to_string()), client.maintainer());

    // Followers register as learners once they ack the leader.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let route = client.refresh_route(3).await?;
        if route.learners.len() == (NUM_MEMBERS - 1) as usize {
            assert!(route.learners.keys().all(|sid| sid.as_u32() != leader_sid));
            assert_eq!("roundrobin", route.strategy);
            break;
        }
        assert!(Instant::now() < deadline, "Learners never registered: {:?}", route);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let _heartbeat = client.spawn_heartbeat(Duration::from_millis(200));
    assert!(matches!(
        client.increment("", "ORD-#incr", 5).await,
        Err(quorum::ClientError::Rejected(_))
    ));

    Ok(())
}

#[tokio::test]
async fn election_events_are_published() -> Result<(), Box<dyn Error>> {
    let nodes = start_cluster(17700).await?;
    let mut listener = nodes[&1].event_listener();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let event = tokio::time::timeout_at(deadline, listener.next_event())
            .await
            .expect("Timeout waiting for leader election")
            .expect("Expected election event bus to be alive");

        match event {
            NodeEvent::Election(ElectionEvent::Leading) => break,
            NodeEvent::Election(ElectionEvent::Following { leader_sid, .. }) => {
                assert_ne!(1, leader_sid);
                break;
            }
            NodeEvent::Election(ElectionEvent::Searching) => { /* Continue */ }
        }
    }

    // Dropping every handle shuts the nodes down, which closes the event bus.
    drop(nodes);
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while listener.next_event().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok());

    Ok(())
}

async fn start_cluster(port_base: u16) -> Result<HashMap<u32, NodeHandle>, quorum::NodeCreationError> {
    let mut nodes = HashMap::new();
    for sid in 1..=NUM_MEMBERS {
        let node = quorum::start_node(config(sid, port_base)).await?;
        nodes.insert(sid, node);
    }
    Ok(nodes)
}

fn config(my_sid: u32, port_base: u16) -> quorum::NodeConfig {
    let members = (1..=NUM_MEMBERS).map(|sid| member_info(port_base, sid)).collect();

    quorum::NodeConfig {
        cluster_name: "integration".to_string(),
        my_sid,
        members,
        info_logger: create_root_logger_for_stdout(format!("node-{}", my_sid)),
        options: quorum::NodeOptions {
            heartbeat_interval: Some(Duration::from_millis(50)),
            leader_liveness_min_timeout: Some(Duration::from_millis(400)),
            leader_liveness_max_timeout: Some(Duration::from_millis(800)),
            election_retry_interval: Some(Duration::from_millis(100)),
            ..quorum::NodeOptions::default()
        },
    }
}

fn member_info(port_base: u16, sid: u32) -> quorum::MemberInfo {
    quorum::MemberInfo {
        sid,
        ip_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        quorum_port: port_base + sid as u16,
        client_port: port_base + 50 + sid as u16,
        weight: None,
    }
}

fn client_addr(port_base: u16, sid: u32) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port_base + 50 + sid as u16)
}

// Returns the leader once every node agrees on it.
async fn wait_for_stable_leader(nodes: &HashMap<u32, NodeHandle>, timeout: Duration) -> u32 {
    let deadline = Instant::now() + timeout;

    loop {
        let states: Vec<(u32, ElectionEvent)> = nodes
            .iter()
            .map(|(sid, node)| (*sid, node.event_listener().current_election_state()))
            .collect();

        let leader = states.iter().find_map(|(sid, state)| match state {
            ElectionEvent::Leading => Some(*sid),
            _ => None,
        });
        if let Some(leader_sid) = leader {
            let agreed = states.iter().all(|(sid, state)| match state {
                ElectionEvent::Leading => *sid == leader_sid,
                ElectionEvent::Following { leader_sid: followed, .. } => *followed == leader_sid,
                ElectionEvent::Searching => false,
            });
            if agreed {
                return leader_sid;
            }
        }

        assert!(Instant::now() < deadline, "Timeout waiting for leader election: {:?}", states);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn create_root_logger_for_stdout(node_name: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Node" => node_name))
}
