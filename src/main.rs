use quorum::{ElectionEvent, MemberInfo, NodeConfig, NodeEvent, NodeOptions, RouteClient, RouteClientConfig};
use slog::Drain;
use std::error::Error;
use std::net::{IpAddr, Ipv4Addr};
use tokio::time::Duration;

const CLUSTER_NAME: &str = "helloworld";
const QUORUM_PORT_BASE: u16 = 7100;
const CLIENT_PORT_BASE: u16 = 8100;

// Runs a three member cluster in process, then draws a few IDs through the route client.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger();
    let members = fake_cluster_members(3);

    let mut nodes = Vec::with_capacity(members.len());
    for member in members.iter() {
        let node = quorum::start_node(NodeConfig {
            cluster_name: CLUSTER_NAME.to_string(),
            my_sid: member.sid,
            members: members.clone(),
            info_logger: logger.new(slog::o!("Sid" => member.sid)),
            options: NodeOptions::default(),
        })
        .await?;
        nodes.push(node);
    }

    let mut events = nodes[0].event_listener();
    while let Some(NodeEvent::Election(event)) = events.next_event().await {
        slog::info!(logger, "Member 1 election state: {:?}", event);
        if event != ElectionEvent::Searching {
            break;
        }
    }

    let bootstrap = members
        .iter()
        .map(|member| format!("{}:{}", member.ip_addr, member.client_port))
        .collect::<Vec<_>>()
        .join(",");
    let client = RouteClient::new(RouteClientConfig {
        cluster_name: CLUSTER_NAME.to_string(),
        bootstrap,
        strategy: None,
        request_timeout: Some(Duration::from_secs(1)),
        info_logger: logger.new(slog::o!("Role" => "client")),
    })?;

    for _ in 0..3 {
        let record = client.increment("order", "ORD-#incr", 20).await?;
        slog::info!(logger, "Drew {} #{} at offset {}", record.key, record.incr, record.physical_offset);
    }
    slog::info!(logger, "Route: maintainer {:?}, learners {:?}", client.maintainer(), client.learners());

    Ok(())
}

fn fake_cluster_members(num_members: u32) -> Vec<MemberInfo> {
    (1..=num_members)
        .map(|sid| MemberInfo {
            sid,
            ip_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            quorum_port: QUORUM_PORT_BASE + sid as u16,
            client_port: CLIENT_PORT_BASE + sid as u16,
            weight: None,
        })
        .collect()
}

fn create_root_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
