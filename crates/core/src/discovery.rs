//! UDP broadcast discovery shared by both binaries: the wire shapes and
//! the server-side responder logic live here; the client-side prober
//! loop also lives here since it's pure socket + timeout plumbing with no
//! server-state dependency.

use crate::net::broadcast_addresses;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum DiscoveryMessage {
    #[serde(rename = "discover")]
    Discover { client_name: String },

    #[serde(rename = "serverInfo")]
    ServerInfo {
        name: String,
        ip: String,
        tcp_port: u16,
        udp_port: u16,
        clients: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    #[serde(flatten)]
    message: DiscoveryMessage,
    timestamp: i64,
}

/// One discovered server, deduplicated by source IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub name: String,
    pub ip: IpAddr,
    pub tcp_port: u16,
    pub udp_port: u16,
    pub clients: usize,
}

/// Binds `udp_port` and answers every `discover` datagram with
/// `serverInfo`, unicast to the sender. Runs until the socket errors or
/// the task is cancelled; intended to be `tokio::spawn`ed for the
/// server's lifetime.
pub async fn run_responder(
    socket: UdpSocket,
    server_name: String,
    tcp_port: u16,
    udp_port: u16,
    client_count: impl Fn() -> usize + Send + Sync + 'static,
) {
    let mut buf = [0u8; 2048];
    loop {
        let (n, src) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "discovery responder socket error");
                break;
            }
        };

        let Ok(envelope) = serde_json::from_slice::<Envelope>(&buf[..n]) else {
            tracing::debug!(%src, "discovery responder dropped unparseable datagram");
            continue;
        };

        if let DiscoveryMessage::Discover { client_name } = envelope.message {
            tracing::debug!(%src, %client_name, "discovery request received");
            let response = Envelope {
                message: DiscoveryMessage::ServerInfo {
                    name: server_name.clone(),
                    ip: crate::net::local_ipv4().to_string(),
                    tcp_port,
                    udp_port,
                    clients: client_count(),
                },
                timestamp: crate::protocol::unix_millis(),
            };
            if let Ok(bytes) = serde_json::to_vec(&response) {
                let _ = socket.send_to(&bytes, src).await;
            }
        }
    }
}

/// Probes every broadcast address plus `255.255.255.255` on `udp_port`,
/// collecting distinct `serverInfo` responses (deduplicated by source IP)
/// until `timeout` elapses — a fixed wall-clock window regardless of how
/// many responses arrive.
pub async fn discover_servers(udp_port: u16, client_name: &str, timeout: Duration) -> std::io::Result<Vec<DiscoveredServer>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;

    let request = Envelope {
        message: DiscoveryMessage::Discover {
            client_name: client_name.to_string(),
        },
        timestamp: crate::protocol::unix_millis(),
    };
    let bytes = serde_json::to_vec(&request).unwrap_or_default();

    for addr in broadcast_addresses() {
        let _ = socket.send_to(&bytes, SocketAddr::new(IpAddr::V4(addr), udp_port)).await;
    }

    let mut seen: HashMap<IpAddr, DiscoveredServer> = HashMap::new();
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 2048];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let recv = tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await;
        let Ok(Ok((n, src))) = recv else {
            break;
        };

        if let Ok(envelope) = serde_json::from_slice::<Envelope>(&buf[..n]) {
            if let DiscoveryMessage::ServerInfo {
                name,
                ip,
                tcp_port,
                udp_port,
                clients,
            } = envelope.message
            {
                seen.entry(src.ip()).or_insert(DiscoveredServer {
                    name,
                    ip: ip.parse().unwrap_or(src.ip()),
                    tcp_port,
                    udp_port,
                    clients,
                });
            }
        }
    }

    Ok(seen.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    #[tokio::test]
    async fn discovery_dedups_multiple_responses_from_same_ip() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let responder_port = responder.local_addr().unwrap().port();
        let responder = Arc::new(responder);

        let responder_task = {
            let responder = responder.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                for _ in 0..2 {
                    if let Ok((n, src)) = responder.recv_from(&mut buf).await {
                        let _ = serde_json::from_slice::<Envelope>(&buf[..n]);
                        let response = Envelope {
                            message: DiscoveryMessage::ServerInfo {
                                name: "H-SVSmate".into(),
                                ip: "127.0.0.1".into(),
                                tcp_port: 6789,
                                udp_port: responder_port,
                                clients: 0,
                            },
                            timestamp: 0,
                        };
                        let bytes = serde_json::to_vec(&response).unwrap();
                        let _ = responder.send_to(&bytes, src).await;
                    }
                }
            })
        };

        let prober = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        prober.set_broadcast(true).unwrap();
        let request = Envelope {
            message: DiscoveryMessage::Discover {
                client_name: "tester".into(),
            },
            timestamp: 0,
        };
        let bytes = serde_json::to_vec(&request).unwrap();
        // Send twice so the responder answers twice from the same IP.
        let dest: SocketAddr = (Ipv4Addr::LOCALHOST, responder_port).into();
        prober.send_to(&bytes, dest).await.unwrap();
        prober.send_to(&bytes, dest).await.unwrap();

        let mut seen: HashMap<IpAddr, DiscoveredServer> = HashMap::new();
        let deadline = Instant::now() + Duration::from_millis(500);
        let mut buf = [0u8; 2048];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Ok(Ok((n, src))) = tokio::time::timeout(remaining, prober.recv_from(&mut buf)).await else {
                break;
            };
            if let Ok(envelope) = serde_json::from_slice::<Envelope>(&buf[..n]) {
                if let DiscoveryMessage::ServerInfo { name, ip, tcp_port, udp_port, clients } = envelope.message {
                    seen.entry(src.ip()).or_insert(DiscoveredServer {
                        name, ip: ip.parse().unwrap_or(src.ip()), tcp_port, udp_port, clients,
                    });
                }
            }
        }

        responder_task.abort();
        assert_eq!(seen.len(), 1);
    }
}
