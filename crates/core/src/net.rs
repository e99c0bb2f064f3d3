//! Network utilities: local-IP selection for display, and per-interface
//! broadcast address enumeration for UDP discovery.

use std::net::Ipv4Addr;

/// Picks a single IPv4 address to show the user as "this machine's
/// address", preferring RFC1918 ranges in the order `10/8`, `172.16/12`,
/// `192.168/16`, falling back to `0.0.0.0` if nothing non-loopback is
/// found.
pub fn local_ipv4() -> Ipv4Addr {
    let candidates = non_loopback_ipv4_addrs();

    if let Some(addr) = candidates.iter().find(|ip| ip.octets()[0] == 10) {
        return *addr;
    }
    if let Some(addr) = candidates
        .iter()
        .find(|ip| ip.octets()[0] == 172 && (16..=31).contains(&ip.octets()[1]))
    {
        return *addr;
    }
    if let Some(addr) = candidates
        .iter()
        .find(|ip| ip.octets()[0] == 192 && ip.octets()[1] == 168)
    {
        return *addr;
    }

    Ipv4Addr::new(0, 0, 0, 0)
}

/// Computes the broadcast address for every non-loopback IPv4 interface
/// (`ip | !netmask`, octet-wise), plus the universal `255.255.255.255`.
/// Deduplicated but otherwise unordered.
pub fn broadcast_addresses() -> Vec<Ipv4Addr> {
    let mut addrs: Vec<Ipv4Addr> = Vec::new();

    if let Ok(interfaces) = if_addrs::get_if_addrs() {
        for iface in interfaces {
            if iface.is_loopback() {
                continue;
            }
            if let if_addrs::IfAddr::V4(v4) = iface.addr {
                let ip = u32::from(v4.ip);
                let mask = u32::from(v4.netmask);
                let broadcast = Ipv4Addr::from(ip | !mask);
                if !addrs.contains(&broadcast) {
                    addrs.push(broadcast);
                }
            }
        }
    }

    let universal = Ipv4Addr::new(255, 255, 255, 255);
    if !addrs.contains(&universal) {
        addrs.push(universal);
    }

    addrs
}

fn non_loopback_ipv4_addrs() -> Vec<Ipv4Addr> {
    let mut addrs = Vec::new();
    if let Ok(interfaces) = if_addrs::get_if_addrs() {
        for iface in interfaces {
            if iface.is_loopback() {
                continue;
            }
            if let if_addrs::IfAddr::V4(v4) = iface.addr {
                addrs.push(v4.ip);
            }
        }
    }
    addrs
}
