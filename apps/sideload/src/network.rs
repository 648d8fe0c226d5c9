//! Local address discovery.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use anyhow::Context;

/// Public resolver used only to pick the outbound interface; nothing is sent.
const PROBE_ADDR: &str = "8.8.8.8:53";

/// Returns the address of the interface that routes to the internet,
/// falling back to the first LAN address.
pub fn detect_host_ip() -> anyhow::Result<IpAddr> {
    match outbound_ip() {
        Ok(ip) if !ip.is_unspecified() => Ok(ip),
        Ok(_) => fallback_ip(),
        Err(e) => {
            tracing::debug!(error = %e, "outbound address probe failed");
            fallback_ip()
        }
    }
}

fn outbound_ip() -> anyhow::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind socket for IP detection")?;
    socket
        .connect(PROBE_ADDR)
        .context("failed to connect socket for IP detection")?;
    let local_addr = socket.local_addr().context("failed to get local address")?;
    Ok(local_addr.ip())
}

fn fallback_ip() -> anyhow::Result<IpAddr> {
    local_ipv4_addrs()
        .into_iter()
        .next()
        .map(IpAddr::V4)
        .context("could not detect a LAN address; pass host_ip explicitly")
}

/// Returns local non-loopback IPv4 addresses, excluding link-local (169.254.x.x).
pub fn local_ipv4_addrs() -> Vec<Ipv4Addr> {
    let Ok(interfaces) = if_addrs::get_if_addrs() else {
        return Vec::new();
    };

    let mut ips = Vec::new();
    for iface in interfaces {
        if iface.is_loopback() {
            continue;
        }
        if let IpAddr::V4(ipv4) = iface.ip()
            && is_lan_candidate(ipv4)
            && !ips.contains(&ipv4)
        {
            ips.push(ipv4);
        }
    }
    ips
}

fn is_lan_candidate(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_link_local() && !ip.is_unspecified()
}
