//! Socket, port, interface and node permissions.
//!
//! A network resource names an address family, socket type, protocol and
//! port in any combination. It is first reduced to the kernel socket
//! classes it can refer to; every class then gets its lifecycle rule plus
//! whatever port, interface and node rules apply.

use crate::allocator::AppItem;
use crate::context::{FileClass, Protocol};
use crate::error::{CompileError, Result, Scope};
use crate::project::{NetResource, Permission};
use crate::rule::{build, AvcRule, Rule};

use super::{push_unique, require_nonempty, Generator};

/// Actions a network permission may request.
pub const ACTIONS: [&str; 6] = ["receive", "send", "connect", "bind", "accept", "listen"];

const INET_SOCKETS: [&str; 6] = [
    "tcp_socket",
    "udp_socket",
    "dccp_socket",
    "sctp_socket",
    "icmp_socket",
    "rawip_socket",
];

const NETLINK_SOCKETS: [&str; 18] = [
    "netlink_route_socket",
    "netlink_firewall_socket",
    "netlink_tcpdiag_socket",
    "netlink_nflog_socket",
    "netlink_selinux_socket",
    "netlink_audit_socket",
    "netlink_ip6fw_socket",
    "netlink_dnrt_socket",
    "netlink_kobject_uevent_socket",
    "netlink_iscsi_socket",
    "netlink_fib_lookup_socket",
    "netlink_connector_socket",
    "netlink_netfilter_socket",
    "netlink_generic_socket",
    "netlink_scsitransport_socket",
    "netlink_rdma_socket",
    "netlink_crypto_socket",
    "netlink_socket",
];

const UNIX_SOCKETS: [&str; 2] = ["unix_stream_socket", "unix_dgram_socket"];

/// Netlink sockets whose receive and send also read netlink messages.
const NLMSG_SOCKETS: [&str; 6] = [
    "netlink_route_socket",
    "netlink_firewall_socket",
    "netlink_tcpdiag_socket",
    "netlink_xfrm_socket",
    "netlink_audit_socket",
    "netlink_ip6fw_socket",
];

const BASE_SOCKET_PERMS: [&str; 11] = [
    "create", "lock", "read", "write", "getattr", "setattr", "getopt", "setopt", "append",
    "shutdown", "ioctl",
];

/// Families with exactly one socket class named after them.
fn family_socket(domain: &str) -> Option<&'static str> {
    let class = match domain {
        "ax25" => "ax25_socket",
        "ipx" => "ipx_socket",
        "appletalk" => "appletalk_socket",
        "netrom" => "netrom_socket",
        "bridge" => "bridge_socket",
        "atmpvc" => "atmpvc_socket",
        "x25" => "x25_socket",
        "rose" => "rose_socket",
        "decnet" => "decnet_socket",
        "packet" => "packet_socket",
        "atmsvc" => "atmsvc_socket",
        "irda" => "irda_socket",
        "pppox" => "pppox_socket",
        "bluetooth" => "bluetooth_socket",
        "rds" => "rds_socket",
        "llc" => "llc_socket",
        "can" => "can_socket",
        "tipc" => "tipc_socket",
        "iucv" => "iucv_socket",
        "rxrpc" => "rxrpc_socket",
        "isdn" => "isdn_socket",
        "phonet" => "phonet_socket",
        "ieee802154" => "ieee802154_socket",
        "caif" => "caif_socket",
        "alg" => "alg_socket",
        "nfc" => "nfc_socket",
        "vsock" => "vsock_socket",
        "mpls" => "mpls_socket",
        "ib" => "ib_socket",
        "smc" => "smc_socket",
        _ => return None,
    };
    Some(class)
}

fn inet_sockets(socket_type: &str, protocol: &str) -> Vec<&'static str> {
    if socket_type.is_empty() && protocol.is_empty() {
        return INET_SOCKETS.to_vec();
    }
    if protocol.is_empty() {
        return match socket_type {
            "stream" => vec!["tcp_socket", "sctp_socket"],
            "dgram" => vec!["udp_socket"],
            "seqpacket" => vec!["sctp_socket"],
            "raw" => vec!["rawip_socket", "icmp_socket", "sctp_socket"],
            _ => Vec::new(),
        };
    }
    match protocol {
        "tcp" => vec!["tcp_socket"],
        "udp" => vec!["udp_socket"],
        "dccp" => vec!["dccp_socket"],
        "sctp" => vec!["sctp_socket", "rawip_socket"],
        "icmp" => vec!["icmp_socket", "rawip_socket"],
        _ => Vec::new(),
    }
}

fn netlink_sockets(protocol: &str) -> Vec<&'static str> {
    if protocol.is_empty() {
        return NETLINK_SOCKETS.to_vec();
    }
    // `netlink_socket` is the generic fallback, not a protocol.
    NETLINK_SOCKETS
        .iter()
        .filter(|s| **s != "netlink_socket")
        .find(|s| s.strip_prefix("netlink_").and_then(|r| r.strip_suffix("_socket")) == Some(protocol))
        .map(|s| vec![*s])
        .unwrap_or_default()
}

fn unix_sockets(socket_type: &str) -> Vec<&'static str> {
    match socket_type {
        "" => UNIX_SOCKETS.to_vec(),
        "stream" => vec!["unix_stream_socket"],
        "dgram" => vec!["unix_dgram_socket"],
        _ => Vec::new(),
    }
}

/// Socket classes a network resource can refer to. An explicit family
/// decides alone; otherwise the classes implied by type and protocol are
/// combined.
pub fn socket_classes(res: &NetResource) -> Vec<&'static str> {
    let mut classes = match res.domain.as_str() {
        "inet" | "inet6" => inet_sockets(&res.socket_type, &res.protocol),
        "netlink" => netlink_sockets(&res.protocol),
        "unix" => unix_sockets(&res.socket_type),
        "" if !res.socket_type.is_empty() => {
            let mut all = inet_sockets(&res.socket_type, &res.protocol);
            all.extend(unix_sockets(&res.socket_type));
            all
        }
        "" if !res.protocol.is_empty() => {
            let mut all = inet_sockets(&res.socket_type, &res.protocol);
            all.extend(netlink_sockets(&res.protocol));
            all
        }
        "" => Vec::new(),
        other => family_socket(other).into_iter().collect(),
    };
    let mut seen = Vec::with_capacity(classes.len());
    classes.retain(|c| {
        let fresh = !seen.contains(c);
        seen.push(*c);
        fresh
    });
    classes
}

// ---------------------------------------------------------------------------
// Per-class rules
// ---------------------------------------------------------------------------

fn socket_perms(socket: &str, actions: &[String]) -> Vec<String> {
    let nlmsg = NLMSG_SOCKETS.contains(&socket);
    let mut perms = Vec::new();
    for action in actions {
        let extra: &[&str] = match action.as_str() {
            "accept" => &["accept"],
            "connect" => &["connect"],
            "bind" => &["bind"],
            "listen" => &["listen"],
            "receive" if nlmsg => &["recvfrom", "nlmsg_read"],
            "receive" => &["recvfrom"],
            "send" if nlmsg => &["sendto", "nlmsg_read"],
            "send" => &["sendto"],
            _ => &[],
        };
        push_unique(&mut perms, extra);
    }
    push_unique(&mut perms, &BASE_SOCKET_PERMS);
    perms
}

fn port_perms(socket: &str, actions: &[String]) -> Vec<String> {
    let connects = matches!(socket, "tcp_socket" | "dccp_socket" | "sctp_socket");
    let mut perms = Vec::new();
    for action in actions {
        let extra: &[&str] = match action.as_str() {
            "bind" => &["name_bind", "node_bind"],
            "connect" if connects => &["name_connect"],
            "receive" => &["recv_msg"],
            "send" => &["send_msg"],
            _ => &[],
        };
        push_unique(&mut perms, extra);
    }
    perms
}

/// Interface (`netif`) or node permissions for the packet-level checks of
/// `socket`, given the two per-action leading permissions.
fn packet_perms(
    socket: &str,
    actions: &[String],
    recv: [&str; 2],
    send: [&str; 2],
) -> Vec<String> {
    let Some(proto) = socket
        .strip_suffix("_socket")
        .filter(|p| matches!(*p, "tcp" | "udp" | "dccp" | "rawip"))
    else {
        return Vec::new();
    };
    let mut perms = Vec::new();
    let (recv_tag, send_tag) = (format!("{proto}_recv"), format!("{proto}_send"));
    for action in actions {
        match action.as_str() {
            "receive" => push_unique(&mut perms, &[recv[0], recv[1], recv_tag.as_str()]),
            "send" => push_unique(&mut perms, &[send[0], send[1], send_tag.as_str()]),
            _ => {}
        }
    }
    perms
}

fn socket_rules(domain: &str, socket: &str, actions: &[String]) -> Vec<Rule> {
    let mut rules: Vec<Rule> = Vec::new();

    if INET_SOCKETS.contains(&socket) {
        rules.extend(build::file_allow(
            domain,
            "sysctl_net_t",
            FileClass::Dir,
            &["search".to_owned()],
        ));
        rules.extend(build::file_allow(
            domain,
            "sysctl_net_t",
            FileClass::File,
            &["getattr".to_owned(), "read".to_owned(), "open".to_owned()],
        ));
    }

    rules.push(AvcRule::allow(domain, domain, socket, socket_perms(socket, actions)).into());

    let netif = packet_perms(socket, actions, ["egress", "ingress"], ["egress", "ingress"]);
    if !netif.is_empty() {
        rules.push(AvcRule::allow(domain, "netif_type", "netif", netif).into());
    }

    let node = packet_perms(socket, actions, ["enforce_dest", "recvfrom"], ["enforce_dest", "sendto"]);
    if !node.is_empty() {
        rules.push(AvcRule::allow(domain, "node_type", "node", node).into());
    }
    if INET_SOCKETS.contains(&socket) {
        rules.push(AvcRule::allow(domain, "node_type", socket, ["node_bind"]).into());
    }

    if socket == "unix_stream_socket" {
        rules.push(AvcRule::allow(domain, "domain", socket, ["connectto"]).into());
    }
    rules
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub(super) fn rules(gen: &Generator<'_>, app: &AppItem, perm: &Permission) -> Result<Vec<Rule>> {
    require_nonempty(perm, true)?;
    if let Some(bad) = perm.actions.iter().find(|a| !ACTIONS.contains(&a.as_str())) {
        return Err(CompileError::InvalidPermission(format!(
            "invalid socket action {bad}"
        )));
    }

    let mut rules = Vec::new();
    let mut sockets: Vec<&'static str> = Vec::new();

    for line in &perm.resources {
        let res = NetResource::parse(line).scoped(|| format!("network resource {line}"))?;
        let classes = socket_classes(&res);
        if classes.is_empty() {
            gen.diagnostics
                .warn(format!("network resource {line} matches no socket class; skipped"));
            continue;
        }

        for socket in &classes {
            let Some(protocol) = Protocol::for_socket(socket) else {
                continue;
            };
            let port_type = match res.port {
                0 => None,
                port => gen.catalog.lookup_port(port, protocol),
            }
            .map_or("port_type", |pc| pc.context.type_name.as_str());

            let perms = port_perms(socket, &perm.actions);
            if !perms.is_empty() {
                rules.push(AvcRule::allow(&app.domain, port_type, socket, perms).into());
            }
        }
        sockets.extend(classes);
    }

    for socket in sockets {
        rules.extend(socket_rules(&app.domain, socket, &perm.actions));
    }
    Ok(rules)
}
