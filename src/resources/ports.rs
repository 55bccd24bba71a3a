//! Host port availability

use std::collections::BTreeSet;
use std::net::TcpListener;

/// Answers whether a port is free on the host
pub trait PortProbe: Send + Sync {
    fn is_free(&self, port: u16) -> bool;
}

const TCP_TABLES: [&str; 2] = ["/proc/net/tcp", "/proc/net/tcp6"];
const UDP_TABLES: [&str; 2] = ["/proc/net/udp", "/proc/net/udp6"];

/// `st` column value of a listening TCP socket
const TCP_LISTEN: &str = "0A";

/// Inspects the kernel socket tables for TCP listeners and bound UDP sockets
///
/// Falls back to [`BindProbe`] where `/proc/net` cannot be read.
pub struct ListeningProbe;

impl ListeningProbe {
    /// Ports in use, or `None` when no socket table is readable
    fn occupied_ports() -> Option<BTreeSet<u16>> {
        let mut readable = false;
        let mut ports = BTreeSet::new();

        for (tables, listen_only) in [(TCP_TABLES, true), (UDP_TABLES, false)] {
            for table in tables {
                let Ok(contents) = std::fs::read_to_string(table) else {
                    continue;
                };
                readable = true;
                ports.extend(local_ports(&contents, listen_only));
            }
        }

        readable.then_some(ports)
    }
}

impl PortProbe for ListeningProbe {
    fn is_free(&self, port: u16) -> bool {
        if port == 0 {
            return false;
        }
        match Self::occupied_ports() {
            Some(occupied) => !occupied.contains(&port),
            None => BindProbe.is_free(port),
        }
    }
}

/// Local ports of the rows of a `/proc/net/{tcp,udp}*` table
///
/// With `listen_only`, rows not in the LISTEN state are skipped.
pub(crate) fn local_ports(contents: &str, listen_only: bool) -> impl Iterator<Item = u16> + '_ {
    contents.lines().skip(1).filter_map(move |line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let local = fields.get(1)?;
        let state = fields.get(3)?;
        if listen_only && !state.eq_ignore_ascii_case(TCP_LISTEN) {
            return None;
        }
        let (_, port) = local.rsplit_once(':')?;
        u16::from_str_radix(port, 16).ok()
    })
}

/// Treats a port as free when a listener can bind it on all interfaces
pub struct BindProbe;

impl PortProbe for BindProbe {
    fn is_free(&self, port: u16) -> bool {
        // port 0 would bind an ephemeral port, which says nothing about port 0
        port != 0 && TcpListener::bind(("0.0.0.0", port)).is_ok()
    }
}
