// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::net::SocketAddr;

/// Transport protocol a message was received on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Udp,
    Tcp,
    Tls,
    Sctp,
}

impl TransportKind {
    /// Returns `true` for reliable transports (TCP/TLS/SCTP).
    pub fn is_reliable(self) -> bool {
        !matches!(self, TransportKind::Udp)
    }

    /// Returns `true` for unreliable transports (UDP).
    pub fn is_unreliable(self) -> bool {
        matches!(self, TransportKind::Udp)
    }

    /// Returns the transport token as used in Via headers.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Udp => "UDP",
            TransportKind::Tcp => "TCP",
            TransportKind::Tls => "TLS",
            TransportKind::Sctp => "SCTP",
        }
    }
}

/// Where a message came from, so responses can be routed back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportContext {
    pub kind: TransportKind,
    pub peer: SocketAddr,
}

impl TransportContext {
    /// Creates a transport context for the given transport and peer address.
    pub fn new(kind: TransportKind, peer: SocketAddr) -> Self {
        Self { kind, peer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reliability_split() {
        assert!(TransportKind::Udp.is_unreliable());
        assert!(TransportKind::Tcp.is_reliable());
        assert!(TransportKind::Tls.is_reliable());
        assert!(TransportKind::Sctp.is_reliable());
    }
}
