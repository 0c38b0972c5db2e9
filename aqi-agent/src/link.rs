// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Host network link
//!
//! A Linux host is already associated by its own network stack. Association
//! is confirmed once by a TCP probe to the broker address; after that the
//! link stays up while the host still has a route to it, which costs no
//! traffic. Signal strength comes from `/proc/net/wireless` when a wireless
//! interface exists.

use aqi_station::{Credentials, NetworkLink};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default location of the wireless statistics table
pub const WIRELESS_STATS: &str = "/proc/net/wireless";

/// [`NetworkLink`] that probes the broker over TCP
pub struct HostLink {
    target: String,
    probe_timeout: Duration,
    wireless_stats: PathBuf,
    resolved: Option<SocketAddr>,
    associated: bool,
}

impl HostLink {
    /// Probe `host:port` with the given timeout per attempt
    pub fn new(host: &str, port: u16, probe_timeout: Duration) -> Self {
        Self {
            target: format!("{}:{}", host, port),
            probe_timeout,
            wireless_stats: PathBuf::from(WIRELESS_STATS),
            resolved: None,
            associated: false,
        }
    }

    /// Read signal strength from another statistics file
    pub fn with_wireless_stats(mut self, path: impl Into<PathBuf>) -> Self {
        self.wireless_stats = path.into();
        self
    }

    fn resolve(&mut self) -> Option<SocketAddr> {
        if self.resolved.is_none() {
            self.resolved = self
                .target
                .to_socket_addrs()
                .ok()
                .and_then(|mut addrs| addrs.next());
        }
        self.resolved
    }

    /// Local socket address the host would use to reach the broker.
    /// Connecting a UDP socket only selects a route; nothing is sent.
    fn route(&self) -> Option<SocketAddr> {
        let addr = self.resolved?;
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).ok()?;
        socket.connect(addr).ok()?;
        socket.local_addr().ok()
    }

    fn probe(&mut self) -> bool {
        let Some(addr) = self.resolve() else {
            debug!("[link] cannot resolve {}", self.target);
            return false;
        };
        match TcpStream::connect_timeout(&addr, self.probe_timeout) {
            Ok(_) => true,
            Err(e) => {
                debug!("[link] probe {} failed: {}", addr, e);
                false
            }
        }
    }
}

impl NetworkLink for HostLink {
    fn begin(&mut self, credentials: &Credentials) {
        info!("[link] using host network (ssid '{}' ignored)", credentials.ssid);
        // Re-resolve on every association, DNS may have changed
        self.resolved = None;
        self.associated = false;
    }

    fn is_associated(&mut self) -> bool {
        if self.associated {
            if self.route().is_none() {
                debug!("[link] no route to {}", self.target);
                self.associated = false;
            }
            return self.associated;
        }
        self.associated = self.probe();
        self.associated
    }

    fn signal_strength(&self) -> Option<i32> {
        read_signal_level(&self.wireless_stats)
    }

    fn local_address(&self) -> Option<String> {
        self.route().map(|a| a.ip().to_string())
    }
}

/// Signal level (dBm) of the first interface in a wireless stats file
pub fn read_signal_level(path: &Path) -> Option<i32> {
    let table = std::fs::read_to_string(path).ok()?;
    parse_signal_level(&table)
}

/// Parse the `level` column of `/proc/net/wireless`
pub fn parse_signal_level(table: &str) -> Option<i32> {
    table
        .lines()
        .skip(2)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _iface = columns.next()?;
            let _status = columns.next()?;
            let _link = columns.next()?;
            let level = columns.next()?;
            level.trim_end_matches('.').parse::<f32>().ok()
        })
        .map(|level| level as i32)
        .next()
}
