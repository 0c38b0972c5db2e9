// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Network link manager
//!
//! Owns the link state machine:
//!
//! ```text
//!  Disconnected ──ensure_connected──▶ Connecting ──associated──▶ Connected
//!        ▲                                │                         │
//!        └────────── attempt cap ─────────┘◀──── link lost ─────────┘
//! ```
//!
//! Each successful association starts a new link epoch. The session manager
//! compares epochs to notice that the link dropped underneath it.

use crate::clock::SharedClock;
use crate::config::NetworkConfig;
use crate::error::ConnectError;
use crate::retry::{poll_until, RetryStrategy};
use log::{info, warn};
use std::fmt;

/// State of a managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Connected and usable
    Connected,
}

impl ConnectionState {
    /// Check if the connection is usable
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Network credentials handed to the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Network name
    pub ssid: String,
    /// Passphrase
    pub password: String,
}

/// Black-box network interface
pub trait NetworkLink {
    /// Start associating with the network; returns immediately
    fn begin(&mut self, credentials: &Credentials);

    /// Whether the link is currently associated
    fn is_associated(&mut self) -> bool;

    /// Received signal strength (dBm), if the link reports one
    fn signal_strength(&self) -> Option<i32>;

    /// Local address, for logs
    fn local_address(&self) -> Option<String> {
        None
    }
}

impl<L: NetworkLink + ?Sized> NetworkLink for Box<L> {
    fn begin(&mut self, credentials: &Credentials) {
        (**self).begin(credentials)
    }

    fn is_associated(&mut self) -> bool {
        (**self).is_associated()
    }

    fn signal_strength(&self) -> Option<i32> {
        (**self).signal_strength()
    }

    fn local_address(&self) -> Option<String> {
        (**self).local_address()
    }
}

/// Manages the network link with bounded association polling
pub struct NetworkManager<L> {
    link: L,
    credentials: Credentials,
    retry: RetryStrategy,
    clock: SharedClock,
    state: ConnectionState,
    epoch: u64,
}

impl<L: NetworkLink> NetworkManager<L> {
    /// Create a manager from configuration
    pub fn new(link: L, config: &NetworkConfig, clock: SharedClock) -> Self {
        Self {
            link,
            credentials: Credentials {
                ssid: config.ssid.clone(),
                password: config.password.clone(),
            },
            retry: RetryStrategy::fixed(config.max_attempts, config.attempt_delay()),
            clock,
            state: ConnectionState::Disconnected,
            epoch: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Link epoch; increments on every successful association
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Signal strength of the link, when connected
    pub fn signal_strength(&self) -> Option<i32> {
        if self.state.is_connected() {
            self.link.signal_strength()
        } else {
            None
        }
    }

    /// Access the underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutable access to the underlying link
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Bring the link up.
    ///
    /// No-op when already connected. Otherwise starts association and polls
    /// up to the attempt cap; failure is non-fatal and leaves the state
    /// `Disconnected` for the next tick to retry.
    pub fn ensure_connected(&mut self) -> Result<(), ConnectError> {
        if self.state.is_connected() {
            return Ok(());
        }

        info!(
            "[net] connecting to '{}' (up to {} polls, {:?})",
            self.credentials.ssid,
            self.retry.max_attempts(),
            self.retry.worst_case_wait()
        );
        self.state = ConnectionState::Connecting;
        self.link.begin(&self.credentials);

        let link = &mut self.link;
        let outcome = poll_until(&self.retry, &*self.clock, || link.is_associated());

        if outcome.satisfied {
            self.state = ConnectionState::Connected;
            self.epoch += 1;
            info!(
                "[net] connected after {} polls (addr={}, rssi={})",
                outcome.attempts,
                self.link.local_address().as_deref().unwrap_or("?"),
                self.link
                    .signal_strength()
                    .map(|r| format!("{} dBm", r))
                    .unwrap_or_else(|| "n/a".to_string())
            );
            Ok(())
        } else {
            self.state = ConnectionState::Disconnected;
            warn!("[net] not associated after {} polls, will retry", outcome.attempts);
            Err(ConnectError::LinkTimeout {
                attempts: outcome.attempts,
            })
        }
    }

    /// Re-check link status; a lost link drops the state to `Disconnected`.
    ///
    /// Returns the state after the check.
    pub fn refresh(&mut self) -> ConnectionState {
        if self.state.is_connected() && !self.link.is_associated() {
            warn!("[net] connection lost");
            self.mark_down();
        }
        self.state
    }

    /// Force the state to `Disconnected`
    pub fn mark_down(&mut self) {
        self.state = ConnectionState::Disconnected;
    }
}
