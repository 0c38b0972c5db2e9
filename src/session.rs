// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Messaging session manager
//!
//! The broker session is layered on the network link. It is only
//! meaningful while the link is up, and it is bound to the link epoch it
//! was established on: once the link drops and comes back, the session
//! runs the full connect, subscribe, announce sequence again instead of
//! assuming the old session survived.

use crate::config::{BrokerConfig, StationConfig, TopicConfig};
use crate::error::{BrokerError, ConnectError, PublishError};
use crate::network::{ConnectionState, NetworkLink, NetworkManager};
use log::{info, warn};
use std::time::Duration;

/// Literal payload announcing presence on the status topic
pub const PRESENCE_ONLINE: &str = "online";

/// Parameters for one broker connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Client identifier
    pub client_id: String,
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// User name
    pub username: String,
    /// Password
    pub password: String,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Upper bound on the attempt
    pub connect_timeout: Duration,
}

impl SessionOptions {
    /// Build options for a station
    pub fn new(client_id: impl Into<String>, broker: &BrokerConfig) -> Self {
        Self {
            client_id: client_id.into(),
            host: broker.host.clone(),
            port: broker.port,
            username: broker.username.clone(),
            password: broker.password.clone(),
            keep_alive: Duration::from_secs(broker.keep_alive_secs),
            connect_timeout: broker.connect_timeout(),
        }
    }
}

/// Message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic it arrived on
    pub topic: String,
    /// Raw payload
    pub payload: Vec<u8>,
}

/// Black-box publish/subscribe client
///
/// Every call must be bounded: `connect` by its timeout, `poll` by its
/// budget, and `subscribe`/`publish` must not wait on the network.
pub trait BrokerClient {
    /// Open a session; returns once the broker accepted or refused it
    fn connect(&mut self, options: &SessionOptions) -> Result<(), BrokerError>;

    /// Whether the client still holds a live session
    fn is_connected(&self) -> bool;

    /// Subscribe to a topic
    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    /// Publish a payload
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Service the connection for up to `budget`, returning inbound messages.
    ///
    /// An error means the session is gone.
    fn poll(&mut self, budget: Duration) -> Result<Vec<InboundMessage>, BrokerError>;

    /// Drop the session
    fn disconnect(&mut self);
}

impl<B: BrokerClient + ?Sized> BrokerClient for Box<B> {
    fn connect(&mut self, options: &SessionOptions) -> Result<(), BrokerError> {
        (**self).connect(options)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        (**self).subscribe(topic)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        (**self).publish(topic, payload)
    }

    fn poll(&mut self, budget: Duration) -> Result<Vec<InboundMessage>, BrokerError> {
        (**self).poll(budget)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}

/// Manages the broker session on top of the network link
pub struct SessionManager<B> {
    client: B,
    options: SessionOptions,
    topics: TopicConfig,
    poll_budget: Duration,
    state: ConnectionState,
    bound_epoch: Option<u64>,
    connects: u64,
}

impl<B: BrokerClient> SessionManager<B> {
    /// Create a manager from station configuration
    pub fn new(client: B, config: &StationConfig) -> Self {
        Self {
            client,
            options: SessionOptions::new(&config.station.id, &config.broker),
            topics: config.topics.clone(),
            poll_budget: config.broker.poll_budget(),
            state: ConnectionState::Disconnected,
            bound_epoch: None,
            connects: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of successful connect sequences
    pub fn connect_count(&self) -> u64 {
        self.connects
    }

    /// Topic configuration
    pub fn topics(&self) -> &TopicConfig {
        &self.topics
    }

    /// Access the underlying client
    pub fn client(&self) -> &B {
        &self.client
    }

    /// Mutable access to the underlying client
    pub fn client_mut(&mut self) -> &mut B {
        &mut self.client
    }

    /// Whether the session is usable right now
    pub fn is_connected(&self) -> bool {
        self.state.is_connected() && self.client.is_connected()
    }

    /// Bring the session up.
    ///
    /// Requires the network to be connected. No-op when the session is
    /// connected on the current link epoch. Otherwise makes one connect
    /// attempt, then subscribes to the control topics and announces
    /// presence; both steps run on every (re)connect.
    pub fn ensure_connected<L: NetworkLink>(
        &mut self,
        network: &NetworkManager<L>,
    ) -> Result<(), ConnectError> {
        if !network.state().is_connected() {
            self.invalidate();
            return Err(ConnectError::NetworkDown);
        }

        if self.state.is_connected()
            && self.bound_epoch == Some(network.epoch())
            && self.client.is_connected()
        {
            return Ok(());
        }

        if self.state.is_connected() {
            info!("[session] link changed under session, reconnecting");
            self.client.disconnect();
        }

        info!(
            "[session] connecting to {}:{}",
            self.options.host, self.options.port
        );
        self.state = ConnectionState::Connecting;

        if let Err(e) = self.client.connect(&self.options) {
            self.state = ConnectionState::Disconnected;
            warn!("[session] connect failed (rc={})", e.state_code());
            return Err(match e {
                BrokerError::Refused(code) => ConnectError::BrokerRefused { code },
                other => ConnectError::Transport(other),
            });
        }

        if let Err(e) = self.establish() {
            self.client.disconnect();
            self.state = ConnectionState::Disconnected;
            warn!("[session] setup failed: {}", e);
            return Err(e);
        }

        self.state = ConnectionState::Connected;
        self.bound_epoch = Some(network.epoch());
        self.connects += 1;
        info!("[session] connected");
        Ok(())
    }

    /// Subscribe to control topics and announce presence
    fn establish(&mut self) -> Result<(), ConnectError> {
        for topic in self.topics.control_topics() {
            self.client
                .subscribe(topic)
                .map_err(|e| ConnectError::Setup {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
        }

        let status = &self.topics.status;
        self.client
            .publish(status, PRESENCE_ONLINE.as_bytes())
            .map_err(|e| ConnectError::Setup {
                topic: status.clone(),
                reason: e.to_string(),
            })
    }

    /// Drop to `Disconnected`, e.g. because the link went down
    pub fn invalidate(&mut self) {
        if self.state != ConnectionState::Disconnected {
            info!("[session] invalidated");
            self.client.disconnect();
        }
        self.state = ConnectionState::Disconnected;
        self.bound_epoch = None;
    }

    /// Service the session and log inbound control messages.
    ///
    /// Messages are only logged; no command is executed. Returns the number
    /// of messages received.
    pub fn service(&mut self) -> usize {
        if !self.state.is_connected() {
            return 0;
        }
        match self.client.poll(self.poll_budget) {
            Ok(messages) => {
                for msg in &messages {
                    info!(
                        "[session] message on {} ({} bytes)",
                        msg.topic,
                        msg.payload.len()
                    );
                }
                messages.len()
            }
            Err(e) => {
                warn!("[session] connection lost: {}", e);
                self.invalidate();
                0
            }
        }
    }

    /// Publish on a topic through the live session
    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }
        self.client.publish(topic, payload)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::NetworkConfig;
    use crate::network::tests::MockLink;

    /// Broker client recording every call
    #[derive(Debug, Default)]
    pub(crate) struct MockBroker {
        pub connected: bool,
        pub refuse_with: Option<i32>,
        pub fail_subscribe: bool,
        pub fail_publish: bool,
        pub connects: u32,
        pub subscriptions: Vec<String>,
        pub published: Vec<(String, Vec<u8>)>,
        pub inbound: Vec<InboundMessage>,
        pub drop_on_poll: bool,
    }

    impl BrokerClient for MockBroker {
        fn connect(&mut self, _options: &SessionOptions) -> Result<(), BrokerError> {
            self.connects += 1;
            if let Some(code) = self.refuse_with {
                return Err(BrokerError::Refused(code));
            }
            self.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
            if self.fail_subscribe {
                return Err(BrokerError::Request("subscribe refused".to_string()));
            }
            self.subscriptions.push(topic.to_string());
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
            if self.fail_publish {
                return Err(BrokerError::Request("queue full".to_string()));
            }
            self.published.push((topic.to_string(), payload.to_vec()));
            Ok(())
        }

        fn poll(&mut self, _budget: Duration) -> Result<Vec<InboundMessage>, BrokerError> {
            if self.drop_on_poll {
                self.connected = false;
                return Err(BrokerError::Disconnected {
                    reason: "eof".to_string(),
                });
            }
            Ok(std::mem::take(&mut self.inbound))
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }
    }

    fn station_config() -> StationConfig {
        StationConfig::default().finalize().unwrap()
    }

    fn connected_network() -> NetworkManager<MockLink> {
        let mut network = NetworkManager::new(
            MockLink::associating_after(1),
            &NetworkConfig::default(),
            ManualClock::new().shared(),
        );
        network.ensure_connected().unwrap();
        network
    }

    #[test]
    fn test_requires_network() {
        let network = NetworkManager::new(
            MockLink::never(),
            &NetworkConfig::default(),
            ManualClock::new().shared(),
        );
        let mut session = SessionManager::new(MockBroker::default(), &station_config());

        assert_eq!(session.ensure_connected(&network), Err(ConnectError::NetworkDown));
        assert_eq!(session.client().connects, 0);
    }

    #[test]
    fn test_connect_subscribes_and_announces() {
        let network = connected_network();
        let mut session = SessionManager::new(MockBroker::default(), &station_config());

        session.ensure_connected(&network).unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(
            session.client().subscriptions,
            vec!["aqi/STATION_001/config", "aqi/STATION_001/status"]
        );
        assert_eq!(
            session.client().published,
            vec![("aqi/STATION_001/status".to_string(), b"online".to_vec())]
        );
    }

    #[test]
    fn test_idempotent_when_connected() {
        let network = connected_network();
        let mut session = SessionManager::new(MockBroker::default(), &station_config());
        session.ensure_connected(&network).unwrap();

        session.ensure_connected(&network).unwrap();
        assert_eq!(session.client().connects, 1);
        assert_eq!(session.client().subscriptions.len(), 2);
        assert_eq!(session.connect_count(), 1);
    }

    #[test]
    fn test_refused_reports_code() {
        let network = connected_network();
        let broker = MockBroker {
            refuse_with: Some(5),
            ..Default::default()
        };
        let mut session = SessionManager::new(broker, &station_config());

        assert_eq!(
            session.ensure_connected(&network),
            Err(ConnectError::BrokerRefused { code: 5 })
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_setup_failure_leaves_disconnected() {
        let network = connected_network();
        let broker = MockBroker {
            fail_subscribe: true,
            ..Default::default()
        };
        let mut session = SessionManager::new(broker, &station_config());

        assert!(matches!(
            session.ensure_connected(&network),
            Err(ConnectError::Setup { .. })
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.client().connected);
    }

    #[test]
    fn test_network_drop_forces_full_sequence() {
        let mut network = connected_network();
        let mut session = SessionManager::new(MockBroker::default(), &station_config());
        session.ensure_connected(&network).unwrap();

        network.mark_down();
        network.link_mut().up = false;
        network.ensure_connected().unwrap();
        // Broker client never noticed the drop
        assert!(session.client().connected);

        session.ensure_connected(&network).unwrap();
        assert_eq!(session.client().connects, 2);
        assert_eq!(session.client().subscriptions.len(), 4);
        assert_eq!(session.client().published.len(), 2);
    }

    #[test]
    fn test_service_logs_and_counts() {
        let network = connected_network();
        let mut session = SessionManager::new(MockBroker::default(), &station_config());
        session.ensure_connected(&network).unwrap();

        session.client_mut().inbound.push(InboundMessage {
            topic: "aqi/STATION_001/config".to_string(),
            payload: b"{\"interval\":60}".to_vec(),
        });
        assert_eq!(session.service(), 1);
        assert_eq!(session.service(), 0);
    }

    #[test]
    fn test_service_error_invalidates() {
        let network = connected_network();
        let mut session = SessionManager::new(MockBroker::default(), &station_config());
        session.ensure_connected(&network).unwrap();

        session.client_mut().drop_on_poll = true;
        assert_eq!(session.service(), 0);
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_publish_requires_session() {
        let mut session = SessionManager::new(MockBroker::default(), &station_config());
        assert_eq!(
            session.publish("aqi/STATION_001/data", b"{}"),
            Err(PublishError::NotConnected)
        );
    }
}
