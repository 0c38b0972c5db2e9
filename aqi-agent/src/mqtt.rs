// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! MQTT broker client over `rumqttc`
//!
//! Uses the synchronous client. Requests (subscribe, publish) are queued
//! without waiting and go out the next time the connection is polled, so
//! the only blocking points are `connect` and `poll`, both bounded.

use aqi_station::{BrokerClient, BrokerError, InboundMessage, SessionOptions};
use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions, Packet, QoS,
    RecvTimeoutError,
};
use std::time::{Duration, Instant};
use tracing::debug;

/// Request queue depth between client and event loop
const REQUEST_CAPACITY: usize = 16;

/// CONNACK return code as its MQTT 3.1.1 numeric value
fn return_code(code: ConnectReturnCode) -> i32 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

struct Session {
    client: Client,
    connection: Connection,
}

/// [`BrokerClient`] backed by a `rumqttc` sync client
#[derive(Default)]
pub struct RumqttBroker {
    session: Option<Session>,
}

impl RumqttBroker {
    /// Create a client with no session
    pub fn new() -> Self {
        Self::default()
    }

    fn session_mut(&mut self) -> Result<&mut Session, BrokerError> {
        self.session.as_mut().ok_or_else(|| BrokerError::Disconnected {
            reason: "no session".to_string(),
        })
    }
}

impl BrokerClient for RumqttBroker {
    fn connect(&mut self, options: &SessionOptions) -> Result<(), BrokerError> {
        self.disconnect();

        let mut mqtt = MqttOptions::new(&options.client_id, &options.host, options.port);
        mqtt.set_keep_alive(options.keep_alive);
        mqtt.set_clean_session(true);
        if !options.username.is_empty() {
            mqtt.set_credentials(&options.username, &options.password);
        }

        let (client, mut connection) = Client::new(mqtt, REQUEST_CAPACITY);
        let started = Instant::now();

        loop {
            let remaining = options.connect_timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(BrokerError::Refused(return_code(ack.code)));
                    }
                    self.session = Some(Session { client, connection });
                    return Ok(());
                }
                Ok(Ok(event)) => debug!("[mqtt] {:?}", event),
                Ok(Err(ConnectionError::ConnectionRefused(code))) => {
                    return Err(BrokerError::Refused(return_code(code)));
                }
                Ok(Err(e)) => {
                    return Err(BrokerError::Disconnected {
                        reason: e.to_string(),
                    })
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(BrokerError::Disconnected {
                        reason: "event loop stopped".to_string(),
                    })
                }
            }
        }

        Err(BrokerError::Timeout {
            timeout_ms: options.connect_timeout.as_millis() as u64,
        })
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.session_mut()?
            .client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| BrokerError::Request(e.to_string()))
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.session_mut()?
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| BrokerError::Request(e.to_string()))
    }

    fn poll(&mut self, budget: Duration) -> Result<Vec<InboundMessage>, BrokerError> {
        let started = Instant::now();
        let mut inbound = Vec::new();

        let result = {
            let session = self.session_mut()?;
            loop {
                let remaining = budget.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    break Ok(());
                }
                match session.connection.recv_timeout(remaining) {
                    Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                        inbound.push(InboundMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        });
                    }
                    Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                        break Err(BrokerError::Disconnected {
                            reason: "broker sent disconnect".to_string(),
                        })
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        break Err(BrokerError::Disconnected {
                            reason: e.to_string(),
                        })
                    }
                    Err(RecvTimeoutError::Timeout) => break Ok(()),
                    Err(RecvTimeoutError::Disconnected) => {
                        break Err(BrokerError::Disconnected {
                            reason: "event loop stopped".to_string(),
                        })
                    }
                }
            }
        };

        match result {
            Ok(()) => Ok(inbound),
            Err(e) => {
                self.session = None;
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.client.try_disconnect();
        }
    }
}
