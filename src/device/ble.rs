//! Short-range radio credential exchange
//!
//! Phone-side half of the radio factor. The vehicle broadcasts its current
//! hashkey as service data under a fixed service UUID; the phone scans for
//! it, surfaces each discovered `(address, hashkey)` pair to the caller, and
//! once the caller picks a device performs the connect / write-"ACCESS" /
//! disconnect sequence against the command characteristic.
//!
//! The platform radio is abstracted behind [`RadioLink`]: commands go down
//! through the trait, completions come back as [`LinkEvent`]s on an mpsc
//! channel. [`RadioExchange`] is the state machine in between. It issues no
//! command on its own, never retries, and never times out; a stuck exchange
//! is torn down by an explicit [`RadioExchange::disconnect`].

use data_encoding::HEXUPPER;
use thiserror::Error;
use tokio::sync::mpsc;

/// Service UUID the vehicle advertises. Scan filters key on this value.
pub const SERVICE_UUID: &str = "12345678-1234-5678-1234-56789abcdef0";

/// Characteristic that accepts the access command.
pub const COMMAND_CHAR_UUID: &str = "12345678-1234-5678-1234-56789abcdef2";

/// Payload written to the command characteristic.
pub const ACCESS_COMMAND: &[u8] = b"ACCESS";

/// Advertised service data length. The vehicle packs the 16-hex-char
/// hashkey into 8 raw bytes; anything else is not one of our broadcasts.
pub const HASHKEY_SERVICE_DATA_LEN: usize = 8;

// ============================================================================
// Link abstraction
// ============================================================================

/// Commands the exchange issues against the platform radio.
///
/// Implementations perform the real (or scripted) radio work and report
/// asynchronous outcomes as [`LinkEvent`]s on the channel handed to
/// [`RadioExchange::new`]. A command method returning `Err` means the radio
/// rejected the command outright; nothing was started and no event follows.
pub trait RadioLink: Send {
    /// Start scanning, filtered to [`SERVICE_UUID`].
    fn start_scan(&mut self) -> anyhow::Result<()>;

    /// Stop an active scan.
    fn stop_scan(&mut self);

    /// Open a connection to the given device address. The link performs
    /// service discovery on its own once connected.
    fn connect(&mut self, address: &str) -> anyhow::Result<()>;

    /// Write `payload` to [`COMMAND_CHAR_UUID`] on the open connection.
    fn write_command(&mut self, payload: &[u8]) -> anyhow::Result<()>;

    /// Release the connection resource.
    fn disconnect(&mut self);
}

/// Asynchronous outcomes reported by the platform radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A device advertising [`SERVICE_UUID`] was seen. `service_data` is the
    /// raw payload under that UUID.
    Advertisement { address: String, service_data: Vec<u8> },
    /// The scan could not run. Platform-specific code.
    ScanFailed { code: i32 },
    /// The connection opened; service discovery is under way.
    Connected,
    /// Service discovery finished.
    ServicesDiscovered { ok: bool },
    /// The command write finished.
    WriteCompleted { ok: bool },
    /// The connection ended, whether by request or link loss.
    Disconnected,
}

// ============================================================================
// Exchange state machine
// ============================================================================

/// Where the exchange currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Scanning,
    Connecting,
    ServicesDiscovered,
    Writing,
    Disconnected,
}

/// Events the exchange emits to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// A vehicle broadcast was decoded. The scan keeps running; the caller
    /// decides if and when to connect.
    HashkeyFound { address: String, hashkey: String },
    /// The scan failed to start or was aborted by the platform. Reported
    /// once; the exchange does not retry on its own.
    ScanFailed { code: i32 },
    /// Services are discovered; [`RadioExchange::write_access`] may be
    /// issued.
    ReadyToWrite,
    /// The access write finished. On failure the connection stays open so
    /// the caller can retry or tear down.
    WriteResult { ok: bool },
    /// The connection ended without the caller asking for it.
    LinkClosed,
}

#[derive(Debug, Error)]
pub enum RadioError {
    /// The platform radio rejected a command outright.
    #[error("Radio link command failed: {0}")]
    Link(#[from] anyhow::Error),
    /// A command arrived in a state that cannot accept it.
    #[error("{command} is not valid while {state:?}")]
    InvalidState {
        command: &'static str,
        state: ExchangeState,
    },
}

/// Driver for one credential exchange.
///
/// Single scan, single connection, single in-flight write. Callers issue
/// commands, then pull resulting events with [`RadioExchange::next_event`].
pub struct RadioExchange<L: RadioLink> {
    link: L,
    events: mpsc::Receiver<LinkEvent>,
    state: ExchangeState,
}

impl<L: RadioLink> RadioExchange<L> {
    pub fn new(link: L, events: mpsc::Receiver<LinkEvent>) -> Self {
        Self {
            link,
            events,
            state: ExchangeState::Idle,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Start scanning for vehicle broadcasts.
    pub fn start_scan(&mut self) -> Result<(), RadioError> {
        match self.state {
            ExchangeState::Idle | ExchangeState::Disconnected => {}
            state => {
                return Err(RadioError::InvalidState {
                    command: "start_scan",
                    state,
                })
            }
        }
        self.link.start_scan()?;
        self.state = ExchangeState::Scanning;
        tracing::debug!("Scan started");
        Ok(())
    }

    /// Stop an active scan. No-op in any other state.
    pub fn stop_scan(&mut self) {
        if self.state == ExchangeState::Scanning {
            self.link.stop_scan();
            self.state = ExchangeState::Idle;
            tracing::debug!("Scan stopped");
        }
    }

    /// Connect to a discovered device. Accepting an address ends the scan.
    pub fn connect(&mut self, address: &str) -> Result<(), RadioError> {
        match self.state {
            ExchangeState::Idle | ExchangeState::Disconnected => {}
            ExchangeState::Scanning => self.link.stop_scan(),
            state => {
                return Err(RadioError::InvalidState {
                    command: "connect",
                    state,
                })
            }
        }
        self.link.connect(address)?;
        self.state = ExchangeState::Connecting;
        tracing::info!(%address, "Connecting to vehicle");
        Ok(())
    }

    /// Send the access command. Valid only once services are discovered and
    /// no other write is in flight.
    pub fn write_access(&mut self) -> Result<(), RadioError> {
        if self.state != ExchangeState::ServicesDiscovered {
            return Err(RadioError::InvalidState {
                command: "write_access",
                state: self.state,
            });
        }
        self.link.write_command(ACCESS_COMMAND)?;
        self.state = ExchangeState::Writing;
        tracing::debug!("Access command sent");
        Ok(())
    }

    /// Release the connection unconditionally.
    pub fn disconnect(&mut self) {
        self.link.disconnect();
        self.state = ExchangeState::Disconnected;
        tracing::debug!("Disconnected");
    }

    /// Wait for the next exchange event. Returns `None` when the link side
    /// of the channel is gone.
    pub async fn next_event(&mut self) -> Option<ExchangeEvent> {
        while let Some(event) = self.events.recv().await {
            if let Some(out) = self.apply(event) {
                return Some(out);
            }
        }
        None
    }

    fn apply(&mut self, event: LinkEvent) -> Option<ExchangeEvent> {
        match event {
            LinkEvent::Advertisement {
                address,
                service_data,
            } => {
                if self.state != ExchangeState::Scanning {
                    return None;
                }
                if service_data.len() != HASHKEY_SERVICE_DATA_LEN {
                    tracing::debug!(
                        %address,
                        len = service_data.len(),
                        "Ignoring advertisement with unexpected service data length"
                    );
                    return None;
                }
                let hashkey = HEXUPPER.encode(&service_data);
                tracing::info!(%address, %hashkey, "Vehicle broadcast found");
                Some(ExchangeEvent::HashkeyFound { address, hashkey })
            }
            LinkEvent::ScanFailed { code } => {
                tracing::warn!(code, "Scan failed");
                self.state = ExchangeState::Idle;
                Some(ExchangeEvent::ScanFailed { code })
            }
            LinkEvent::Connected => {
                tracing::debug!("Connected, waiting for service discovery");
                None
            }
            LinkEvent::ServicesDiscovered { ok } => {
                if self.state != ExchangeState::Connecting {
                    return None;
                }
                if !ok {
                    // Connection stays open. The caller decides whether to
                    // tear it down.
                    tracing::warn!("Service discovery failed");
                    return None;
                }
                self.state = ExchangeState::ServicesDiscovered;
                Some(ExchangeEvent::ReadyToWrite)
            }
            LinkEvent::WriteCompleted { ok } => {
                if self.state != ExchangeState::Writing {
                    return None;
                }
                self.state = ExchangeState::ServicesDiscovered;
                if !ok {
                    tracing::warn!("Access write failed");
                }
                Some(ExchangeEvent::WriteResult { ok })
            }
            LinkEvent::Disconnected => {
                if self.state == ExchangeState::Disconnected {
                    return None;
                }
                tracing::warn!("Connection lost");
                self.state = ExchangeState::Disconnected;
                Some(ExchangeEvent::LinkClosed)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CommandLog(Arc<Mutex<Vec<String>>>);

    impl CommandLog {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct ScriptedLink {
        log: CommandLog,
        fail_scan_start: bool,
    }

    impl RadioLink for ScriptedLink {
        fn start_scan(&mut self) -> anyhow::Result<()> {
            if self.fail_scan_start {
                anyhow::bail!("adapter is off");
            }
            self.log.push("start_scan");
            Ok(())
        }

        fn stop_scan(&mut self) {
            self.log.push("stop_scan");
        }

        fn connect(&mut self, address: &str) -> anyhow::Result<()> {
            self.log.push(format!("connect {}", address));
            Ok(())
        }

        fn write_command(&mut self, payload: &[u8]) -> anyhow::Result<()> {
            self.log
                .push(format!("write {}", String::from_utf8_lossy(payload)));
            Ok(())
        }

        fn disconnect(&mut self) {
            self.log.push("disconnect");
        }
    }

    const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

    fn setup() -> (
        RadioExchange<ScriptedLink>,
        mpsc::Sender<LinkEvent>,
        CommandLog,
    ) {
        let log = CommandLog::default();
        let (tx, rx) = mpsc::channel(16);
        let exchange = RadioExchange::new(
            ScriptedLink {
                log: log.clone(),
                fail_scan_start: false,
            },
            rx,
        );
        (exchange, tx, log)
    }

    async fn drive_to_ready(
        exchange: &mut RadioExchange<ScriptedLink>,
        tx: &mpsc::Sender<LinkEvent>,
    ) {
        exchange.connect(ADDRESS).unwrap();
        tx.send(LinkEvent::Connected).await.unwrap();
        tx.send(LinkEvent::ServicesDiscovered { ok: true })
            .await
            .unwrap();
        assert_eq!(exchange.next_event().await, Some(ExchangeEvent::ReadyToWrite));
        assert_eq!(exchange.state(), ExchangeState::ServicesDiscovered);
    }

    #[tokio::test]
    async fn test_scan_surfaces_eight_byte_payloads() {
        let (mut exchange, tx, _log) = setup();
        exchange.start_scan().unwrap();

        let data = vec![0x2C, 0xF8, 0x42, 0x5C, 0x6E, 0x60, 0xF5, 0xBC];
        tx.send(LinkEvent::Advertisement {
            address: ADDRESS.into(),
            service_data: data,
        })
        .await
        .unwrap();

        assert_eq!(
            exchange.next_event().await,
            Some(ExchangeEvent::HashkeyFound {
                address: ADDRESS.into(),
                hashkey: "2CF8425C6E60F5BC".into(),
            })
        );
        // The scan keeps running after a find.
        assert_eq!(exchange.state(), ExchangeState::Scanning);
    }

    #[tokio::test]
    async fn test_scan_ignores_foreign_payload_lengths() {
        let (mut exchange, tx, _log) = setup();
        exchange.start_scan().unwrap();

        tx.send(LinkEvent::Advertisement {
            address: ADDRESS.into(),
            service_data: vec![0x01, 0x02, 0x03],
        })
        .await
        .unwrap();
        tx.send(LinkEvent::Advertisement {
            address: ADDRESS.into(),
            service_data: vec![0xAB; 8],
        })
        .await
        .unwrap();

        // The short payload is skipped; the next valid one comes through.
        assert_eq!(
            exchange.next_event().await,
            Some(ExchangeEvent::HashkeyFound {
                address: ADDRESS.into(),
                hashkey: "ABABABABABABABAB".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_advertisements_outside_scanning_are_dropped() {
        let (mut exchange, tx, _log) = setup();

        tx.send(LinkEvent::Advertisement {
            address: ADDRESS.into(),
            service_data: vec![0xAB; 8],
        })
        .await
        .unwrap();
        drop(tx);

        assert_eq!(exchange.next_event().await, None);
        assert_eq!(exchange.state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn test_scan_start_failure_reports_once() {
        let log = CommandLog::default();
        let (_tx, rx) = mpsc::channel(16);
        let mut exchange = RadioExchange::new(
            ScriptedLink {
                log: log.clone(),
                fail_scan_start: true,
            },
            rx,
        );

        let err = exchange.start_scan().unwrap_err();
        assert!(matches!(err, RadioError::Link(_)));
        assert_eq!(exchange.state(), ExchangeState::Idle);
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_scan_failed_event_returns_to_idle() {
        let (mut exchange, tx, _log) = setup();
        exchange.start_scan().unwrap();

        tx.send(LinkEvent::ScanFailed { code: 2 }).await.unwrap();
        assert_eq!(
            exchange.next_event().await,
            Some(ExchangeEvent::ScanFailed { code: 2 })
        );
        assert_eq!(exchange.state(), ExchangeState::Idle);

        // No auto-retry, but the caller may start again.
        exchange.start_scan().unwrap();
        assert_eq!(exchange.state(), ExchangeState::Scanning);
    }

    #[tokio::test]
    async fn test_connect_stops_active_scan() {
        let (mut exchange, _tx, log) = setup();
        exchange.start_scan().unwrap();
        exchange.connect(ADDRESS).unwrap();

        assert_eq!(exchange.state(), ExchangeState::Connecting);
        assert_eq!(
            log.entries(),
            vec![
                "start_scan".to_string(),
                "stop_scan".to_string(),
                format!("connect {}", ADDRESS),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_access_sequence() {
        let (mut exchange, tx, log) = setup();
        drive_to_ready(&mut exchange, &tx).await;

        exchange.write_access().unwrap();
        assert_eq!(exchange.state(), ExchangeState::Writing);

        tx.send(LinkEvent::WriteCompleted { ok: true }).await.unwrap();
        assert_eq!(
            exchange.next_event().await,
            Some(ExchangeEvent::WriteResult { ok: true })
        );

        exchange.disconnect();
        assert_eq!(exchange.state(), ExchangeState::Disconnected);
        assert_eq!(
            log.entries(),
            vec![
                format!("connect {}", ADDRESS),
                "write ACCESS".to_string(),
                "disconnect".to_string(),
            ]
        );

        // The platform's own disconnect notification after an explicit
        // disconnect is not re-reported.
        tx.send(LinkEvent::Disconnected).await.unwrap();
        drop(tx);
        assert_eq!(exchange.next_event().await, None);
    }

    #[tokio::test]
    async fn test_write_before_discovery_is_rejected() {
        let (mut exchange, tx, _log) = setup();
        exchange.connect(ADDRESS).unwrap();
        tx.send(LinkEvent::Connected).await.unwrap();

        let err = exchange.write_access().unwrap_err();
        assert!(matches!(
            err,
            RadioError::InvalidState {
                command: "write_access",
                state: ExchangeState::Connecting,
            }
        ));
    }

    #[tokio::test]
    async fn test_single_write_in_flight() {
        let (mut exchange, tx, _log) = setup();
        drive_to_ready(&mut exchange, &tx).await;

        exchange.write_access().unwrap();
        let err = exchange.write_access().unwrap_err();
        assert!(matches!(
            err,
            RadioError::InvalidState {
                state: ExchangeState::Writing,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_write_failure_leaves_connection_open() {
        let (mut exchange, tx, _log) = setup();
        drive_to_ready(&mut exchange, &tx).await;

        exchange.write_access().unwrap();
        tx.send(LinkEvent::WriteCompleted { ok: false }).await.unwrap();
        assert_eq!(
            exchange.next_event().await,
            Some(ExchangeEvent::WriteResult { ok: false })
        );

        // Retry is the caller's call; the connection is still usable.
        assert_eq!(exchange.state(), ExchangeState::ServicesDiscovered);
        exchange.write_access().unwrap();
    }

    #[tokio::test]
    async fn test_link_loss_emits_closed() {
        let (mut exchange, tx, _log) = setup();
        drive_to_ready(&mut exchange, &tx).await;

        tx.send(LinkEvent::Disconnected).await.unwrap();
        assert_eq!(exchange.next_event().await, Some(ExchangeEvent::LinkClosed));
        assert_eq!(exchange.state(), ExchangeState::Disconnected);
    }

    #[tokio::test]
    async fn test_discovery_failure_keeps_waiting() {
        let (mut exchange, tx, _log) = setup();
        exchange.connect(ADDRESS).unwrap();

        tx.send(LinkEvent::Connected).await.unwrap();
        tx.send(LinkEvent::ServicesDiscovered { ok: false })
            .await
            .unwrap();
        drop(tx);

        // No event surfaces; the caller cancels with an explicit disconnect.
        assert_eq!(exchange.next_event().await, None);
        assert_eq!(exchange.state(), ExchangeState::Connecting);
    }
}
