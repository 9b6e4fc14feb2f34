//! Persistence outbox
//!
//! The in-memory commit path never touches storage. Committed records are
//! queued here, in commit order, and a background writer drains them into
//! the repository provider.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::ledger::SharedSessionLedger;
use crate::domain::{DomainResult, Port, PortEvent, RepositoryProvider, Session, Station};
use crate::shared::shutdown::ShutdownSignal;

#[derive(Debug, Clone)]
pub enum OutboxRecord {
    Station(Station),
    StationRemoved(String),
    Port(Port),
    PortRemoved(String),
    Session(Session),
    Event(PortEvent),
}

impl OutboxRecord {
    fn kind(&self) -> &'static str {
        match self {
            Self::Station(_) => "station",
            Self::StationRemoved(_) => "station_removed",
            Self::Port(_) => "port",
            Self::PortRemoved(_) => "port_removed",
            Self::Session(_) => "session",
            Self::Event(_) => "event",
        }
    }
}

/// Producer side of the outbox. Enqueueing never blocks.
#[derive(Clone)]
pub struct Outbox {
    sender: Option<mpsc::UnboundedSender<OutboxRecord>>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboxRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Outbox that discards everything, for purely in-memory setups.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn enqueue(&self, record: OutboxRecord) {
        if let Some(sender) = &self.sender {
            if sender.send(record).is_err() {
                debug!("Outbox writer is gone, record dropped");
            }
        }
    }
}

/// Drains the outbox into storage
pub struct OutboxWriter {
    repos: Arc<dyn RepositoryProvider>,
    receiver: mpsc::UnboundedReceiver<OutboxRecord>,
    /// Finished sessions are dropped from here once they are stored.
    ledger: Option<SharedSessionLedger>,
}

impl OutboxWriter {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        receiver: mpsc::UnboundedReceiver<OutboxRecord>,
    ) -> Self {
        Self {
            repos,
            receiver,
            ledger: None,
        }
    }

    /// Evicts terminal sessions from `ledger` after they are persisted.
    pub fn evicting(mut self, ledger: SharedSessionLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Runs until shutdown, then writes whatever is still queued.
    pub fn start(mut self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("📦 Outbox writer started");
            loop {
                tokio::select! {
                    record = self.receiver.recv() => {
                        match record {
                            Some(record) => self.write(record).await,
                            None => break,
                        }
                    }
                    _ = shutdown.wait() => {
                        let flushed = self.flush().await;
                        info!(flushed, "📦 Outbox writer shutting down");
                        break;
                    }
                }
            }
            info!("📦 Outbox writer stopped");
        })
    }

    /// Writes every record queued right now; returns how many were taken.
    pub async fn flush(&mut self) -> usize {
        let mut count = 0;
        while let Ok(record) = self.receiver.try_recv() {
            self.write(record).await;
            count += 1;
        }
        count
    }

    async fn write(&self, record: OutboxRecord) {
        let kind = record.kind();
        if let Err(e) = self.persist(record).await {
            warn!(record = kind, error = %e, "Outbox write failed");
            metrics::counter!("outbox_write_failures_total", "record" => kind).increment(1);
        }
    }

    async fn persist(&self, record: OutboxRecord) -> DomainResult<()> {
        match record {
            OutboxRecord::Station(station) => self.repos.stations().save(station).await,
            OutboxRecord::StationRemoved(id) => self.repos.stations().delete(&id).await,
            OutboxRecord::Port(port) => {
                let (id, sequence) = (port.id.clone(), port.sequence);
                if !self.repos.ports().store_if_newer(port).await? {
                    debug!(port_id = %id, sequence, "Stored port is not older, write skipped");
                }
                Ok(())
            }
            OutboxRecord::PortRemoved(id) => self.repos.ports().delete(&id).await,
            OutboxRecord::Session(session) => {
                let finished = session.is_terminal().then(|| session.id.clone());
                self.repos.sessions().save(session).await?;
                if let (Some(ledger), Some(id)) = (&self.ledger, finished) {
                    if ledger.evict_terminal(&id) {
                        debug!(session_id = %id, "Finished session evicted from ledger");
                    }
                }
                Ok(())
            }
            OutboxRecord::Event(event) => self.repos.events().append(event).await,
        }
    }
}
