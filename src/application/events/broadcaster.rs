//! Event broadcaster
//!
//! Fans committed port events out to subscribers. Every subscriber owns a
//! bounded queue; publishing never waits on it. A subscriber whose queue is
//! full is dropped and sees `StaleSubscriber` once it has drained what was
//! already queued.
//!
//! A bounded buffer of recent events is kept per port so that a reconnecting
//! subscriber can resume from the last sequence it saw.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, info, warn};

use crate::config::BroadcasterConfig;
use crate::domain::{DomainError, DomainResult, PortEvent};

/// Last sequence seen per port
pub type ResumeCursor = HashMap<String, u64>;

/// Which ports a subscriber wants to hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    All,
    Port(String),
}

impl SubscriptionFilter {
    pub fn matches(&self, port_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Port(p) => p == port_id,
        }
    }
}

#[derive(Default)]
struct PortStream {
    retained: VecDeque<PortEvent>,
    latest: u64,
}

impl PortStream {
    fn prune(&mut self, limit: usize, cutoff: DateTime<Utc>) {
        while self.retained.len() > limit {
            self.retained.pop_front();
        }
        while self
            .retained
            .front()
            .is_some_and(|e| e.timestamp < cutoff)
        {
            self.retained.pop_front();
        }
    }

    fn oldest(&self) -> u64 {
        self.retained
            .front()
            .map(|e| e.sequence)
            .unwrap_or(self.latest + 1)
    }

    fn replay_after(&self, port_id: &str, from: u64) -> DomainResult<Vec<PortEvent>> {
        if from > self.latest {
            return Err(DomainError::Validation(format!(
                "cursor {} for port {} is ahead of latest sequence {}",
                from, port_id, self.latest
            )));
        }
        if from == self.latest {
            return Ok(Vec::new());
        }
        if self.oldest() > from + 1 {
            return Err(DomainError::StaleSubscriber {
                port_id: port_id.to_string(),
                requested: from,
                oldest_retained: self.oldest(),
            });
        }
        Ok(self
            .retained
            .iter()
            .filter(|e| e.sequence > from)
            .cloned()
            .collect())
    }
}

struct SubscriberSlot {
    filter: SubscriptionFilter,
    sender: mpsc::Sender<PortEvent>,
    lag: Arc<OnceLock<DomainError>>,
}

type SubscriberMap = Arc<DashMap<u64, SubscriberSlot>>;

pub struct EventBroadcaster {
    config: BroadcasterConfig,
    /// Publishing holds it shared, subscribing exclusively, so a new
    /// subscriber's replay snapshot and its live queue never overlap or miss.
    gate: RwLock<()>,
    streams: DashMap<String, PortStream>,
    subscribers: SubscriberMap,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new(config: BroadcasterConfig) -> Self {
        Self {
            config,
            gate: RwLock::new(()),
            streams: DashMap::new(),
            subscribers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.config.replay_window()
    }

    /// Makes a port known with its current sequence.
    pub fn register_port(&self, port_id: &str, latest: u64) {
        let _gate = self.gate.read();
        self.streams
            .entry(port_id.to_string())
            .or_insert_with(|| PortStream {
                retained: VecDeque::new(),
                latest,
            });
    }

    /// Seeds a port's replay buffer from the persisted event log.
    pub fn restore(&self, port_id: &str, latest: u64, events: Vec<PortEvent>) {
        let _gate = self.gate.write();
        let mut stream = PortStream {
            retained: events
                .into_iter()
                .filter(|e| e.sequence <= latest)
                .collect(),
            latest,
        };
        stream.prune(self.config.replay_buffer_size, self.cutoff(Utc::now()));
        self.streams.insert(port_id.to_string(), stream);
    }

    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    pub fn forget_port(&self, port_id: &str) {
        let _gate = self.gate.read();
        self.streams.remove(port_id);
    }

    pub fn latest_sequence(&self, port_id: &str) -> Option<u64> {
        self.streams.get(port_id).map(|s| s.latest)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Publishes an event. Callers serialize publishes per port.
    pub fn publish(&self, event: &PortEvent) {
        let _gate = self.gate.read();

        let oldest = {
            let mut stream = self.streams.entry(event.port_id.clone()).or_default();
            if event.sequence <= stream.latest {
                warn!(
                    port_id = %event.port_id,
                    sequence = event.sequence,
                    latest = stream.latest,
                    "Dropping out-of-order publish"
                );
                return;
            }
            stream.latest = event.sequence;
            stream.retained.push_back(event.clone());
            stream.prune(self.config.replay_buffer_size, self.cutoff(event.timestamp));
            stream.oldest()
        };

        let mut dropped = Vec::new();
        let mut delivered = 0usize;
        for entry in self.subscribers.iter() {
            if !entry.filter.matches(&event.port_id) {
                continue;
            }
            match entry.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    let _ = entry.lag.set(DomainError::StaleSubscriber {
                        port_id: event.port_id.clone(),
                        requested: event.sequence - 1,
                        oldest_retained: oldest,
                    });
                    dropped.push((*entry.key(), true));
                }
                Err(TrySendError::Closed(_)) => dropped.push((*entry.key(), false)),
            }
        }

        for (id, lagged) in dropped {
            if self.subscribers.remove(&id).is_some() && lagged {
                warn!(
                    subscriber = id,
                    port_id = %event.port_id,
                    sequence = event.sequence,
                    "Subscriber queue full, disconnecting"
                );
                metrics::counter!("broadcaster_lagged_total").increment(1);
            }
        }
        metrics::gauge!("broadcaster_subscribers").set(self.subscribers.len() as f64);

        debug!(
            port_id = %event.port_id,
            sequence = event.sequence,
            subscribers = delivered,
            "Event published"
        );
    }

    /// Subscribes to `filter`, first replaying everything after the cursor.
    ///
    /// Ports missing from the cursor start live. A cursor entry older than
    /// the retained buffer fails with `StaleSubscriber`; one ahead of the
    /// port's latest sequence fails with `Validation`.
    pub fn subscribe(
        &self,
        filter: SubscriptionFilter,
        cursor: ResumeCursor,
    ) -> DomainResult<EventSubscription> {
        let _gate = self.gate.write();
        let cutoff = self.cutoff(Utc::now());
        let limit = self.config.replay_buffer_size;

        let mut backlog = VecDeque::new();
        let mut position = ResumeCursor::new();

        if let SubscriptionFilter::Port(port_id) = &filter {
            if !self.streams.contains_key(port_id) {
                return Err(DomainError::not_found("Port", port_id.clone()));
            }
        }
        for (port_id, from) in &cursor {
            if !filter.matches(port_id) {
                continue;
            }
            let mut stream = self
                .streams
                .get_mut(port_id)
                .ok_or_else(|| DomainError::not_found("Port", port_id.clone()))?;
            stream.prune(limit, cutoff);
            backlog.extend(stream.replay_after(port_id, *from)?);
            position.insert(port_id.clone(), *from);
        }
        for stream in self.streams.iter() {
            if filter.matches(stream.key()) {
                position
                    .entry(stream.key().clone())
                    .or_insert(stream.latest);
            }
        }

        let (sender, receiver) = mpsc::channel(self.config.subscriber_queue_capacity);
        let lag = Arc::new(OnceLock::new());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(
            id,
            SubscriberSlot {
                filter: filter.clone(),
                sender,
                lag: lag.clone(),
            },
        );
        metrics::gauge!("broadcaster_subscribers").set(self.subscribers.len() as f64);
        info!(
            subscriber = id,
            ?filter,
            replay = backlog.len(),
            total = self.subscribers.len(),
            "New event subscriber"
        );

        Ok(EventSubscription {
            id,
            filter,
            backlog,
            receiver,
            lag,
            cursor: position,
            subscribers: self.subscribers.clone(),
        })
    }

    /// Disconnects every subscriber; their streams end after draining.
    pub fn close_all(&self) {
        let _gate = self.gate.write();
        self.subscribers.clear();
        metrics::gauge!("broadcaster_subscribers").set(0.0);
    }
}

impl Drop for EventBroadcaster {
    fn drop(&mut self) {
        self.subscribers.clear();
    }
}

/// Ordered stream of events for one subscriber
pub struct EventSubscription {
    id: u64,
    filter: SubscriptionFilter,
    backlog: VecDeque<PortEvent>,
    receiver: mpsc::Receiver<PortEvent>,
    lag: Arc<OnceLock<DomainError>>,
    cursor: ResumeCursor,
    subscribers: SubscriberMap,
}

impl EventSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    /// Last sequence delivered per port; pass it back to resume.
    pub fn cursor(&self) -> &ResumeCursor {
        &self.cursor
    }

    fn advance(&mut self, event: &PortEvent) {
        self.cursor.insert(event.port_id.clone(), event.sequence);
    }

    fn closed(&self) -> DomainResult<Option<PortEvent>> {
        match self.lag.get() {
            Some(err) => Err(err.clone()),
            None => Ok(None),
        }
    }

    /// Next event. `Ok(None)` means the broadcaster closed the stream.
    pub async fn recv(&mut self) -> DomainResult<Option<PortEvent>> {
        if let Some(event) = self.backlog.pop_front() {
            self.advance(&event);
            return Ok(Some(event));
        }
        match self.receiver.recv().await {
            Some(event) => {
                self.advance(&event);
                Ok(Some(event))
            }
            None => self.closed(),
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `Ok(None)` also means
    /// nothing is queued right now.
    pub fn try_recv(&mut self) -> DomainResult<Option<PortEvent>> {
        if let Some(event) = self.backlog.pop_front() {
            self.advance(&event);
            return Ok(Some(event));
        }
        match self.receiver.try_recv() {
            Ok(event) => {
                self.advance(&event);
                Ok(Some(event))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => self.closed(),
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if self.subscribers.remove(&self.id).is_some() {
            metrics::gauge!("broadcaster_subscribers").set(self.subscribers.len() as f64);
            info!(subscriber = self.id, remaining = self.subscribers.len(), "Event subscriber disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Actor, PortState, TriggerKind};

    fn config(buffer: usize, queue: usize) -> BroadcasterConfig {
        BroadcasterConfig {
            replay_buffer_size: buffer,
            replay_window_secs: 600,
            subscriber_queue_capacity: queue,
        }
    }

    fn event_at(port: &str, sequence: u64, timestamp: DateTime<Utc>) -> PortEvent {
        PortEvent {
            sequence,
            port_id: port.to_string(),
            station_id: "ST1".to_string(),
            session_id: None,
            session_state: None,
            old_state: PortState::Available,
            new_state: PortState::Offline,
            trigger: TriggerKind::TakeOffline,
            actor: Actor::admin("A1"),
            timestamp,
        }
    }

    fn event(port: &str, sequence: u64) -> PortEvent {
        event_at(port, sequence, Utc::now())
    }

    fn drain(sub: &mut EventSubscription) -> Vec<u64> {
        let mut seen = Vec::new();
        while let Ok(Some(e)) = sub.try_recv() {
            seen.push(e.sequence);
        }
        seen
    }

    #[test]
    fn live_subscriber_sees_events_in_order() {
        let b = EventBroadcaster::new(config(16, 16));
        b.register_port("P1", 0);
        let mut sub = b
            .subscribe(SubscriptionFilter::Port("P1".into()), ResumeCursor::new())
            .unwrap();
        for seq in 1..=3 {
            b.publish(&event("P1", seq));
        }
        b.publish(&event("P2", 1));
        assert_eq!(drain(&mut sub), vec![1, 2, 3]);
        assert_eq!(sub.cursor().get("P1"), Some(&3));
    }

    #[test]
    fn resume_replays_after_cursor_then_goes_live() {
        let b = EventBroadcaster::new(config(16, 16));
        for seq in 1..=5 {
            b.publish(&event("P1", seq));
        }
        let cursor = ResumeCursor::from([("P1".to_string(), 2)]);
        let mut sub = b
            .subscribe(SubscriptionFilter::Port("P1".into()), cursor)
            .unwrap();
        b.publish(&event("P1", 6));
        assert_eq!(drain(&mut sub), vec![3, 4, 5, 6]);
    }

    #[test]
    fn resume_beyond_buffer_is_stale() {
        let b = EventBroadcaster::new(config(3, 16));
        for seq in 1..=10 {
            b.publish(&event("P1", seq));
        }
        let cursor = ResumeCursor::from([("P1".to_string(), 2)]);
        let err = b
            .subscribe(SubscriptionFilter::Port("P1".into()), cursor)
            .err()
            .unwrap();
        match err {
            DomainError::StaleSubscriber {
                requested,
                oldest_retained,
                ..
            } => {
                assert_eq!(requested, 2);
                assert_eq!(oldest_retained, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resume_at_oldest_boundary_succeeds() {
        let b = EventBroadcaster::new(config(3, 16));
        for seq in 1..=10 {
            b.publish(&event("P1", seq));
        }
        let cursor = ResumeCursor::from([("P1".to_string(), 7)]);
        let mut sub = b
            .subscribe(SubscriptionFilter::Port("P1".into()), cursor)
            .unwrap();
        assert_eq!(drain(&mut sub), vec![8, 9, 10]);
    }

    #[test]
    fn cursor_ahead_of_latest_is_rejected() {
        let b = EventBroadcaster::new(config(16, 16));
        b.publish(&event("P1", 1));
        let cursor = ResumeCursor::from([("P1".to_string(), 5)]);
        let err = b
            .subscribe(SubscriptionFilter::All, cursor)
            .err()
            .unwrap();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unknown_port_subscription_is_not_found() {
        let b = EventBroadcaster::new(config(16, 16));
        let err = b
            .subscribe(SubscriptionFilter::Port("nope".into()), ResumeCursor::new())
            .err()
            .unwrap();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[test]
    fn expired_events_are_pruned_by_age() {
        let b = EventBroadcaster::new(BroadcasterConfig {
            replay_buffer_size: 16,
            replay_window_secs: 60,
            subscriber_queue_capacity: 16,
        });
        let now = Utc::now();
        b.publish(&event_at("P1", 1, now - chrono::Duration::seconds(300)));
        b.publish(&event_at("P1", 2, now));
        let cursor = ResumeCursor::from([("P1".to_string(), 0)]);
        let err = b
            .subscribe(SubscriptionFilter::Port("P1".into()), cursor)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DomainError::StaleSubscriber {
                oldest_retained: 2,
                ..
            }
        ));
    }

    #[test]
    fn full_queue_disconnects_after_drain() {
        let b = EventBroadcaster::new(config(16, 2));
        b.register_port("P1", 0);
        let mut sub = b
            .subscribe(SubscriptionFilter::All, ResumeCursor::new())
            .unwrap();
        for seq in 1..=3 {
            b.publish(&event("P1", seq));
        }
        assert_eq!(b.subscriber_count(), 0);
        assert_eq!(sub.try_recv().unwrap().map(|e| e.sequence), Some(1));
        assert_eq!(sub.try_recv().unwrap().map(|e| e.sequence), Some(2));
        let err = sub.try_recv().err().unwrap();
        assert!(matches!(err, DomainError::StaleSubscriber { requested: 2, .. }));
    }

    #[test]
    fn slow_subscriber_does_not_affect_others() {
        let b = EventBroadcaster::new(config(16, 1));
        b.register_port("P1", 0);
        let _slow = b
            .subscribe(SubscriptionFilter::All, ResumeCursor::new())
            .unwrap();
        let mut fast = b
            .subscribe(SubscriptionFilter::All, ResumeCursor::new())
            .unwrap();
        b.publish(&event("P1", 1));
        assert_eq!(drain(&mut fast), vec![1]);
        b.publish(&event("P1", 2));
        assert_eq!(drain(&mut fast), vec![2]);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn dropping_subscription_unregisters_it() {
        let b = EventBroadcaster::new(config(16, 16));
        let sub = b
            .subscribe(SubscriptionFilter::All, ResumeCursor::new())
            .unwrap();
        assert_eq!(b.subscriber_count(), 1);
        drop(sub);
        assert_eq!(b.subscriber_count(), 0);
    }

    #[test]
    fn restored_buffer_supports_resume() {
        let b = EventBroadcaster::new(config(16, 16));
        b.restore("P1", 3, vec![event("P1", 2), event("P1", 3)]);
        let cursor = ResumeCursor::from([("P1".to_string(), 1)]);
        let mut sub = b
            .subscribe(SubscriptionFilter::Port("P1".into()), cursor)
            .unwrap();
        assert_eq!(drain(&mut sub), vec![2, 3]);
        assert_eq!(b.latest_sequence("P1"), Some(3));
    }

    #[tokio::test]
    async fn close_all_ends_streams() {
        let b = EventBroadcaster::new(config(16, 16));
        b.register_port("P1", 0);
        let mut sub = b
            .subscribe(SubscriptionFilter::All, ResumeCursor::new())
            .unwrap();
        b.publish(&event("P1", 1));
        b.close_all();
        assert_eq!(sub.recv().await.unwrap().map(|e| e.sequence), Some(1));
        assert!(sub.recv().await.unwrap().is_none());
    }
}
