// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key registry of in-flight operations.
//!
//! Each key has at most one [`Record`] at a time. The caller that creates it is
//! the leader and owns the underlying call; everyone else follows and receives
//! the leader's result. A record is removed under the map lock before its
//! result is published, so a caller arriving after completion always starts a
//! fresh flight instead of observing a settled one.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::{
    FutureExt,
    channel::oneshot,
    future::Shared,
};
use parking_lot::Mutex;
use strata_tier::Error;

/// The value a flight settles with. `Ok(None)` means the key is absent.
pub(crate) type FlightResult<V> = Result<Option<V>, Error>;

type Outcome<V> = Shared<oneshot::Receiver<FlightResult<V>>>;

type Records<K, V> = Arc<Mutex<HashMap<K, Record<K, V>>>>;

/// What the leader of a flight is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlightKind {
    /// A plain `get`.
    Read,
    /// A read-through that will call a loader on a miss.
    Load,
    /// A `set` or `delete` whose outcome is the written value or absence.
    Write,
}

struct Record<K, V>
where
    K: Eq + Hash,
{
    id: u64,
    kind: FlightKind,
    outcome: Outcome<V>,
    // Loads waiting on a read. A read that misses passes its lead to the first
    // one still listening instead of publishing the miss.
    handoffs: Vec<oneshot::Sender<Lead<K, V>>>,
}

pub(crate) struct Flights<K, V>
where
    K: Eq + Hash,
{
    records: Records<K, V>,
    next_id: AtomicU64,
}

pub(crate) enum Role<K, V>
where
    K: Eq + Hash,
{
    Leader(Lead<K, V>),
    Follower(Follow<K, V>),
}

/// What a follower observed once its flight ended.
pub(crate) enum Joined<K, V>
where
    K: Eq + Hash,
{
    /// The leader published a result.
    Settled(FlightResult<V>),
    /// A read missed and handed its lead to this follower.
    HandedOff(Lead<K, V>),
    /// The leader went away without publishing anything.
    Abandoned,
}

impl<K, V> Flights<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Follows the flight already running for `key`, or starts one of `kind`.
    ///
    /// A load that finds a read in flight registers for a handoff, so a miss is
    /// resolved by exactly one loader call.
    pub fn join_or_lead(&self, key: &K, kind: FlightKind) -> Role<K, V> {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(key) {
            let handoff = (kind == FlightKind::Load && record.kind == FlightKind::Read).then(|| {
                let (sender, receiver) = oneshot::channel();
                record.handoffs.push(sender);
                receiver
            });
            return Role::Follower(Follow {
                outcome: record.outcome.clone(),
                handoff,
            });
        }
        Role::Leader(self.insert(&mut records, key, kind))
    }

    /// Starts a flight of `kind` for `key`, displacing any flight already registered.
    ///
    /// The displaced leader still delivers its result to its own followers.
    pub fn lead(&self, key: &K, kind: FlightKind) -> Lead<K, V> {
        let mut records = self.records.lock();
        self.insert(&mut records, key, kind)
    }

    fn insert(&self, records: &mut HashMap<K, Record<K, V>>, key: &K, kind: FlightKind) -> Lead<K, V> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        records.insert(
            key.clone(),
            Record {
                id,
                kind,
                outcome: receiver.shared(),
                handoffs: Vec::new(),
            },
        );
        Lead {
            key: key.clone(),
            id,
            sender: Some(sender),
            records: Arc::clone(&self.records),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }
}

/// Ownership of one flight. Dropping it without completing retires the flight
/// and its followers observe [`Joined::Abandoned`].
pub(crate) struct Lead<K, V>
where
    K: Eq + Hash,
{
    key: K,
    id: u64,
    sender: Option<oneshot::Sender<FlightResult<V>>>,
    records: Records<K, V>,
}

impl<K, V> Lead<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Retires the flight and hands `result` to every follower.
    pub fn complete(mut self, result: FlightResult<V>) {
        self.retire();
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(result);
        }
    }

    /// Settles a read that found nothing.
    ///
    /// If a load joined this read, the lead passes to it and the returned
    /// [`Follow`] resolves with the loaded value. Otherwise the miss is published.
    pub fn complete_miss(mut self) -> Option<Follow<K, V>> {
        let records = Arc::clone(&self.records);
        let mut records = records.lock();
        if let Some(record) = records.get_mut(&self.key).filter(|record| record.id == self.id) {
            let outcome = record.outcome.clone();
            let mut next = Self {
                key: self.key.clone(),
                id: self.id,
                sender: self.sender.take(),
                records: Arc::clone(&self.records),
            };
            for handoff in std::mem::take(&mut record.handoffs) {
                match handoff.send(next) {
                    Ok(()) => {
                        record.kind = FlightKind::Load;
                        return Some(Follow {
                            outcome,
                            handoff: None,
                        });
                    }
                    Err(returned) => next = returned,
                }
            }
            self.sender = next.sender.take();
        }
        drop(records);
        self.complete(Ok(None));
        None
    }
}

impl<K, V> Lead<K, V>
where
    K: Eq + Hash,
{
    fn retire(&self) {
        let mut records = self.records.lock();
        if records.get(&self.key).is_some_and(|record| record.id == self.id) {
            records.remove(&self.key);
        }
    }
}

impl<K, V> Drop for Lead<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.retire();
        }
    }
}

/// A handle on someone else's flight.
pub(crate) struct Follow<K, V>
where
    K: Eq + Hash,
{
    outcome: Outcome<V>,
    handoff: Option<oneshot::Receiver<Lead<K, V>>>,
}

impl<K, V> Follow<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Waits for the flight to end, taking over the lead if a read hands it off.
    pub async fn wait(self) -> Joined<K, V> {
        if let Some(handoff) = self.handoff
            && let Ok(lead) = handoff.await
        {
            return Joined::HandedOff(lead);
        }
        match self.outcome.await {
            Ok(result) => Joined::Settled(result),
            Err(_) => Joined::Abandoned,
        }
    }

    /// Waits for the flight's result; `None` if the leader was abandoned.
    pub async fn settled(self) -> Option<FlightResult<V>> {
        self.outcome.await.ok()
    }
}
