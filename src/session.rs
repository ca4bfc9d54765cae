//! Session and cluster-time tracking for logical sessions and transactions.

use std::{cmp::Ordering, time::Instant};

use bson::{doc, spec::BinarySubtype, Binary, Document, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::concern::ReadConcern;

/// The `$clusterTime` document exchanged with the server to keep a deployment's logical clock
/// advancing monotonically across a session.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterTime {
    #[serde(rename = "clusterTime")]
    pub cluster_time: Timestamp,
    pub signature: Document,
}

impl PartialEq for ClusterTime {
    fn eq(&self, other: &Self) -> bool {
        self.cluster_time == other.cluster_time
    }
}

impl PartialOrd for ClusterTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cluster_time.cmp(&other.cluster_time))
    }
}

/// Transaction state for a logical session, per spec §3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    None,
    Starting,
    InProgress,
    Committed,
    Aborted,
}

impl TransactionState {
    /// Transactions disable retry (spec §4.2) except for the very first command of a
    /// transaction, which is allowed to retry since the transaction hasn't been observed by the
    /// server yet.
    pub fn disables_retry(&self) -> bool {
        matches!(self, TransactionState::InProgress)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Starting | TransactionState::InProgress)
    }
}

/// A server-side session identifier, generated client-side as a UUID per the driver sessions
/// specification.
#[derive(Clone, Debug)]
pub struct ServerSessionId(Document);

impl ServerSessionId {
    pub fn new() -> Self {
        let binary = Binary {
            subtype: BinarySubtype::Uuid,
            bytes: Uuid::new_v4().as_bytes().to_vec(),
        };
        Self(doc! { "id": binary })
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }
}

impl Default for ServerSessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque carrier for the state a logical session needs across attempts and retries (spec §3
/// "Session Context"): the session id, transaction state, current read concern, cluster time,
/// and operation time.
#[derive(Debug)]
pub struct SessionContext {
    id: ServerSessionId,
    txn_number: i64,
    transaction: TransactionState,
    read_concern: Option<ReadConcern>,
    cluster_time: Option<ClusterTime>,
    operation_time: Option<Timestamp>,
    last_use: Instant,
    causal_consistency: bool,
}

impl SessionContext {
    pub fn new(causal_consistency: bool) -> Self {
        Self {
            id: ServerSessionId::new(),
            txn_number: 0,
            transaction: TransactionState::None,
            read_concern: None,
            cluster_time: None,
            operation_time: None,
            last_use: Instant::now(),
            causal_consistency,
        }
    }

    pub fn id(&self) -> &Document {
        self.id.as_document()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction
    }

    pub fn start_transaction(&mut self) {
        self.transaction = TransactionState::Starting;
    }

    pub fn advance_transaction_started(&mut self) {
        if self.transaction == TransactionState::Starting {
            self.transaction = TransactionState::InProgress;
        }
    }

    pub fn commit_transaction(&mut self) {
        self.transaction = TransactionState::Committed;
    }

    pub fn abort_transaction(&mut self) {
        self.transaction = TransactionState::Aborted;
    }

    pub fn reset_transaction(&mut self) {
        self.transaction = TransactionState::None;
    }

    pub fn read_concern(&self) -> Option<&ReadConcern> {
        self.read_concern.as_ref()
    }

    pub fn set_read_concern(&mut self, rc: Option<ReadConcern>) {
        self.read_concern = rc;
    }

    pub fn cluster_time(&self) -> Option<&ClusterTime> {
        self.cluster_time.as_ref()
    }

    /// Advances the cluster time iff `to` is newer than what this session has already seen.
    pub fn advance_cluster_time(&mut self, to: &ClusterTime) {
        if self.cluster_time.as_ref().map(|ct| ct < to).unwrap_or(true) {
            self.cluster_time = Some(to.clone());
        }
    }

    pub fn operation_time(&self) -> Option<Timestamp> {
        self.operation_time
    }

    pub fn advance_operation_time(&mut self, ts: Timestamp) {
        self.operation_time = match self.operation_time {
            Some(current) if current >= ts => Some(current),
            _ => Some(ts),
        };
    }

    pub fn causal_consistency(&self) -> bool {
        self.causal_consistency
    }

    pub fn txn_number(&self) -> i64 {
        self.txn_number
    }

    pub fn get_and_increment_txn_number(&mut self) -> i64 {
        self.txn_number += 1;
        self.txn_number
    }

    pub fn touch(&mut self) {
        self.last_use = Instant::now();
    }

    pub fn last_use(&self) -> Instant {
        self.last_use
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cluster_time_advances_monotonically() {
        let mut session = SessionContext::new(false);
        let older = ClusterTime {
            cluster_time: Timestamp { time: 1, increment: 0 },
            signature: doc! {},
        };
        let newer = ClusterTime {
            cluster_time: Timestamp { time: 5, increment: 0 },
            signature: doc! {},
        };
        session.advance_cluster_time(&newer);
        session.advance_cluster_time(&older);
        assert_eq!(session.cluster_time().unwrap().cluster_time.time, 5);
    }

    #[test]
    fn transaction_in_progress_disables_retry() {
        let mut session = SessionContext::new(false);
        session.start_transaction();
        assert!(!session.transaction_state().disables_retry());
        session.advance_transaction_started();
        assert!(session.transaction_state().disables_retry());
    }
}
