// ============================================================================
// Unit-of-work bookkeeping for the memory store
// ============================================================================
//
// Snapshot isolation over MVCC row versions:
// - each unit of work reads from the snapshot taken when it began
// - its own writes are visible to itself immediately
// - writes of other units become visible to units that begin after the commit
//
// Calls made outside a unit run as single-statement auto-commit transactions.
//
// ============================================================================

use crate::core::{StoreError, StoreResult};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// What a transaction may see.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tx_id: u64,
    pub active: Arc<HashSet<u64>>,
    pub aborted: Arc<HashSet<u64>>,
    pub max_tx_id: u64,
}

impl Snapshot {
    /// Whether `tx_id` had committed when this snapshot was taken.
    pub fn is_committed(&self, tx_id: u64) -> bool {
        tx_id < self.max_tx_id && !self.active.contains(&tx_id) && !self.aborted.contains(&tx_id)
    }
}

#[derive(Debug)]
pub struct TransactionManager {
    next_id: u64,
    snapshots: HashMap<u64, Snapshot>,
    active: Arc<HashSet<u64>>,
    aborted: Arc<HashSet<u64>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            snapshots: HashMap::new(),
            active: Arc::new(HashSet::new()),
            aborted: Arc::new(HashSet::new()),
        }
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn begin(&mut self) -> TransactionId {
        let id = self.allocate();

        // Repeatable read: the snapshot is frozen here.
        let snapshot = Snapshot {
            tx_id: id,
            active: self.active.clone(),
            aborted: self.aborted.clone(),
            max_tx_id: id,
        };
        self.snapshots.insert(id, snapshot);

        let mut active = (*self.active).clone();
        active.insert(id);
        self.active = Arc::new(active);

        TransactionId(id)
    }

    /// Snapshot for a call: the unit's own, or a fresh auto-commit one.
    pub fn snapshot(&mut self, transaction_id: Option<TransactionId>) -> StoreResult<Snapshot> {
        match transaction_id {
            Some(id) => self.snapshots.get(&id.0).cloned().ok_or_else(|| {
                StoreError::TransactionError(format!("Transaction {} is not active", id))
            }),
            None => {
                let id = self.allocate();
                Ok(Snapshot {
                    tx_id: id,
                    active: self.active.clone(),
                    aborted: self.aborted.clone(),
                    max_tx_id: self.next_id,
                })
            }
        }
    }

    pub fn state(&self, transaction_id: TransactionId) -> TransactionState {
        if self.active.contains(&transaction_id.0) {
            TransactionState::Active
        } else if self.aborted.contains(&transaction_id.0) {
            TransactionState::Aborted
        } else {
            TransactionState::Committed
        }
    }

    pub fn is_aborted(&self, tx_id: u64) -> bool {
        self.aborted.contains(&tx_id)
    }

    pub fn commit(&mut self, transaction_id: TransactionId) -> StoreResult<()> {
        self.finish(transaction_id)?;
        Ok(())
    }

    pub fn rollback(&mut self, transaction_id: TransactionId) -> StoreResult<()> {
        self.finish(transaction_id)?;
        let mut aborted = (*self.aborted).clone();
        aborted.insert(transaction_id.0);
        self.aborted = Arc::new(aborted);
        Ok(())
    }

    /// Marks a single auto-commit statement as failed so its partial writes stay invisible.
    pub fn abort_statement(&mut self, tx_id: u64) {
        let mut aborted = (*self.aborted).clone();
        aborted.insert(tx_id);
        self.aborted = Arc::new(aborted);
    }

    fn finish(&mut self, transaction_id: TransactionId) -> StoreResult<()> {
        if self.snapshots.remove(&transaction_id.0).is_none() {
            return Err(StoreError::TransactionError(format!(
                "Transaction {} not active ({})",
                transaction_id,
                self.state(transaction_id)
            )));
        }

        let mut active = (*self.active).clone();
        active.remove(&transaction_id.0);
        self.active = Arc::new(active);
        Ok(())
    }
}
