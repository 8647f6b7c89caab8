//! Pending-call table correlating dispatched commands with their results

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::connections::{CommandResult, ConnectionId, CorrelationId, Identity};

/// How a pending call was terminated by someone other than its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Device reported a result (`Err` carries the device-side error)
    Completed(Result<String, String>),
    /// Target connection went away before reporting
    Disconnected,
}

/// Read-only view of an in-flight call
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub correlation_id: CorrelationId,
    pub command: String,
    pub deadline: DateTime<Utc>,
}

struct PendingEntry {
    target: Identity,
    /// Connection the request was pushed to, once known
    connection: Option<ConnectionId>,
    command: String,
    deadline: DateTime<Utc>,
    responder: oneshot::Sender<Resolution>,
}

/// Map from correlation id to a single-use completion handle
///
/// Every termination path (result, timeout, disconnect, cancellation) goes
/// through one atomic remove, so only the first path to claim an entry acts on
/// it. Resolving paths signal the waiter before releasing the lock, so a
/// failed [`claim`](Self::claim) always finds the winner's value already
/// delivered. The lock is never held across an await point.
#[derive(Default)]
pub struct PendingCallTable {
    entries: Mutex<HashMap<CorrelationId, PendingEntry>>,
}

impl std::fmt::Debug for PendingCallTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCallTable")
            .field("len", &self.len())
            .finish()
    }
}

impl PendingCallTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a call under a fresh correlation id
    ///
    /// Returns the id and the receiver the dispatching task awaits
    pub fn register(
        &self,
        target: &Identity,
        command: &str,
        timeout: Duration,
    ) -> (CorrelationId, oneshot::Receiver<Resolution>) {
        let now = Utc::now();
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut entries = self.lock();
        loop {
            let correlation_id = CorrelationId::generate();
            if let Entry::Vacant(slot) = entries.entry(correlation_id.clone()) {
                let (responder, receiver) = oneshot::channel();
                slot.insert(PendingEntry {
                    target: target.clone(),
                    connection: None,
                    command: command.to_string(),
                    deadline,
                    responder,
                });
                return (correlation_id, receiver);
            }
        }
    }

    /// Remove an entry without resolving it
    ///
    /// Returns true if this call removed it, false if another path already had
    pub fn claim(&self, correlation_id: &CorrelationId) -> bool {
        self.lock().remove(correlation_id).is_some()
    }

    /// Record which connection a call's request was pushed to
    ///
    /// Returns false if the call already terminated
    pub fn bind(&self, correlation_id: &CorrelationId, connection: ConnectionId) -> bool {
        match self.lock().get_mut(correlation_id) {
            Some(entry) => {
                entry.connection = Some(connection);
                true
            }
            None => false,
        }
    }

    /// Resolve the call a device result belongs to
    ///
    /// Results for unknown or already terminated ids are dropped and logged.
    /// Returns true if the result claimed a pending call.
    pub fn resolve(&self, result: CommandResult) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.remove(&result.correlation_id) else {
            drop(entries);
            tracing::warn!(
                correlation_id = %result.correlation_id,
                "dropping orphaned command result"
            );
            return false;
        };

        let correlation_id = result.correlation_id.clone();
        // oneshot send never blocks, so it happens inside the claim
        let delivered = entry
            .responder
            .send(Resolution::Completed(result.into_outcome()))
            .is_ok();
        drop(entries);

        tracing::debug!(
            correlation_id = %correlation_id,
            target = %entry.target,
            command = %entry.command,
            delivered,
            "command result received"
        );
        true
    }

    /// Fail every call pushed to a connection with [`Resolution::Disconnected`]
    ///
    /// Calls sent to a newer connection for the same identity are untouched.
    /// Returns the number of calls failed.
    pub fn fail_connection(&self, connection: ConnectionId) -> usize {
        let mut entries = self.lock();
        let ids: Vec<CorrelationId> = entries
            .iter()
            .filter(|(_, entry)| entry.connection == Some(connection))
            .map(|(id, _)| id.clone())
            .collect();

        let mut failed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = entries.remove(&id) {
                let _ = entry.responder.send(Resolution::Disconnected);
                failed.push((id, entry.target, entry.command));
            }
        }
        drop(entries);

        for (correlation_id, target, command) in &failed {
            tracing::info!(
                correlation_id = %correlation_id,
                target = %target,
                connection_id = %connection,
                command = %command,
                "failing in-flight command: connection closed"
            );
        }
        failed.len()
    }

    /// Whether an id is still awaiting resolution
    #[must_use]
    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.lock().contains_key(correlation_id)
    }

    /// Identity an in-flight call was sent to
    #[must_use]
    pub fn target_of(&self, correlation_id: &CorrelationId) -> Option<Identity> {
        self.lock().get(correlation_id).map(|e| e.target.clone())
    }

    /// Number of in-flight calls addressed to an identity
    #[must_use]
    pub fn count_for(&self, target: &Identity) -> usize {
        self.lock().values().filter(|e| &e.target == target).count()
    }

    /// In-flight calls addressed to an identity, earliest deadline first
    #[must_use]
    pub fn calls_for(&self, target: &Identity) -> Vec<PendingCall> {
        let mut calls: Vec<PendingCall> = self
            .lock()
            .iter()
            .filter(|(_, entry)| &entry.target == target)
            .map(|(id, entry)| PendingCall {
                correlation_id: id.clone(),
                command: entry.command.clone(),
                deadline: entry.deadline,
            })
            .collect();
        calls.sort_by_key(|call| call.deadline);
        calls
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn resolve_delivers_once() {
        let table = PendingCallTable::new();
        let target = Identity::desktop_agent("user1");
        let (id, mut rx) = table.register(&target, "whoami", TIMEOUT);

        assert!(table.resolve(CommandResult::output(id.clone(), "user1")));
        assert!(!table.resolve(CommandResult::output(id.clone(), "again")));

        assert_eq!(
            rx.try_recv().unwrap(),
            Resolution::Completed(Ok("user1".to_string()))
        );
        assert!(table.is_empty());
    }

    #[test]
    fn waiter_stays_pending_until_resolved() {
        use tokio_test::{assert_pending, assert_ready_eq, task};

        let table = PendingCallTable::new();
        let (id, rx) = table.register(&Identity::desktop_agent("u"), "hostname", TIMEOUT);
        let mut waiter = task::spawn(rx);

        assert_pending!(waiter.poll());
        table.resolve(CommandResult::output(id, "PC-01"));

        assert!(waiter.is_woken());
        assert_ready_eq!(waiter.poll(), Ok(Resolution::Completed(Ok("PC-01".to_string()))));
    }

    #[test]
    fn claim_is_exclusive() {
        let table = PendingCallTable::new();
        let (id, _rx) = table.register(&Identity::desktop_agent("u"), "hostname", TIMEOUT);

        assert!(table.claim(&id));
        assert!(!table.claim(&id));
        assert!(!table.resolve(CommandResult::output(id, "late")));
    }

    #[test]
    fn orphan_result_is_dropped() {
        let table = PendingCallTable::new();
        let (id, _rx) = table.register(&Identity::desktop_agent("u"), "hostname", TIMEOUT);

        assert!(!table.resolve(CommandResult::output("unknown", "x")));
        assert!(table.contains(&id));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remote_error_is_preserved() {
        let table = PendingCallTable::new();
        let (id, mut rx) = table.register(&Identity::desktop_agent("u"), "ipconfig", TIMEOUT);

        table.resolve(CommandResult::error(id, "access denied"));
        assert_eq!(
            rx.try_recv().unwrap(),
            Resolution::Completed(Err("access denied".to_string()))
        );
    }

    #[test]
    fn fail_connection_spares_newer_connection() {
        let table = PendingCallTable::new();
        let alice = Identity::desktop_agent("alice");
        let (old, new) = (ConnectionId::generate(), ConnectionId::generate());
        let (a1, mut rx_a1) = table.register(&alice, "whoami", TIMEOUT);
        let (a2, mut rx_a2) = table.register(&alice, "hostname", TIMEOUT);
        let (a3, mut rx_a3) = table.register(&alice, "ipconfig", TIMEOUT);
        assert!(table.bind(&a1, old));
        assert!(table.bind(&a2, old));
        assert!(table.bind(&a3, new));

        assert_eq!(table.fail_connection(old), 2);

        assert_eq!(rx_a1.try_recv().unwrap(), Resolution::Disconnected);
        assert_eq!(rx_a2.try_recv().unwrap(), Resolution::Disconnected);
        assert!(rx_a3.try_recv().is_err());
        assert!(table.contains(&a3));
        assert_eq!(table.count_for(&alice), 1);
    }

    #[test]
    fn unbound_calls_survive_connection_failure() {
        let table = PendingCallTable::new();
        let (id, _rx) = table.register(&Identity::desktop_agent("u"), "whoami", TIMEOUT);

        assert_eq!(table.fail_connection(ConnectionId::generate()), 0);
        assert!(table.contains(&id));
    }

    #[test]
    fn lost_claim_finds_result_already_delivered() {
        let table = PendingCallTable::new();
        let (id, mut rx) = table.register(&Identity::desktop_agent("u"), "hostname", TIMEOUT);

        assert!(table.resolve(CommandResult::output(id.clone(), "PC-01")));
        assert!(!table.claim(&id));
        assert_eq!(
            rx.try_recv().unwrap(),
            Resolution::Completed(Ok("PC-01".to_string()))
        );
        assert!(!table.bind(&id, ConnectionId::generate()));
    }

    #[test]
    fn ids_are_unique() {
        let table = PendingCallTable::new();
        let target = Identity::desktop_agent("u");
        let ids: std::collections::HashSet<_> = (0..100)
            .map(|_| table.register(&target, "whoami", TIMEOUT).0)
            .collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn calls_for_lists_one_identity_by_deadline() {
        let table = PendingCallTable::new();
        let target = Identity::desktop_agent("u");
        let before = Utc::now();
        table.register(&target, "systeminfo", TIMEOUT);
        table.register(&target, "whoami", Duration::from_secs(5));
        table.register(&Identity::desktop_agent("other"), "hostname", TIMEOUT);

        let calls = table.calls_for(&target);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].command, "whoami");
        assert_eq!(calls[1].command, "systeminfo");
        assert!(calls[1].deadline >= before + chrono::Duration::seconds(29));
    }
}
