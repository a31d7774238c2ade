// Session - one store connection scope, its transaction state and pending changes
//
// A unit of work owns exactly one session and shares it with every
// repository it hands out. All access goes through the async mutex, so reads,
// staging and saves are serialized.

use super::change_tracker::{ChangeTracker, PendingChange, Write};
use crate::error::{AppError, Result};
use crate::port::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared handle used by the unit of work and its repositories
pub type SharedSession = Arc<Mutex<Session>>;

/// Transaction state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Begun,
    Committed,
    RolledBack,
    /// Terminal
    Disposed,
}

pub struct Session {
    store: Option<Box<dyn Store>>,
    tracker: ChangeTracker,
    state: SessionState,
    /// Set without the lock when the owner is dropped mid-operation
    released: Arc<AtomicBool>,
}

fn disposed() -> AppError {
    AppError::InvalidState("unit of work has been disposed".to_string())
}

impl Session {
    pub fn new(store: Box<dyn Store>) -> Self {
        Self {
            store: Some(store),
            tracker: ChangeTracker::new(),
            state: SessionState::Open,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shared(store: Box<dyn Store>) -> SharedSession {
        Arc::new(Mutex::new(Self::new(store)))
    }

    pub fn state(&self) -> SessionState {
        if self.released.load(Ordering::Acquire) {
            return SessionState::Disposed;
        }
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == SessionState::Disposed
    }

    /// Flag that disposes the session on its next use, settable without the lock
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    fn check_usable(&mut self) -> Result<()> {
        if !self.is_disposed() {
            return Ok(());
        }
        if self.store.is_some() {
            self.release();
        }
        Err(disposed())
    }

    /// Store for the current operation; fails once disposed
    pub fn store(&mut self) -> Result<&mut dyn Store> {
        self.check_usable()?;
        match self.store.as_deref_mut() {
            Some(store) => Ok(store),
            None => Err(disposed()),
        }
    }

    pub fn tracker(&mut self) -> Result<&mut ChangeTracker> {
        self.check_usable()?;
        Ok(&mut self.tracker)
    }

    pub async fn begin(&mut self) -> Result<()> {
        if self.state == SessionState::Begun {
            return Err(AppError::InvalidState(
                "transaction already begun".to_string(),
            ));
        }
        self.store()?.begin().await?;
        self.state = SessionState::Begun;
        debug!("Transaction begun");
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.require_begun("commit")?;
        self.store()?.commit().await?;
        self.state = SessionState::Committed;
        info!("Transaction committed");
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.require_begun("rollback")?;
        self.store()?.rollback().await?;
        self.state = SessionState::RolledBack;
        info!("Transaction rolled back");
        Ok(())
    }

    fn require_begun(&self, operation: &str) -> Result<()> {
        match self.state() {
            SessionState::Begun => Ok(()),
            SessionState::Disposed => Err(disposed()),
            state => Err(AppError::InvalidState(format!(
                "cannot {} without an open transaction (state: {:?})",
                operation, state
            ))),
        }
    }

    /// Stamp and flush every pending change.
    ///
    /// Runs inside the ambient transaction when one is begun, otherwise inside
    /// an implicit one. On failure the implicit transaction is rolled back and
    /// every change is put back unstamped for a later attempt. Inside an
    /// ambient transaction the changes flushed before the failure stay in that
    /// transaction and only the rest is put back.
    pub async fn save(&mut self, actor: &str, now: i64, cancel: &CancellationToken) -> Result<u64> {
        self.check_usable()?;
        let Some(store) = self.store.as_deref_mut() else {
            return Err(disposed());
        };

        let mut changes = self.tracker.drain();
        if changes.is_empty() {
            return Ok(0);
        }
        if cancel.is_cancelled() {
            self.tracker.restore(changes);
            return Err(AppError::Cancelled("save cancelled before flush".to_string()));
        }

        let implicit = !store.in_transaction();
        if implicit {
            if let Err(e) = store.begin().await {
                self.tracker.restore(changes);
                return Err(e);
            }
        }

        let writes: Vec<Option<Write>> = changes
            .iter()
            .map(|change| {
                change
                    .entry
                    .prepare(change.kind, change.original.as_ref(), actor, now)
            })
            .collect();

        let mut flushed = Flushed::default();
        let outcome = match flush(store, &changes, &writes, cancel, &mut flushed).await {
            Ok(()) if implicit => store.commit().await,
            other => other,
        };

        match outcome {
            Ok(()) => {
                accept_flushed(&mut self.tracker, &changes, &writes, &flushed.generated);
                info!(
                    changes = changes.len(),
                    affected = flushed.affected,
                    actor = actor,
                    "Changes saved"
                );
                Ok(flushed.affected)
            }
            Err(e) if implicit => {
                if store.in_transaction() {
                    if let Err(rollback_error) = store.rollback().await {
                        warn!(error = %rollback_error, "Rollback after failed save also failed");
                    }
                }
                for change in &changes {
                    change.entry.discard_prepared();
                }
                warn!(error = %e, changes = changes.len(), "Save failed, changes kept pending");
                self.tracker.restore(changes);
                Err(e)
            }
            Err(e) => {
                let remaining = changes.split_off(flushed.completed);
                accept_flushed(&mut self.tracker, &changes, &writes, &flushed.generated);
                for change in &remaining {
                    change.entry.discard_prepared();
                }
                warn!(
                    error = %e,
                    flushed = changes.len(),
                    pending = remaining.len(),
                    "Save failed inside transaction, unflushed changes kept pending"
                );
                self.tracker.restore(remaining);
                Err(e)
            }
        }
    }

    /// Roll back an open transaction and release the store (idempotent)
    pub async fn dispose(&mut self) -> Result<()> {
        self.state = SessionState::Disposed;
        self.tracker.clear();
        let Some(mut store) = self.store.take() else {
            return Ok(());
        };
        if store.in_transaction() {
            warn!("Disposing with an open transaction, rolling back");
            store.rollback().await?;
        }
        store.close().await
    }

    /// Synchronous release for drop paths; the store rolls back on drop
    pub fn release(&mut self) {
        if self.state == SessionState::Begun {
            warn!("Unit of work dropped with an open transaction, rolling back");
        }
        self.state = SessionState::Disposed;
        self.tracker.clear();
        self.store = None;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("tracker", &self.tracker)
            .finish()
    }
}

#[derive(Default)]
struct Flushed {
    affected: u64,
    /// Leading changes that reached the store
    completed: usize,
    /// (change index, generated key)
    generated: Vec<(usize, i64)>,
}

/// Settle the leading `changes` that reached the store
fn accept_flushed(
    tracker: &mut ChangeTracker,
    changes: &[PendingChange],
    writes: &[Option<Write>],
    generated: &[(usize, i64)],
) {
    for (index, (change, write)) in changes.iter().zip(writes).enumerate() {
        let key = generated
            .iter()
            .find(|(at, _)| *at == index)
            .map(|(_, key)| *key);
        change.entry.apply_prepared(key);
        let physically_deleted = matches!(write, Some(Write::Delete { .. }));
        tracker.accept(change, physically_deleted);
    }
}

async fn flush(
    store: &mut dyn Store,
    changes: &[PendingChange],
    writes: &[Option<Write>],
    cancel: &CancellationToken,
    flushed: &mut Flushed,
) -> Result<()> {
    for (index, (change, write)) in changes.iter().zip(writes).enumerate() {
        let Some(write) = write else {
            debug!(kind = ?change.kind, "No write needed");
            flushed.completed = index + 1;
            continue;
        };
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled("save cancelled during flush".to_string()));
        }

        let schema = change.entry.schema();
        flushed.affected += match write {
            Write::Insert(values) => {
                let outcome = store.insert(&schema, values).await?;
                if let Some(key) = outcome.generated_key {
                    flushed.generated.push((index, key));
                }
                outcome.rows_affected
            }
            Write::Update { key, values } => store.update(&schema, key, values).await?,
            Write::Delete { key } => store.delete(&schema, key).await?,
        };
        flushed.completed = index + 1;
        debug!(table = schema.table, kind = ?change.kind, "Change flushed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::change_tracker::{ChangeKind, EntryState};
    use crate::domain::{Article, Label, Value};
    use crate::port::{InsertOutcome, MockStore};

    fn article(id: i64) -> Article {
        let mut article = Article::new("t", None);
        article.id = id;
        article
    }

    #[tokio::test]
    async fn test_save_without_changes_returns_zero() {
        let mut store = MockStore::new();
        store.expect_begin().never();
        let mut session = Session::new(Box::new(store));

        let saved = session.save("x", 1, &CancellationToken::new()).await.unwrap();
        assert_eq!(saved, 0);
    }

    #[tokio::test]
    async fn test_save_uses_implicit_transaction_and_assigns_keys() {
        let mut store = MockStore::new();
        store.expect_in_transaction().return_const(false);
        store.expect_begin().times(1).returning(|| Ok(()));
        store.expect_insert().times(1).returning(|_, _| {
            Ok(InsertOutcome {
                rows_affected: 1,
                generated_key: Some(42),
            })
        });
        store.expect_commit().times(1).returning(|| Ok(()));

        let mut session = Session::new(Box::new(store));
        let entry = session.tracker().unwrap().stage(ChangeKind::Added, Article::new("a", None));

        let saved = session.save("alice", 10, &CancellationToken::new()).await.unwrap();

        assert_eq!(saved, 1);
        assert_eq!(entry.id(), 42);
        assert_eq!(entry.state(), EntryState::Unchanged);
        assert_eq!(session.tracker().unwrap().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_flush_rolls_back_and_keeps_changes() {
        let mut store = MockStore::new();
        let mut in_tx = false;
        store.expect_in_transaction().returning(move || {
            let current = in_tx;
            in_tx = true;
            current
        });
        store.expect_begin().times(1).returning(|| Ok(()));
        store
            .expect_update()
            .times(1)
            .returning(|_, _, _| Err(AppError::Database("disk I/O error".into())));
        store.expect_rollback().times(1).returning(|| Ok(()));
        store.expect_commit().never();

        let mut session = Session::new(Box::new(store));
        session.tracker().unwrap().stage(ChangeKind::Modified, article(3));

        let result = session.save("bob", 10, &CancellationToken::new()).await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(session.tracker().unwrap().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_failed_flush_writes_soft_delete() {
        let mut store = MockStore::new();
        let mut calls = 0;
        store.expect_in_transaction().returning(move || {
            calls += 1;
            calls % 2 == 0
        });
        store.expect_begin().times(2).returning(|| Ok(()));
        let mut attempts = 0;
        store
            .expect_update()
            .withf(|_, _, values| {
                values.get("is_deleted") == Some(&Value::Bool(true))
                    && values.get("deleted_by") == Some(&Value::from("carol"))
            })
            .times(2)
            .returning(move |_, _, _| {
                attempts += 1;
                if attempts == 1 {
                    Err(AppError::Database("database is locked".into()))
                } else {
                    Ok(1)
                }
            });
        store.expect_rollback().times(1).returning(|| Ok(()));
        store.expect_commit().times(1).returning(|| Ok(()));

        let mut session = Session::new(Box::new(store));
        let entry = session.tracker().unwrap().stage(ChangeKind::Deleted, article(4));
        let cancel = CancellationToken::new();

        assert!(session.save("carol", 10, &cancel).await.is_err());
        assert!(!entry.current().audit.is_deleted);

        assert_eq!(session.save("carol", 20, &cancel).await.unwrap(), 1);
        assert!(entry.current().audit.is_deleted);
        assert_eq!(entry.current().audit.deleted_on, Some(20));
        assert_eq!(entry.state(), EntryState::Unchanged);
    }

    #[tokio::test]
    async fn test_failure_inside_ambient_transaction_keeps_flushed_prefix() {
        let mut store = MockStore::new();
        store.expect_begin().times(1).returning(|| Ok(()));
        store.expect_in_transaction().return_const(true);
        store.expect_insert().times(1).returning(|_, _| {
            Ok(InsertOutcome {
                rows_affected: 1,
                generated_key: Some(77),
            })
        });
        let mut attempts = 0;
        store.expect_update().times(2).returning(move |_, _, _| {
            attempts += 1;
            if attempts == 1 {
                Err(AppError::Database("database is locked".into()))
            } else {
                Ok(1)
            }
        });
        store.expect_commit().never();
        store.expect_rollback().never();

        let mut session = Session::new(Box::new(store));
        session.begin().await.unwrap();
        let inserted = session
            .tracker()
            .unwrap()
            .stage(ChangeKind::Added, Article::new("new", None));
        let updated = session.tracker().unwrap().stage(ChangeKind::Modified, article(5));
        let cancel = CancellationToken::new();

        assert!(session.save("x", 1, &cancel).await.is_err());
        assert_eq!(inserted.id(), 77);
        assert_eq!(inserted.state(), EntryState::Unchanged);
        assert_eq!(updated.state(), EntryState::Modified);
        assert_eq!(session.tracker().unwrap().pending_count(), 1);

        assert_eq!(session.save("x", 2, &cancel).await.unwrap(), 1);
        assert_eq!(inserted.id(), 77);
        assert_eq!(session.tracker().unwrap().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_save_inside_ambient_transaction_does_not_commit() {
        let mut store = MockStore::new();
        store.expect_begin().times(1).returning(|| Ok(()));
        store.expect_in_transaction().return_const(true);
        store.expect_delete().times(1).returning(|_, _| Ok(1));
        store.expect_commit().never();

        let mut session = Session::new(Box::new(store));
        session.begin().await.unwrap();
        let mut label = Label::new("l");
        label.id = 8;
        session.tracker().unwrap().stage(ChangeKind::Deleted, label);

        let saved = session.save("x", 1, &CancellationToken::new()).await.unwrap();
        assert_eq!(saved, 1);
        assert_eq!(session.state(), SessionState::Begun);
    }

    #[tokio::test]
    async fn test_cancelled_save_keeps_changes() {
        let mut store = MockStore::new();
        store.expect_begin().never();

        let mut session = Session::new(Box::new(store));
        session.tracker().unwrap().stage(ChangeKind::Modified, article(1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = session.save("x", 1, &cancel).await;

        assert!(matches!(result, Err(AppError::Cancelled(_))));
        assert_eq!(session.tracker().unwrap().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_transaction_state_machine() {
        let mut store = MockStore::new();
        store.expect_begin().times(2).returning(|| Ok(()));
        store.expect_commit().times(1).returning(|| Ok(()));
        store.expect_rollback().times(1).returning(|| Ok(()));
        store.expect_in_transaction().return_const(false);
        store.expect_close().times(1).returning(|| Ok(()));

        let mut session = Session::new(Box::new(store));

        assert!(matches!(session.commit().await, Err(AppError::InvalidState(_))));
        assert!(matches!(session.rollback().await, Err(AppError::InvalidState(_))));

        session.begin().await.unwrap();
        assert!(matches!(session.begin().await, Err(AppError::InvalidState(_))));
        session.commit().await.unwrap();
        assert_eq!(session.state(), SessionState::Committed);

        session.begin().await.unwrap();
        session.rollback().await.unwrap();
        assert_eq!(session.state(), SessionState::RolledBack);

        session.dispose().await.unwrap();
        session.dispose().await.unwrap();
        assert!(matches!(session.begin().await, Err(AppError::InvalidState(_))));
        assert!(session.store().is_err());
    }
}
