// Change Tracker - explicit pending-change list consumed by the save pipeline
//
// Repositories stage entities here; nothing reaches the store until the unit
// of work saves. Audit stamping happens while a change is turned into a
// write, so it always sees the final state of the entity. Stamps land on a
// prepared copy and reach the staged entity only once the write is flushed.

use crate::domain::capability::{CREATED_BY, CREATED_ON, DELETED_BY, DELETED_ON, IS_DELETED};
use crate::domain::{Entity, Record, Schema, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle of a staged entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Known to the unit of work, no pending change
    Unchanged,
    Added,
    Modified,
    Deleted,
}

/// Kind of a pending change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl From<ChangeKind> for EntryState {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Added => EntryState::Added,
            ChangeKind::Modified => EntryState::Modified,
            ChangeKind::Deleted => EntryState::Deleted,
        }
    }
}

/// A physical write derived from one pending change
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Insert(Record),
    Update { key: Value, values: Record },
    Delete { key: Value },
}

/// Type-erased view of a staged entity
pub(crate) trait TrackedEntry: Send + Sync {
    fn schema(&self) -> Schema;

    fn key(&self) -> Value;

    fn record(&self) -> Record;

    fn set_state(&self, state: EntryState);

    /// Stamp a copy of the entity for `kind` and describe the resulting write.
    ///
    /// `None` means the change needs no write (an already soft-deleted row,
    /// or an update with no changed columns). The staged entity is left
    /// untouched until `apply_prepared`.
    fn prepare(
        &self,
        kind: ChangeKind,
        original: Option<&Record>,
        actor: &str,
        now: i64,
    ) -> Option<Write>;

    /// Replace the staged entity with the stamped copy, then apply the generated key
    fn apply_prepared(&self, generated_key: Option<i64>);

    /// Drop the stamped copy after a failed flush
    fn discard_prepared(&self);
}

struct SlotInner<T> {
    entity: T,
    state: EntryState,
    prepared: Option<T>,
}

/// Shared cell holding one staged entity
pub(crate) struct Slot<T> {
    inner: Mutex<SlotInner<T>>,
}

impl<T: Entity> Slot<T> {
    fn new(entity: T, state: EntryState) -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                entity,
                state,
                prepared: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Entity> TrackedEntry for Slot<T> {
    fn schema(&self) -> Schema {
        T::SCHEMA
    }

    fn key(&self) -> Value {
        self.lock().entity.id().into()
    }

    fn record(&self) -> Record {
        self.lock().entity.to_record()
    }

    fn set_state(&self, state: EntryState) {
        self.lock().state = state;
    }

    fn prepare(
        &self,
        kind: ChangeKind,
        original: Option<&Record>,
        actor: &str,
        now: i64,
    ) -> Option<Write> {
        let mut inner = self.lock();
        let mut entity = inner.entity.clone();
        let write = stamp(&mut entity, kind, original, actor, now);
        inner.prepared = Some(entity);
        write
    }

    fn apply_prepared(&self, generated_key: Option<i64>) {
        let mut inner = self.lock();
        if let Some(prepared) = inner.prepared.take() {
            inner.entity = prepared;
        }
        if let Some(key) = generated_key {
            inner.entity.assign_key(key);
        }
    }

    fn discard_prepared(&self) {
        self.lock().prepared = None;
    }
}

/// Apply the audit stamps for `kind` to `entity` and build its write
fn stamp<T: Entity>(
    entity: &mut T,
    kind: ChangeKind,
    original: Option<&Record>,
    actor: &str,
    now: i64,
) -> Option<Write> {
    let schema = T::SCHEMA;
    let caps = schema.capabilities;

    match kind {
        ChangeKind::Added => {
            if caps.creatable {
                if let Some(creatable) = entity.as_creatable_mut() {
                    creatable.stamp_created(actor, now);
                }
            }
            if caps.modifiable {
                if let Some(modifiable) = entity.as_modifiable_mut() {
                    modifiable.stamp_modified(actor, now);
                }
            }
            let mut values = entity.to_record();
            if schema.generated_key {
                values.remove(schema.key.name);
            }
            Some(Write::Insert(values))
        }
        ChangeKind::Modified => {
            if caps.modifiable {
                if let Some(modifiable) = entity.as_modifiable_mut() {
                    modifiable.stamp_modified(actor, now);
                }
            }
            let current = entity.to_record();
            let mut values = match original {
                Some(original) => current.changed_since(original),
                None => current,
            };
            values.remove(schema.key.name);
            values.remove(CREATED_BY.name);
            values.remove(CREATED_ON.name);
            if values.is_empty() {
                return None;
            }
            Some(Write::Update {
                key: entity.id().into(),
                values,
            })
        }
        ChangeKind::Deleted => {
            let key: Value = entity.id().into();
            if !caps.deletable {
                return Some(Write::Delete { key });
            }
            let Some(deletable) = entity.as_deletable_mut() else {
                return Some(Write::Delete { key });
            };
            if deletable.is_deleted() {
                return None;
            }
            deletable.mark_deleted(actor, now);
            let values = entity
                .to_record()
                .project(&[IS_DELETED.name, DELETED_BY.name, DELETED_ON.name]);
            Some(Write::Update { key, values })
        }
    }
}

/// Caller's handle on a staged or attached entity.
///
/// Reflects what the save pipeline did: generated keys, audit stamps and the
/// entry state after a successful save.
pub struct Entry<T> {
    slot: Arc<Slot<T>>,
}

impl<T: Entity> Entry<T> {
    /// Copy of the entity as it is now
    pub fn current(&self) -> T {
        self.slot.lock().entity.clone()
    }

    pub fn state(&self) -> EntryState {
        self.slot.lock().state
    }

    pub fn id(&self) -> T::Id {
        self.slot.lock().entity.id()
    }
}

impl<T: Entity> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Entity> fmt::Debug for Entry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.slot.lock();
        f.debug_struct("Entry")
            .field("state", &inner.state)
            .field("entity", &inner.entity)
            .finish()
    }
}

/// One staged change
#[derive(Clone)]
pub(crate) struct PendingChange {
    pub kind: ChangeKind,
    pub entry: Arc<dyn TrackedEntry>,
    /// Snapshot taken when the entity was attached, if any
    pub original: Option<Record>,
}

impl PendingChange {
    fn identity(&self) -> (&'static str, String) {
        (self.entry.schema().table, self.entry.key().to_string())
    }
}

/// Pending changes plus the snapshots of attached entities
#[derive(Default)]
pub struct ChangeTracker {
    pending: Vec<PendingChange>,
    snapshots: HashMap<(&'static str, String), Record>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Stage a change and hand back the caller's handle.
    ///
    /// A later update or delete of the same key replaces an earlier staged
    /// update or delete; inserts are never merged.
    pub fn stage<T: Entity>(&mut self, kind: ChangeKind, entity: T) -> Entry<T> {
        let slot = Arc::new(Slot::new(entity, kind.into()));
        let entry: Arc<dyn TrackedEntry> = slot.clone();
        let identity = (T::SCHEMA.table, entry.key().to_string());
        let original = match kind {
            ChangeKind::Added => None,
            _ => self.snapshots.get(&identity).cloned(),
        };

        if kind != ChangeKind::Added {
            self.pending
                .retain(|change| change.kind == ChangeKind::Added || change.identity() != identity);
        }

        self.pending.push(PendingChange {
            kind,
            entry,
            original,
        });
        Entry { slot }
    }

    /// Track an entity as unchanged, recording its current values as the original snapshot
    pub fn attach<T: Entity>(&mut self, entity: T) -> Entry<T> {
        self.remember(T::SCHEMA.table, entity.id().into(), entity.to_record());
        Entry {
            slot: Arc::new(Slot::new(entity, EntryState::Unchanged)),
        }
    }

    /// Record the original snapshot of a row loaded by a tracked read
    pub fn remember(&mut self, table: &'static str, key: Value, record: Record) {
        self.snapshots.insert((table, key.to_string()), record);
    }

    pub fn snapshot(&self, table: &'static str, key: &Value) -> Option<&Record> {
        self.snapshots.get(&(table, key.to_string()))
    }

    /// Take every pending change, leaving the list empty
    pub(crate) fn drain(&mut self) -> Vec<PendingChange> {
        std::mem::take(&mut self.pending)
    }

    /// Put changes back after a failed save, ahead of anything staged since
    pub(crate) fn restore(&mut self, mut changes: Vec<PendingChange>) {
        changes.append(&mut self.pending);
        self.pending = changes;
    }

    /// Mark a flushed change as unchanged and refresh its snapshot
    pub(crate) fn accept(&mut self, change: &PendingChange, physically_deleted: bool) {
        change.entry.set_state(EntryState::Unchanged);
        let identity = change.identity();
        if physically_deleted {
            self.snapshots.remove(&identity);
        } else {
            self.snapshots.insert(identity, change.entry.record());
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.snapshots.clear();
    }
}

impl fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("pending", &self.pending.len())
            .field("snapshots", &self.snapshots.len())
            .finish()
    }
}
