//! A transactional integer.

use crate::component::{load_file, persist_atomically, ComponentLifecycle, TransactionalComponent};
use crate::error::{TxnError, TxnResult};
use crate::id::{ComponentId, TxnId};
use crate::types::TxnInfo;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
struct IntView {
    value: i64,
    dirty: bool,
}

/// A single `i64` with snapshot isolation.
///
/// Each transaction sees the value committed when it began, plus its own
/// writes. Redo is the 8-byte little-endian value. With a backing file the
/// committed value is also written there on every commit.
pub struct TransInteger {
    lifecycle: ComponentLifecycle<IntView>,
    committed: RwLock<i64>,
    location: Option<PathBuf>,
}

impl TransInteger {
    /// Creates an in-memory integer starting at `initial`.
    #[must_use]
    pub fn new(component_id: ComponentId, initial: i64) -> Self {
        Self {
            lifecycle: ComponentLifecycle::new(component_id),
            committed: RwLock::new(initial),
            location: None,
        }
    }

    /// Creates an integer backed by the file at `path`, reading the stored
    /// value if the file exists and writing `initial` if it does not.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written, or does not
    /// hold an 8-byte value.
    pub fn open(component_id: ComponentId, path: impl AsRef<Path>, initial: i64) -> TxnResult<Self> {
        let path = path.as_ref();
        let value = match load_file(path)? {
            Some(bytes) => decode(component_id, &bytes)?,
            None => {
                persist_atomically(path, &initial.to_le_bytes())?;
                initial
            }
        };
        Ok(Self {
            lifecycle: ComponentLifecycle::new(component_id),
            committed: RwLock::new(value),
            location: Some(path.to_path_buf()),
        })
    }

    /// The value as seen by `txn`.
    ///
    /// # Errors
    ///
    /// Returns an error if `txn` has no view here.
    pub fn get(&self, txn: TxnId) -> TxnResult<i64> {
        self.lifecycle.with_state(txn, |_, view| view.value)
    }

    /// Sets the value within `txn`.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::NotWriteTransaction`] unless `txn` is a writer.
    pub fn set(&self, txn: TxnId, value: i64) -> TxnResult<()> {
        self.lifecycle.with_state_mut(txn, |_, view| {
            view.value = value;
            view.dirty = true;
        })
    }

    /// Adds one within `txn`.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::NotWriteTransaction`] unless `txn` is a writer,
    /// or a component error on overflow.
    pub fn inc(&self, txn: TxnId) -> TxnResult<()> {
        let id = self.lifecycle.component_id();
        self.lifecycle.with_state_mut(txn, |_, view| {
            view.value = view
                .value
                .checked_add(1)
                .ok_or_else(|| TxnError::component(id, "integer overflow"))?;
            view.dirty = true;
            Ok(())
        })?
    }

    /// The last committed value.
    #[must_use]
    pub fn committed_value(&self) -> i64 {
        *self.committed.read()
    }

    /// Backing file, if any.
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    fn install(&self, value: i64) -> TxnResult<()> {
        let mut committed = self.committed.write();
        if let Some(path) = &self.location {
            persist_atomically(path, &value.to_le_bytes())?;
        }
        *committed = value;
        Ok(())
    }
}

fn decode(component_id: ComponentId, bytes: &[u8]) -> TxnResult<i64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        TxnError::component(
            component_id,
            format!("expected 8 bytes for an integer, got {}", bytes.len()),
        )
    })?;
    Ok(i64::from_le_bytes(raw))
}

impl TransactionalComponent for TransInteger {
    fn component_id(&self) -> ComponentId {
        self.lifecycle.component_id()
    }

    fn recover(&self, redo: &[u8]) -> TxnResult<()> {
        self.install(decode(self.component_id(), redo)?)
    }

    fn begin(&self, txn: &TxnInfo) -> TxnResult<()> {
        let value = *self.committed.read();
        self.lifecycle
            .begin_with(txn, IntView { value, dirty: false })
    }

    fn promote(&self, txn: &TxnInfo, read_committed: bool) -> TxnResult<()> {
        let latest = *self.committed.read();
        self.lifecycle.promote_with(txn, |view| {
            if read_committed {
                view.value = latest;
            }
        })
    }

    fn prepare(&self, txn: &TxnInfo) -> TxnResult<Option<Vec<u8>>> {
        self.lifecycle.with_state(txn.id, |_, view| {
            view.dirty.then(|| view.value.to_le_bytes().to_vec())
        })
    }

    fn commit(&self, txn: &TxnInfo) -> TxnResult<()> {
        let (info, view) = self.lifecycle.take(txn.id)?;
        if info.is_write() && view.dirty {
            self.install(view.value)?;
        }
        Ok(())
    }

    fn abort(&self, txn: &TxnInfo) -> TxnResult<()> {
        self.lifecycle.take(txn.id).map(|_| ())
    }

    fn complete(&self, txn: &TxnInfo) -> TxnResult<()> {
        self.lifecycle.complete(txn.id);
        Ok(())
    }
}

impl std::fmt::Debug for TransInteger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransInteger")
            .field("id", &self.component_id())
            .field("committed", &self.committed_value())
            .field("location", &self.location)
            .finish()
    }
}
