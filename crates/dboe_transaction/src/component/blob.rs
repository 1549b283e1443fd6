//! A transactional byte buffer.

use crate::component::{load_file, persist_atomically, ComponentLifecycle, TransactionalComponent};
use crate::error::TxnResult;
use crate::id::{ComponentId, TxnId};
use crate::types::TxnInfo;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct BlobView {
    base: Arc<Vec<u8>>,
    pending: Option<Vec<u8>>,
}

impl BlobView {
    fn current(&self) -> &[u8] {
        self.pending.as_deref().unwrap_or(self.base.as_slice())
    }
}

/// A byte buffer with snapshot isolation.
///
/// Readers share the committed buffer; a writer copies it on first write.
/// Redo is the whole new buffer.
pub struct TransBlob {
    lifecycle: ComponentLifecycle<BlobView>,
    committed: RwLock<Arc<Vec<u8>>>,
    location: Option<PathBuf>,
}

impl TransBlob {
    /// Creates an in-memory blob.
    #[must_use]
    pub fn new(component_id: ComponentId, initial: impl Into<Vec<u8>>) -> Self {
        Self {
            lifecycle: ComponentLifecycle::new(component_id),
            committed: RwLock::new(Arc::new(initial.into())),
            location: None,
        }
    }

    /// Creates a blob backed by the file at `path`; an absent file starts
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn open(component_id: ComponentId, path: impl AsRef<Path>) -> TxnResult<Self> {
        let path = path.as_ref();
        let bytes = load_file(path)?.unwrap_or_default();
        Ok(Self {
            lifecycle: ComponentLifecycle::new(component_id),
            committed: RwLock::new(Arc::new(bytes)),
            location: Some(path.to_path_buf()),
        })
    }

    /// The bytes as seen by `txn`.
    ///
    /// # Errors
    ///
    /// Returns an error if `txn` has no view here.
    pub fn get(&self, txn: TxnId) -> TxnResult<Vec<u8>> {
        self.lifecycle.with_state(txn, |_, view| view.current().to_vec())
    }

    /// Length as seen by `txn`.
    ///
    /// # Errors
    ///
    /// Returns an error if `txn` has no view here.
    pub fn len(&self, txn: TxnId) -> TxnResult<usize> {
        self.lifecycle.with_state(txn, |_, view| view.current().len())
    }

    /// Replaces the bytes within `txn`.
    ///
    /// # Errors
    ///
    /// Returns an error unless `txn` is a writer.
    pub fn set(&self, txn: TxnId, bytes: impl Into<Vec<u8>>) -> TxnResult<()> {
        let bytes = bytes.into();
        self.lifecycle
            .with_state_mut(txn, |_, view| view.pending = Some(bytes))
    }

    /// Appends to the bytes within `txn`.
    ///
    /// # Errors
    ///
    /// Returns an error unless `txn` is a writer.
    pub fn append(&self, txn: TxnId, bytes: &[u8]) -> TxnResult<()> {
        self.lifecycle.with_state_mut(txn, |_, view| {
            let base = &view.base;
            view.pending
                .get_or_insert_with(|| base.as_ref().clone())
                .extend_from_slice(bytes);
        })
    }

    /// The last committed bytes.
    #[must_use]
    pub fn committed(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.committed.read())
    }

    fn install(&self, bytes: Vec<u8>) -> TxnResult<()> {
        let mut committed = self.committed.write();
        if let Some(path) = &self.location {
            persist_atomically(path, &bytes)?;
        }
        *committed = Arc::new(bytes);
        Ok(())
    }
}

impl TransactionalComponent for TransBlob {
    fn component_id(&self) -> ComponentId {
        self.lifecycle.component_id()
    }

    fn recover(&self, redo: &[u8]) -> TxnResult<()> {
        self.install(redo.to_vec())
    }

    fn begin(&self, txn: &TxnInfo) -> TxnResult<()> {
        let base = self.committed();
        self.lifecycle.begin_with(txn, BlobView { base, pending: None })
    }

    fn promote(&self, txn: &TxnInfo, read_committed: bool) -> TxnResult<()> {
        let latest = self.committed();
        self.lifecycle.promote_with(txn, |view| {
            if read_committed {
                view.base = latest;
            }
        })
    }

    fn prepare(&self, txn: &TxnInfo) -> TxnResult<Option<Vec<u8>>> {
        self.lifecycle
            .with_state(txn.id, |_, view| view.pending.clone())
    }

    fn commit(&self, txn: &TxnInfo) -> TxnResult<()> {
        let (info, view) = self.lifecycle.take(txn.id)?;
        match view.pending {
            Some(bytes) if info.is_write() => self.install(bytes),
            _ => Ok(()),
        }
    }

    fn abort(&self, txn: &TxnInfo) -> TxnResult<()> {
        self.lifecycle.take(txn.id).map(|_| ())
    }

    fn complete(&self, txn: &TxnInfo) -> TxnResult<()> {
        self.lifecycle.complete(txn.id);
        Ok(())
    }
}

impl std::fmt::Debug for TransBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransBlob")
            .field("id", &self.component_id())
            .field("committed_len", &self.committed.read().len())
            .field("location", &self.location)
            .finish()
    }
}
