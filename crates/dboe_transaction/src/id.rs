//! Transaction and component identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Length in bytes of a [`TxnId`].
pub const TXN_ID_LEN: usize = 16;

/// Length in bytes of a [`ComponentId`].
pub const COMPONENT_ID_LEN: usize = 16;

/// Opaque transaction identifier.
///
/// Two ids are equal iff their bytes are equal. Every `begin` gets a fresh
/// id from the coordinator's [`TxnIdGenerator`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId([u8; TXN_ID_LEN]);

impl TxnId {
    /// Creates an id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; TXN_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates an id from a counter value (big-endian in the low 8 bytes).
    #[must_use]
    pub fn from_u64(n: u64) -> Self {
        let mut bytes = [0u8; TXN_ID_LEN];
        bytes[8..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    /// Creates an id from a slice; `None` unless it is exactly 16 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; TXN_ID_LEN]>::try_from(slice).ok().map(Self)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; TXN_ID_LEN] {
        &self.0
    }

    /// The counter value, if this id came from a counter.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        if self.0[..8].iter().all(|b| *b == 0) {
            let mut low = [0u8; 8];
            low.copy_from_slice(&self.0[8..]);
            Some(u64::from_be_bytes(low))
        } else {
            None
        }
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u64() {
            Some(n) => write!(f, "txn:{n}"),
            None => write!(f, "txn:{}", hex(&self.0)),
        }
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxnId({self})")
    }
}

/// Source of fresh transaction ids.
pub trait TxnIdGenerator: Send + Sync {
    /// Returns an id never returned before by this generator.
    fn generate(&self) -> TxnId;
}

/// Counter-based ids, starting at 1. Unique within one coordinator run.
#[derive(Debug)]
pub struct SimpleTxnIdGenerator {
    next: AtomicU64,
}

impl SimpleTxnIdGenerator {
    /// Creates a generator whose first id is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SimpleTxnIdGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl TxnIdGenerator for SimpleTxnIdGenerator {
    fn generate(&self) -> TxnId {
        TxnId::from_u64(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Random v4 UUID ids, unique across coordinator runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTxnIdGenerator;

impl TxnIdGenerator for UuidTxnIdGenerator {
    fn generate(&self) -> TxnId {
        let mut bytes = Uuid::new_v4().into_bytes();
        // Keep the high half non-zero so the id never reads as a counter.
        bytes[0] |= 0x80;
        TxnId(bytes)
    }
}

/// Fixed-length id of a registered component.
///
/// Journal entries carry it so recovery can route redo bytes to their
/// owner. The all-zero id is reserved for control entries.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId([u8; COMPONENT_ID_LEN]);

impl ComponentId {
    /// Id carried by `COMMIT` and `ABORT` entries.
    pub const CONTROL: Self = Self([0; COMPONENT_ID_LEN]);

    /// Creates an id from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; COMPONENT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates an id from a short label, zero padded (or truncated) to
    /// 16 bytes.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let mut bytes = [0u8; COMPONENT_ID_LEN];
        let src = label.as_bytes();
        let n = src.len().min(COMPONENT_ID_LEN);
        bytes[..n].copy_from_slice(&src[..n]);
        Self(bytes)
    }

    /// Creates an id from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; COMPONENT_ID_LEN] {
        &self.0
    }

    /// Whether this is the reserved control id.
    #[must_use]
    pub fn is_control(&self) -> bool {
        *self == Self::CONTROL
    }

    /// The label, if the id was made by [`ComponentId::from_label`] from
    /// printable ASCII.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(COMPONENT_ID_LEN);
        if end == 0 || self.0[end..].iter().any(|b| *b != 0) {
            return None;
        }
        let text = std::str::from_utf8(&self.0[..end]).ok()?;
        text.chars()
            .all(|c| c.is_ascii_graphic() || c == ' ')
            .then_some(text)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_control() {
            return f.write_str("<control>");
        }
        match self.label() {
            Some(label) => f.write_str(label),
            None => f.write_str(&hex(&self.0)),
        }
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({self})")
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
