//! Journal entries and their byte encoding.

use crate::error::{TxnError, TxnResult};
use crate::id::{ComponentId, TxnId, COMPONENT_ID_LEN};

/// type (1) + component id (16) + payload length (4).
pub const ENTRY_HEADER_LEN: usize = 1 + COMPONENT_ID_LEN + 4;

/// Trailing CRC32.
pub const ENTRY_CRC_LEN: usize = 4;

/// Kind of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JournalEntryType {
    /// Component redo bytes.
    Redo = 1,
    /// Component undo bytes. Readable, but recovery does not act on them.
    Undo = 2,
    /// The preceding redo entries are authoritative.
    Commit = 3,
    /// The preceding redo entries are discarded.
    Abort = 4,
}

impl JournalEntryType {
    /// Parses a type byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Redo),
            2 => Some(Self::Undo),
            3 => Some(Self::Commit),
            4 => Some(Self::Abort),
            _ => None,
        }
    }

    /// The type byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Name used in logs and tools.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Redo => "REDO",
            Self::Undo => "UNDO",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
        }
    }
}

/// One immutable journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Entry kind.
    pub entry_type: JournalEntryType,
    /// Owning component, or [`ComponentId::CONTROL`] for commit/abort.
    pub component_id: ComponentId,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

impl JournalEntry {
    /// Largest payload the 4-byte length field can describe.
    pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

    /// Creates an entry.
    #[must_use]
    pub fn new(entry_type: JournalEntryType, component_id: ComponentId, payload: Vec<u8>) -> Self {
        Self {
            entry_type,
            component_id,
            payload,
        }
    }

    /// A redo entry for `component_id`.
    #[must_use]
    pub fn redo(component_id: ComponentId, payload: Vec<u8>) -> Self {
        Self::new(JournalEntryType::Redo, component_id, payload)
    }

    /// A commit decision for `txn`.
    #[must_use]
    pub fn commit(txn: TxnId) -> Self {
        Self::new(
            JournalEntryType::Commit,
            ComponentId::CONTROL,
            txn.as_bytes().to_vec(),
        )
    }

    /// An abort decision for `txn`.
    #[must_use]
    pub fn abort(txn: TxnId) -> Self {
        Self::new(
            JournalEntryType::Abort,
            ComponentId::CONTROL,
            txn.as_bytes().to_vec(),
        )
    }

    /// The transaction a control entry decides, if the payload carries one.
    #[must_use]
    pub fn txn_id(&self) -> Option<TxnId> {
        match self.entry_type {
            JournalEntryType::Commit | JournalEntryType::Abort => TxnId::from_slice(&self.payload),
            JournalEntryType::Redo | JournalEntryType::Undo => None,
        }
    }

    /// Bytes this entry occupies in the journal.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_LEN + self.payload.len() + ENTRY_CRC_LEN
    }

    /// Encodes the entry with its header and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload exceeds [`Self::MAX_PAYLOAD_SIZE`].
    pub fn encode(&self) -> TxnResult<Vec<u8>> {
        let len = u32::try_from(self.payload.len()).map_err(|_| {
            TxnError::journal_corruption(format!(
                "payload of {} bytes exceeds maximum of {} bytes",
                self.payload.len(),
                Self::MAX_PAYLOAD_SIZE
            ))
        })?;

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.entry_type.as_byte());
        buf.extend_from_slice(self.component_id.as_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Parses a header into type, component and payload length.
    pub(crate) fn decode_header(
        header: &[u8],
        position: u64,
    ) -> TxnResult<(JournalEntryType, ComponentId, usize)> {
        if header.len() < ENTRY_HEADER_LEN {
            return Err(TxnError::journal_corruption(format!(
                "short header at position {position}"
            )));
        }
        let entry_type = JournalEntryType::from_byte(header[0]).ok_or_else(|| {
            TxnError::journal_corruption(format!(
                "unknown entry type {} at position {position}",
                header[0]
            ))
        })?;
        let mut cid = [0u8; COMPONENT_ID_LEN];
        cid.copy_from_slice(&header[1..=COMPONENT_ID_LEN]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&header[1 + COMPONENT_ID_LEN..ENTRY_HEADER_LEN]);
        Ok((
            entry_type,
            ComponentId::new(cid),
            u32::from_le_bytes(len) as usize,
        ))
    }

    /// Decodes a complete encoded entry (header, payload and CRC).
    pub(crate) fn decode(bytes: &[u8], position: u64) -> TxnResult<Self> {
        let (entry_type, component_id, len) = Self::decode_header(bytes, position)?;
        let body_end = ENTRY_HEADER_LEN + len;
        if bytes.len() != body_end + ENTRY_CRC_LEN {
            return Err(TxnError::journal_corruption(format!(
                "entry at position {position}: expected {} bytes, got {}",
                body_end + ENTRY_CRC_LEN,
                bytes.len()
            )));
        }
        let mut stored = [0u8; ENTRY_CRC_LEN];
        stored.copy_from_slice(&bytes[body_end..]);
        let expected = u32::from_le_bytes(stored);
        let actual = compute_crc32(&bytes[..body_end]);
        if expected != actual {
            return Err(TxnError::ChecksumMismatch { expected, actual });
        }
        Ok(Self {
            entry_type,
            component_id,
            payload: bytes[ENTRY_HEADER_LEN..body_end].to_vec(),
        })
    }
}

/// CRC32 (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}
