//! Transaction participants.
//!
//! A [`TransactionalComponent`] is any piece of state that wants to share
//! the coordinator's transaction boundary. [`ComponentLifecycle`] does the
//! per-transaction bookkeeping most components need, and [`TransInteger`]
//! and [`TransBlob`] are small complete components built on it.

mod blob;
mod group;
mod integer;
mod lifecycle;
mod traits;

pub use blob::TransBlob;
pub use group::ComponentGroup;
pub use integer::TransInteger;
pub use lifecycle::ComponentLifecycle;
pub use traits::TransactionalComponent;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Replaces the file at `path` with `bytes` using write-then-rename.
///
/// A crash leaves either the old contents or the new, never a mix.
pub(crate) fn persist_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    #[cfg(unix)]
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

/// Reads the file at `path`, or `None` if it does not exist.
pub(crate) fn load_file(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
