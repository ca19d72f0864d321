//! Backend adapters.
//!
//! Each adapter translates the capability traits into calls against one
//! backend library and normalizes every failure on the way out.
//!
//! | Backend | Data | Metadata | Privileges | Search |
//! |---------|------|----------|------------|--------|
//! | [`sqlite`] | yes | attribute rows | yes | metadata search |
//! | [`index`] | - | - | - | full-text |
//! | [`git`] | working tree | JSON notes | - | - |
//! | [`webdav`] | HTTP | JSON dead property | - | - |

pub mod git;
pub mod index;
pub mod sqlite;
pub mod webdav;

use crate::{Error, Result};
use crate::models::ItemId;
use crate::storage::normalize::{Context, Normalize};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::io::Read;

/// Maximum number of links followed when reading through a link.
pub(crate) const MAX_LINK_HOPS: usize = 8;

/// Characters left unescaped in an encoded path.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes the path of `id` relative to the mount root.
pub(crate) fn encode_relative(id: &ItemId) -> String {
    utf8_percent_encode(id.relative(), PATH_SEGMENT).to_string()
}

/// Drains a caller-supplied content stream.
pub(crate) fn read_all(data: &mut dyn Read, id: &ItemId) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    data.read_to_end(&mut buf)
        .normalize(Context::new("stream", "read_content"))?;
    tracing::debug!(item = %id, bytes = buf.len(), "Content stream drained");
    Ok(buf)
}

/// Rejects structural changes of the root or of an item into its own subtree.
pub(crate) fn check_relocation(operation: &'static str, id: &ItemId, new_id: &ItemId) -> Result<()> {
    if id.is_root() {
        return Err(Error::persistence(operation, "the root collection cannot be relocated"));
    }
    if new_id.starts_with(id) {
        return Err(Error::persistence(
            operation,
            format!("{new_id} lies inside {id}"),
        ));
    }
    Ok(())
}
