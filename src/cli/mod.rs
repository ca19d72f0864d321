//! CLI command implementations.
//!
//! Every command runs against one configured [`Mount`] and writes its output
//! to a caller-supplied writer, so the binary decides where output goes.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `get` | Print the content of a leaf |
//! | `put` | Write a leaf from a file or stdin |
//! | `ls` | List the children of a collection |
//! | `mkdir` | Create a collection |
//! | `rm` | Delete an item and its subtree |
//! | `mv` / `cp` | Move or copy an item |
//! | `props` | Show the properties of an item |
//! | `set-prop` / `del-prop` | Store or remove properties |
//! | `search` | Search by property conditions |
//! | `acl` | Show or edit an access-control list |
//!
//! # Example Usage
//!
//! ```bash
//! mountstore put /reports/q1.txt --file q1.txt
//! mountstore set-prop /reports/q1.txt status approved
//! mountstore search 'status=approved' 'sys:size>=1024'
//! mountstore acl /reports --grant user:alice=read,write
//! ```

mod acl;
mod items;
mod props;

pub use acl::{AclCommand, parse_assignment};
pub use items::ItemsCommand;
pub use props::{PropsCommand, format_value, parse_condition, parse_value};

use crate::storage::Mount;
use crate::{Error, Result};
use std::io::Write;

/// Writes one output line.
pub(crate) fn emit(out: &mut dyn Write, line: impl std::fmt::Display) -> Result<()> {
    writeln!(out, "{line}").map_err(|e| Error::persistence("write_output", e))
}

/// Runs commands against one mount.
pub struct Runner<'a> {
    mount: &'a Mount,
}

impl<'a> Runner<'a> {
    /// Creates a runner for `mount`.
    #[must_use]
    pub const fn new(mount: &'a Mount) -> Self {
        Self { mount }
    }

    /// Item commands.
    #[must_use]
    pub const fn items(&self) -> ItemsCommand<'a> {
        ItemsCommand::new(self.mount)
    }

    /// Property and search commands.
    #[must_use]
    pub const fn props(&self) -> PropsCommand<'a> {
        PropsCommand::new(self.mount)
    }

    /// Access-control commands.
    #[must_use]
    pub const fn acl(&self) -> AclCommand<'a> {
        AclCommand::new(self.mount)
    }
}
