//! Access-control CLI commands.

use super::emit;
use crate::models::{AccessControlList, ItemId, Principal, PrincipalType, Privilege};
use crate::storage::Mount;
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::io::Write;

/// Parses `user:alice=read,write`, `group:staff=admin` or `all=read`.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] for an unknown principal type, an
/// empty name or an unknown privilege.
pub fn parse_assignment(text: &str) -> Result<(Principal, Vec<Privilege>)> {
    let invalid = |reason: &str| Error::InvalidIdentifier(format!("'{text}': {reason}"));
    let (principal, privileges) = text
        .split_once('=')
        .ok_or_else(|| invalid("expected PRINCIPAL=PRIVILEGE[,PRIVILEGE...]"))?;

    let principal = match principal.split_once(':') {
        None if principal == "all" => Principal::all(),
        None => return Err(invalid("expected user:NAME, group:NAME or all")),
        Some((kind, name)) => {
            if name.is_empty() {
                return Err(invalid("empty principal name"));
            }
            match PrincipalType::parse(kind) {
                Some(PrincipalType::User) => Principal::user(name),
                Some(PrincipalType::Group) => Principal::group(name),
                Some(PrincipalType::All) => Principal::all(),
                None => return Err(invalid("unknown principal type")),
            }
        },
    };

    let privileges = privileges
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Privilege::parse(p).ok_or_else(|| invalid("unknown privilege")))
        .collect::<Result<Vec<_>>>()?;
    if privileges.is_empty() {
        return Err(invalid("no privilege given"));
    }
    Ok((principal, privileges))
}

fn join(privileges: &BTreeSet<Privilege>) -> String {
    privileges
        .iter()
        .map(Privilege::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Access-control commands.
pub struct AclCommand<'a> {
    mount: &'a Mount,
}

impl<'a> AclCommand<'a> {
    /// Creates the command set for `mount`.
    #[must_use]
    pub const fn new(mount: &'a Mount) -> Self {
        Self { mount }
    }

    /// Prints one line per entry, in evaluation order.
    pub fn show(&self, id: &ItemId, out: &mut dyn Write) -> Result<()> {
        let acl = self.mount.privileges().retrieve_privileges(id)?;
        for entry in acl.entries() {
            emit(
                out,
                format_args!(
                    "{} grant={} deny={}",
                    entry.principal,
                    join(&entry.granted),
                    join(&entry.denied)
                ),
            )?;
        }
        Ok(())
    }

    /// Applies grants, then denials, and stores the list.
    ///
    /// With `clear` the existing list is replaced instead of edited.
    pub fn edit(&self, id: &ItemId, grants: &[String], denies: &[String], clear: bool) -> Result<()> {
        let storer = self.mount.privileges();
        let mut acl = if clear {
            AccessControlList::new()
        } else {
            storer.retrieve_privileges(id)?
        };
        for text in grants {
            let (principal, privileges) = parse_assignment(text)?;
            for privilege in privileges {
                acl.grant(&principal, privilege);
            }
        }
        for text in denies {
            let (principal, privileges) = parse_assignment(text)?;
            for privilege in privileges {
                acl.deny(&principal, privilege);
            }
        }
        storer.update_privileges(id, &acl)
    }
}
