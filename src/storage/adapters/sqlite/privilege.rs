//! Access-control lists as ordered entry rows.

use super::{BACKEND, SqliteStore, require_item};
use crate::models::{
    AccessControlEntry, AccessControlList, ItemId, Principal, PrincipalType, Privilege,
};
use crate::storage::normalize::{Context, Normalize};
use crate::storage::traits::PrivilegeStorer;
use crate::{Error, Result};
use rusqlite::params;
use std::collections::BTreeSet;
use tracing::instrument;

/// [`PrivilegeStorer`] over the object store.
pub struct SqlitePrivilegeStorer {
    store: SqliteStore,
}

impl SqlitePrivilegeStorer {
    pub(super) const fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

fn join_privileges(set: &BTreeSet<Privilege>) -> String {
    set.iter()
        .map(Privilege::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn split_privileges(text: &str) -> Result<BTreeSet<Privilege>> {
    text.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            Privilege::parse(s)
                .ok_or_else(|| Error::persistence("retrieve_privileges", format!("unknown privilege '{s}'")))
        })
        .collect()
}

type AclRow = (String, String, String, String);

impl PrivilegeStorer for SqlitePrivilegeStorer {
    #[instrument(skip(self), fields(backend = BACKEND))]
    fn retrieve_privileges(&self, id: &ItemId) -> Result<AccessControlList> {
        let conn = self.store.pool.acquire()?;
        let row = require_item(&conn, id)?;
        let ctx = Context::new(BACKEND, "retrieve_privileges").item(id);
        let mut stmt = conn
            .prepare(
                "SELECT principal, principal_type, granted, denied FROM acl_entries
                 WHERE item_id = ?1 ORDER BY position",
            )
            .normalize(ctx)?;
        let rows: Vec<AclRow> = stmt
            .query_map(params![row.id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
            .normalize(ctx)?
            .collect::<std::result::Result<_, _>>()
            .normalize(ctx)?;

        let entries = rows
            .into_iter()
            .map(|(identifier, principal_type, granted, denied)| {
                let principal_type = PrincipalType::parse(&principal_type).ok_or_else(|| {
                    Error::persistence(
                        "retrieve_privileges",
                        format!("unknown principal type '{principal_type}'"),
                    )
                })?;
                Ok(AccessControlEntry {
                    principal: Principal {
                        identifier,
                        principal_type,
                    },
                    granted: split_privileges(&granted)?,
                    denied: split_privileges(&denied)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(AccessControlList::from_entries(entries))
    }

    #[instrument(skip(self, acl), fields(backend = BACKEND, entries = acl.entries().len()))]
    fn update_privileges(&self, id: &ItemId, acl: &AccessControlList) -> Result<()> {
        let mut conn = self.store.pool.acquire()?;
        let tx = conn
            .transaction()
            .normalize(Context::new(BACKEND, "begin_update_privileges"))?;
        let row = require_item(&tx, id)?;
        let ctx = Context::new(BACKEND, "update_privileges").item(id);

        tx.execute("DELETE FROM acl_entries WHERE item_id = ?1", params![row.id])
            .normalize(ctx)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO acl_entries
                         (item_id, position, principal, principal_type, granted, denied)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .normalize(ctx)?;
            for (position, entry) in acl.entries().iter().enumerate() {
                stmt.execute(params![
                    row.id,
                    i64::try_from(position).unwrap_or(i64::MAX),
                    entry.principal.identifier,
                    entry.principal.principal_type.as_str(),
                    join_privileges(&entry.granted),
                    join_privileges(&entry.denied),
                ])
                .normalize(ctx)?;
            }
        }
        tx.commit().normalize(ctx)
    }
}
