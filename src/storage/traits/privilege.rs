//! Privilege storer trait.

use crate::models::{AccessControlList, ItemId};
use crate::{Capability, Error, Result};

/// Stores access-control lists.
pub trait PrivilegeStorer: Send + Sync {
    /// Retrieves the access-control list of an item.
    fn retrieve_privileges(&self, id: &ItemId) -> Result<AccessControlList>;

    /// Replaces the access-control list of an item.
    fn update_privileges(&self, id: &ItemId, acl: &AccessControlList) -> Result<()>;
}

/// Privilege storer of a backend without access-control support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPrivilegeStorer;

impl PrivilegeStorer for NullPrivilegeStorer {
    fn retrieve_privileges(&self, _id: &ItemId) -> Result<AccessControlList> {
        Err(Error::unsupported(
            Capability::Privileges,
            "retrieve_privileges",
        ))
    }

    fn update_privileges(&self, _id: &ItemId, _acl: &AccessControlList) -> Result<()> {
        Err(Error::unsupported(Capability::Privileges, "update_privileges"))
    }
}
