//! Access-control model.

use std::collections::BTreeSet;
use std::fmt;

/// Kind of principal an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrincipalType {
    /// A single user.
    User,
    /// A group of users.
    Group,
    /// Every principal, authenticated or not.
    All,
}

impl PrincipalType {
    /// Returns the type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::All => "all",
        }
    }

    /// Parses a principal type string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "group" => Some(Self::Group),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// A user, a group, or the `All` pseudo-principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal {
    /// Backend-specific identifier (user name, group name).
    pub identifier: String,
    /// Principal kind.
    pub principal_type: PrincipalType,
}

impl Principal {
    /// A user principal.
    #[must_use]
    pub fn user(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            principal_type: PrincipalType::User,
        }
    }

    /// A group principal.
    #[must_use]
    pub fn group(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            principal_type: PrincipalType::Group,
        }
    }

    /// The pseudo-principal matching everyone.
    #[must_use]
    pub fn all() -> Self {
        Self {
            identifier: "all".to_string(),
            principal_type: PrincipalType::All,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.principal_type.as_str(), self.identifier)
    }
}

/// A grantable privilege.
///
/// `Read`, `Write` and `Admin` are the coarse access levels; the remaining
/// variants are the fine-grained privileges they are made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Privilege {
    /// Read content and properties.
    Read,
    /// Modify content, properties and structure.
    Write,
    /// Full control including the access-control list.
    Admin,
    /// Read properties only.
    ReadProperties,
    /// Modify properties only.
    WriteProperties,
    /// Add children to a collection.
    AddChildren,
    /// Remove the item.
    Remove,
    /// Read the access-control list.
    ReadAcl,
    /// Modify the access-control list.
    WriteAcl,
}

impl Privilege {
    /// Returns the privilege as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
            Self::ReadProperties => "read_properties",
            Self::WriteProperties => "write_properties",
            Self::AddChildren => "add_children",
            Self::Remove => "remove",
            Self::ReadAcl => "read_acl",
            Self::WriteAcl => "write_acl",
        }
    }

    /// Parses a privilege string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "admin" => Some(Self::Admin),
            "read_properties" => Some(Self::ReadProperties),
            "write_properties" => Some(Self::WriteProperties),
            "add_children" => Some(Self::AddChildren),
            "remove" => Some(Self::Remove),
            "read_acl" => Some(Self::ReadAcl),
            "write_acl" => Some(Self::WriteAcl),
            _ => None,
        }
    }

    /// Returns true if holding `self` implies holding `other`.
    #[must_use]
    pub fn implies(self, other: Self) -> bool {
        if self == other {
            return true;
        }
        match self {
            Self::Admin => true,
            Self::Write => matches!(
                other,
                Self::WriteProperties | Self::AddChildren | Self::Remove
            ),
            Self::Read => matches!(other, Self::ReadProperties | Self::ReadAcl),
            _ => false,
        }
    }
}

/// Granted and denied privileges of one principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlEntry {
    /// The principal.
    pub principal: Principal,
    /// Granted privileges.
    pub granted: BTreeSet<Privilege>,
    /// Denied privileges. Denial wins over a grant.
    pub denied: BTreeSet<Privilege>,
}

impl AccessControlEntry {
    /// Creates an entry with no privileges.
    #[must_use]
    pub const fn new(principal: Principal) -> Self {
        Self {
            principal,
            granted: BTreeSet::new(),
            denied: BTreeSet::new(),
        }
    }
}

/// Ordered access-control list of an item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessControlList {
    entries: Vec<AccessControlEntry>,
}

impl AccessControlList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Creates a list from entries, keeping their order.
    #[must_use]
    pub const fn from_entries(entries: Vec<AccessControlEntry>) -> Self {
        Self { entries }
    }

    /// Returns the entries in order.
    #[must_use]
    pub fn entries(&self) -> &[AccessControlEntry] {
        &self.entries
    }

    /// Returns true if the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, principal: &Principal) -> &mut AccessControlEntry {
        let idx = match self.entries.iter().position(|e| &e.principal == principal) {
            Some(idx) => idx,
            None => {
                self.entries.push(AccessControlEntry::new(principal.clone()));
                self.entries.len() - 1
            },
        };
        &mut self.entries[idx]
    }

    /// Grants a privilege, clearing a previous denial of it.
    pub fn grant(&mut self, principal: &Principal, privilege: Privilege) {
        let entry = self.entry_mut(principal);
        entry.denied.remove(&privilege);
        entry.granted.insert(privilege);
    }

    /// Denies a privilege, clearing a previous grant of it.
    pub fn deny(&mut self, principal: &Principal, privilege: Privilege) {
        let entry = self.entry_mut(principal);
        entry.granted.remove(&privilege);
        entry.denied.insert(privilege);
    }

    /// Returns the entry of a principal.
    #[must_use]
    pub fn entry(&self, principal: &Principal) -> Option<&AccessControlEntry> {
        self.entries.iter().find(|e| &e.principal == principal)
    }

    /// Evaluates whether `principal` holds `privilege`.
    ///
    /// Entries of the principal itself and of the `All` pseudo-principal are
    /// considered; any matching denial wins.
    #[must_use]
    pub fn is_granted(&self, principal: &Principal, privilege: Privilege) -> bool {
        let relevant = self.entries.iter().filter(|e| {
            &e.principal == principal || e.principal.principal_type == PrincipalType::All
        });
        let mut granted = false;
        for entry in relevant {
            if entry.denied.iter().any(|d| d.implies(privilege)) {
                return false;
            }
            granted |= entry.granted.iter().any(|g| g.implies(privilege));
        }
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_and_deny() {
        let alice = Principal::user("alice");
        let mut acl = AccessControlList::new();
        acl.grant(&alice, Privilege::Write);
        assert!(acl.is_granted(&alice, Privilege::Write));
        assert!(acl.is_granted(&alice, Privilege::WriteProperties));
        assert!(!acl.is_granted(&alice, Privilege::Read));

        acl.deny(&alice, Privilege::Write);
        assert!(!acl.is_granted(&alice, Privilege::Write));
        assert_eq!(acl.entries().len(), 1);
    }

    #[test]
    fn test_all_principal_denial_wins() {
        let bob = Principal::user("bob");
        let mut acl = AccessControlList::new();
        acl.grant(&bob, Privilege::Admin);
        acl.deny(&Principal::all(), Privilege::WriteAcl);
        assert!(acl.is_granted(&bob, Privilege::Read));
        assert!(!acl.is_granted(&bob, Privilege::WriteAcl));
    }

    #[test]
    fn test_privilege_tags_roundtrip() {
        for p in [
            Privilege::Read,
            Privilege::Write,
            Privilege::Admin,
            Privilege::ReadProperties,
            Privilege::WriteProperties,
            Privilege::AddChildren,
            Privilege::Remove,
            Privilege::ReadAcl,
            Privilege::WriteAcl,
        ] {
            assert_eq!(Privilege::parse(p.as_str()), Some(p));
        }
    }
}
