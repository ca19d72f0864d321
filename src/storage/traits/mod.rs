//! Storer capability traits.
//!
//! An item supports zero or more of four capabilities. A backend that lacks
//! one exposes the matching `Null*` implementation, whose every operation
//! fails with [`Error::CapabilityUnsupported`](crate::Error::CapabilityUnsupported),
//! so callers probe capabilities by calling rather than by type-testing.

mod data;
mod metadata;
mod privilege;
mod search;

pub use data::{DataStorer, NullDataStorer};
pub use metadata::{MetadataStorer, NullMetadataStorer};
pub use privilege::{NullPrivilegeStorer, PrivilegeStorer};
pub use search::{NullSearchStorer, SearchStorer};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccessControlList, ItemId, Property, PropertyId, Restriction};
    use crate::{Capability, Error, Result};

    type Call = Box<dyn Fn() -> Result<()>>;

    fn call<T>(f: impl Fn() -> Result<T> + 'static) -> Call {
        Box::new(move || f().map(|_| ()))
    }

    fn a() -> ItemId {
        ItemId::parse("/a").unwrap()
    }

    fn b() -> ItemId {
        ItemId::parse("/b").unwrap()
    }

    fn null_calls() -> Vec<(Capability, &'static str, Call)> {
        let props = [Property::new("title", "x")];
        let ids = [PropertyId::new("title")];
        let restriction = || Restriction::equals("title", "x");
        vec![
            (Capability::Data, "read", call(|| NullDataStorer.read(&a()))),
            (Capability::Data, "write", call(|| NullDataStorer.write(&a(), &mut "x".as_bytes()))),
            (Capability::Data, "exists", call(|| NullDataStorer.exists(&a()))),
            (Capability::Data, "delete", call(|| DataStorer::delete(&NullDataStorer, &a()))),
            (Capability::Data, "create_collection", call(|| NullDataStorer.create_collection(&a()))),
            (Capability::Data, "create_link", call(|| NullDataStorer.create_link(&a(), &b()))),
            (Capability::Data, "move_item", call(|| NullDataStorer.move_item(&a(), &b()))),
            (Capability::Data, "copy_item", call(|| NullDataStorer.copy_item(&a(), &b()))),
            (Capability::Data, "kind", call(|| NullDataStorer.kind(&a()))),
            (Capability::Data, "children", call(|| NullDataStorer.children(&a()))),
            (Capability::Data, "link_target", call(|| NullDataStorer.link_target(&a()))),
            (Capability::Metadata, "retrieve", call(|| NullMetadataStorer.retrieve(&a(), &[]))),
            (Capability::Metadata, "update", call(move || NullMetadataStorer.update(&a(), &props))),
            (
                Capability::Metadata,
                "delete",
                call(move || MetadataStorer::delete(&NullMetadataStorer, &a(), &ids)),
            ),
            (
                Capability::Metadata,
                "search",
                call(move || MetadataStorer::search(&NullMetadataStorer, &restriction())),
            ),
            (
                Capability::Privileges,
                "retrieve_privileges",
                call(|| NullPrivilegeStorer.retrieve_privileges(&a())),
            ),
            (
                Capability::Privileges,
                "update_privileges",
                call(|| NullPrivilegeStorer.update_privileges(&a(), &AccessControlList::default())),
            ),
            (
                Capability::Search,
                "search",
                call(move || SearchStorer::search(&NullSearchStorer, &restriction())),
            ),
        ]
    }

    #[test]
    fn test_every_null_operation_is_unsupported() {
        let calls = null_calls();
        assert_eq!(calls.len(), 18);
        for (expected, name, call) in calls {
            match call() {
                Err(Error::CapabilityUnsupported { capability, .. }) => {
                    assert_eq!(capability, expected, "{name}");
                },
                other => panic!("{name}: expected CapabilityUnsupported, got {other:?}"),
            }
        }
    }
}
