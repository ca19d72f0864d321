//! Properties as one JSON dead property per resource.

use super::data::stat;
use super::multistatus::{DavEntry, failed_propstat, proppatch_body};
use super::{BACKEND, DavRequest, WebdavSession, WebdavStore, expect_success};
use crate::models::{ItemId, ItemKind, MetadataSet, Property, PropertyId, Restriction};
use crate::storage::mapping::{JsonBag, JsonBagMapper, SystemFacts, merge_derived};
use crate::storage::normalize::{Context, HttpStatus};
use crate::storage::traits::{MetadataStorer, NullMetadataStorer};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::instrument;

/// [`MetadataStorer`] keeping a JSON property bag in the
/// `{urn:mountstore:}propertybag` dead property.
pub struct WebdavMetadataStorer {
    store: WebdavStore,
    mapper: JsonBagMapper,
}

impl WebdavMetadataStorer {
    pub(super) const fn new(store: WebdavStore) -> Self {
        Self {
            store,
            mapper: JsonBagMapper,
        }
    }
}

fn bag_of(entry: &DavEntry) -> Result<JsonBag> {
    entry
        .property_bag
        .as_deref()
        .map_or_else(|| Ok(JsonBag::new()), JsonBag::parse)
}

fn facts(entry: &DavEntry) -> SystemFacts {
    let kind = if entry.is_collection {
        ItemKind::Collection
    } else {
        ItemKind::Leaf
    };
    SystemFacts {
        created: entry
            .creation_date
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|ts| ts.with_timezone(&Utc)),
        modified: entry
            .last_modified
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|ts| ts.with_timezone(&Utc)),
        size: (kind == ItemKind::Leaf).then(|| entry.content_length.unwrap_or(0)),
        owner: None,
        kind: Some(kind),
        mime_type: entry.content_type.clone(),
    }
}

/// Stores `bag` on `id`, removing the dead property when it is empty.
fn store_bag(session: &mut WebdavSession, id: &ItemId, collection: bool, bag: &JsonBag) -> Result<()> {
    let json = if bag.is_empty() {
        None
    } else {
        Some(bag.to_json_string()?)
    };
    let ctx = Context::new(BACKEND, "proppatch").item(id);
    let request = DavRequest::new("PROPPATCH", session.config().url_for(id, collection))
        .header("Content-Type", "application/xml; charset=utf-8")
        .body(proppatch_body(json.as_deref()));
    let response = expect_success(ctx, session.send(ctx, &request)?)?;
    match failed_propstat(&response.text()) {
        Some(status) => Err(Error::persistence("proppatch", HttpStatus(status))),
        None => Ok(()),
    }
}

impl MetadataStorer for WebdavMetadataStorer {
    #[instrument(skip(self, selection), fields(backend = BACKEND, selected = selection.len()))]
    fn retrieve(&self, id: &ItemId, selection: &[PropertyId]) -> Result<MetadataSet> {
        let mut session = self.store.pool.acquire()?;
        let entry = stat(&mut session, "retrieve", id)?;
        let stored = bag_of(&entry)?.decode(&self.mapper, selection)?;
        Ok(merge_derived(stored, facts(&entry).into_properties(id)).filtered(selection))
    }

    #[instrument(skip(self, properties), fields(backend = BACKEND, count = properties.len()))]
    fn update(&self, id: &ItemId, properties: &[Property]) -> Result<()> {
        let mut session = self.store.pool.acquire()?;
        let entry = stat(&mut session, "update", id)?;
        let mut bag = bag_of(&entry)?;
        bag.update(&self.mapper, properties)?;
        store_bag(&mut session, id, entry.is_collection, &bag)
    }

    #[instrument(skip(self, ids), fields(backend = BACKEND, count = ids.len()))]
    fn delete(&self, id: &ItemId, ids: &[PropertyId]) -> Result<()> {
        let mut session = self.store.pool.acquire()?;
        let entry = stat(&mut session, "delete", id)?;
        let mut bag = bag_of(&entry)?;
        bag.remove(ids);
        store_bag(&mut session, id, entry.is_collection, &bag)
    }

    fn search(&self, _restriction: &Restriction) -> Result<Vec<ItemId>> {
        NullMetadataStorer::search_unsupported()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{ScriptedTransport, multistatus, multistatus_with};
    use super::super::{DavResponse, WebdavConfig};
    use super::*;
    use crate::config::PoolConfig;
    use crate::models::{PropertyValue, system};
    use std::sync::Arc;

    fn storer(transport: &Arc<ScriptedTransport>) -> WebdavMetadataStorer {
        let config = WebdavConfig::new("http://dav.test/repo/", None).unwrap();
        WebdavStore::with_transport(config, PoolConfig::new(1), transport.clone()).metadata()
    }

    fn leaf_with_bag(bag: &str) -> DavResponse {
        multistatus_with([format!(
            "<d:href>/repo/a.txt</d:href><d:propstat><d:prop>\
             <d:resourcetype/><d:getcontentlength>3</d:getcontentlength>\
             <d:getlastmodified>Fri, 01 Mar 2024 10:00:00 GMT</d:getlastmodified>\
             <m:propertybag>{}</m:propertybag></d:prop></d:propstat>",
            super::super::multistatus::escape(bag)
        )])
    }

    const TITLE_BAG: &str = r#"{"title":{"type":"string","value":"Hello"}}"#;

    fn proppatch_ok() -> DavResponse {
        DavResponse::new(207).with_body(
            "<d:multistatus xmlns:d=\"DAV:\"><d:response><d:href>/repo/a.txt</d:href>\
             <d:propstat><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response></d:multistatus>",
        )
    }

    #[test]
    fn test_retrieve_merges_system_properties() {
        let transport = ScriptedTransport::new([
            multistatus(&[("/repo/", true)]),
            leaf_with_bag(TITLE_BAG),
        ]);
        let set = storer(&transport)
            .retrieve(&ItemId::parse("/a.txt").unwrap(), &[])
            .unwrap();
        assert_eq!(set.value("title"), Some(&PropertyValue::from("Hello")));
        assert_eq!(set.value(system::SIZE), Some(&PropertyValue::Integer(3)));
        assert_eq!(set.value(system::MIME_TYPE), Some(&PropertyValue::from("text/plain")));
        assert!(set.contains(system::MODIFICATION_DATETIME));
    }

    #[test]
    fn test_update_sends_merged_bag() {
        let transport = ScriptedTransport::new([
            multistatus(&[("/repo/", true)]),
            leaf_with_bag(TITLE_BAG),
            proppatch_ok(),
        ]);
        storer(&transport)
            .update(&ItemId::parse("/a.txt").unwrap(), &[Property::new("tag", "x")])
            .unwrap();
        let requests = transport.requests();
        let body = String::from_utf8(requests[2].body.clone()).unwrap();
        assert_eq!(requests[2].method, "PROPPATCH");
        assert!(body.contains("<D:set>"));
        assert!(body.contains("&quot;title&quot;"));
        assert!(body.contains("&quot;tag&quot;"));
    }

    #[test]
    fn test_deleting_last_property_removes_dead_property() {
        let transport = ScriptedTransport::new([
            multistatus(&[("/repo/", true)]),
            leaf_with_bag(TITLE_BAG),
            proppatch_ok(),
        ]);
        storer(&transport)
            .delete(&ItemId::parse("/a.txt").unwrap(), &["title".into()])
            .unwrap();
        let body = String::from_utf8(transport.requests()[2].body.clone()).unwrap();
        assert!(body.contains("<D:remove>"));
    }

    #[test]
    fn test_rejected_proppatch() {
        let transport = ScriptedTransport::new([
            multistatus(&[("/repo/", true)]),
            leaf_with_bag("{}"),
            DavResponse::new(207).with_body("<d:status>HTTP/1.1 403 Forbidden</d:status>"),
        ]);
        let err = storer(&transport)
            .update(&ItemId::parse("/a.txt").unwrap(), &[Property::new("k", "v")])
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Persistence);
    }
}
