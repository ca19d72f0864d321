//! Content and structure over plain WebDAV methods.

use super::multistatus::{DavEntry, parse_multistatus, propfind_body};
use super::{BACKEND, DavRequest, DavResponse, WebdavSession, WebdavStore, expect_success};
use crate::models::{ItemId, ItemKind};
use crate::storage::adapters::{check_relocation, read_all};
use crate::storage::normalize::Context;
use crate::storage::traits::DataStorer;
use crate::{Capability, Error, Result};
use std::io::{Cursor, Read};
use tracing::instrument;

/// [`DataStorer`] mapping items onto WebDAV resources.
///
/// WebDAV has no portable link resource, so links cannot be created and
/// [`link_target`](DataStorer::link_target) is always `None`.
pub struct WebdavDataStorer {
    store: WebdavStore,
}

impl WebdavDataStorer {
    pub(super) const fn new(store: WebdavStore) -> Self {
        Self { store }
    }
}

/// PROPFIND of one item (`Depth: 0`) or its members (`Depth: 1`).
///
/// Returns `None` when the item does not exist.
pub(super) fn propfind(
    session: &mut WebdavSession,
    operation: &'static str,
    id: &ItemId,
    depth: u8,
) -> Result<Option<Vec<DavEntry>>> {
    let ctx = Context::new(BACKEND, operation).item(id);
    let request = DavRequest::new("PROPFIND", session.config().url_for(id, depth > 0))
        .header("Depth", depth.to_string())
        .header("Content-Type", "application/xml; charset=utf-8")
        .body(propfind_body());
    let response = session.send(ctx, &request)?;
    if response.status == 404 {
        return Ok(None);
    }
    let response = expect_success(ctx, response)?;
    Ok(Some(parse_multistatus(&response.text())))
}

/// The PROPFIND entry describing `id` itself.
pub(super) fn stat(
    session: &mut WebdavSession,
    operation: &'static str,
    id: &ItemId,
) -> Result<DavEntry> {
    let entries = propfind(session, operation, id, 0)?.ok_or_else(|| Error::not_found(id))?;
    let config = session.config();
    entries
        .into_iter()
        .find(|entry| config.id_for_href(&entry.href).as_ref() == Some(id))
        .ok_or_else(|| {
            Error::persistence(operation, format!("multistatus answer does not describe {id}"))
        })
}

const fn kind_of(entry: &DavEntry) -> ItemKind {
    if entry.is_collection {
        ItemKind::Collection
    } else {
        ItemKind::Leaf
    }
}

/// Maps the status of a structural change.
///
/// `409 Conflict` means the parent of `target` is missing, `405`/`412` that
/// the target slot is taken.
fn structural_status(
    operation: &'static str,
    id: &ItemId,
    target: &ItemId,
    response: DavResponse,
) -> Result<()> {
    match response.status {
        409 => Err(Error::not_found(&target.parent().unwrap_or_else(ItemId::root))),
        405 | 412 => Err(Error::persistence(operation, format!("{target} already exists"))),
        _ => expect_success(Context::new(BACKEND, operation).item(id), response).map(drop),
    }
}

impl DataStorer for WebdavDataStorer {
    #[instrument(skip(self), fields(backend = BACKEND))]
    fn read(&self, id: &ItemId) -> Result<Box<dyn Read + Send>> {
        let mut session = self.store.pool.acquire()?;
        if stat(&mut session, "read", id)?.is_collection {
            return Err(Error::persistence("read", format!("{id} is a collection")));
        }
        let ctx = Context::new(BACKEND, "read").item(id);
        let request = DavRequest::new("GET", session.config().url_for(id, false));
        let response = expect_success(ctx, session.send(ctx, &request)?)?;
        Ok(Box::new(Cursor::new(response.body)))
    }

    #[instrument(skip(self, data), fields(backend = BACKEND))]
    fn write(&self, id: &ItemId, data: &mut dyn Read) -> Result<()> {
        if id.is_root() {
            return Err(Error::persistence("write", "the root is a collection"));
        }
        let content = read_all(data, id)?;
        let mut session = self.store.pool.acquire()?;
        let request = DavRequest::new("PUT", session.config().url_for(id, false)).body(content);
        let response = session.send(Context::new(BACKEND, "write").item(id), &request)?;
        match response.status {
            405 => Err(Error::persistence("write", format!("{id} is a collection"))),
            _ => structural_status("write", id, id, response),
        }
    }

    fn exists(&self, id: &ItemId) -> Result<bool> {
        let mut session = self.store.pool.acquire()?;
        Ok(propfind(&mut session, "exists", id, 0)?.is_some())
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn delete(&self, id: &ItemId) -> Result<()> {
        if id.is_root() {
            return Err(Error::persistence("delete", "the root collection cannot be deleted"));
        }
        let mut session = self.store.pool.acquire()?;
        let collection = stat(&mut session, "delete", id)?.is_collection;
        let ctx = Context::new(BACKEND, "delete").item(id);
        let request = DavRequest::new("DELETE", session.config().url_for(id, collection));
        expect_success(ctx, session.send(ctx, &request)?).map(drop)
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn create_collection(&self, id: &ItemId) -> Result<()> {
        let mut session = self.store.pool.acquire()?;
        let request = DavRequest::new("MKCOL", session.config().url_for(id, true));
        let response = session.send(Context::new(BACKEND, "create_collection").item(id), &request)?;
        structural_status("create_collection", id, id, response)
    }

    fn create_link(&self, _id: &ItemId, _target: &ItemId) -> Result<()> {
        Err(Error::unsupported(Capability::Data, "create_link"))
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn move_item(&self, id: &ItemId, new_id: &ItemId) -> Result<()> {
        self.relocate("MOVE", "move_item", id, new_id)
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn copy_item(&self, id: &ItemId, new_id: &ItemId) -> Result<()> {
        self.relocate("COPY", "copy_item", id, new_id)
    }

    fn kind(&self, id: &ItemId) -> Result<ItemKind> {
        let mut session = self.store.pool.acquire()?;
        Ok(kind_of(&stat(&mut session, "kind", id)?))
    }

    fn children(&self, id: &ItemId) -> Result<Vec<ItemId>> {
        let mut session = self.store.pool.acquire()?;
        let entries = propfind(&mut session, "children", id, 1)?.ok_or_else(|| Error::not_found(id))?;
        let config = session.config();
        let mut children = Vec::new();
        for entry in &entries {
            match config.id_for_href(&entry.href) {
                Some(member) if &member == id => {
                    if !entry.is_collection {
                        return Err(Error::persistence(
                            "children",
                            format!("{id} is not a collection"),
                        ));
                    }
                },
                Some(member) => children.push(member),
                None => tracing::debug!(backend = BACKEND, href = %entry.href, "Skipping foreign href"),
            }
        }
        children.sort();
        Ok(children)
    }

    fn link_target(&self, id: &ItemId) -> Result<Option<ItemId>> {
        let mut session = self.store.pool.acquire()?;
        stat(&mut session, "link_target", id)?;
        Ok(None)
    }
}

impl WebdavDataStorer {
    fn relocate(
        &self,
        method: &'static str,
        operation: &'static str,
        id: &ItemId,
        new_id: &ItemId,
    ) -> Result<()> {
        check_relocation(operation, id, new_id)?;
        let mut session = self.store.pool.acquire()?;
        let collection = stat(&mut session, operation, id)?.is_collection;
        let config = session.config();
        let mut request = DavRequest::new(method, config.url_for(id, collection))
            .header("Destination", config.url_for(new_id, collection))
            .header("Overwrite", "F");
        if method == "COPY" {
            request = request.header("Depth", "infinity");
        }
        let response = session.send(Context::new(BACKEND, operation).item(id), &request)?;
        structural_status(operation, id, new_id, response)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{ScriptedTransport, multistatus};
    use super::super::WebdavConfig;
    use super::*;
    use crate::ErrorKind;
    use crate::config::PoolConfig;
    use std::sync::Arc;

    fn storer(transport: &Arc<ScriptedTransport>) -> WebdavDataStorer {
        let config = WebdavConfig::new("http://dav.test/repo/", None).unwrap();
        WebdavStore::with_transport(config, PoolConfig::new(1), transport.clone()).data()
    }

    fn id(path: &str) -> ItemId {
        ItemId::parse(path).unwrap()
    }

    #[test]
    fn test_read_leaf() {
        let transport = ScriptedTransport::new([
            multistatus(&[("/repo/", true)]),
            multistatus(&[("/repo/a.txt", false)]),
            DavResponse::new(200).with_body("hello"),
        ]);
        let mut content = String::new();
        storer(&transport)
            .read(&id("/a.txt"))
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "hello");

        let requests = transport.requests();
        assert_eq!(requests[0].method, "PROPFIND");
        assert_eq!(requests[2].method, "GET");
        assert_eq!(requests[2].url, "http://dav.test:80/repo/a.txt");
    }

    #[test]
    fn test_write_conflict_means_missing_parent() {
        let transport = ScriptedTransport::new([
            multistatus(&[("/repo/", true)]),
            DavResponse::new(409),
        ]);
        let err = storer(&transport)
            .write(&id("/missing/a.txt"), &mut "x".as_bytes())
            .unwrap_err();
        match err {
            Error::ItemNotFound { id } => assert_eq!(id, "/missing"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_children_skip_self_and_sort() {
        let transport = ScriptedTransport::new([
            multistatus(&[("/repo/", true)]),
            multistatus(&[
                ("/repo/docs/", true),
                ("/repo/docs/z.txt", false),
                ("/repo/docs/a%20b/", true),
            ]),
        ]);
        let children = storer(&transport).children(&id("/docs")).unwrap();
        assert_eq!(children, vec![id("/docs/a b"), id("/docs/z.txt")]);
        assert_eq!(transport.requests()[1].header_value("Depth"), Some("1"));
    }

    #[test]
    fn test_move_sends_destination() {
        let transport = ScriptedTransport::new([
            multistatus(&[("/repo/", true)]),
            multistatus(&[("/repo/a/", true)]),
            DavResponse::new(201),
        ]);
        storer(&transport).move_item(&id("/a"), &id("/b")).unwrap();
        let requests = transport.requests();
        assert_eq!(requests[2].method, "MOVE");
        assert_eq!(requests[2].url, "http://dav.test:80/repo/a/");
        assert_eq!(requests[2].header_value("Destination"), Some("http://dav.test:80/repo/b/"));
        assert_eq!(requests[2].header_value("Overwrite"), Some("F"));
    }

    #[test]
    fn test_missing_item_and_links() {
        let transport = ScriptedTransport::new([
            multistatus(&[("/repo/", true)]),
            DavResponse::new(404),
            DavResponse::new(404),
        ]);
        let data = storer(&transport);
        assert!(!data.exists(&id("/nope")).unwrap());
        assert_eq!(data.kind(&id("/nope")).unwrap_err().kind(), ErrorKind::ItemNotFound);
        assert_eq!(
            data.create_link(&id("/l"), &id("/a")).unwrap_err().kind(),
            ErrorKind::CapabilityUnsupported
        );
    }

    #[test]
    fn test_mkcol_on_existing_collection() {
        let transport = ScriptedTransport::new([
            multistatus(&[("/repo/", true)]),
            DavResponse::new(405),
        ]);
        let err = storer(&transport).create_collection(&id("/a")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}
