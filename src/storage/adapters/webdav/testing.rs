//! Scripted transport for unit tests.

use super::{DavRequest, DavResponse, HttpTransport, TransportError, TransportErrorKind};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Answers requests from a fixed script and records what was sent.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<DavResponse>>,
    sent: Mutex<Vec<DavRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: impl IntoIterator<Item = DavResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<DavRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: &DavRequest) -> Result<DavResponse, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::new(TransportErrorKind::Connect, "script exhausted"))
    }
}

/// A `207` answer listing `(href, is_collection)` entries.
pub fn multistatus(entries: &[(&str, bool)]) -> DavResponse {
    multistatus_with(entries.iter().map(|(href, collection)| {
        let rtype = if *collection { "<d:collection/>" } else { "" };
        format!("<d:href>{href}</d:href><d:propstat><d:prop><d:resourcetype>{rtype}</d:resourcetype></d:prop></d:propstat>")
    }))
}

/// A `207` answer with raw `<d:response>` contents.
pub fn multistatus_with(responses: impl IntoIterator<Item = String>) -> DavResponse {
    let body: String = responses
        .into_iter()
        .map(|inner| format!("<d:response>{inner}</d:response>"))
        .collect();
    DavResponse::new(207).with_body(format!(
        r#"<?xml version="1.0"?><d:multistatus xmlns:d="DAV:" xmlns:m="urn:mountstore:">{body}</d:multistatus>"#
    ))
}
