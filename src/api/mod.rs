pub(crate) mod firestore;

use crate::config::EnvConfig;
use crate::models::{NoteData, NotePatch};
use crate::runtime::{Runtime, TimerId};
use crate::store::{
    DocumentSnapshot, NoteStore, Snapshot, SnapshotListener, StoreError, StoreFuture,
    StoreResult, Subscription,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

const PAGE_SIZE: &str = "300";

fn error_for_status(status: u16, body: String, id: Option<&str>) -> StoreError {
    match status {
        401 | 403 => StoreError::Unauthorized,
        404 => StoreError::NotFound(id.unwrap_or_default().to_string()),
        _ => StoreError::Http { status, body },
    }
}

fn network(e: reqwest::Error) -> StoreError {
    StoreError::Network(e.to_string())
}

/// HTTP client for a Firestore-compatible documents endpoint.
#[derive(Clone)]
pub(crate) struct ApiClient {
    pub(crate) collection_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: &EnvConfig) -> Self {
        let collection_url = format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            config.api_url.trim_end_matches('/'),
            config.project_id,
            config.collection
        );
        Self {
            collection_url,
            http: reqwest::Client::new(),
        }
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url, urlencoding::encode(id))
    }

    async fn send(
        req: reqwest::RequestBuilder,
        id: Option<&str>,
    ) -> StoreResult<reqwest::Response> {
        let res = req.send().await.map_err(network)?;
        if res.status().is_success() {
            Ok(res)
        } else {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            Err(error_for_status(status, body, id))
        }
    }

    /// Every document of the collection, following `nextPageToken`.
    pub async fn list_documents(&self) -> StoreResult<Vec<DocumentSnapshot>> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .http
                .get(&self.collection_url)
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }

            let data: serde_json::Value = Self::send(req, None)
                .await?
                .json()
                .await
                .map_err(StoreError::parse)?;
            let (docs, next) = firestore::parse_list_response(&data);
            out.extend(docs);

            match next {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(out)
    }

    pub async fn create_document(&self, data: &NoteData) -> StoreResult<String> {
        let req = self
            .http
            .post(&self.collection_url)
            .json(&firestore::encode_data(data)?);
        let created: serde_json::Value = Self::send(req, None)
            .await?
            .json()
            .await
            .map_err(StoreError::parse)?;

        firestore::decode_document(&created)
            .map(|doc| doc.id)
            .ok_or_else(|| {
                StoreError::Parse(format!("create response is missing a document name: {created}"))
            })
    }

    /// Merge-write; fails with `NotFound` instead of recreating a deleted note.
    pub async fn patch_document(&self, id: &str, patch: &NotePatch) -> StoreResult<()> {
        let mut query: Vec<(&str, &str)> = patch
            .field_paths()
            .into_iter()
            .map(|p| ("updateMask.fieldPaths", p))
            .collect();
        query.push(("currentDocument.exists", "true"));

        let req = self
            .http
            .patch(self.document_url(id))
            .query(&query)
            .json(&firestore::encode_patch(patch)?);
        Self::send(req, Some(id)).await?;
        Ok(())
    }

    pub async fn delete_document(&self, id: &str) -> StoreResult<()> {
        let req = self.http.delete(self.document_url(id));
        Self::send(req, Some(id)).await?;
        Ok(())
    }
}

/// Collection calls the polling store is built on.
pub(crate) trait DocumentsApi {
    fn list(&self) -> StoreFuture<Vec<DocumentSnapshot>>;
    fn create(&self, data: NoteData) -> StoreFuture<String>;
    fn patch(&self, id: &str, patch: NotePatch) -> StoreFuture<()>;
    fn delete(&self, id: &str) -> StoreFuture<()>;
}

impl DocumentsApi for ApiClient {
    fn list(&self) -> StoreFuture<Vec<DocumentSnapshot>> {
        let client = self.clone();
        Box::pin(async move { client.list_documents().await })
    }

    fn create(&self, data: NoteData) -> StoreFuture<String> {
        let client = self.clone();
        Box::pin(async move { client.create_document(&data).await })
    }

    fn patch(&self, id: &str, patch: NotePatch) -> StoreFuture<()> {
        let client = self.clone();
        let id = id.to_string();
        Box::pin(async move { client.patch_document(&id, &patch).await })
    }

    fn delete(&self, id: &str) -> StoreFuture<()> {
        let client = self.clone();
        let id = id.to_string();
        Box::pin(async move { client.delete_document(&id).await })
    }
}

struct Feed {
    listener: SnapshotListener,
    interval: TimerId,
    last: Option<Snapshot>,
    /// Request sequence numbers, used to ignore responses that arrive out of order.
    issued: u64,
    applied: u64,
}

struct RestInner {
    api: Rc<dyn DocumentsApi>,
    runtime: Rc<dyn Runtime>,
    poll_ms: i32,
    feeds: RefCell<BTreeMap<u64, Feed>>,
    next_feed_id: Cell<u64>,
}

/// [`NoteStore`] over the REST API.
///
/// Subscriptions poll the collection every `poll_ms` and right after each
/// successful write; listeners only hear about snapshots that differ from the
/// previous one.
#[derive(Clone)]
pub(crate) struct RestStore {
    inner: Rc<RestInner>,
}

impl RestStore {
    pub fn new(api: Rc<dyn DocumentsApi>, runtime: Rc<dyn Runtime>, poll_ms: i32) -> Self {
        Self {
            inner: Rc::new(RestInner {
                api,
                runtime,
                poll_ms: poll_ms.max(250),
                feeds: RefCell::new(BTreeMap::new()),
                next_feed_id: Cell::new(0),
            }),
        }
    }

    fn from_weak(weak: &Weak<RestInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn refresh(&self, feed_id: u64) {
        let seq = {
            let mut feeds = self.inner.feeds.borrow_mut();
            let Some(feed) = feeds.get_mut(&feed_id) else {
                return;
            };
            feed.issued += 1;
            feed.issued
        };

        let list = self.inner.api.list();
        let weak = Rc::downgrade(&self.inner);
        self.inner.runtime.spawn(Box::pin(async move {
            let result = list.await;
            let Some(store) = Self::from_weak(&weak) else {
                return;
            };
            match result {
                Ok(docs) => store.deliver(feed_id, seq, Snapshot { docs }),
                Err(e) => {
                    // Keep the last snapshot; the next poll tries again.
                    tracing::warn!(error = %e, "polling notes failed");
                }
            }
        }));
    }

    fn deliver(&self, feed_id: u64, seq: u64, snap: Snapshot) {
        let listener = {
            let mut feeds = self.inner.feeds.borrow_mut();
            let Some(feed) = feeds.get_mut(&feed_id) else {
                return;
            };
            if seq <= feed.applied {
                return;
            }
            feed.applied = seq;
            if feed.last.as_ref() == Some(&snap) {
                return;
            }
            feed.last = Some(snap.clone());
            feed.listener.clone()
        };
        listener(snap);
    }

    fn refresh_all(&self) {
        let ids: Vec<u64> = self.inner.feeds.borrow().keys().copied().collect();
        for id in ids {
            self.refresh(id);
        }
    }

    fn unsubscribe(&self, feed_id: u64) {
        let feed = self.inner.feeds.borrow_mut().remove(&feed_id);
        if let Some(feed) = feed {
            self.inner.runtime.clear_interval(feed.interval);
        }
    }
}

impl NoteStore for RestStore {
    fn subscribe(&self, listener: SnapshotListener) -> Subscription {
        let feed_id = self.inner.next_feed_id.get() + 1;
        self.inner.next_feed_id.set(feed_id);

        let weak = Rc::downgrade(&self.inner);
        let interval = self.inner.runtime.set_interval(
            self.inner.poll_ms,
            Box::new(move || {
                if let Some(store) = Self::from_weak(&weak) {
                    store.refresh(feed_id);
                }
            }),
        );

        self.inner.feeds.borrow_mut().insert(
            feed_id,
            Feed {
                listener,
                interval,
                last: None,
                issued: 0,
                applied: 0,
            },
        );
        self.refresh(feed_id);

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(store) = Self::from_weak(&weak) {
                store.unsubscribe(feed_id);
            }
        })
    }

    fn create(&self, data: NoteData) -> StoreFuture<String> {
        let store = self.clone();
        Box::pin(async move {
            let id = store.inner.api.create(data).await?;
            store.refresh_all();
            Ok(id)
        })
    }

    fn merge_write(&self, id: &str, patch: NotePatch) -> StoreFuture<()> {
        let store = self.clone();
        let id = id.to_string();
        Box::pin(async move {
            store.inner.api.patch(&id, patch).await?;
            store.refresh_all();
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> StoreFuture<()> {
        let store = self.clone();
        let id = id.to_string();
        Box::pin(async move {
            store.inner.api.delete(&id).await?;
            store.refresh_all();
            Ok(())
        })
    }
}
