//! Ephemeral `ThreadStore` backed by an in-process map. Used for tests and
//! one-shot sessions that opt out of durable persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{LaceError, LaceResult};
use crate::event::{Event, EventId, EventKind, ThreadId};
use crate::thread::Thread;
use crate::thread_store::ThreadStore;

struct ThreadRecord {
    thread: Thread,
    events: Vec<Event>,
    clock: u64,
}

#[derive(Default)]
struct Inner {
    threads: HashMap<ThreadId, ThreadRecord>,
    /// Insertion order of top-level threads, for `get_latest_thread_id`.
    root_order: Vec<ThreadId>,
    /// Compaction indirection: canonical id -> current shadow id.
    canonical: HashMap<ThreadId, ThreadId>,
}

#[derive(Default)]
pub struct InMemoryThreadStore {
    inner: RwLock<Inner>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn create_thread(&self, id: &ThreadId) -> LaceResult<()> {
        let mut inner = self.inner.write();
        if inner.threads.contains_key(id) {
            return Err(LaceError::DuplicateThread(id.clone()));
        }
        let now = inner.root_order.len() as u64;
        inner.threads.insert(
            id.clone(),
            ThreadRecord {
                thread: Thread {
                    id: id.clone(),
                    created_at: now,
                    updated_at: now,
                },
                events: Vec::new(),
                clock: 0,
            },
        );
        if id.is_root() {
            inner.root_order.push(id.clone());
        }
        Ok(())
    }

    async fn append_event(&self, thread_id: &ThreadId, kind: EventKind) -> LaceResult<Event> {
        let mut inner = self.inner.write();
        let record = inner
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| LaceError::ThreadNotFound(thread_id.clone()))?;
        record.clock += 1;
        let event = Event {
            id: EventId::new(),
            thread_id: thread_id.clone(),
            timestamp: record.clock,
            kind,
        };
        record.events.push(event.clone());
        record.thread.updated_at = record.clock;
        Ok(event)
    }

    async fn get_events(&self, thread_id: &ThreadId) -> LaceResult<Vec<Event>> {
        let inner = self.inner.read();
        Ok(inner
            .threads
            .get(thread_id)
            .map(|r| r.events.clone())
            .unwrap_or_default())
    }

    async fn get_main_and_delegate_events(&self, root_id: &ThreadId) -> LaceResult<Vec<Event>> {
        let inner = self.inner.read();
        let mut merged: Vec<Event> = inner
            .threads
            .iter()
            .filter(|(id, _)| id.is_descendant_of(root_id))
            .flat_map(|(_, r)| r.events.clone())
            .collect();
        merged.sort_by_key(|e| e.timestamp);
        Ok(merged)
    }

    async fn get_latest_thread_id(&self) -> LaceResult<Option<ThreadId>> {
        Ok(self.inner.read().root_order.last().cloned())
    }

    async fn has_thread(&self, id: &ThreadId) -> LaceResult<bool> {
        Ok(self.inner.read().threads.contains_key(id))
    }

    async fn get_thread(&self, id: &ThreadId) -> LaceResult<Option<Thread>> {
        Ok(self.inner.read().threads.get(id).map(|r| r.thread.clone()))
    }

    async fn canonical_id(&self, id: &ThreadId) -> LaceResult<ThreadId> {
        let inner = self.inner.read();
        let mut current = id.clone();
        // Follow the indirection chain; bounded by map size so a cycle
        // (which should never occur) cannot loop forever.
        for _ in 0..inner.canonical.len() + 1 {
            match inner.canonical.get(&current) {
                Some(next) if *next != current => current = next.clone(),
                _ => break,
            }
        }
        Ok(current)
    }

    async fn rebind_canonical(&self, canonical: &ThreadId, shadow: &ThreadId) -> LaceResult<()> {
        self.inner
            .write()
            .canonical
            .insert(canonical.clone(), shadow.clone());
        Ok(())
    }

    async fn direct_children(&self, parent: &ThreadId) -> LaceResult<Vec<ThreadId>> {
        let inner = self.inner.read();
        let prefix = format!("{parent}.");
        Ok(inner
            .threads
            .keys()
            .filter(|id| {
                id.as_str()
                    .strip_prefix(prefix.as_str())
                    .map(|rest| !rest.contains('.'))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_create_fails() {
        let store = InMemoryThreadStore::new();
        let id = ThreadId::from_raw("lace_20250101_abc123");
        store.create_thread(&id).await.unwrap();
        assert!(matches!(
            store.create_thread(&id).await,
            Err(LaceError::DuplicateThread(_))
        ));
    }

    #[tokio::test]
    async fn append_assigns_monotone_timestamps() {
        let store = InMemoryThreadStore::new();
        let id = ThreadId::from_raw("lace_20250101_abc123");
        store.create_thread(&id).await.unwrap();
        let e1 = store
            .append_event(&id, EventKind::UserMessage("hi".into()))
            .await
            .unwrap();
        let e2 = store
            .append_event(&id, EventKind::AgentMessage("hello".into()))
            .await
            .unwrap();
        assert!(e2.timestamp > e1.timestamp);
    }

    #[tokio::test]
    async fn read_on_missing_thread_is_empty_not_error() {
        let store = InMemoryThreadStore::new();
        let id = ThreadId::from_raw("lace_20250101_missing");
        assert_eq!(store.get_events(&id).await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn main_and_delegate_events_merge_by_timestamp() {
        let store = InMemoryThreadStore::new();
        let root = ThreadId::from_raw("lace_20250101_abc123");
        let child = ThreadId::from_raw("lace_20250101_abc123.1");
        store.create_thread(&root).await.unwrap();
        store.create_thread(&child).await.unwrap();
        store
            .append_event(&root, EventKind::UserMessage("root-1".into()))
            .await
            .unwrap();
        store
            .append_event(&child, EventKind::UserMessage("child-1".into()))
            .await
            .unwrap();
        store
            .append_event(&root, EventKind::UserMessage("root-2".into()))
            .await
            .unwrap();
        let merged = store.get_main_and_delegate_events(&root).await.unwrap();
        assert_eq!(merged.len(), 3);
        let unrelated = ThreadId::from_raw("lace_20250101_zzz999");
        store.create_thread(&unrelated).await.unwrap();
        store
            .append_event(&unrelated, EventKind::UserMessage("nope".into()))
            .await
            .unwrap();
        let merged = store.get_main_and_delegate_events(&root).await.unwrap();
        assert_eq!(merged.len(), 3);
    }

    #[tokio::test]
    async fn canonical_id_follows_rebind_chain() {
        let store = InMemoryThreadStore::new();
        let a = ThreadId::from_raw("lace_20250101_aaa111");
        let b = ThreadId::from_raw("lace_20250101_bbb222");
        assert_eq!(store.canonical_id(&a).await.unwrap(), a);
        store.rebind_canonical(&a, &b).await.unwrap();
        assert_eq!(store.canonical_id(&a).await.unwrap(), b);
    }

    #[tokio::test]
    async fn direct_children_excludes_grandchildren() {
        let store = InMemoryThreadStore::new();
        let parent = ThreadId::from_raw("lace_20250101_abc123");
        for suffix in ["1", "2", "1.1"] {
            let id = ThreadId::from_raw(format!("{parent}.{suffix}"));
            store.create_thread(&id).await.unwrap();
        }
        let mut children = store.direct_children(&parent).await.unwrap();
        children.sort();
        assert_eq!(
            children,
            vec![
                ThreadId::from_raw("lace_20250101_abc123.1"),
                ThreadId::from_raw("lace_20250101_abc123.2"),
            ]
        );
    }
}
