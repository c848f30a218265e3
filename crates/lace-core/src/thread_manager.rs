//! `ThreadManager` (§4.B): generates thread/delegate ids and offers
//! resume-or-create semantics on top of a `ThreadStore`.

use std::sync::Arc;

use rand::Rng;
use time::OffsetDateTime;
use tracing::instrument;

use crate::error::LaceResult;
use crate::event::{ThreadId, looks_like_thread_id};
use crate::thread_store::ThreadStore;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;
const MAX_ID_ATTEMPTS: usize = 16;

/// Outcome of `resume_or_create`: never raises on a malformed/unknown id,
/// per §4.B's contract.
pub struct ResumeOutcome {
    pub thread_id: ThreadId,
    pub is_resumed: bool,
    pub resume_error: Option<String>,
}

/// In-memory index over a `ThreadStore`. Not concurrency-safe for writers
/// of the *same* thread; single-writer-per-thread is enforced one layer up,
/// by the `Agent`.
pub struct ThreadManager {
    store: Arc<dyn ThreadStore>,
}

impl ThreadManager {
    pub fn new(store: Arc<dyn ThreadStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ThreadStore> {
        &self.store
    }

    /// Creates a brand-new root thread with a fresh, store-unique id.
    #[instrument(skip(self))]
    pub async fn create_thread(&self) -> LaceResult<ThreadId> {
        let date = current_date_yyyymmdd();
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_ID_ATTEMPTS {
            let suffix = random_suffix(&mut rng);
            let id = ThreadId::new_root(&date, &suffix);
            if !self.store.has_thread(&id).await? {
                self.store.create_thread(&id).await?;
                return Ok(id);
            }
        }
        // Astronomically unlikely with a 36^6 suffix space; fall back to a
        // longer suffix rather than looping forever.
        let suffix: String = (0..SUFFIX_LEN + 4)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        let id = ThreadId::new_root(&date, &suffix);
        self.store.create_thread(&id).await?;
        Ok(id)
    }

    /// Creates a new delegate thread under `parent`, picking the next free
    /// `.N` suffix among `parent`'s direct children.
    #[instrument(skip(self))]
    pub async fn create_delegate_thread(&self, parent: &ThreadId) -> LaceResult<ThreadId> {
        let children = self.store.direct_children(parent).await?;
        let taken: Vec<u32> = children
            .iter()
            .filter_map(|c| c.as_str().rsplit('.').next())
            .filter_map(|s| s.parse().ok())
            .collect();
        let id = parent.next_delegate(&taken);
        self.store.create_thread(&id).await?;
        Ok(id)
    }

    /// Resumes `maybe_id` if it names a stored thread; otherwise creates a
    /// fresh thread and reports why resumption didn't happen. Never raises.
    #[instrument(skip(self))]
    pub async fn resume_or_create(&self, maybe_id: Option<&str>) -> LaceResult<ResumeOutcome> {
        let Some(raw) = maybe_id else {
            let thread_id = self.create_thread().await?;
            return Ok(ResumeOutcome {
                thread_id,
                is_resumed: false,
                resume_error: None,
            });
        };

        if !looks_like_thread_id(raw) {
            let thread_id = self.create_thread().await?;
            return Ok(ResumeOutcome {
                thread_id,
                is_resumed: false,
                resume_error: Some(format!("'{raw}' is not a valid thread id")),
            });
        }

        let id = ThreadId::from_raw(raw);
        let canonical = self.store.canonical_id(&id).await?;
        if self.store.has_thread(&canonical).await? {
            return Ok(ResumeOutcome {
                thread_id: canonical,
                is_resumed: true,
                resume_error: None,
            });
        }

        let thread_id = self.create_thread().await?;
        Ok(ResumeOutcome {
            thread_id,
            is_resumed: false,
            resume_error: Some(format!("no stored thread found for '{raw}'")),
        })
    }
}

fn random_suffix(rng: &mut impl Rng) -> String {
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

fn current_date_yyyymmdd() -> String {
    let now = OffsetDateTime::now_utc();
    format!("{:04}{:02}{:02}", now.year(), u8::from(now.month()), now.day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryThreadStore;

    #[tokio::test]
    async fn create_thread_is_unique_and_matches_shape() {
        let manager = ThreadManager::new(Arc::new(InMemoryThreadStore::new()));
        let a = manager.create_thread().await.unwrap();
        let b = manager.create_thread().await.unwrap();
        assert_ne!(a, b);
        assert!(looks_like_thread_id(a.as_str()));
    }

    #[tokio::test]
    async fn delegate_ids_are_sequential() {
        let manager = ThreadManager::new(Arc::new(InMemoryThreadStore::new()));
        let parent = manager.create_thread().await.unwrap();
        let d1 = manager.create_delegate_thread(&parent).await.unwrap();
        let d2 = manager.create_delegate_thread(&parent).await.unwrap();
        let d3 = manager.create_delegate_thread(&parent).await.unwrap();
        assert_eq!(d1.as_str(), format!("{parent}.1"));
        assert_eq!(d2.as_str(), format!("{parent}.2"));
        assert_eq!(d3.as_str(), format!("{parent}.3"));

        let d11 = manager.create_delegate_thread(&d1).await.unwrap();
        assert_eq!(d11.as_str(), format!("{d1}.1"));
        let d111 = manager.create_delegate_thread(&d11).await.unwrap();
        assert_eq!(d111.as_str(), format!("{d11}.1"));
    }

    #[tokio::test]
    async fn resume_or_create_resumes_known_thread() {
        let manager = ThreadManager::new(Arc::new(InMemoryThreadStore::new()));
        let id = manager.create_thread().await.unwrap();
        let outcome = manager.resume_or_create(Some(id.as_str())).await.unwrap();
        assert!(outcome.is_resumed);
        assert_eq!(outcome.thread_id, id);
        assert!(outcome.resume_error.is_none());
    }

    #[tokio::test]
    async fn resume_or_create_falls_back_on_malformed_id() {
        let manager = ThreadManager::new(Arc::new(InMemoryThreadStore::new()));
        let outcome = manager.resume_or_create(Some("not-a-thread")).await.unwrap();
        assert!(!outcome.is_resumed);
        assert!(outcome.resume_error.is_some());
    }

    #[tokio::test]
    async fn resume_or_create_falls_back_on_unknown_id() {
        let manager = ThreadManager::new(Arc::new(InMemoryThreadStore::new()));
        let outcome = manager
            .resume_or_create(Some("lace_20250101_zzzzzz"))
            .await
            .unwrap();
        assert!(!outcome.is_resumed);
        assert!(outcome.resume_error.is_some());
    }

    #[tokio::test]
    async fn resume_or_create_with_none_creates_fresh() {
        let manager = ThreadManager::new(Arc::new(InMemoryThreadStore::new()));
        let outcome = manager.resume_or_create(None).await.unwrap();
        assert!(!outcome.is_resumed);
        assert!(outcome.resume_error.is_none());
    }

    #[tokio::test]
    async fn resume_or_create_follows_canonical_shadow() {
        let manager = ThreadManager::new(Arc::new(InMemoryThreadStore::new()));
        let original = manager.create_thread().await.unwrap();
        let shadow = manager.create_thread().await.unwrap();
        manager
            .store()
            .rebind_canonical(&original, &shadow)
            .await
            .unwrap();
        let outcome = manager
            .resume_or_create(Some(original.as_str()))
            .await
            .unwrap();
        assert!(outcome.is_resumed);
        assert_eq!(outcome.thread_id, shadow);
    }
}
