//! `Compactor` (§4.K): rewrites a thread's events into a shorter
//! semantically-equivalent shadow thread under a named strategy, then
//! rebinds the canonical id and appends a `COMPACTION` marker to the
//! original.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::error::{LaceError, LaceResult};
use crate::event::{CompactionData, Event, EventKind, ThreadId};
use crate::thread_manager::ThreadManager;

/// A pluggable rewrite strategy. Implementations return the *replacement*
/// event kinds for the thread; the `Compactor` is responsible for appending
/// them (with fresh ids/timestamps) to a new shadow thread.
#[async_trait]
pub trait CompactStrategy: Send + Sync {
    fn id(&self) -> &'static str;

    async fn compact(&self, events: &[Event]) -> LaceResult<Vec<EventKind>>;
}

/// Abstraction over "ask the model to summarize this text", kept separate
/// from `CompactStrategy` so `lace-core` does not need to depend on the
/// provider crate; `lace-agent` supplies a `ProviderPort`-backed impl.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> LaceResult<String>;
}

/// Cheap, non-LLM strategy: keeps the last `keep_turns` user turns (and
/// everything after the cut point), dropping everything earlier. Grounded
/// on the teacher's token-budget pruning approach (`session/pruning.rs`):
/// a purely mechanical, no-model-call trim.
pub struct DropOldTurnsStrategy {
    pub keep_turns: usize,
}

#[async_trait]
impl CompactStrategy for DropOldTurnsStrategy {
    fn id(&self) -> &'static str {
        "drop-old-turns"
    }

    async fn compact(&self, events: &[Event]) -> LaceResult<Vec<EventKind>> {
        let mut turn_starts: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.kind, EventKind::UserMessage(_)))
            .map(|(i, _)| i)
            .collect();
        if turn_starts.len() <= self.keep_turns {
            return Ok(events.iter().map(|e| e.kind.clone()).collect());
        }
        let cut_at = turn_starts[turn_starts.len() - self.keep_turns];
        turn_starts.clear();
        Ok(events[cut_at..].iter().map(|e| e.kind.clone()).collect())
    }
}

/// LLM-backed strategy: collapses everything before the last `keep_turns`
/// user turns into a single summarizing `AGENT_MESSAGE`, grounded on the
/// teacher's `session/compaction.rs` summarization prompt pattern.
pub struct SummarizeStrategy {
    pub keep_turns: usize,
    pub summarizer: Arc<dyn Summarizer>,
}

#[async_trait]
impl CompactStrategy for SummarizeStrategy {
    fn id(&self) -> &'static str {
        "summarize"
    }

    async fn compact(&self, events: &[Event]) -> LaceResult<Vec<EventKind>> {
        let turn_starts: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.kind, EventKind::UserMessage(_)))
            .map(|(i, _)| i)
            .collect();
        if turn_starts.len() <= self.keep_turns {
            return Ok(events.iter().map(|e| e.kind.clone()).collect());
        }
        let cut_at = turn_starts[turn_starts.len() - self.keep_turns];
        let (to_summarize, to_keep) = events.split_at(cut_at);

        let transcript = to_summarize
            .iter()
            .filter_map(render_line)
            .collect::<Vec<_>>()
            .join("\n");
        let summary = self.summarizer.summarize(&transcript).await?;

        let mut out = vec![EventKind::AgentMessage(format!(
            "[earlier conversation summarized]\n{summary}"
        ))];
        out.extend(to_keep.iter().map(|e| e.kind.clone()));
        Ok(out)
    }
}

fn render_line(event: &Event) -> Option<String> {
    match &event.kind {
        EventKind::UserMessage(text) => Some(format!("User: {text}")),
        EventKind::AgentMessage(text) => Some(format!("Assistant: {text}")),
        _ => None,
    }
}

pub struct Compactor {
    thread_manager: Arc<ThreadManager>,
    strategies: HashMap<&'static str, Arc<dyn CompactStrategy>>,
}

impl Compactor {
    pub fn new(thread_manager: Arc<ThreadManager>) -> Self {
        Self {
            thread_manager,
            strategies: HashMap::new(),
        }
    }

    pub fn register(&mut self, strategy: Arc<dyn CompactStrategy>) -> &mut Self {
        self.strategies.insert(strategy.id(), strategy);
        self
    }

    /// Compacts `original_id` under `strategy_id`, returning the new
    /// shadow thread id. The canonical id continues to resolve to the
    /// shadow afterwards (`ThreadStore::canonical_id`).
    #[instrument(skip(self))]
    pub async fn compact(&self, original_id: &ThreadId, strategy_id: &str) -> LaceResult<ThreadId> {
        let strategy = self
            .strategies
            .get(strategy_id)
            .ok_or_else(|| LaceError::Internal(format!("unknown compaction strategy: {strategy_id}")))?
            .clone();

        let store = self.thread_manager.store();
        let original_events = store.get_events(original_id).await?;
        let compacted_kinds = strategy.compact(&original_events).await?;

        let shadow_id = self.thread_manager.create_thread().await?;
        for kind in &compacted_kinds {
            store.append_event(&shadow_id, kind.clone()).await?;
        }

        store
            .append_event(
                original_id,
                EventKind::Compaction(CompactionData {
                    strategy_id: strategy_id.to_string(),
                    original_event_count: original_events.len(),
                    compacted_event_count: compacted_kinds.len(),
                }),
            )
            .await?;

        store.rebind_canonical(original_id, &shadow_id).await?;
        Ok(shadow_id)
    }
}

/// Detects a `/compact` command in the text of a `USER_MESSAGE`, as
/// required by §4.K ("detected by handlers via the preceding USER_MESSAGE
/// content").
pub fn is_compact_command(text: &str) -> bool {
    matches!(text.trim(), "/compact")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryThreadStore;
    use crate::thread_store::ThreadStore;

    struct StubSummarizer;

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, transcript: &str) -> LaceResult<String> {
            Ok(format!("summary of {} lines", transcript.lines().count()))
        }
    }

    async fn seed(store: &Arc<dyn ThreadStore>, id: &ThreadId, turns: usize) {
        for i in 0..turns {
            store
                .append_event(id, EventKind::UserMessage(format!("turn {i}")))
                .await
                .unwrap();
            store
                .append_event(id, EventKind::AgentMessage(format!("reply {i}")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn drop_old_turns_keeps_only_recent_and_rebinds_canonical() {
        let store: Arc<dyn ThreadStore> = Arc::new(InMemoryThreadStore::new());
        let manager = Arc::new(ThreadManager::new(store.clone()));
        let original = manager.create_thread().await.unwrap();
        seed(&store, &original, 5).await;

        let mut compactor = Compactor::new(manager.clone());
        compactor.register(Arc::new(DropOldTurnsStrategy { keep_turns: 2 }));

        let shadow = compactor.compact(&original, "drop-old-turns").await.unwrap();
        let shadow_events = store.get_events(&shadow).await.unwrap();
        let user_turns = shadow_events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::UserMessage(_)))
            .count();
        assert_eq!(user_turns, 2);

        let canonical = store.canonical_id(&original).await.unwrap();
        assert_eq!(canonical, shadow);

        let original_events = store.get_events(&original).await.unwrap();
        assert!(matches!(
            original_events.last().unwrap().kind,
            EventKind::Compaction(_)
        ));
    }

    #[tokio::test]
    async fn summarize_strategy_collapses_dropped_turns_into_one_message() {
        let store: Arc<dyn ThreadStore> = Arc::new(InMemoryThreadStore::new());
        let manager = Arc::new(ThreadManager::new(store.clone()));
        let original = manager.create_thread().await.unwrap();
        seed(&store, &original, 4).await;

        let mut compactor = Compactor::new(manager.clone());
        compactor.register(Arc::new(SummarizeStrategy {
            keep_turns: 1,
            summarizer: Arc::new(StubSummarizer),
        }));

        let shadow = compactor.compact(&original, "summarize").await.unwrap();
        let shadow_events = store.get_events(&shadow).await.unwrap();
        assert!(matches!(shadow_events[0].kind, EventKind::AgentMessage(_)));
        if let EventKind::AgentMessage(text) = &shadow_events[0].kind {
            assert!(text.contains("summarized"));
        }
        let user_turns = shadow_events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::UserMessage(_)))
            .count();
        assert_eq!(user_turns, 1);
    }

    #[test]
    fn compact_command_detection() {
        assert!(is_compact_command("/compact"));
        assert!(is_compact_command("  /compact  "));
        assert!(!is_compact_command("/compact now"));
        assert!(!is_compact_command("tell me about /compact"));
    }
}
