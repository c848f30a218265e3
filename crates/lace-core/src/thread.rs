use serde::{Deserialize, Serialize};

use crate::event::ThreadId;

/// Metadata for a stored thread, independent of its event contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub created_at: u64,
    pub updated_at: u64,
}
