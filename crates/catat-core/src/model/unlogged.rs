//! Unlogged awareness blocks. Local-only, pruned after a retention period.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A 30-minute span with no activity and no user response to the awareness
/// prompt. Resolved blocks become auto-logged activities and are deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnloggedBlock {
    pub id: String,
    pub block_start: DateTime<Utc>,
    pub block_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
