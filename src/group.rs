//! Consumer group bootstrap.

use tracing::debug;

use crate::commands::streams::{self, NEW_ENTRIES_ONLY};
use crate::error::Result;
use crate::transport::Transport;

/// Make sure `group` exists on `topic`, creating both if needed.
///
/// New groups start at the tail of the log, so entries appended before the
/// group existed are never delivered to it. An existing group is left as is.
pub async fn ensure_group<T: Transport + ?Sized>(conn: &mut T, topic: &str, group: &str) -> Result<()> {
    match streams::xgroup_create(conn, topic, group, NEW_ENTRIES_ONLY, true).await {
        Ok(()) => {
            debug!(topic, group, "created consumer group");
            Ok(())
        }
        Err(e) if e.is_busy_group() => {
            debug!(topic, group, "consumer group already exists");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
