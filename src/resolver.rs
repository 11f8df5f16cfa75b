//! Channel reference resolution
//!
//! Maps caller-supplied references (identifier, profile URL, handle, or free
//! text name) to stable [`ChannelId`]s, and looks up the channel metadata the
//! pipeline needs before enumeration.

use crate::api::UpstreamApi;
use crate::config::QuotaCosts;
use crate::error::{Error, Result};
use crate::quota::QuotaTracker;
use crate::types::{ChannelId, ChannelInfo};
use crate::utils::{ChannelRef, classify_channel_ref};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Resolves channel references, caching name lookups for the resolver's lifetime
///
/// References that already carry an identifier resolve locally at zero cost.
/// Free-text names cost one `search` reservation the first time they are seen.
pub struct ChannelResolver {
    api: Arc<dyn UpstreamApi>,
    quota: QuotaTracker,
    costs: QuotaCosts,
    /// Name lookups already paid for (keyed by lowercased name)
    cache: Mutex<HashMap<String, ChannelId>>,
}

impl ChannelResolver {
    /// Create a resolver that spends budget from `quota`
    pub fn new(api: Arc<dyn UpstreamApi>, quota: QuotaTracker, costs: QuotaCosts) -> Self {
        Self {
            api,
            quota,
            costs,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `reference` to a stable identifier
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the reference is empty or nothing matches
    /// - [`Error::QuotaExceeded`] if the name lookup cannot be paid for
    /// - Transport errors from the lookup call
    pub async fn resolve(&self, reference: &str) -> Result<ChannelId> {
        let name = match classify_channel_ref(reference) {
            ChannelRef::Id(id) => return Ok(id),
            ChannelRef::Name(name) if name.is_empty() => {
                return Err(Error::NotFound("empty channel reference".into()));
            }
            ChannelRef::Name(name) => name,
        };

        let key = name.to_lowercase();
        if let Some(id) = self.cache.lock().await.get(&key) {
            return Ok(id.clone());
        }

        self.quota.reserve(self.costs.search)?;
        let id = self
            .api
            .search_channel(&name)
            .await?
            .ok_or_else(|| Error::NotFound(reference.trim().to_string()))?;

        debug!(reference = %name, channel_id = %id, "channel name resolved");
        self.cache.lock().await.insert(key, id.clone());
        Ok(id)
    }

    /// Look up display name, upload index and item count for a resolved channel
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the channel does not exist or exposes no upload
    /// index; quota and transport errors as for [`resolve`](Self::resolve).
    pub async fn describe(&self, id: &ChannelId) -> Result<ChannelInfo> {
        self.quota.reserve(self.costs.channel_lookup)?;
        let info = self
            .api
            .channel_info(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if info.uploads_index.is_none() {
            return Err(Error::NotFound(format!("{id} has no upload index")));
        }
        Ok(info)
    }
}
