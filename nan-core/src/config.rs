//! Device configuration requested by clients, and the merge of all requests into the
//! one configuration pushed to hardware.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Highest valid cluster id. `[0, CLUSTER_ID_MAX]` is the full default range.
pub const CLUSTER_ID_MAX: u16 = 0xFFFF;

/// Default bound on each session's peer cache.
pub const DEFAULT_PEER_CACHE_CAPACITY: usize = 64;

/// Device-wide configuration a client asks for.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub support_5g: bool,
    pub master_preference: u8,
    pub cluster_low: u16,
    pub cluster_high: u16,
}

impl Default for ConfigRequest {
    fn default() -> Self {
        Self {
            support_5g: false,
            master_preference: 0,
            cluster_low: 0,
            cluster_high: CLUSTER_ID_MAX,
        }
    }
}

impl ConfigRequest {
    pub fn builder() -> ConfigRequestBuilder {
        ConfigRequestBuilder::default()
    }

    /// True when the cluster range is `[0, CLUSTER_ID_MAX]`, i.e. no preference.
    pub fn has_default_cluster_range(&self) -> bool {
        self.cluster_low == 0 && self.cluster_high == CLUSTER_ID_MAX
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.master_preference == 1 || self.master_preference == 255 {
            return Err(ConfigError::ReservedMasterPreference(self.master_preference));
        }
        if self.cluster_low > self.cluster_high {
            return Err(ConfigError::InvertedClusterRange {
                low: self.cluster_low,
                high: self.cluster_high,
            });
        }
        Ok(())
    }
}

/// Builder for [`ConfigRequest`]; `build` validates.
#[derive(Debug, Clone, Default)]
pub struct ConfigRequestBuilder {
    inner: ConfigRequest,
}

impl ConfigRequestBuilder {
    pub fn support_5g(mut self, v: bool) -> Self {
        self.inner.support_5g = v;
        self
    }

    pub fn master_preference(mut self, v: u8) -> Self {
        self.inner.master_preference = v;
        self
    }

    pub fn cluster_low(mut self, v: u16) -> Self {
        self.inner.cluster_low = v;
        self
    }

    pub fn cluster_high(mut self, v: u16) -> Self {
        self.inner.cluster_high = v;
        self
    }

    pub fn build(self) -> Result<ConfigRequest, ConfigError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("master preference {0} is reserved")]
    ReservedMasterPreference(u8),
    #[error("cluster range inverted: low {low} > high {high}")]
    InvertedClusterRange { low: u16, high: u16 },
    #[error("service name must not be empty")]
    EmptyServiceName,
}

/// Merge the configurations of all connected clients. Clients without a
/// configuration are skipped; with none at all the result is the default.
///
/// 5 GHz support is OR-ed, master preference is the maximum, and the cluster range
/// is the hull of every non-default range. A default range never narrows or
/// overrides a range seeded by another client.
pub fn merge_config_requests<'a, I>(requests: I) -> ConfigRequest
where
    I: IntoIterator<Item = &'a ConfigRequest>,
{
    let requests: Vec<&ConfigRequest> = requests.into_iter().collect();
    if let [only] = requests.as_slice() {
        return **only;
    }

    let mut merged = ConfigRequest::default();
    let mut range_seeded = false;
    for cr in requests {
        merged.support_5g |= cr.support_5g;
        merged.master_preference = merged.master_preference.max(cr.master_preference);

        if cr.has_default_cluster_range() {
            continue;
        }
        if range_seeded {
            merged.cluster_low = merged.cluster_low.min(cr.cluster_low);
            merged.cluster_high = merged.cluster_high.max(cr.cluster_high);
        } else {
            merged.cluster_low = cr.cluster_low;
            merged.cluster_high = cr.cluster_high;
            range_seeded = true;
        }
    }
    merged
}

/// Coordinator tunables.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CoreSettings {
    /// Peers remembered per session before the least recently refreshed is evicted.
    pub peer_cache_capacity: NonZeroUsize,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            peer_cache_capacity: NonZeroUsize::new(DEFAULT_PEER_CACHE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}
