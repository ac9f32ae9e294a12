//! ProxyConfig - factory 全体の設定（JSON から読める）
//!
//! 全フィールドに既定値があるので、空の `{}` も有効な設定です。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::WorkUnitCache;
use crate::error::ConfigError;
use crate::throttle::ThrottlePolicy;

use super::executor::ExecutorConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub cache_capacity: usize,

    pub throttle: ThrottlePolicy,

    pub executor: ExecutorConfig,

    /// Default for new proxies: check connectivity before executing.
    pub check_network: bool,

    /// Default for new proxies: notify failures no callback handles.
    pub failure_notice: bool,
}

impl ProxyConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            cache_capacity: WorkUnitCache::DEFAULT_CAPACITY,
            throttle: ThrottlePolicy::default(),
            executor: ExecutorConfig::default(),
            check_network: true,
            failure_notice: true,
        }
    }
}
