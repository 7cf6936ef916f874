//! `ActorPoolConfig` and its wire shape -- the §6 "ActorPoolConfig (serialized wire shape)"
//! layout, ported from `oscar/backends/config.py`'s `ActorPoolConfig`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::{ExternalAddress, InternalAddress, ProcessIndex};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfigEntry {
    pub label: String,
    pub internal_address: InternalAddress,
    pub external_address: Vec<ExternalAddress>,
    pub env: Option<std::collections::HashMap<String, String>>,
    pub modules: Option<Vec<String>>,
    pub suspend_sigint: bool,
    pub use_uvloop: bool,
    pub logging_conf: Option<serde_json::Value>,
    pub kwargs: serde_json::Value,
}

impl Default for PoolConfigEntry {
    fn default() -> Self {
        Self {
            label: String::new(),
            internal_address: String::new(),
            external_address: Vec::new(),
            env: None,
            modules: None,
            suspend_sigint: false,
            use_uvloop: false,
            logging_conf: None,
            kwargs: serde_json::Value::Null,
        }
    }
}

/// Process-index-keyed pool layout plus the external->internal address mapping every process
/// consults to route a send. Constructed once per task manager instance, then treated as
/// read-only across subpool processes (§5's shared-resource policy).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorPoolConfig {
    pub pools: BTreeMap<ProcessIndex, PoolConfigEntry>,
    pub mapping: std::collections::HashMap<ExternalAddress, InternalAddress>,
    #[serde(default)]
    pub metrics: serde_json::Value,
    #[serde(default)]
    pub comm: serde_json::Value,
}

impl ActorPoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool_conf(&mut self, process_index: ProcessIndex, entry: PoolConfigEntry) {
        for external in &entry.external_address {
            self.mapping.insert(external.clone(), entry.internal_address.clone());
        }
        self.pools.insert(process_index, entry);
    }

    pub fn get_pool_config(&self, process_index: ProcessIndex) -> Option<&PoolConfigEntry> {
        self.pools.get(&process_index)
    }

    pub fn external_to_internal(&self, external: &str) -> Option<&InternalAddress> {
        self.mapping.get(external)
    }

    /// Every external address across every process, ordered by process index -- mirrors
    /// `ActorPoolConfig.get_external_addresses` in the source.
    pub fn get_external_addresses(&self) -> Vec<ExternalAddress> {
        self.pools
            .values()
            .flat_map(|entry| entry.external_address.iter().cloned())
            .collect()
    }

    /// Replaces a process's external addresses (e.g. after a recovery re-bind picks new
    /// ephemeral ports), updating `mapping` so stale externals no longer resolve and new ones
    /// do. Ported from `ActorPoolConfig.reset_pool_external_address`.
    pub fn reset_pool_external_address(&mut self, process_index: ProcessIndex, new_external: Vec<ExternalAddress>) {
        let Some(entry) = self.pools.get_mut(&process_index) else { return };
        for old in &entry.external_address {
            self.mapping.remove(old);
        }
        for new in &new_external {
            self.mapping.insert(new.clone(), entry.internal_address.clone());
        }
        entry.external_address = new_external;
    }

    pub fn process_indexes(&self) -> impl Iterator<Item = ProcessIndex> + '_ {
        self.pools.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(internal: &str, external: &str) -> PoolConfigEntry {
        PoolConfigEntry {
            internal_address: internal.into(),
            external_address: vec![external.into()],
            ..Default::default()
        }
    }

    #[test]
    fn add_pool_conf_populates_mapping() {
        let mut config = ActorPoolConfig::new();
        config.add_pool_conf(0, entry("unix:///tmp/pool-0.sock", "10.0.0.1:9001"));
        assert_eq!(config.external_to_internal("10.0.0.1:9001"), Some(&"unix:///tmp/pool-0.sock".to_string()));
        assert_eq!(config.get_external_addresses(), vec!["10.0.0.1:9001".to_string()]);
    }

    #[test]
    fn reset_pool_external_address_rewrites_mapping() {
        let mut config = ActorPoolConfig::new();
        config.add_pool_conf(0, entry("unix:///tmp/pool-0.sock", "10.0.0.1:9001"));
        config.reset_pool_external_address(0, vec!["10.0.0.1:9101".into()]);
        assert_eq!(config.external_to_internal("10.0.0.1:9001"), None);
        assert_eq!(config.external_to_internal("10.0.0.1:9101"), Some(&"unix:///tmp/pool-0.sock".to_string()));
    }
}
