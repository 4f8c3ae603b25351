//! # config
//!
//! why: the reserved namespace and pruning behavior differ between deployments and tests
//! relations: consumed by Store
//! what: StoreConfig

use serde::{Deserialize, Serialize};

/// store configuration, loadable from json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// top-level keys external transactions may not touch
    pub protected_prefixes: Vec<String>,
    /// remove object nodes left empty by a delete or a ttl expiry
    pub prune_empty_parents: bool,
    /// how many client ids `inquire` remembers, 0 disables tracking
    pub client_id_history: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            protected_prefixes: vec![".agency".to_owned()],
            prune_empty_parents: true,
            client_id_history: 1024,
        }
    }
}

impl StoreConfig {
    pub fn is_protected(&self, first_segment: &str) -> bool {
        self.protected_prefixes.iter().any(|p| p == first_segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_protect_agency_namespace() {
        let config = StoreConfig::default();
        assert!(config.is_protected(".agency"));
        assert!(!config.is_protected("agency"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"prune_empty_parents": false}"#).unwrap();
        assert!(!config.prune_empty_parents);
        assert_eq!(config.protected_prefixes, vec![".agency".to_string()]);
    }
}
