use super::{DatabaseAdapter, MySqlAdapter, PostgresAdapter, RedisAdapter};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Lookup of database adapters by canonical name or alias.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<&'static str, Arc<dyn DatabaseAdapter>>,
    aliases: HashMap<&'static str, &'static str>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Registry with postgres, mysql and redis.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PostgresAdapter));
        registry.register(Arc::new(MySqlAdapter));
        registry.register(Arc::new(RedisAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn DatabaseAdapter>) {
        let name = adapter.name();
        for alias in adapter.aliases() {
            self.aliases.insert(*alias, name);
        }
        self.aliases.insert(name, name);
        self.adapters.insert(name, adapter);
    }

    pub fn resolve(&self, name_or_alias: &str) -> Result<Arc<dyn DatabaseAdapter>> {
        let canonical = self.normalize(name_or_alias)?;
        self.adapters
            .get(canonical)
            .cloned()
            .ok_or_else(|| unknown_type(name_or_alias))
    }

    pub fn normalize(&self, name_or_alias: &str) -> Result<&'static str> {
        let key = name_or_alias.trim().to_lowercase();
        self.aliases
            .get(key.as_str())
            .copied()
            .ok_or_else(|| unknown_type(name_or_alias))
    }

    /// Canonical names, sorted
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.adapters.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Alias to canonical name, including each canonical name mapping to itself
    pub fn aliases(&self) -> BTreeMap<&'static str, &'static str> {
        self.aliases.iter().map(|(k, v)| (*k, *v)).collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn unknown_type(name: &str) -> Error {
    Error::NotFound(format!("tipo de banco desconhecido: '{}'", name.trim()))
}
