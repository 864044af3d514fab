//! Scope and cache accumulation during lowering
//!
//! Builders share a single mutable accumulator per task while that task is
//! being lowered; once lowering completes the accumulator is drained into the
//! task definition and no cross-task shared mutable state remains.

use std::collections::BTreeSet;

use serde_json::{json, Value};

/// A cache mounted into the execution environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMount {
    /// Cache name; reserved families embed the runner content hash
    pub name: String,
    /// Mount path inside the execution image
    pub mount_point: String,
}

/// Per-task accumulator for scopes and cache mounts
#[derive(Debug, Default)]
pub struct CapabilityAccumulator {
    scopes: BTreeSet<String>,
    caches: Vec<CacheMount>,
}

impl CapabilityAccumulator {
    /// Fresh accumulator for one task
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a scope
    pub fn add_scope(&mut self, scope: impl Into<String>) {
        self.scopes.insert(scope.into());
    }

    /// Mount a cache, requiring its access scope as well
    pub fn add_cache(&mut self, cache: CacheMount) {
        self.add_scope(format!("cache:{}", cache.name));
        self.caches.push(cache);
    }

    /// Accumulated scopes, sorted for deterministic output
    pub fn scopes(&self) -> Vec<String> {
        self.scopes.iter().cloned().collect()
    }

    /// Accumulated cache mounts in declaration order
    pub fn caches(&self) -> &[CacheMount] {
        &self.caches
    }

    /// Cache mounts as payload JSON
    pub fn caches_json(&self) -> Vec<Value> {
        self.caches
            .iter()
            .map(|c| json!({"name": c.name, "mount-point": c.mount_point}))
            .collect()
    }
}
