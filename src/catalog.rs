use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use crate::engine::EngineError;
use crate::model::{RequesterId, UnitId, UnitInfo};

/// Existence and enumeration lookups the admission path depends on.
///
/// Implementations backed by a remote service report failures as
/// `EngineError::Storage`; the engine surfaces them without retrying.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn unit_exists(&self, unit_id: &str) -> Result<bool, EngineError>;

    async fn requester_exists(&self, requester_id: &str) -> Result<bool, EngineError>;

    async fn unit_ids(&self) -> Result<Vec<UnitId>, EngineError>;
}

/// Built-in catalog. Its contents are rebuilt from the WAL on startup; all
/// writes go through `Engine::register_unit` and friends so they are logged.
#[derive(Debug, Default)]
pub struct Registry {
    /// unit id → owner id
    units: DashMap<UnitId, String>,
    requesters: DashSet<RequesterId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&self, id: UnitId, owner_id: String) {
        self.units.insert(id, owner_id);
    }

    pub fn remove_unit(&self, id: &str) -> bool {
        self.units.remove(id).is_some()
    }

    pub fn add_requester(&self, id: RequesterId) {
        self.requesters.insert(id);
    }

    pub fn contains_unit(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    pub fn contains_requester(&self, id: &str) -> bool {
        self.requesters.contains(id)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn requester_count(&self) -> usize {
        self.requesters.len()
    }

    /// Units sorted by id.
    pub fn units(&self) -> Vec<UnitInfo> {
        let mut units: Vec<UnitInfo> = self
            .units
            .iter()
            .map(|e| UnitInfo {
                id: e.key().clone(),
                owner_id: e.value().clone(),
            })
            .collect();
        units.sort_by(|a, b| a.id.cmp(&b.id));
        units
    }

    pub fn requester_ids(&self) -> Vec<RequesterId> {
        let mut ids: Vec<RequesterId> = self.requesters.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Catalog for Registry {
    async fn unit_exists(&self, unit_id: &str) -> Result<bool, EngineError> {
        Ok(self.contains_unit(unit_id))
    }

    async fn requester_exists(&self, requester_id: &str) -> Result<bool, EngineError> {
        Ok(self.contains_requester(requester_id))
    }

    async fn unit_ids(&self) -> Result<Vec<UnitId>, EngineError> {
        Ok(self.units.iter().map(|e| e.key().clone()).collect())
    }
}
