//! GANTRY Context - Scoped Execution Contexts
//!
//! A versioned key-value store scoped to session, agent, global, or
//! temporary lifetimes. Supports dot-path access into nested maps, bounded
//! change history, diffing, and strategy-driven merging with scope
//! promotion. The request-scoped tenant context is a different thing and
//! lives in `gantry-engine`.

use chrono::Utc;
use gantry_core::{
    AgentId, ContextId, ContextScope, EntityIdType, MergeStrategy, SessionId, TenantId,
    Timestamp, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Change-history entries kept per context.
pub const MAX_CHANGE_HISTORY: usize = 100;

/// Default TTL for `temporary`-scoped contexts, in seconds.
pub const TEMPORARY_TTL_SECONDS: i64 = 3600;

// ============================================================================
// CHANGE HISTORY & DIFF
// ============================================================================

/// Record of a single context change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub changed_at: Timestamp,
    pub changed_by: Option<String>,
}

/// Difference between two contexts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextDiff {
    /// Keys present only in the other context
    pub added: Vec<(String, Value)>,
    /// Keys present in both with differing values: key -> (ours, theirs)
    pub modified: Vec<(String, Value, Value)>,
    /// Keys present only in this context
    pub deleted: Vec<(String, Value)>,
}

impl ContextDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn conflicting_keys(&self) -> Vec<String> {
        self.modified.iter().map(|(k, _, _)| k.clone()).collect()
    }
}

// ============================================================================
// EXECUTION CONTEXT
// ============================================================================

/// A versioned key-value execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub id: ContextId,
    pub tenant_id: TenantId,
    pub session_id: Option<SessionId>,
    pub agent_id: Option<AgentId>,
    pub scope: ContextScope,
    /// Nested JSON object; access via dot paths
    pub data: Value,
    /// Incremented by 1 on every set/delete
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub created_by: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub change_history: Vec<ContextChange>,
}

impl ExecutionContext {
    /// Create a context, enforcing the scope rules: `session` scope requires
    /// a session id and `agent` scope requires an agent id.
    pub fn new(
        tenant_id: TenantId,
        scope: ContextScope,
        session_id: Option<SessionId>,
        agent_id: Option<AgentId>,
    ) -> Result<Self, ValidationError> {
        match scope {
            ContextScope::Session if session_id.is_none() => {
                return Err(ValidationError::RequiredFieldMissing {
                    field: "session_id".into(),
                });
            }
            ContextScope::Agent if agent_id.is_none() => {
                return Err(ValidationError::RequiredFieldMissing {
                    field: "agent_id".into(),
                });
            }
            _ => {}
        }

        let now = Utc::now();
        Ok(Self {
            id: ContextId::now_v7(),
            tenant_id,
            session_id,
            agent_id,
            scope,
            data: Value::Object(Map::new()),
            version: 1,
            created_at: now,
            updated_at: now,
            created_by: None,
            metadata: Map::new(),
            change_history: Vec::new(),
        })
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = if data.is_object() {
            data
        } else {
            Value::Object(Map::new())
        };
        self
    }

    /// Get a value by dot path, e.g. `"build.target.os"`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut current = &self.data;
        for part in key.split('.') {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Whether a key resolves to a value.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Top-level keys.
    pub fn keys(&self) -> Vec<String> {
        self.data
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// All keys including nested ones, in dot-path form.
    pub fn all_keys(&self) -> Vec<String> {
        fn walk(value: &Value, prefix: &str, out: &mut Vec<String>) {
            if let Some(map) = value.as_object() {
                for (k, v) in map {
                    let full = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    out.push(full.clone());
                    walk(v, &full, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.data, "", &mut out);
        out
    }

    /// Set a value by dot path, creating intermediate objects as needed.
    /// Bumps the version and records the change.
    pub fn set(&mut self, key: &str, value: Value, changed_by: Option<&str>) {
        let old_value = self.get(key).cloned();

        let parts: Vec<&str> = key.split('.').collect();
        if !self.data.is_object() {
            self.data = Value::Object(Map::new());
        }
        let mut current = &mut self.data;
        for part in &parts[..parts.len() - 1] {
            let map = current
                .as_object_mut()
                .unwrap_or_else(|| unreachable!("parents are always objects"));
            let entry = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = entry;
        }
        if let Some(map) = current.as_object_mut() {
            map.insert(parts[parts.len() - 1].to_string(), value.clone());
        }

        self.record_change(key, old_value, Some(value), changed_by);
        self.bump_version();
    }

    /// Delete a value by dot path. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str, changed_by: Option<&str>) -> bool {
        let old_value = self.get(key).cloned();
        if old_value.is_none() {
            return false;
        }

        let parts: Vec<&str> = key.split('.').collect();
        let mut current = &mut self.data;
        for part in &parts[..parts.len() - 1] {
            let Some(next) = current.as_object_mut().and_then(|m| m.get_mut(*part)) else {
                return false;
            };
            current = next;
        }
        let removed = current
            .as_object_mut()
            .and_then(|m| m.remove(parts[parts.len() - 1]))
            .is_some();

        if removed {
            self.record_change(key, old_value, None, changed_by);
            self.bump_version();
        }
        removed
    }

    fn bump_version(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    fn record_change(
        &mut self,
        key: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
        changed_by: Option<&str>,
    ) {
        self.change_history.push(ContextChange {
            key: key.to_string(),
            old_value,
            new_value,
            changed_at: Utc::now(),
            changed_by: changed_by.map(str::to_string),
        });
        if self.change_history.len() > MAX_CHANGE_HISTORY {
            let excess = self.change_history.len() - MAX_CHANGE_HISTORY;
            self.change_history.drain(..excess);
        }
    }

    /// Most recent changes, newest last.
    pub fn recent_changes(&self, count: usize) -> &[ContextChange] {
        let start = self.change_history.len().saturating_sub(count);
        &self.change_history[start..]
    }

    /// Difference between this context and another.
    pub fn diff(&self, other: &ExecutionContext) -> ContextDiff {
        let mut diff = ContextDiff::default();
        let self_keys = self.all_keys();
        let other_keys = other.all_keys();

        for key in &other_keys {
            if !self_keys.contains(key) {
                if let Some(value) = other.get(key) {
                    // Skip interior nodes already represented by their leaves
                    if !value.is_object() || value.as_object().is_some_and(|m| m.is_empty()) {
                        diff.added.push((key.clone(), value.clone()));
                    }
                }
            }
        }
        for key in &self_keys {
            if !other_keys.contains(key) {
                if let Some(value) = self.get(key) {
                    if !value.is_object() || value.as_object().is_some_and(|m| m.is_empty()) {
                        diff.deleted.push((key.clone(), value.clone()));
                    }
                }
            }
        }
        for key in &self_keys {
            if other_keys.contains(key) {
                let (Some(ours), Some(theirs)) = (self.get(key), other.get(key)) else {
                    continue;
                };
                if ours != theirs && !ours.is_object() && !theirs.is_object() {
                    diff.modified
                        .push((key.clone(), ours.clone(), theirs.clone()));
                }
            }
        }
        diff
    }

    /// Deep copy with an optionally different scope.
    pub fn clone_as(&self, new_scope: Option<ContextScope>) -> ExecutionContext {
        let mut cloned = self.clone();
        cloned.id = ContextId::now_v7();
        cloned.scope = new_scope.unwrap_or(self.scope);
        cloned.version = 1;
        cloned.change_history.clear();
        cloned
            .metadata
            .insert("cloned_from".into(), Value::from(self.id.to_string()));
        cloned
    }

    /// Merge another context into a new one.
    ///
    /// Cross-tenant merges are rejected. The merged scope is the more
    /// permissive of the two. `Manual` records conflicting keys in the
    /// result metadata but still produces a merged value.
    pub fn merge(
        &self,
        other: &ExecutionContext,
        strategy: MergeStrategy,
    ) -> Result<ExecutionContext, ValidationError> {
        if self.tenant_id != other.tenant_id {
            return Err(ValidationError::InvalidValue {
                field: "tenant_id".into(),
                reason: "cannot merge contexts from different tenants".into(),
            });
        }

        let mut conflicts: Vec<String> = Vec::new();
        let data = match strategy {
            MergeStrategy::LastWriteWins | MergeStrategy::PreferSource => {
                deep_merge(&self.data, &other.data, true)
            }
            MergeStrategy::DeepMerge => deep_merge(&self.data, &other.data, false),
            MergeStrategy::PreferTarget => deep_merge(&other.data, &self.data, true),
            MergeStrategy::Manual => {
                conflicts = self.diff(other).conflicting_keys();
                deep_merge(&self.data, &other.data, true)
            }
        };

        let now = Utc::now();
        let mut metadata = Map::new();
        metadata.insert(
            "merged_from".into(),
            Value::from(vec![self.id.to_string(), other.id.to_string()]),
        );
        metadata.insert(
            "merge_strategy".into(),
            Value::from(strategy.as_db_str()),
        );
        metadata.insert(
            "conflicts".into(),
            Value::from(conflicts),
        );

        Ok(ExecutionContext {
            id: ContextId::now_v7(),
            tenant_id: self.tenant_id,
            session_id: self.session_id.or(other.session_id),
            agent_id: self.agent_id.or(other.agent_id),
            scope: self.scope.max(other.scope),
            data,
            version: 1,
            created_at: now,
            updated_at: now,
            created_by: None,
            metadata,
            change_history: Vec::new(),
        })
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Deserialize from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|e| ValidationError::InvalidValue {
            field: "context".into(),
            reason: e.to_string(),
        })
    }
}

/// Recursive object merge. `prefer_overlay` decides who wins on scalar
/// conflicts; nested objects always merge key-by-key.
fn deep_merge(base: &Value, overlay: &Value, prefer_overlay: bool) -> Value {
    match (base.as_object(), overlay.as_object()) {
        (Some(base_map), Some(overlay_map)) => {
            let mut result = base_map.clone();
            for (key, overlay_value) in overlay_map {
                match result.get(key) {
                    Some(base_value)
                        if base_value.is_object() && overlay_value.is_object() =>
                    {
                        result.insert(
                            key.clone(),
                            deep_merge(base_value, overlay_value, prefer_overlay),
                        );
                    }
                    Some(_) if !prefer_overlay => {}
                    _ => {
                        result.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
            Value::Object(result)
        }
        _ => {
            if prefer_overlay {
                overlay.clone()
            } else {
                base.clone()
            }
        }
    }
}
