//! Rule and history persistence.
//!
//! The engine only depends on the [`AlertRuleRepository`] trait. The
//! [`InMemoryRuleRepository`] is a complete reference implementation used
//! by the daemon and by tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{AlertError, Result};
use crate::types::{AlertHistory, AlertRule, HistoryId, RuleId};

/// Storage for alert rules and fire history.
#[async_trait]
pub trait AlertRuleRepository: Send + Sync {
    /// Returns every enabled rule.
    async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>>;

    /// Returns every rule, enabled or not.
    async fn list_rules(&self) -> Result<Vec<AlertRule>>;

    /// Stores a new rule and returns it with its assigned ID.
    async fn create_rule(&self, rule: AlertRule) -> Result<AlertRule>;

    /// Stores a history record and returns its assigned ID.
    async fn save_history(&self, history: AlertHistory) -> Result<HistoryId>;

    /// Deletes history fired before `cutoff`, returning the number removed.
    async fn delete_history_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Pagination and filtering for history listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Only records for this rule.
    pub rule_id: Option<RuleId>,
    /// Maximum records to return. `None` returns all.
    pub limit: Option<usize>,
    /// Records to skip.
    pub offset: usize,
}

impl HistoryQuery {
    /// Restricts the listing to one rule.
    #[must_use]
    pub const fn for_rule(mut self, rule_id: RuleId) -> Self {
        self.rule_id = Some(rule_id);
        self
    }

    /// Sets the page.
    #[must_use]
    pub const fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

#[derive(Debug, Default)]
struct Store {
    rules: BTreeMap<RuleId, AlertRule>,
    history: Vec<AlertHistory>,
    next_rule_id: u64,
    next_history_id: u64,
}

/// Process-local rule and history storage.
#[derive(Debug, Default)]
pub struct InMemoryRuleRepository {
    store: RwLock<Store>,
}

impl InMemoryRuleRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rule with the given ID.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::RuleNotFound` if no such rule exists.
    pub fn get_rule(&self, id: RuleId) -> Result<AlertRule> {
        self.store
            .read()
            .rules
            .get(&id)
            .cloned()
            .ok_or(AlertError::RuleNotFound { id: id.0 })
    }

    /// Replaces a stored rule. The rule's `id` selects which one.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if the rule fails validation, or
    /// `AlertError::RuleNotFound` if no rule has that ID.
    pub fn update_rule(&self, rule: AlertRule) -> Result<()> {
        rule.validate()?;
        let mut store = self.store.write();
        let slot = store
            .rules
            .get_mut(&rule.id)
            .ok_or(AlertError::RuleNotFound { id: rule.id.0 })?;
        *slot = rule;
        Ok(())
    }

    /// Deletes a rule along with its history.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::RuleNotFound` if no such rule exists.
    pub fn delete_rule(&self, id: RuleId) -> Result<AlertRule> {
        let mut store = self.store.write();
        let rule = store
            .rules
            .remove(&id)
            .ok_or(AlertError::RuleNotFound { id: id.0 })?;
        store.history.retain(|h| h.rule_id != id);
        Ok(rule)
    }

    /// Enables or disables a rule.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::RuleNotFound` if no such rule exists.
    pub fn toggle_rule(&self, id: RuleId, enabled: bool) -> Result<()> {
        let mut store = self.store.write();
        let rule = store
            .rules
            .get_mut(&id)
            .ok_or(AlertError::RuleNotFound { id: id.0 })?;
        rule.enabled = enabled;
        Ok(())
    }

    /// Returns history, newest first.
    #[must_use]
    pub fn list_history(&self, query: HistoryQuery) -> Vec<AlertHistory> {
        let store = self.store.read();
        let matching = store
            .history
            .iter()
            .rev()
            .filter(|h| query.rule_id.is_none_or(|id| h.rule_id == id))
            .skip(query.offset);

        match query.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }

    /// Returns the number of history records matching the rule filter.
    #[must_use]
    pub fn count_history(&self, rule_id: Option<RuleId>) -> usize {
        self.store
            .read()
            .history
            .iter()
            .filter(|h| rule_id.is_none_or(|id| h.rule_id == id))
            .count()
    }

    /// Deletes all history, returning the number removed.
    pub fn clear_history(&self) -> u64 {
        let mut store = self.store.write();
        let removed = store.history.len() as u64;
        store.history.clear();
        removed
    }

    /// Returns the number of stored rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.store.read().rules.len()
    }
}

#[async_trait]
impl AlertRuleRepository for InMemoryRuleRepository {
    async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self
            .store
            .read()
            .rules
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }

    async fn list_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self.store.read().rules.values().cloned().collect())
    }

    async fn create_rule(&self, mut rule: AlertRule) -> Result<AlertRule> {
        rule.validate()?;
        let mut store = self.store.write();
        store.next_rule_id += 1;
        rule.id = RuleId(store.next_rule_id);
        store.rules.insert(rule.id, rule.clone());
        debug!(rule_id = %rule.id, rule = %rule.name, "rule created");
        Ok(rule)
    }

    async fn save_history(&self, mut history: AlertHistory) -> Result<HistoryId> {
        let mut store = self.store.write();
        store.next_history_id += 1;
        history.id = HistoryId(store.next_history_id);
        let id = history.id;
        store.history.push(history);
        Ok(id)
    }

    async fn delete_history_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut store = self.store.write();
        let before = store.history.len();
        store.history.retain(|h| h.fired_at >= cutoff);
        Ok((before - store.history.len()) as u64)
    }
}
