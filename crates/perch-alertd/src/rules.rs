//! Rule import and export.
//!
//! A rules file is a JSON array of rules in the same shape the library
//! serializes them, so `perch-alertd default-rules` output can be edited and
//! fed back in through `rules_file`.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use perch_alerts::{AlertRule, AlertRuleRepository, default_rules};

use crate::error::{DaemonError, Result};

/// Reads a JSON array of rules from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a rule array.
pub fn read_rules_file(path: impl AsRef<Path>) -> Result<Vec<AlertRule>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        DaemonError::RulesFile(format!("failed to read '{}': {}", path.display(), e))
    })?;
    parse_rules(&content)
}

/// Parses a JSON array of rules.
///
/// # Errors
///
/// Returns an error if the JSON is not a rule array.
pub fn parse_rules(content: &str) -> Result<Vec<AlertRule>> {
    serde_json::from_str(content).map_err(|e| DaemonError::RulesFile(format!("invalid JSON: {e}")))
}

/// Creates every rule whose name is not already stored.
///
/// Importing before the built-in rules are seeded lets a rules file replace
/// a default rule of the same name. Returns the number of rules created.
///
/// # Errors
///
/// Returns the first repository error, including validation failures.
pub async fn import_rules(repo: &dyn AlertRuleRepository, rules: Vec<AlertRule>) -> Result<usize> {
    let mut existing: HashSet<String> = repo
        .list_rules()
        .await?
        .into_iter()
        .map(|rule| rule.name)
        .collect();

    let mut created = 0;
    for rule in rules {
        if !existing.insert(rule.name.clone()) {
            warn!(rule = %rule.name, "rule already exists, skipping");
            continue;
        }
        repo.create_rule(rule).await?;
        created += 1;
    }

    info!(created, "imported alert rules");
    Ok(created)
}

/// Renders the built-in rules as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_default_rules() -> Result<String> {
    serde_json::to_string_pretty(&default_rules())
        .map_err(|e| DaemonError::RulesFile(format!("failed to serialize rules: {e}")))
}
