//! Store verification module
//!
//! Recomputes everything the store keeps incrementally and compares it with
//! the stored values. Used after loading a database and by hosts that want
//! a health check before rendering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{ClassId, ContextId, NumberSet};
use crate::schema::UNRESOLVED_SCORE;
use crate::store::SymbolStore;
use crate::symbols::ending_symbol;

/// Report of store verification results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Class or context rows whose count differs from the actual number of users
    pub reference_counts: Vec<String>,
    /// Used ID sets that do not match the live rows
    pub id_sets: Vec<String>,
    /// Topics or links whose ending symbols are not derived from their text
    pub ending_symbols: Vec<String>,
    /// IDs pointing at rows that do not exist
    pub dangling: Vec<String>,
    /// Secondary indexes or scores out of step with the tables
    pub indexes: Vec<String>,
}

impl VerifyReport {
    /// Total number of issues found
    pub fn total_issues(&self) -> usize {
        self.reference_counts.len()
            + self.id_sets.len()
            + self.ending_symbols.len()
            + self.dangling.len()
            + self.indexes.len()
    }

    /// Check if verification is clean (no issues)
    pub fn is_clean(&self) -> bool {
        self.total_issues() == 0
    }

    /// One line naming the first few issues.
    pub fn summary(&self) -> String {
        let issues: Vec<&str> = self
            .reference_counts
            .iter()
            .chain(&self.id_sets)
            .chain(&self.ending_symbols)
            .chain(&self.dangling)
            .chain(&self.indexes)
            .map(String::as_str)
            .collect();
        let shown = issues.iter().take(3).copied().collect::<Vec<_>>().join("; ");
        if issues.len() > 3 {
            format!("{} issues: {}; ...", issues.len(), shown)
        } else {
            format!("{} issues: {}", issues.len(), shown)
        }
    }
}

/// Verify every derived value in `store`
///
/// # Returns
/// VerifyReport with any discrepancies found, each list sorted
pub fn verify_store(store: &SymbolStore) -> VerifyReport {
    let mut report = VerifyReport::default();

    let mut class_users: BTreeMap<ClassId, u32> = BTreeMap::new();
    let mut context_users: BTreeMap<ContextId, u32> = BTreeMap::new();

    for topic in store.topics.values() {
        if !store.files.contains(&topic.file_id) {
            report
                .dangling
                .push(format!("topic {} in unregistered file {}", topic.id, topic.file_id));
        }
        if let Some(class_id) = topic.class_id {
            *class_users.entry(class_id).or_default() += 1;
            if !store.classes.contains(class_id) {
                report
                    .dangling
                    .push(format!("topic {} points at missing class {}", topic.id, class_id));
            }
        }
        for context_id in [topic.prototype_context_id, topic.body_context_id] {
            *context_users.entry(context_id).or_default() += 1;
            if !store.contexts.contains(context_id) {
                report
                    .dangling
                    .push(format!("topic {} points at missing context {}", topic.id, context_id));
            }
        }

        let expected = ending_symbol(&topic.symbol, store.is_case_sensitive(topic.language_id));
        if topic.ending_symbol != expected {
            report.ending_symbols.push(format!(
                "topic {} has ending symbol {:?}, expected {:?}",
                topic.id, topic.ending_symbol, expected
            ));
        }
    }

    for link in store.links.values() {
        if !store.files.contains(&link.file_id) {
            report
                .dangling
                .push(format!("link {} in unregistered file {}", link.id, link.file_id));
        }
        *context_users.entry(link.context_id).or_default() += 1;
        if !store.contexts.contains(link.context_id) {
            report
                .dangling
                .push(format!("link {} points at missing context {}", link.id, link.context_id));
        }

        match link.target_topic_id {
            Some(target) => {
                if !store.topics.contains_key(&target) {
                    report
                        .dangling
                        .push(format!("link {} targets missing topic {}", link.id, target));
                }
                if !store.links_by_target.get(&target).any(|id| id == link.id) {
                    report
                        .indexes
                        .push(format!("link {} missing from target index", link.id));
                }
                if link.target_score <= UNRESOLVED_SCORE {
                    report
                        .indexes
                        .push(format!("resolved link {} has no score", link.id));
                }
            }
            None => {
                if link.target_score != UNRESOLVED_SCORE {
                    report
                        .indexes
                        .push(format!("unresolved link {} has score {}", link.id, link.target_score));
                }
            }
        }

        let (primary, alternates) =
            store.link_endings(&link.text_or_symbol, link.link_type, link.language_id);
        if link.ending_symbol != primary || link.alternate_ending_symbols != alternates {
            report.ending_symbols.push(format!(
                "link {} has ending symbols {:?} {:?}, expected {:?} {:?}",
                link.id, link.ending_symbol, link.alternate_ending_symbols, primary, alternates
            ));
        }
    }

    for (id, row) in store.classes.iter() {
        let users = class_users.get(&id).copied().unwrap_or(0);
        if row.reference_count != users {
            report.reference_counts.push(format!(
                "class {} has count {} but {} users",
                id, row.reference_count, users
            ));
        }
    }
    for (id, row) in store.contexts.iter() {
        let users = context_users.get(&id).copied().unwrap_or(0);
        if row.reference_count != users {
            report.reference_counts.push(format!(
                "context {} has count {} but {} users",
                id, row.reference_count, users
            ));
        }
    }

    let topic_ids = NumberSet::from_members(store.topics.keys().copied());
    if topic_ids != store.used_topic_ids {
        report.id_sets.push(format!(
            "used topic IDs {:?} but rows {:?}",
            store.used_topic_ids.to_string(),
            topic_ids.to_string()
        ));
    }
    let link_ids = NumberSet::from_members(store.links.keys().copied());
    if link_ids != store.used_link_ids {
        report.id_sets.push(format!(
            "used link IDs {:?} but rows {:?}",
            store.used_link_ids.to_string(),
            link_ids.to_string()
        ));
    }

    if store.topic_keys.len() != store.topics.len() {
        report.indexes.push(format!(
            "{} topic identities for {} topics",
            store.topic_keys.len(),
            store.topics.len()
        ));
    }
    if store.link_keys.len() != store.links.len() {
        report.indexes.push(format!(
            "{} link identities for {} links",
            store.link_keys.len(),
            store.links.len()
        ));
    }

    report.reference_counts.sort();
    report.id_sets.sort();
    report.ending_symbols.sort();
    report.dangling.sort();
    report.indexes.sort();
    report
}

impl SymbolStore {
    pub fn verify(&self) -> VerifyReport {
        verify_store(self)
    }
}
