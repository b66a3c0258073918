//! Link resolution
//!
//! Matches each link against the topics sharing one of its ending symbols
//! and keeps the best legal candidate.
//!
//! # Legality
//!
//! A topic is a legal target when one reading of the link text, qualified
//! through the link's context (as written, then enclosing scopes, then
//! using statements), equals the topic's symbol under the topic language's
//! case rule. Class-parent links additionally require a topic that defines
//! a class. Image, URL and email links never resolve.
//!
//! # Ranking
//!
//! See [`score`]: exact reading, same file, same class, same language,
//! lower definition number, and finally the lowest topic ID.
//!
//! # Incremental passes
//!
//! [`LinkResolver::resolve_pending`] drains the store's change tracker and
//! resolves only the links that could have changed. Passes check a
//! [`CancelFlag`] between links; a cancelled pass leaves every processed
//! link consistent and queues the rest for the next pass.

pub mod interpret;
pub mod score;

use std::cmp::Reverse;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::error::{EntityKind, StoreError, StoreResult};
use crate::ids::{LinkId, TopicId};
use crate::schema::{Link, LinkType, Topic, UNRESOLVED_SCORE};
use crate::shared::CancelFlag;
use crate::store::SymbolStore;
use crate::symbols::{fold_ending, symbols_equal, Context};

use interpret::{interpretations, Interpretation};
use score::Score;

/// Summary of one resolve pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveReport {
    /// Links actually resolved in this pass
    pub examined: usize,
    /// Links whose target changed
    pub changed: Vec<LinkId>,
    pub resolved: usize,
    pub unresolved: usize,
    /// Links left for a later pass because of cancellation
    pub pending: Vec<LinkId>,
    pub cancelled: bool,
}

impl ResolveReport {
    pub fn is_complete(&self) -> bool {
        !self.cancelled
    }
}

#[derive(Debug, Clone)]
pub struct LinkResolver {
    cancel: CancelFlag,
    check_interval: usize,
}

impl Default for LinkResolver {
    fn default() -> Self {
        Self::new(CancelFlag::new())
    }
}

impl LinkResolver {
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            cancel,
            check_interval: 1,
        }
    }

    pub fn for_config(config: &StoreConfig, cancel: CancelFlag) -> Self {
        Self::new(cancel).with_check_interval(config.cancel_check_interval)
    }

    /// Check the cancel flag every `interval` links (0 is treated as 1).
    pub fn with_check_interval(mut self, interval: usize) -> Self {
        self.check_interval = interval.max(1);
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Best legal target for `link` and its packed score, without writing.
    pub fn best_target(&self, store: &SymbolStore, link: &Link) -> StoreResult<Option<(TopicId, i64)>> {
        if !link.link_type.resolves_to_topics() {
            return Ok(None);
        }
        let context = store
            .context_value(link.context_id)
            .ok_or_else(|| StoreError::reference(EntityKind::Context, link.context_id))?;
        let readings = interpretations(&link.text_or_symbol, link.link_type);

        let candidates: BTreeSet<TopicId> = link
            .all_ending_symbols()
            .map(fold_ending)
            .flat_map(|ending| store.topics_by_ending.get(ending.as_str()).collect::<Vec<_>>())
            .collect();

        let mut best: Option<(i64, Reverse<TopicId>)> = None;
        for topic_id in candidates {
            let Some(topic) = store.topic(topic_id) else {
                continue;
            };
            let Some(score) = score_candidate(store, link, context, &readings, topic) else {
                continue;
            };
            let rank = (score.to_i64(), Reverse(topic_id));
            if best.map_or(true, |current| rank > current) {
                best = Some(rank);
            }
        }

        Ok(best.map(|(score, Reverse(topic_id))| (topic_id, score)))
    }

    /// Recompute and store the target of one link.
    ///
    /// Returns whether the stored target changed. A link with no legal
    /// candidate ends up unresolved; that is not an error.
    pub fn resolve(&self, store: &mut SymbolStore, link_id: LinkId) -> StoreResult<bool> {
        let link = store
            .link(link_id)
            .ok_or_else(|| StoreError::reference(EntityKind::Link, link_id))?;
        let (target, score) = match self.best_target(store, link)? {
            Some((topic_id, score)) => (Some(topic_id), score),
            None => (None, UNRESOLVED_SCORE),
        };
        store.set_link_target(link_id, target, score)
    }

    /// Resolve the given links in ascending ID order.
    ///
    /// Links that no longer exist are skipped. On cancellation the
    /// unprocessed links are returned in the report and queued in the
    /// store's change tracker.
    pub fn resolve_links<I>(&self, store: &mut SymbolStore, ids: I) -> StoreResult<ResolveReport>
    where
        I: IntoIterator<Item = LinkId>,
    {
        let ids: Vec<LinkId> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut report = ResolveReport::default();

        for (i, &id) in ids.iter().enumerate() {
            if i % self.check_interval == 0 && self.cancel.is_cancelled() {
                report.cancelled = true;
                report.pending = ids[i..].to_vec();
                store.note_links_pending(report.pending.iter().copied());
                tracing::warn!(
                    processed = i,
                    pending = report.pending.len(),
                    "resolve pass cancelled"
                );
                break;
            }
            if store.link(id).is_none() {
                continue;
            }
            report.examined += 1;
            if self.resolve(store, id)? {
                report.changed.push(id);
            }
            if store.link(id).is_some_and(Link::is_resolved) {
                report.resolved += 1;
            } else {
                report.unresolved += 1;
            }
        }

        tracing::info!(
            examined = report.examined,
            changed = report.changed.len(),
            unresolved = report.unresolved,
            cancelled = report.cancelled,
            "resolve pass finished"
        );
        Ok(report)
    }

    /// Resolve every link that shares an ending symbol with the given
    /// topics, plus the given links themselves.
    ///
    /// Topics that were already removed still count through the ending
    /// symbols the change tracker recorded for them.
    pub fn resolve_affected(
        &self,
        store: &mut SymbolStore,
        changed_topic_ids: &BTreeSet<TopicId>,
        changed_link_ids: &BTreeSet<LinkId>,
    ) -> StoreResult<ResolveReport> {
        let mut endings: BTreeSet<String> = BTreeSet::new();
        for &id in changed_topic_ids {
            if let Some(topic) = store.topic(id) {
                if !topic.ending_symbol.is_empty() {
                    endings.insert(fold_ending(&topic.ending_symbol));
                }
            }
            endings.extend(store.changes().endings_of(id).map(str::to_string));
        }

        let mut affected: BTreeSet<LinkId> = endings
            .iter()
            .flat_map(|ending| store.links_by_ending.get(ending.as_str()))
            .collect();
        affected.extend(
            changed_link_ids
                .iter()
                .copied()
                .filter(|&id| store.link(id).is_some()),
        );
        self.resolve_links(store, affected)
    }

    /// Drain the store's change tracker and resolve what it implies.
    pub fn resolve_pending(&self, store: &mut SymbolStore) -> StoreResult<ResolveReport> {
        let mut tracker = store.take_changes();
        let affected = tracker.affected_links(store);
        tracing::debug!(links = affected.len(), "resolving pending changes");
        self.resolve_links(store, affected)
    }

    /// Re-resolve every link in the store.
    pub fn resolve_all(&self, store: &mut SymbolStore) -> StoreResult<ResolveReport> {
        store.take_changes();
        let all: Vec<LinkId> = store.links().map(|link| link.id).collect();
        self.resolve_links(store, all)
    }
}

/// Score of `topic` as a target for `link`, or `None` if it is not legal.
fn score_candidate(
    store: &SymbolStore,
    link: &Link,
    context: &Context,
    readings: &[Interpretation],
    topic: &Topic,
) -> Option<Score> {
    let case_sensitive = store.is_case_sensitive(topic.language_id);
    let class_symbol = store.class_symbol(topic.class_id);

    if link.link_type == LinkType::ClassParent {
        let defines_class =
            class_symbol.is_some_and(|class| symbols_equal(class, &topic.symbol, case_sensitive));
        if !defines_class {
            return None;
        }
    }

    let exact = matching_reading(context, readings, topic, case_sensitive)?;
    let same_class = match (class_symbol, context.scope.as_deref()) {
        (Some(class), Some(scope)) => symbols_equal(class, scope, case_sensitive),
        _ => false,
    };

    Some(Score {
        exact,
        same_file: topic.file_id == link.file_id,
        same_class,
        same_language: topic.language_id == link.language_id,
        definition_number: topic.symbol_definition_number,
    })
}

/// `Some(true)` if the text as written reaches the topic, `Some(false)` if
/// only an alternate reading does.
fn matching_reading(
    context: &Context,
    readings: &[Interpretation],
    topic: &Topic,
    case_sensitive: bool,
) -> Option<bool> {
    let mut found = None;
    for reading in readings {
        let hit = context
            .qualified_candidates(&reading.text, case_sensitive)
            .iter()
            .any(|candidate| symbols_equal(candidate, &topic.symbol, case_sensitive));
        if hit {
            if reading.exact {
                return Some(true);
            }
            found = Some(false);
        }
    }
    found
}
