//! Component selector matching and the workload label index

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::crd::{ComponentSelector, SelectorOperator, SelectorRequirement};
use crate::policy::ObjectKey;

impl ComponentSelector {
    /// Whether a label set satisfies every requirement of the selector
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
            && self
                .match_expressions
                .iter()
                .all(|req| req.matches(labels))
    }
}

impl SelectorRequirement {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            SelectorOperator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
        }
    }
}

/// Inverted index from `key=value` to workloads, for policy fan-out
#[derive(Debug, Default)]
pub struct LabelIndex {
    by_label: HashMap<(String, String), BTreeSet<ObjectKey>>,
    labels: HashMap<ObjectKey, BTreeMap<String, String>>,
}

impl LabelIndex {
    pub fn build<I>(workloads: I) -> Self
    where
        I: IntoIterator<Item = (ObjectKey, BTreeMap<String, String>)>,
    {
        let mut index = Self::default();
        for (key, labels) in workloads {
            index.insert(key, labels);
        }
        index
    }

    pub fn insert(&mut self, key: ObjectKey, labels: BTreeMap<String, String>) {
        for (k, v) in &labels {
            self.by_label
                .entry((k.clone(), v.clone()))
                .or_default()
                .insert(key.clone());
        }
        self.labels.insert(key, labels);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Workloads matched by `selector`
    ///
    /// Exact-match labels narrow the candidate set through the index; set
    /// expressions are then checked against each remaining candidate.
    pub fn select(&self, selector: &ComponentSelector) -> BTreeSet<ObjectKey> {
        let mut candidates: Option<BTreeSet<ObjectKey>> = None;
        for (k, v) in &selector.match_labels {
            let Some(keys) = self.by_label.get(&(k.clone(), v.clone())) else {
                return BTreeSet::new();
            };
            candidates = Some(match candidates {
                None => keys.clone(),
                Some(current) => current.intersection(keys).cloned().collect(),
            });
        }

        let candidates =
            candidates.unwrap_or_else(|| self.labels.keys().cloned().collect::<BTreeSet<_>>());

        candidates
            .into_iter()
            .filter(|key| {
                self.labels
                    .get(key)
                    .is_some_and(|labels| selector.matches(labels))
            })
            .collect()
    }
}
