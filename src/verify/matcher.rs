// src/verify/matcher.rs

//! Acceptance-criteria matching.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;

use crate::verify::{AcceptanceCriterion, CriterionResult};

/// Decides, per criterion, whether the changed artifacts satisfy it.
///
/// Implementations must return exactly one result per criterion, in input
/// order.
pub trait CriteriaMatcher: Send + Sync {
    fn match_criteria(
        &self,
        criteria: &[AcceptanceCriterion],
        changed_files: &[String],
    ) -> Vec<CriterionResult>;
}

/// Default matcher: a criterion is satisfied when any changed file matches
/// any of its glob patterns.
///
/// A criterion without patterns is satisfied by any change at all. A
/// criterion with an invalid pattern is never satisfied.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobMatcher;

impl CriteriaMatcher for GlobMatcher {
    fn match_criteria(
        &self,
        criteria: &[AcceptanceCriterion],
        changed_files: &[String],
    ) -> Vec<CriterionResult> {
        criteria
            .iter()
            .map(|criterion| match_one(criterion, changed_files))
            .collect()
    }
}

fn match_one(criterion: &AcceptanceCriterion, changed_files: &[String]) -> CriterionResult {
    if criterion.patterns.is_empty() {
        return CriterionResult {
            criterion_id: criterion.id.clone(),
            satisfied: !changed_files.is_empty(),
            matched_files: changed_files.to_vec(),
        };
    }

    let set = match build_globset(&criterion.patterns) {
        Ok(set) => set,
        Err(err) => {
            warn!(criterion = %criterion.id, error = %err, "unusable acceptance pattern");
            return CriterionResult {
                criterion_id: criterion.id.clone(),
                satisfied: false,
                matched_files: Vec::new(),
            };
        }
    };

    let matched_files: Vec<String> = changed_files
        .iter()
        .filter(|path| set.is_match(normalize(path)))
        .cloned()
        .collect();

    CriterionResult {
        criterion_id: criterion.id.clone(),
        satisfied: !matched_files.is_empty(),
        matched_files,
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
