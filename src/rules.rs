// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Rule matching: resolve a version string to the single applicable
//! retention rule.
//!
//! Versions are lower-cased and tested against every configured pattern
//! anchored at the start of the string. When several patterns match, the one
//! with the longest pattern string wins (most specific); ties keep the
//! earliest rule in configuration order. A version no pattern matches falls
//! back to the ruleset's no-match rule.

use regex::Regex;

use crate::model::RetentionRule;

#[derive(Debug, Clone)]
struct CompiledRule {
    regex: Regex,
    rule: RetentionRule,
}

/// The full rule configuration for one evaluation run.
///
/// The no-match fallback is carried as a value here rather than as a
/// module-level default, so every run gets exactly the fallback its
/// configuration asked for.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    no_match: RetentionRule,
    max_retention_days: Option<i64>,
}

impl RuleSet {
    pub fn new(no_match: RetentionRule, max_retention_days: Option<i64>) -> Self {
        Self {
            rules: Vec::new(),
            no_match,
            max_retention_days,
        }
    }

    /// Compile and append a pattern rule. Order of insertion is the
    /// tie-break order for equally long patterns.
    pub fn add_rule(
        &mut self,
        pattern: &str,
        retention_days: Option<i64>,
        reserved: Option<usize>,
        min_days_since_last_download: Option<i64>,
    ) -> Result<(), regex::Error> {
        let regex = Regex::new(pattern)?;
        self.rules.push(CompiledRule {
            regex,
            rule: RetentionRule {
                pattern: pattern.to_string(),
                retention_days,
                reserved,
                min_days_since_last_download,
            },
        });
        Ok(())
    }

    /// Global override: artifacts older than this are deleted regardless of
    /// reservation. Evaluated config-wide, not per rule.
    pub fn max_retention_days(&self) -> Option<i64> {
        self.max_retention_days
    }

    /// Resolve the applicable rule for a version string. Never fails.
    pub fn match_version(&self, version: &str) -> &RetentionRule {
        let lowered = version.to_lowercase();
        let mut best: Option<&CompiledRule> = None;

        for candidate in &self.rules {
            if !matches_at_start(&candidate.regex, &lowered) {
                continue;
            }

            // Strictly-greater keeps the first rule on equal lengths.
            let is_better = best
                .map(|current| candidate.rule.pattern.len() > current.rule.pattern.len())
                .unwrap_or(true);
            if is_better {
                best = Some(candidate);
            }
        }

        best.map(|compiled| &compiled.rule).unwrap_or(&self.no_match)
    }
}

/// Anchored-at-start matching: the pattern must match a prefix of the
/// version, not the full string.
fn matches_at_start(regex: &Regex, text: &str) -> bool {
    regex.find(text).map(|found| found.start() == 0).unwrap_or(false)
}
