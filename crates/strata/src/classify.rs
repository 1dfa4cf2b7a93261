//! Test-type classification of raw files by filename.
//!
//! Rules are matched against the file name only, case-insensitively, in
//! configuration order. A pattern without glob metacharacters matches as a
//! substring. Files matching no rule get the unfiltered sentinel.

use crate::error::{Result, StrataError};
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::path::Path;
use strata_db::UNFILTERED_TEST_TYPE;

/// Filename pattern → test type mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTypeRule {
    pub pattern: String,
    pub test_type: String,
}

#[derive(Clone)]
struct CompiledRule {
    test_type: String,
    matcher: GlobMatcher,
}

/// Compiled, validated set of test-type rules.
#[derive(Clone, Default)]
pub struct TestTypeClassifier {
    rules: Vec<CompiledRule>,
}

fn has_glob_syntax(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

impl TestTypeClassifier {
    /// Compile rules, rejecting invalid globs, empty test types and rules
    /// that would assign the unfiltered sentinel explicitly.
    pub fn new(rules: &[TestTypeRule]) -> Result<Self> {
        let compiled = rules
            .iter()
            .map(|rule| {
                let pattern = rule.pattern.trim();
                let test_type = rule.test_type.trim();
                if pattern.is_empty() {
                    return Err(StrataError::Pattern(format!(
                        "empty pattern for test type '{}'",
                        test_type
                    )));
                }
                if test_type.is_empty() {
                    return Err(StrataError::Pattern(format!(
                        "pattern '{}' has an empty test type",
                        pattern
                    )));
                }
                if test_type == UNFILTERED_TEST_TYPE {
                    return Err(StrataError::Pattern(format!(
                        "pattern '{}' maps to reserved test type '{}'",
                        pattern, UNFILTERED_TEST_TYPE
                    )));
                }

                let glob = if has_glob_syntax(pattern) {
                    pattern.to_string()
                } else {
                    format!("*{}*", pattern)
                };
                let matcher = GlobBuilder::new(&glob)
                    .case_insensitive(true)
                    .literal_separator(false)
                    .build()
                    .map_err(|e| StrataError::Pattern(format!("{}: {}", pattern, e)))?
                    .compile_matcher();

                Ok(CompiledRule {
                    test_type: test_type.to_string(),
                    matcher,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules: compiled })
    }

    /// Test type for a raw file, or `"None"` when no rule matches.
    pub fn classify(&self, path: &Path) -> &str {
        let Some(name) = path.file_name() else {
            return UNFILTERED_TEST_TYPE;
        };
        self.rules
            .iter()
            .find(|rule| rule.matcher.is_match(name))
            .map(|rule| rule.test_type.as_str())
            .unwrap_or(UNFILTERED_TEST_TYPE)
    }

    /// Distinct test types in rule order.
    pub fn test_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if !types.contains(&rule.test_type.as_str()) {
                types.push(rule.test_type.as_str());
            }
        }
        types
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> Vec<TestTypeRule> {
        pairs
            .iter()
            .map(|(pattern, test_type)| TestTypeRule {
                pattern: pattern.to_string(),
                test_type: test_type.to_string(),
            })
            .collect()
    }

    #[test]
    fn substring_patterns_match_case_insensitively() {
        let classifier =
            TestTypeClassifier::new(&rules(&[("stability", "Stability"), ("final", "Final")]))
                .unwrap();

        assert_eq!(classifier.classify(Path::new("/d/SN1_Stability_01.csv")), "Stability");
        assert_eq!(classifier.classify(Path::new("FINAL-report.csv")), "Final");
        assert_eq!(classifier.classify(Path::new("run1.csv")), "None");
    }

    #[test]
    fn only_the_file_name_is_matched() {
        let classifier = TestTypeClassifier::new(&rules(&[("final", "Final")])).unwrap();
        assert_eq!(classifier.classify(Path::new("/final/run1.csv")), "None");
    }

    #[test]
    fn first_matching_rule_wins() {
        let classifier = TestTypeClassifier::new(&rules(&[
            ("*_final_stability*", "Final"),
            ("stability", "Stability"),
        ]))
        .unwrap();

        assert_eq!(classifier.classify(Path::new("a_final_stability.csv")), "Final");
        assert_eq!(classifier.classify(Path::new("stability.csv")), "Stability");
        assert_eq!(classifier.test_types(), vec!["Final", "Stability"]);
    }

    #[test]
    fn invalid_rules_are_rejected() {
        assert!(TestTypeClassifier::new(&rules(&[("[bad", "Final")])).is_err());
        assert!(TestTypeClassifier::new(&rules(&[("", "Final")])).is_err());
        assert!(TestTypeClassifier::new(&rules(&[("final", " ")])).is_err());
        assert!(TestTypeClassifier::new(&rules(&[("final", "None")])).is_err());
    }

    #[test]
    fn empty_classifier_leaves_everything_unfiltered() {
        let classifier = TestTypeClassifier::default();
        assert!(classifier.is_empty());
        assert_eq!(classifier.classify(Path::new("stability.csv")), "None");
    }
}
