//! Inclusion/exclusion filtering of candidate table names.
//!
//! A name is kept when it matches the inclusion pattern and none of the
//! exclusion patterns. Exclusions are checked in order and the first match is
//! recorded as the reason. Patterns without regex metacharacters are literal
//! names and must match exactly; everything else is a regular expression that
//! matches according to its own anchors.

use crate::{Result, error::SchemaSyncError};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One compiled name pattern, remembering its source text for diagnostics.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    /// Returns a configuration error if the expression does not compile.
    pub fn new(source: &str) -> Result<Self> {
        let expression = if is_literal(source) {
            format!("^{}$", regex::escape(source))
        } else {
            source.to_string()
        };

        let regex = Regex::new(&expression).map_err(|e| {
            SchemaSyncError::configuration(format!("Invalid pattern '{}': {}", source, e))
        })?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Pattern text as configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Tests a candidate name against the pattern.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_literal(source: &str) -> bool {
    !source.chars().any(|c| {
        matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        )
    })
}

/// A candidate dropped by an exclusion pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    /// Excluded name
    pub name: String,
    /// First exclusion pattern that matched
    pub pattern: String,
}

/// Result of applying a filter rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Names that passed, in input order
    pub kept: Vec<String>,
    /// Names that matched the inclusion pattern but were excluded
    pub excluded: Vec<Exclusion>,
}

/// Inclusion pattern plus ordered exclusion patterns.
#[derive(Debug, Clone)]
pub struct FilterRule {
    include: Pattern,
    excludes: Vec<Pattern>,
}

impl FilterRule {
    /// Compiles a filter rule.
    ///
    /// # Errors
    /// Returns a configuration error naming the first pattern that fails to compile.
    pub fn new<S: AsRef<str>>(include: &str, excludes: &[S]) -> Result<Self> {
        let include = Pattern::new(include)?;
        let excludes = excludes
            .iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { include, excludes })
    }

    /// The inclusion pattern.
    pub fn include(&self) -> &Pattern {
        &self.include
    }

    /// The exclusion patterns in evaluation order.
    pub fn excludes(&self) -> &[Pattern] {
        &self.excludes
    }

    /// First exclusion pattern matching `name`, if any.
    pub fn excluded_by(&self, name: &str) -> Option<&Pattern> {
        self.excludes.iter().find(|p| p.is_match(name))
    }

    /// Applies the rule, logging each exclusion decision.
    pub fn apply<S: AsRef<str>>(&self, candidates: &[S]) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();

        for candidate in candidates {
            let name = candidate.as_ref();
            if !self.include.is_match(name) {
                continue;
            }

            match self.excluded_by(name) {
                Some(pattern) => {
                    tracing::info!("    🚫 Excluded table: {} (pattern: {})", name, pattern);
                    outcome.excluded.push(Exclusion {
                        name: name.to_string(),
                        pattern: pattern.as_str().to_string(),
                    });
                }
                None => outcome.kept.push(name.to_string()),
            }
        }

        outcome
    }

    /// Convenience wrapper returning only the kept names.
    pub fn filter<S: AsRef<str>>(&self, candidates: &[S]) -> Vec<String> {
        self.apply(candidates).kept
    }
}
