//! Nickname classification of processes by command line.
//!
//! Rules map a nickname to a regular expression searched anywhere in the
//! command line. Rules are evaluated in lexicographic order of their names
//! and the last matching rule wins, so overlapping rules give the same answer
//! on every run. A process no rule matches keeps its short name.

use regex::Regex;
use std::collections::BTreeMap;

use crate::error::ConfigError;

/// One compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub nickname: String,
    pub pattern: String,
    regex: Regex,
}

/// Ordered set of compiled nickname rules.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Compiles every rule. An invalid or empty pattern is a configuration error.
    pub fn new(rules: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(rules.len());
        // BTreeMap iterates in key order, which is the evaluation order.
        for (nickname, pattern) in rules {
            if pattern.is_empty() {
                return Err(ConfigError::EmptyPattern(nickname.clone()));
            }
            let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                name: nickname.clone(),
                pattern: pattern.clone(),
                source,
            })?;
            compiled.push(Rule {
                nickname: nickname.clone(),
                pattern: pattern.clone(),
                regex,
            });
        }
        Ok(Self { rules: compiled })
    }

    /// Returns the nickname for a process.
    pub fn classify(&self, cmdline: &str, name: &str) -> String {
        // Scanning backwards finds the last match in evaluation order.
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.regex.is_match(cmdline))
            .map(|rule| rule.nickname.clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Source pattern of the rule carrying `nickname`, if any.
    pub fn pattern(&self, nickname: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.nickname == nickname)
            .map(|rule| rule.pattern.as_str())
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
