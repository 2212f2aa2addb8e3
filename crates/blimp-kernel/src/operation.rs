//! Operation predicates and deterministic operation selection.
//!
//! A handler declares an ordered list of [`OperationSpec`]s. Each carries a
//! [`KeywordPredicate`]: a conjunction of keyword groups, where a group is
//! satisfied if *any* of its keywords occurs as a substring of the
//! workflow's lowercased name and description. Selection walks the list in
//! declaration order and returns the first spec whose predicate matches.

use std::fmt;

use aho_corasick::AhoCorasick;

use crate::error::{KernelError, Result};
use crate::workflow::WorkflowDefinition;

// ---------------------------------------------------------------------------
// KeywordPredicate
// ---------------------------------------------------------------------------

/// One any-of keyword group, compiled to a single automaton.
#[derive(Clone)]
struct KeywordGroup {
    keywords: Vec<String>,
    automaton: AhoCorasick,
}

impl KeywordGroup {
    fn matches(&self, text: &str) -> bool {
        self.automaton.is_match(text)
    }
}

/// Conjunction of any-of keyword groups.
///
/// A predicate with no groups matches everything.
#[derive(Clone, Default)]
pub struct KeywordPredicate {
    groups: Vec<KeywordGroup>,
}

impl KeywordPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group that is satisfied when any of `keywords` appears.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidPredicate`] for an empty group, a blank
    /// keyword, or if the automaton cannot be built.
    pub fn any_of(mut self, keywords: &[&str]) -> Result<Self> {
        if keywords.is_empty() {
            return Err(KernelError::InvalidPredicate {
                reason: "keyword group must not be empty".into(),
            });
        }
        let keywords: Vec<String> = keywords.iter().map(|k| k.trim().to_lowercase()).collect();
        if keywords.iter().any(String::is_empty) {
            return Err(KernelError::InvalidPredicate {
                reason: "keywords must not be blank".into(),
            });
        }
        let automaton = AhoCorasick::new(&keywords).map_err(|e| KernelError::InvalidPredicate {
            reason: e.to_string(),
        })?;
        self.groups.push(KeywordGroup {
            keywords,
            automaton,
        });
        Ok(self)
    }

    /// Evaluate against already-lowercased text.
    pub fn matches(&self, text: &str) -> bool {
        self.groups.iter().all(|g| g.matches(text))
    }

    /// Evaluate against a workflow's name and description.
    pub fn matches_workflow(&self, workflow: &WorkflowDefinition) -> bool {
        self.matches(&workflow.metadata_text())
    }
}

impl fmt::Debug for KeywordPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<&[String]> = self.groups.iter().map(|g| g.keywords.as_slice()).collect();
        f.debug_struct("KeywordPredicate")
            .field("groups", &groups)
            .finish()
    }
}

impl fmt::Display for KeywordPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.groups.is_empty() {
            return f.write_str("*");
        }
        let rendered: Vec<String> = self
            .groups
            .iter()
            .map(|g| format!("({})", g.keywords.join("|")))
            .collect();
        f.write_str(&rendered.join(" & "))
    }
}

// ---------------------------------------------------------------------------
// OperationSpec
// ---------------------------------------------------------------------------

/// A named operation a handler can perform, with the predicate that
/// decides when it applies.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    /// Stable operation tag, e.g. `emails_to_calendar_events`.
    pub name: &'static str,
    pub summary: &'static str,
    pub predicate: KeywordPredicate,
}

impl OperationSpec {
    pub fn new(name: &'static str, summary: &'static str, predicate: KeywordPredicate) -> Self {
        Self {
            name,
            summary,
            predicate,
        }
    }
}

/// First operation, in declaration order, whose predicate matches the
/// workflow's metadata.
pub fn select_operation<'a>(
    operations: &'a [OperationSpec],
    workflow: &WorkflowDefinition,
) -> Option<&'a OperationSpec> {
    let text = workflow.metadata_text();
    let selected = operations.iter().find(|op| op.predicate.matches(&text));
    match selected {
        Some(op) => {
            tracing::debug!(workflow_id = %workflow.id, operation = op.name, "operation selected")
        }
        None => tracing::debug!(workflow_id = %workflow.id, "no operation predicate matched"),
    }
    selected
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
