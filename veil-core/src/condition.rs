//! Condition language for case content.
//!
//! Characters, commentary triggers, and secret reveals are gated by compact
//! textual conditions like `trust>=40 AND evidence:torn_letter OR flag:confronted`.
//! Each condition string is compiled once at content-load time into an
//! expression tree; evaluation against an [`EvaluationContext`] is a pure
//! recursive fold with no side effects.
//!
//! `OR` binds weaker than `AND`: the text is split on `OR` first, then each
//! segment on `AND`. Keyword and key matching is case-insensitive. A clause
//! the parser does not recognize is dropped from its enclosing group with a
//! diagnostic log rather than aborting the parse, so one bad clause in
//! authored content never disables an entire trigger tree.

use crate::state::{EvaluationContext, EvidenceId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Comparison operators usable in numeric clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl Comparison {
    /// Apply the comparison to two numbers.
    pub fn compare(&self, left: i32, right: i32) -> bool {
        match self {
            Comparison::Gt => left > right,
            Comparison::Lt => left < right,
            Comparison::Ge => left >= right,
            Comparison::Le => left <= right,
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A single recognized clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Atom {
    /// Compare the entity's trust value, e.g. `trust>=40`.
    Trust { op: Comparison, value: i32 },
    /// Compare the discovered-evidence count, e.g. `evidence_count>5`.
    EvidenceCount { op: Comparison, value: i32 },
    /// Test for a specific piece of evidence, e.g. `evidence:torn_letter`.
    EvidencePresence(EvidenceId),
    /// Test for a boolean flag, e.g. `flag:confronted`.
    Flag(String),
}

impl Atom {
    /// Evaluate this clause against a context snapshot.
    pub fn holds(&self, ctx: &EvaluationContext) -> bool {
        match self {
            Atom::Trust { op, value } => op.compare(ctx.trust, *value),
            Atom::EvidenceCount { op, value } => op.compare(ctx.evidence_count as i32, *value),
            Atom::EvidencePresence(id) => ctx.discovered_evidence.contains(id),
            Atom::Flag(name) => ctx.flags.contains(name),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Trust { op, value } => write!(f, "trust{op}{value}"),
            Atom::EvidenceCount { op, value } => write!(f, "evidence_count{op}{value}"),
            Atom::EvidencePresence(id) => write!(f, "evidence:{id}"),
            Atom::Flag(name) => write!(f, "flag:{name}"),
        }
    }
}

/// A compiled condition expression.
///
/// Produced once per content item by [`ConditionExpr::parse`] and then shared
/// immutably. The variant set is closed on purpose: the evaluator matches
/// exhaustively, so an unrecognized node shape is unrepresentable rather than
/// silently false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionExpr {
    Atomic(Atom),
    /// True iff every member is true. Vacuously true when empty.
    All(Vec<ConditionExpr>),
    /// True iff any member is true. Never true when empty.
    Any(Vec<ConditionExpr>),
}

impl ConditionExpr {
    /// Compile a condition string.
    ///
    /// Never fails: malformed clauses are dropped with a diagnostic, a blank
    /// string yields an expression that always evaluates false, and a group
    /// whose clauses were all dropped evaluates true. Identical input always
    /// yields a structurally identical tree.
    pub fn parse(text: &str) -> ConditionExpr {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ConditionExpr::Any(Vec::new());
        }

        let mut branches = Vec::new();
        for segment in split_keyword(trimmed, " or ") {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let mut clauses = Vec::new();
            for clause in split_keyword(segment, " and ") {
                if let Some(atom) = parse_clause(clause) {
                    clauses.push(ConditionExpr::Atomic(atom));
                }
            }

            branches.push(if clauses.len() == 1 {
                clauses.remove(0)
            } else {
                ConditionExpr::All(clauses)
            });
        }

        match branches.len() {
            0 => ConditionExpr::Any(Vec::new()),
            1 => branches.remove(0),
            _ => ConditionExpr::Any(branches),
        }
    }

    /// Evaluate against a context snapshot.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> bool {
        match self {
            ConditionExpr::Atomic(atom) => atom.holds(ctx),
            ConditionExpr::All(members) => members.iter().all(|m| m.evaluate(ctx)),
            ConditionExpr::Any(members) => members.iter().any(|m| m.evaluate(ctx)),
        }
    }

    /// An expression that is true for every context.
    pub fn always() -> ConditionExpr {
        ConditionExpr::All(Vec::new())
    }

    /// An expression that is false for every context.
    pub fn never() -> ConditionExpr {
        ConditionExpr::Any(Vec::new())
    }
}

impl fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionExpr::Atomic(atom) => write!(f, "{atom}"),
            ConditionExpr::All(members) if members.is_empty() => write!(f, "<always>"),
            ConditionExpr::Any(members) if members.is_empty() => write!(f, "<never>"),
            ConditionExpr::All(members) => write_joined(f, members, " AND "),
            ConditionExpr::Any(members) => write_joined(f, members, " OR "),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    members: &[ConditionExpr],
    sep: &str,
) -> fmt::Result {
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match member {
            ConditionExpr::Atomic(_) => write!(f, "{member}")?,
            _ => write!(f, "({member})")?,
        }
    }
    Ok(())
}

/// Split on a keyword separator, case-insensitively.
///
/// Condition text is ASCII authored content, so lowercasing preserves byte
/// offsets into the original string.
fn split_keyword<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let lowered = text.to_ascii_lowercase();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut from = 0;
    while let Some(pos) = lowered[from..].find(sep) {
        let at = from + pos;
        parts.push(&text[start..at]);
        start = at + sep.len();
        from = start;
    }
    parts.push(&text[start..]);
    parts
}

/// Parse one atomic clause, or drop it with a diagnostic.
fn parse_clause(clause: &str) -> Option<Atom> {
    let clause = clause.trim();
    if clause.is_empty() {
        return None;
    }

    let lowered = clause.to_ascii_lowercase();
    if lowered.starts_with("evidence:") {
        let id = clause["evidence:".len()..].trim();
        if id.is_empty() {
            debug!(clause, "dropping evidence clause with empty id");
            return None;
        }
        return Some(Atom::EvidencePresence(EvidenceId::from(id)));
    }
    if lowered.starts_with("flag:") {
        let name = clause["flag:".len()..].trim();
        if name.is_empty() {
            debug!(clause, "dropping flag clause with empty name");
            return None;
        }
        return Some(Atom::Flag(name.to_string()));
    }

    let Some((key, op, value)) = split_comparison(&lowered) else {
        debug!(clause, "dropping clause without a comparison");
        return None;
    };
    let Ok(value) = value.trim().parse::<i32>() else {
        debug!(clause, "dropping clause with a non-numeric value");
        return None;
    };
    match key.trim() {
        "trust" => Some(Atom::Trust { op, value }),
        "evidence_count" => Some(Atom::EvidenceCount { op, value }),
        other => {
            debug!(clause, key = other, "dropping clause with unknown key");
            None
        }
    }
}

fn split_comparison(s: &str) -> Option<(&str, Comparison, &str)> {
    let at = s.find(|c| matches!(c, '<' | '>' | '=' | '!'))?;
    let (key, rest) = s.split_at(at);
    let (op, value) = if let Some(v) = rest.strip_prefix(">=") {
        (Comparison::Ge, v)
    } else if let Some(v) = rest.strip_prefix("<=") {
        (Comparison::Le, v)
    } else if let Some(v) = rest.strip_prefix("==") {
        (Comparison::Eq, v)
    } else if let Some(v) = rest.strip_prefix("!=") {
        (Comparison::Ne, v)
    } else if let Some(v) = rest.strip_prefix('>') {
        (Comparison::Gt, v)
    } else if let Some(v) = rest.strip_prefix('<') {
        (Comparison::Lt, v)
    } else {
        return None;
    };
    Some((key, op, value))
}
