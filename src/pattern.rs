//! Action patterns and templates.
//!
//! A pattern maps parameter names to terms. A term is either a literal value
//! that must be equal to the realized value, or a variable that is bound (or
//! constrained, if already bound) by the realized value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::trace::{ActionOutcome, TraceEntry};
use crate::value::{Record, Value};

/// A pattern slot: literal or logical variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Term {
    Literal(Value),
    Var(String),
}

impl Term {
    /// Returns the variable name if this term is a variable.
    #[must_use]
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Self::Var(name) => Some(name),
            Self::Literal(_) => None,
        }
    }

    #[must_use]
    pub const fn is_var(&self) -> bool {
        matches!(self, Self::Var(_))
    }
}

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Var(name) => write!(f, "?{name}"),
        }
    }
}

/// Creates a variable term.
#[must_use]
pub fn var(name: impl Into<String>) -> Term {
    Term::Var(name.into())
}

/// Creates a literal term.
#[must_use]
pub fn lit(value: impl Into<Value>) -> Term {
    Term::Literal(value.into())
}

/// Parameter name -> term.
pub type TermMap = BTreeMap<String, Term>;

/// Builds a [`TermMap`] from `key => term` pairs.
///
/// ```
/// use concept_sync::{terms, pattern::{lit, var}};
///
/// let t = terms! { "path" => lit("/login"), "user" => var("user") };
/// assert_eq!(t.len(), 2);
/// ```
#[macro_export]
macro_rules! terms {
    () => {
        $crate::pattern::TermMap::new()
    };
    ($($key:expr => $term:expr),+ $(,)?) => {{
        let mut map = $crate::pattern::TermMap::new();
        $(map.insert(($key).to_string(), $crate::pattern::Term::from($term));)+
        map
    }};
}

/// Which outcome of an action a pattern matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputPattern {
    /// Matches successful entries whose outputs satisfy the terms.
    Success {
        #[serde(default)]
        terms: TermMap,
    },
    /// Matches error entries, optionally binding the error message.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bind: Option<String>,
    },
}

impl Default for OutputPattern {
    fn default() -> Self {
        Self::Success {
            terms: TermMap::new(),
        }
    }
}

/// A (concept, action, input pattern, output pattern) quadruple used in a
/// sync's when clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPattern {
    pub concept: String,
    pub action: String,
    #[serde(default)]
    pub input: TermMap,
    #[serde(default)]
    pub output: OutputPattern,
}

impl ActionPattern {
    /// Pattern matching any successful invocation of `concept.action`.
    #[must_use]
    pub fn new(concept: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            action: action.into(),
            input: TermMap::new(),
            output: OutputPattern::default(),
        }
    }

    /// Sets the input pattern.
    #[must_use]
    pub fn inputs(mut self, input: TermMap) -> Self {
        self.input = input;
        self
    }

    /// Sets the success output pattern.
    #[must_use]
    pub fn outputs(mut self, terms: TermMap) -> Self {
        self.output = OutputPattern::Success { terms };
        self
    }

    /// Matches error entries instead of successes, binding the message to `bind`.
    #[must_use]
    pub fn on_error(mut self, bind: Option<&str>) -> Self {
        self.output = OutputPattern::Error {
            bind: bind.map(str::to_string),
        };
        self
    }

    /// Variables this pattern binds.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars: BTreeSet<String> = term_variables(&self.input).collect();
        match &self.output {
            OutputPattern::Success { terms } => vars.extend(term_variables(terms)),
            OutputPattern::Error { bind } => vars.extend(bind.iter().cloned()),
        }
        vars
    }

    /// Matches a single trace entry, producing the bindings on success.
    ///
    /// Literal slots must equal the realized value; variable slots bind it.
    /// A variable used twice must see equal values. Missing fields fail the match.
    #[must_use]
    pub fn match_entry(&self, entry: &TraceEntry) -> Option<Frame> {
        if !entry.is_action(&self.concept, &self.action) {
            return None;
        }

        let frame = match_terms(&self.input, &entry.input, Frame::new())?;

        match (&self.output, &entry.outcome) {
            (OutputPattern::Success { terms }, ActionOutcome::Success { output }) => {
                match_terms(terms, output, frame)
            }
            (OutputPattern::Error { bind }, ActionOutcome::Error { error }) => match bind {
                Some(name) => frame.with(name, Value::String(error.clone())),
                None => Some(frame),
            },
            _ => None,
        }
    }
}

impl fmt::Display for ActionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.concept, self.action)
    }
}

/// A then-clause dispatch template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub concept: String,
    pub action: String,
    #[serde(default)]
    pub input: TermMap,
}

impl ActionTemplate {
    #[must_use]
    pub fn new(concept: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            action: action.into(),
            input: TermMap::new(),
        }
    }

    /// Sets the input template.
    #[must_use]
    pub fn inputs(mut self, input: TermMap) -> Self {
        self.input = input;
        self
    }

    /// Variables the template needs from the frame.
    pub fn variables(&self) -> impl Iterator<Item = String> + '_ {
        term_variables(&self.input)
    }

    /// Substitutes the frame's bindings into the template.
    pub fn instantiate(&self, frame: &Frame) -> crate::error::SyncResult<Record> {
        substitute(&self.input, frame)
    }
}

impl fmt::Display for ActionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.concept, self.action)
    }
}

pub(crate) fn term_variables(terms: &TermMap) -> impl Iterator<Item = String> + '_ {
    terms.values().filter_map(|t| t.as_var().map(str::to_string))
}

/// Matches `terms` against `record`, extending `frame`.
pub(crate) fn match_terms(terms: &TermMap, record: &Record, mut frame: Frame) -> Option<Frame> {
    for (field, term) in terms {
        let actual = record.get(field)?;
        match term {
            Term::Literal(expected) => {
                if expected != actual {
                    return None;
                }
            }
            Term::Var(name) => {
                frame = frame.with(name, actual.clone())?;
            }
        }
    }
    Some(frame)
}

/// Resolves every term against `frame`.
pub(crate) fn substitute(terms: &TermMap, frame: &Frame) -> crate::error::SyncResult<Record> {
    terms
        .iter()
        .map(|(field, term)| Ok((field.clone(), frame.resolve(term)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::terms;
    use crate::trace::ActionTrace;

    fn trace_with(outcome: ActionOutcome) -> ActionTrace {
        let mut trace = ActionTrace::new();
        trace.append(
            "Conversing",
            "send",
            record! { "conversation" => Value::id("c1"), "content" => "hi" },
            outcome,
            0,
            None,
        );
        trace
    }

    #[test]
    fn variables_bind_and_literals_constrain() {
        let trace = trace_with(ActionOutcome::Success {
            output: record! { "message" => Value::id("m1") },
        });
        let pattern = ActionPattern::new("Conversing", "send")
            .inputs(terms! { "conversation" => var("c"), "content" => lit("hi") })
            .outputs(terms! { "message" => var("m") });

        let frame = pattern.match_entry(trace.get(0).unwrap()).unwrap();
        assert_eq!(frame.get("c"), Some(&Value::id("c1")));
        assert_eq!(frame.get("m"), Some(&Value::id("m1")));

        let wrong = ActionPattern::new("Conversing", "send")
            .inputs(terms! { "content" => lit("bye") });
        assert!(wrong.match_entry(trace.get(0).unwrap()).is_none());
    }

    #[test]
    fn repeated_variable_requires_equal_values() {
        let trace = trace_with(ActionOutcome::Success { output: Record::new() });
        let pattern = ActionPattern::new("Conversing", "send")
            .inputs(terms! { "conversation" => var("x"), "content" => var("x") });
        assert!(pattern.match_entry(trace.get(0).unwrap()).is_none());
    }

    #[test]
    fn missing_field_fails_match() {
        let trace = trace_with(ActionOutcome::Success { output: Record::new() });
        let pattern = ActionPattern::new("Conversing", "send")
            .outputs(terms! { "message" => var("m") });
        assert!(pattern.match_entry(trace.get(0).unwrap()).is_none());
    }

    #[test]
    fn error_entries_only_match_error_patterns() {
        let trace = trace_with(ActionOutcome::Error {
            error: "not a participant".to_string(),
        });
        let entry = trace.get(0).unwrap();

        let success = ActionPattern::new("Conversing", "send");
        assert!(success.match_entry(entry).is_none());

        let failure = ActionPattern::new("Conversing", "send").on_error(Some("error"));
        let frame = failure.match_entry(entry).unwrap();
        assert_eq!(frame.get("error"), Some(&Value::from("not a participant")));
    }

    #[test]
    fn pattern_variables_cover_inputs_and_outputs() {
        let pattern = ActionPattern::new("A", "b")
            .inputs(terms! { "x" => var("x"), "k" => lit(1) })
            .outputs(terms! { "y" => var("y") });
        let vars: Vec<String> = pattern.variables().into_iter().collect();
        assert_eq!(vars, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn template_instantiation_reports_unbound_variables() {
        let template = ActionTemplate::new("Assistant", "reply")
            .inputs(terms! { "prompt" => var("prompt"), "mode" => lit("short") });
        let frame = Frame::new().with("prompt", Value::from("hello")).unwrap();
        let input = template.instantiate(&frame).unwrap();
        assert_eq!(input.get("mode"), Some(&Value::from("short")));

        let err = template.instantiate(&Frame::new()).unwrap_err();
        assert!(err.is_unbound_variable());
    }
}
