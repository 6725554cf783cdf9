//! Frames: the binding structure produced by matching and consumed by dispatch.
//!
//! A [`Frame`] maps logical variable names to values. Joining two frames is
//! natural-join unification: shared variables must hold structurally equal
//! values, otherwise the frames do not unify. [`Frames`] is the collection a
//! where clause filters and enriches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::concept::QueryContext;
use crate::error::{ExecutionError, SyncResult};
use crate::pattern::{match_terms, substitute, Term, TermMap};
use crate::value::{Record, Value};

/// An immutable mapping from variable name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame {
    bindings: BTreeMap<String, Value>,
}

impl Frame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.bindings.get(var)
    }

    #[must_use]
    pub fn contains(&self, var: &str) -> bool {
        self.bindings.contains_key(var)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a copy of this frame with `var` bound to `value`.
    ///
    /// Returns `None` if `var` is already bound to a different value.
    #[must_use]
    pub fn with(&self, var: impl Into<String>, value: Value) -> Option<Self> {
        let var = var.into();
        match self.bindings.get(&var) {
            Some(existing) if *existing != value => None,
            Some(_) => Some(self.clone()),
            None => {
                let mut bindings = self.bindings.clone();
                bindings.insert(var, value);
                Some(Self { bindings })
            }
        }
    }

    /// Natural-join unification of two frames.
    #[must_use]
    pub fn unify(&self, other: &Self) -> Option<Self> {
        unify(self, other)
    }

    /// Resolves a term: literals pass through, variables are looked up.
    pub fn resolve(&self, term: &Term) -> SyncResult<Value> {
        match term {
            Term::Literal(v) => Ok(v.clone()),
            Term::Var(name) => self.get(name).cloned().ok_or_else(|| {
                ExecutionError::UnboundVariable {
                    variable: name.clone(),
                }
                .into()
            }),
        }
    }

    /// Renders the bindings as plain JSON (for logs and diagnostics).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        crate::value::record_to_json(&self.bindings)
    }

    pub(crate) fn into_record(self) -> Record {
        self.bindings
    }
}

impl FromIterator<(String, Value)> for Frame {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}

/// Unifies two frames.
///
/// Every variable bound in both frames must hold structurally equal values;
/// the result binds the union of both frames' variables. Frames with no
/// shared variable always unify (Cartesian product).
#[must_use]
pub fn unify(a: &Frame, b: &Frame) -> Option<Frame> {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut bindings = large.bindings.clone();
    for (var, value) in &small.bindings {
        match bindings.get(var) {
            Some(existing) if existing != value => return None,
            Some(_) => {}
            None => {
                bindings.insert(var.clone(), value.clone());
            }
        }
    }
    Some(Frame { bindings })
}

/// An ordered collection of candidate frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frames {
    frames: Vec<Frame>,
}

impl Frames {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Frame> {
        self.frames
    }

    /// Keeps the frames for which `keep` returns true.
    #[must_use]
    pub fn filter(mut self, mut keep: impl FnMut(&Frame) -> bool) -> Self {
        self.frames.retain(|f| keep(f));
        self
    }

    /// Binds `var` in every frame to the value computed by `derive`.
    ///
    /// Frames for which `derive` returns `None`, or whose existing binding
    /// for `var` disagrees, are dropped.
    #[must_use]
    pub fn bind(self, var: &str, mut derive: impl FnMut(&Frame) -> Option<Value>) -> Self {
        self.frames
            .into_iter()
            .filter_map(|frame| {
                let value = derive(&frame)?;
                frame.with(var, value)
            })
            .collect()
    }

    /// Natural join of two frame sets.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        for a in &self.frames {
            for b in &other.frames {
                if let Some(f) = unify(a, b) {
                    out.push(f);
                }
            }
        }
        Self { frames: out }
    }

    /// Enriches frames with the rows of a concept query.
    ///
    /// For every frame, `inputs` is resolved against the frame's bindings and
    /// the query is run. Each returned row that satisfies `outputs` yields one
    /// derived frame (the original bindings plus newly bound outputs). Frames
    /// whose query returns no satisfying row are dropped.
    pub async fn query(
        self,
        ctx: &QueryContext,
        concept: &str,
        query: &str,
        inputs: &TermMap,
        outputs: &TermMap,
    ) -> SyncResult<Self> {
        let mut out = Vec::with_capacity(self.frames.len());
        for frame in self.frames {
            let input = substitute(inputs, &frame)?;
            let rows = ctx.query(concept, query, &input).await?;
            for row in &rows {
                if let Some(derived) = match_terms(outputs, row, frame.clone()) {
                    out.push(derived);
                }
            }
        }
        Ok(Self { frames: out })
    }

    /// Groups frames by every variable except `vars` and collects the `vars`
    /// bindings of each group into an array of records bound to `into`.
    ///
    /// Groups keep the order in which they first appear.
    #[must_use]
    pub fn collect_as(self, vars: &[&str], into: &str) -> Self {
        let mut groups: Vec<(Frame, Vec<Value>)> = Vec::new();
        for frame in self.frames {
            let mut key = Frame::new();
            let mut item = Record::new();
            for (var, value) in frame.into_record() {
                if vars.contains(&var.as_str()) {
                    item.insert(var, value);
                } else {
                    key.bindings.insert(var, value);
                }
            }
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, items)) => items.push(Value::Record(item)),
                None => groups.push((key, vec![Value::Record(item)])),
            }
        }
        groups
            .into_iter()
            .filter_map(|(key, items)| key.with(into, Value::Array(items)))
            .collect()
    }
}

impl From<Vec<Frame>> for Frames {
    fn from(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

impl FromIterator<Frame> for Frames {
    fn from_iter<T: IntoIterator<Item = Frame>>(iter: T) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Frames {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}
