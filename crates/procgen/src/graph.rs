//! Declared render passes and their dependency order.
//!
//! Each pass names the destination it writes and the targets it samples.
//! [`PassGraphBuilder::build`] checks the declarations against the backend's
//! targets and produces a fixed execution order in which every writer of a
//! target finishes before any pass that samples it. Ties fall back to
//! declaration order, so the schedule is stable across runs.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use crate::color::Rgba;
use crate::error::SetupError;
use crate::target::{Destination, RenderBackend, TargetId};

/// Index of a pass in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub usize);

/// What happens to the destination before a pass draws.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Load {
    Clear(Rgba),
    /// The pass covers every pixel itself, e.g. a full-screen quad.
    Overwrite,
    /// Keep whatever is there: feedback history or an earlier pass's output.
    #[default]
    Preserve,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub name: String,
    pub writes: Destination,
    pub reads: Vec<TargetId>,
    pub load: Load,
}

impl Pass {
    pub fn new(name: impl Into<String>, writes: impl Into<Destination>) -> Self {
        Self {
            name: name.into(),
            writes: writes.into(),
            reads: Vec::new(),
            load: Load::Preserve,
        }
    }

    pub fn to_screen(name: impl Into<String>) -> Self {
        Self::new(name, Destination::Screen)
    }

    pub fn reads(mut self, target: TargetId) -> Self {
        if !self.reads.contains(&target) {
            self.reads.push(target);
        }
        self
    }

    pub fn clear(mut self, color: Rgba) -> Self {
        self.load = Load::Clear(color);
        self
    }

    pub fn overwrite(mut self) -> Self {
        self.load = Load::Overwrite;
        self
    }

    pub fn preserve(mut self) -> Self {
        self.load = Load::Preserve;
        self
    }
}

#[derive(Debug, Default)]
pub struct PassGraphBuilder {
    passes: Vec<Pass>,
}

impl PassGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pass: Pass) -> PassId {
        let id = PassId(self.passes.len());
        self.passes.push(pass);
        id
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Validates the declarations and computes the execution order.
    pub fn build(self, backend: &dyn RenderBackend) -> Result<PassGraph, SetupError> {
        let passes = self.passes;
        let is_feedback = |id: TargetId| backend.target(id).is_some_and(|t| t.feedback);
        let is_uploaded = |id: TargetId| backend.target(id).is_some_and(|t| t.uploaded);
        let label = |destination: Destination| match destination {
            Destination::Screen => "screen".to_string(),
            Destination::Target(id) => backend
                .target(id)
                .map(|t| t.label.clone())
                .unwrap_or_else(|| format!("#{}", id.0)),
        };

        let mut names = BTreeSet::new();
        for pass in &passes {
            if pass.name.trim().is_empty() {
                return Err(SetupError::Graph("a pass has an empty name".into()));
            }
            if !names.insert(pass.name.as_str()) {
                return Err(SetupError::Graph(format!(
                    "pass '{}' is declared twice",
                    pass.name
                )));
            }
            if let Destination::Target(id) = pass.writes {
                if backend.target(id).is_none() {
                    return Err(SetupError::Graph(format!(
                        "pass '{}' writes unknown target #{}",
                        pass.name, id.0
                    )));
                }
                if is_uploaded(id) {
                    return Err(SetupError::Graph(format!(
                        "pass '{}' draws into '{}', which is filled by uploads",
                        pass.name,
                        label(pass.writes)
                    )));
                }
            }
            for read in &pass.reads {
                if backend.target(*read).is_none() {
                    return Err(SetupError::Graph(format!(
                        "pass '{}' reads unknown target #{}",
                        pass.name, read.0
                    )));
                }
                if pass.writes == Destination::Target(*read) && !is_feedback(*read) {
                    return Err(SetupError::Graph(format!(
                        "pass '{}' samples '{}' while writing it; mark the target as feedback",
                        pass.name,
                        label(pass.writes)
                    )));
                }
            }
        }

        let count = passes.len();
        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];

        // Writers of one destination run in declaration order, and only the
        // first may start from undefined contents.
        let mut destinations: Vec<Destination> = passes.iter().map(|p| p.writes).collect();
        destinations.sort_by_key(|d| match d {
            Destination::Screen => (0, 0),
            Destination::Target(id) => (1, id.0),
        });
        destinations.dedup();
        for destination in &destinations {
            let writers: Vec<usize> = (0..count)
                .filter(|&i| passes[i].writes == *destination)
                .collect();
            let feedback = matches!(destination, Destination::Target(id) if is_feedback(*id));
            for (position, &writer) in writers.iter().enumerate() {
                let pass = &passes[writer];
                match (position, pass.load, feedback) {
                    (_, Load::Clear(_), true) => {
                        return Err(SetupError::Graph(format!(
                            "pass '{}' clears feedback target '{}'",
                            pass.name,
                            label(*destination)
                        )))
                    }
                    (0, Load::Preserve, false) => {
                        return Err(SetupError::Graph(format!(
                            "pass '{}' is the first writer of '{}' and must clear or overwrite it",
                            pass.name,
                            label(*destination)
                        )))
                    }
                    (p, Load::Clear(_), false) if p > 0 => {
                        return Err(SetupError::Graph(format!(
                            "pass '{}' clears '{}' after '{}' already wrote it",
                            pass.name,
                            label(*destination),
                            passes[writers[p - 1]].name
                        )))
                    }
                    _ => {}
                }
            }
            for pair in writers.windows(2) {
                edges[pair[0]].insert(pair[1]);
            }
        }

        // Sampling a regular target waits for all of its writers. Feedback
        // reads see last frame's contents and uploads land before any pass,
        // so neither imposes an order.
        for (reader, pass) in passes.iter().enumerate() {
            for read in &pass.reads {
                if is_feedback(*read) || is_uploaded(*read) {
                    continue;
                }
                let writers: Vec<usize> = (0..count)
                    .filter(|&i| passes[i].writes == Destination::Target(*read))
                    .collect();
                if writers.is_empty() {
                    return Err(SetupError::Graph(format!(
                        "pass '{}' reads '{}' but no pass writes it",
                        pass.name,
                        label(Destination::Target(*read))
                    )));
                }
                for writer in writers {
                    edges[writer].insert(reader);
                }
            }
        }

        let order = topological_order(&edges).ok_or_else(|| {
            SetupError::Graph("pass dependencies form a cycle".to_string())
        })?;

        tracing::debug!(
            passes = count,
            order = ?order.iter().map(|&i| passes[i].name.as_str()).collect::<Vec<_>>(),
            "scheduled pass graph"
        );

        Ok(PassGraph {
            order: order.into_iter().map(PassId).collect(),
            passes,
        })
    }
}

/// Kahn's algorithm, always taking the lowest ready index.
fn topological_order(edges: &[BTreeSet<usize>]) -> Option<Vec<usize>> {
    let mut indegree = vec![0usize; edges.len()];
    for targets in edges {
        for &target in targets {
            indegree[target] += 1;
        }
    }
    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| Reverse(index))
        .collect();
    let mut order = Vec::with_capacity(edges.len());
    while let Some(Reverse(next)) = ready.pop() {
        order.push(next);
        for &target in &edges[next] {
            indegree[target] -= 1;
            if indegree[target] == 0 {
                ready.push(Reverse(target));
            }
        }
    }
    (order.len() == edges.len()).then_some(order)
}

/// A validated, scheduled set of passes.
#[derive(Debug, Clone, Default)]
pub struct PassGraph {
    passes: Vec<Pass>,
    order: Vec<PassId>,
}

impl PassGraph {
    /// A graph with one pass that clears the screen and draws into it.
    pub fn single(color: Rgba) -> Self {
        Self {
            passes: vec![Pass::to_screen("main").clear(color)],
            order: vec![PassId(0)],
        }
    }

    pub fn order(&self) -> &[PassId] {
        &self.order
    }

    pub fn pass(&self, id: PassId) -> Option<&Pass> {
        self.passes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Passes in execution order.
    pub fn scheduled(&self) -> impl Iterator<Item = (PassId, &Pass)> {
        self.order.iter().map(move |id| (*id, &self.passes[id.0]))
    }
}
