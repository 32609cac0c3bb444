//! Build-time analysis of the operator graph.
//!
//! Operators are nodes of an index-addressed arena; streams are edges.  An
//! edge without a [`Grouping`] is local: both ends run in the same task and
//! tuples move through an in-task dispatcher.  Every other edge crosses a
//! task boundary.
//!
//! All traversals use explicit stacks, so deep graphs cannot overflow the
//! call stack.

use crate::{error::DetailedError, grouping::Grouping};
use petgraph::{
    algo::toposort,
    stable_graph::{EdgeIndex, NodeIndex, StableDiGraph},
    visit::{Dfs, EdgeRef},
    Direction,
};
use serde::Serialize;
use std::{borrow::Cow, collections::HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TopologyError {
    #[error("operator '{operator}' is defined twice")]
    DuplicateOperator { operator: String },

    #[error("unknown operator '{operator}'")]
    UnknownOperator { operator: String },

    #[error("operator graph contains a cycle through '{operator}'")]
    Cycle { operator: String },

    #[error("local stream '{from}' -> '{to}' joins operators with different parallelism")]
    ParallelismMismatch { from: String, to: String },
}

impl DetailedError for TopologyError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::DuplicateOperator { .. } => Cow::from("DuplicateOperator"),
            Self::UnknownOperator { .. } => Cow::from("UnknownOperator"),
            Self::Cycle { .. } => Cow::from("CyclicTopology"),
            Self::ParallelismMismatch { .. } => Cow::from("ParallelismMismatch"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorDescriptor {
    pub name: String,
    /// Number of task instances running this operator.
    pub parallelism: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEdge {
    pub stream: String,
    /// `None` for local edges.
    pub grouping: Option<Grouping>,
}

impl StreamEdge {
    pub fn local(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            grouping: None,
        }
    }

    pub fn remote(stream: impl Into<String>, grouping: Grouping) -> Self {
        Self {
            stream: stream.into(),
            grouping: Some(grouping),
        }
    }

    pub fn is_local(&self) -> bool {
        self.grouping.is_none()
    }
}

#[derive(Default)]
pub struct TopologyGraph {
    graph: StableDiGraph<OperatorDescriptor, StreamEdge>,
    nodes: HashMap<String, NodeIndex>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operator(
        &mut self,
        name: impl Into<String>,
        parallelism: usize,
    ) -> Result<NodeIndex, TopologyError> {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(TopologyError::DuplicateOperator { operator: name });
        }
        let index = self.graph.add_node(OperatorDescriptor {
            name: name.clone(),
            parallelism,
        });
        self.nodes.insert(name, index);
        Ok(index)
    }

    pub fn connect(
        &mut self,
        from: &str,
        to: &str,
        edge: StreamEdge,
    ) -> Result<EdgeIndex, TopologyError> {
        let from = self.index_of(from)?;
        let to = self.index_of(to)?;
        Ok(self.graph.add_edge(from, to, edge))
    }

    pub fn operator(&self, name: &str) -> Option<&OperatorDescriptor> {
        self.nodes.get(name).map(|index| &self.graph[*index])
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Operators without inbound streams, in insertion order.
    pub fn roots(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|index| {
                self.graph
                    .neighbors_directed(*index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|index| self.name(index))
            .collect()
    }

    /// Downstream operators of `name` with the connecting streams.
    pub fn downstream(&self, name: &str) -> Result<Vec<(&str, &StreamEdge)>, TopologyError> {
        let index = self.index_of(name)?;
        Ok(self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| (self.name(edge.target()), edge.weight()))
            .collect())
    }

    /// Operators reachable from `start`, in depth-first preorder.
    pub fn dfs(&self, start: &str) -> Result<Vec<&str>, TopologyError> {
        let mut dfs = Dfs::new(&self.graph, self.index_of(start)?);
        let mut order = Vec::new();
        while let Some(index) = dfs.next(&self.graph) {
            order.push(self.name(index));
        }
        Ok(order)
    }

    /// Every operator after all of its upstream operators.
    pub fn topological_order(&self) -> Result<Vec<&str>, TopologyError> {
        let order = toposort(&self.graph, None).map_err(|cycle| TopologyError::Cycle {
            operator: self.name(cycle.node_id()).to_string(),
        })?;
        Ok(order.into_iter().map(|index| self.name(index)).collect())
    }

    /// Groups operators connected by local streams.  Each group runs inside
    /// one task, so all of its members must share the same parallelism.
    ///
    /// Fragments are listed by their first operator in insertion order, and
    /// members of a fragment in discovery order.
    pub fn fragments(&self) -> Result<Vec<Vec<&str>>, TopologyError> {
        let mut fragment_of: HashMap<NodeIndex, usize> = HashMap::new();
        let mut fragments = Vec::new();

        for start in self.graph.node_indices() {
            if fragment_of.contains_key(&start) {
                continue;
            }
            let id = fragments.len();
            let mut members = Vec::new();
            let mut stack = vec![start];
            fragment_of.insert(start, id);

            while let Some(index) = stack.pop() {
                members.push(self.name(index));
                let local = self
                    .graph
                    .edges_directed(index, Direction::Outgoing)
                    .chain(self.graph.edges_directed(index, Direction::Incoming))
                    .filter(|edge| edge.weight().is_local());
                for edge in local {
                    let (from, to) = (edge.source(), edge.target());
                    if self.graph[from].parallelism != self.graph[to].parallelism {
                        return Err(TopologyError::ParallelismMismatch {
                            from: self.name(from).to_string(),
                            to: self.name(to).to_string(),
                        });
                    }
                    let next = if from == index { to } else { from };
                    if !fragment_of.contains_key(&next) {
                        fragment_of.insert(next, id);
                        stack.push(next);
                    }
                }
            }
            fragments.push(members);
        }
        Ok(fragments)
    }

    fn index_of(&self, name: &str) -> Result<NodeIndex, TopologyError> {
        self.nodes
            .get(name)
            .copied()
            .ok_or_else(|| TopologyError::UnknownOperator {
                operator: name.to_string(),
            })
    }

    fn name(&self, index: NodeIndex) -> &str {
        &self.graph[index].name
    }
}

#[cfg(test)]
mod test {
    use super::{StreamEdge, TopologyError, TopologyGraph};
    use crate::{grouping::Grouping, tuple::GroupFields};
    use pretty_assertions::assert_eq;

    /// source -> parse (local) -> count (fields) -> sink (global)
    ///                         \-> audit (shuffle)
    fn clicks() -> TopologyGraph {
        let mut graph = TopologyGraph::new();
        for (name, parallelism) in [("source", 2), ("parse", 2), ("count", 4), ("sink", 1), ("audit", 2)] {
            graph.add_operator(name, parallelism).unwrap();
        }
        graph
            .connect("source", "parse", StreamEdge::local("raw"))
            .unwrap();
        graph
            .connect(
                "parse",
                "count",
                StreamEdge::remote("click", Grouping::fields(GroupFields::from_names(["user"]))),
            )
            .unwrap();
        graph
            .connect("parse", "audit", StreamEdge::remote("click", Grouping::shuffle()))
            .unwrap();
        graph
            .connect("count", "sink", StreamEdge::remote("clicks", Grouping::global()))
            .unwrap();
        graph
    }

    #[test]
    fn traversal() {
        let graph = clicks();
        assert_eq!(graph.roots(), vec!["source"]);

        let reachable = graph.dfs("parse").unwrap();
        assert_eq!(reachable[0], "parse");
        assert_eq!(reachable.len(), 4);

        let order = graph.topological_order().unwrap();
        let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
        assert!(position("source") < position("parse"));
        assert!(position("parse") < position("count"));
        assert!(position("count") < position("sink"));
        assert!(position("parse") < position("audit"));

        let downstream = graph.downstream("parse").unwrap();
        assert_eq!(downstream.len(), 2);
        assert!(downstream.iter().all(|(_, edge)| !edge.is_local()));
    }

    #[test]
    fn fragments_follow_local_edges() {
        assert_eq!(
            clicks().fragments().unwrap(),
            vec![vec!["source", "parse"], vec!["count"], vec!["sink"], vec!["audit"]]
        );
    }

    #[test]
    fn local_edge_needs_equal_parallelism() {
        let mut graph = clicks();
        graph
            .connect("count", "audit", StreamEdge::local("counted"))
            .unwrap();
        assert!(matches!(
            graph.fragments(),
            Err(TopologyError::ParallelismMismatch { .. })
        ));
    }

    #[test]
    fn cycles_are_reported() {
        let mut graph = clicks();
        graph
            .connect("sink", "parse", StreamEdge::remote("feedback", Grouping::shuffle()))
            .unwrap();
        assert!(matches!(
            graph.topological_order(),
            Err(TopologyError::Cycle { .. })
        ));
    }

    #[test]
    fn construction_errors() {
        let mut graph = clicks();
        assert_eq!(
            graph.add_operator("count", 1),
            Err(TopologyError::DuplicateOperator {
                operator: "count".to_string()
            })
        );
        assert_eq!(
            graph
                .connect("count", "nowhere", StreamEdge::local("x"))
                .map(|_| ()),
            Err(TopologyError::UnknownOperator {
                operator: "nowhere".to_string()
            })
        );
    }
}
