use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::NodeIndex;

use crate::error::Error;
use crate::graph::{Graph, Node};

/// Visitation state of a vertex during a depth-first walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mark {
    /// On the current DFS path.
    Temporary,
    /// Fully processed, along with everything reachable from it.
    Permanent,
}

impl Graph {
    /// Orders every vertex so that each one comes after all of the vertices
    /// it depends on.
    ///
    /// Fails with [`Error::DanglingEdge`] if an edge starts at a vertex that
    /// was never added, and with [`Error::CyclicDependency`] if the graph is
    /// not acyclic.
    pub fn toposort(&self) -> Result<Vec<NodeIndex>, Error> {
        if let Some((from, to)) = self
            .pending_edges()
            .iter()
            .find(|(from, _)| !self.index.contains_key(from))
        {
            return Err(Error::DanglingEdge {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut marks = HashMap::with_capacity(self.vertex_count());
        let mut path = Vec::new();
        let mut sorted = Vec::with_capacity(self.vertex_count());

        for index in self.inner.node_indices() {
            self.visit(index, &mut marks, &mut path, &mut sorted)?;
        }

        // vertices were appended after their dependents
        sorted.reverse();
        Ok(sorted)
    }

    /// Graph-wide acyclicity check, independent of any plan.
    pub fn check_for_cycles(&self) -> Result<(), Error> {
        let order = self.toposort()?;
        tracing::debug!("graph is acyclic, {} vertices ordered", order.len());
        Ok(())
    }

    fn visit(
        &self,
        index: NodeIndex,
        marks: &mut HashMap<NodeIndex, Mark>,
        path: &mut Vec<NodeIndex>,
        sorted: &mut Vec<NodeIndex>,
    ) -> Result<(), Error> {
        match marks.get(&index) {
            Some(Mark::Permanent) => return Ok(()),
            Some(Mark::Temporary) => return Err(self.cycle_error(index, path)),
            None => {}
        }

        marks.insert(index, Mark::Temporary);
        path.push(index);

        for next in self.inner.neighbors_directed(index, Direction::Outgoing) {
            self.visit(next, marks, path, sorted)?;
        }

        path.pop();
        marks.insert(index, Mark::Permanent);
        sorted.push(index);

        Ok(())
    }

    /// Describes the cycle closing at `index` using the type vertices on the
    /// current path.
    fn cycle_error(&self, index: NodeIndex, path: &[NodeIndex]) -> Error {
        let start = path.iter().position(|&i| i == index).unwrap_or(0);

        let types: Vec<_> = path[start..]
            .iter()
            .chain(std::iter::once(&index))
            .filter_map(|&i| match self.node(i) {
                Node::Value(key) => Some(*key),
                Node::Provider(_) => None,
            })
            .collect();

        // providers only connect to types, so every cycle passes through one
        let type_name = types.first().map(|key| key.name()).unwrap_or_default();

        let chain = types
            .iter()
            .map(|key| key.name())
            .collect::<Vec<_>>()
            .join(" -> ");

        Error::CyclicDependency { type_name, chain }
    }
}
