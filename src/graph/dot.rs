use std::fmt::{self, Write};

use serde::Serialize;

use crate::graph::{Graph, Node};

impl Graph {
    /// Renders the graph in the Graphviz DOT language. Providers are drawn as
    /// boxes, plain value types as circles.
    pub fn to_dot(&self) -> String {
        self.to_string()
    }

    /// A serializable view of the graph, for tooling that does not speak DOT.
    pub fn snapshot(&self) -> Snapshot {
        let nodes = self
            .inner
            .node_indices()
            .map(|index| {
                let node = &self.inner[index];
                SnapshotNode {
                    id: index.index(),
                    label: node.label().to_string(),
                    provider: node.as_provider().is_some(),
                    fallible: node
                        .as_provider()
                        .is_some_and(|provider| provider.error_slot().is_some()),
                }
            })
            .collect();

        let edges = self
            .inner
            .raw_edges()
            .iter()
            .map(|edge| (edge.source().index(), edge.target().index()))
            .collect();

        Snapshot { nodes, edges }
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph container {{")?;
        writeln!(f, "    rankdir=LR;")?;

        for index in self.inner.node_indices() {
            let node = &self.inner[index];
            let label = escape(node.label());

            match node {
                Node::Value(_) => {
                    writeln!(f, "    {} [label=\"{}\", shape=circle];", index.index(), label)?;
                }
                Node::Provider(provider) => {
                    let style = if provider.error_slot().is_some() {
                        ", style=dashed"
                    } else {
                        ""
                    };
                    writeln!(
                        f,
                        "    {} [label=\"{}\", shape=box{}];",
                        index.index(),
                        label,
                        style
                    )?;
                }
            }
        }

        for edge in self.inner.raw_edges() {
            writeln!(
                f,
                "    {} -> {};",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        write!(f, "}}")
    }
}

/// Serializable description of a [`Graph`].
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotNode {
    pub id: usize,
    pub label: String,
    pub provider: bool,
    pub fallible: bool,
}

impl Snapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn label(&self, id: usize) -> Option<&str> {
        self.nodes
            .iter()
            .find(|node| node.id == id)
            .map(|node| node.label.as_str())
    }

    /// A short textual summary, one provider per line, listing what it needs
    /// and what it produces.
    pub fn describe(&self) -> String {
        let mut out = String::new();

        for node in self.nodes.iter().filter(|node| node.provider) {
            let needs: Vec<_> = self
                .edges
                .iter()
                .filter(|(_, to)| *to == node.id)
                .filter_map(|(from, _)| self.label(*from))
                .collect();

            let makes: Vec<_> = self
                .edges
                .iter()
                .filter(|(from, _)| *from == node.id)
                .filter_map(|(_, to)| self.label(*to))
                .collect();

            let _ = writeln!(
                out,
                "{}: ({}) -> ({})",
                node.label,
                needs.join(", "),
                makes.join(", ")
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProviderNode;

    #[derive(Clone)]
    struct Token;

    #[derive(Clone)]
    struct Session;

    crate::injectable!(Token, Session);

    fn sample() -> Graph {
        let mut graph = Graph::from_provider(ProviderNode::from_value(Token)).unwrap();
        graph.merge(
            Graph::from_provider(ProviderNode::from_handler(
                |_: Token| -> anyhow::Result<Session> { Ok(Session) },
            ))
            .unwrap(),
        );
        graph
    }

    #[test]
    fn test_dot_shapes() {
        let dot = sample().to_dot();

        assert!(dot.starts_with("digraph container {"));
        assert!(dot.ends_with('}'));
        assert_eq!(dot.matches("shape=circle").count(), 2);
        assert_eq!(dot.matches("shape=box").count(), 2);
        assert_eq!(dot.matches("style=dashed").count(), 1);
        assert_eq!(dot.matches(" -> ").count(), 3);
    }

    #[test]
    fn test_snapshot_json() {
        let snapshot = sample().snapshot();

        assert_eq!(snapshot.nodes.len(), 4);
        assert_eq!(snapshot.edges.len(), 3);
        assert_eq!(snapshot.nodes.iter().filter(|n| n.fallible).count(), 1);

        let json = snapshot.to_json().unwrap();
        assert!(json.contains(r#""provider":true"#));
        assert!(json.contains(r#""edges":[["#));
    }

    #[test]
    fn test_describe() {
        let text = sample().snapshot().describe();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("() -> (tsunagi::graph::dot::tests::Token)"));
        assert!(lines[1].contains("(tsunagi::graph::dot::tests::Token) -> (tsunagi::graph::dot::tests::Session)"));
    }

    #[test]
    fn test_describe_hand_built_snapshot() {
        let node = |id, label: &str, provider| SnapshotNode {
            id,
            label: label.to_string(),
            provider,
            fallible: false,
        };

        // ids do not follow positions and one edge points nowhere
        let snapshot = Snapshot {
            nodes: vec![
                node(7, "make", true),
                node(3, "Input", false),
                node(9, "Output", false),
            ],
            edges: vec![(3, 7), (7, 9), (42, 7), (7, 100)],
        };

        assert_eq!(snapshot.describe(), "make: (Input) -> (Output)\n");
    }
}
