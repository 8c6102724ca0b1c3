//! The type dependency graph.
//!
//! The graph is bipartite. A [`Node::Value`] vertex stands for a data type, a
//! [`Node::Provider`] vertex for something that can produce values. Edges
//! always point in the direction data flows:
//!
//! * `Value(A) -> Provider(p)`: `p` needs an `A` as input.
//! * `Provider(p) -> Value(B)`: `p` produces a `B`.
//!
//! Answering "what provides `T`" is therefore a lookup of the incoming
//! neighbours of `Value(T)`, and a provider with no outgoing edges is a sink.
//!
//! Vertices live in a `petgraph` arena and are addressed by [`NodeIndex`].
//! Every vertex is also indexed by a [`VertexKey`] for O(1) lookup by type.

mod dot;
mod sort;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::NodeIndex;

pub use crate::graph::dot::{Snapshot, SnapshotNode};
pub(crate) use crate::graph::sort::Mark;

use crate::core::TypeKey;
use crate::engine::{ProviderId, ProviderNode};
use crate::error::Error;

/// A vertex in the dependency graph.
#[derive(Clone, Debug)]
pub enum Node {
    /// A data type. It is satisfied through an edge from a provider.
    Value(TypeKey),
    /// A function or a constant value producing one or more types.
    Provider(Arc<ProviderNode>),
}

impl Node {
    pub fn key(&self) -> VertexKey {
        match self {
            Node::Value(key) => VertexKey::Type(*key),
            Node::Provider(provider) => VertexKey::Provider(provider.id()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Node::Value(key) => key.name(),
            Node::Provider(provider) => provider.name(),
        }
    }

    pub fn as_provider(&self) -> Option<&Arc<ProviderNode>> {
        match self {
            Node::Value(_) => None,
            Node::Provider(provider) => Some(provider),
        }
    }
}

/// Stable identity of a vertex, independent of its position in any one
/// graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexKey {
    Type(TypeKey),
    Provider(ProviderId),
}

impl fmt::Display for VertexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VertexKey::Type(key) => write!(f, "{key}"),
            VertexKey::Provider(id) => write!(f, "provider {id}"),
        }
    }
}

/// A directed dependency graph over types and providers.
#[derive(Default)]
pub struct Graph {
    pub(crate) inner: petgraph::Graph<Node, ()>,
    index: HashMap<VertexKey, NodeIndex>,
    /// Every edge ever added, attached or not, in insertion order.
    edges: Vec<(VertexKey, VertexKey)>,
    seen: HashSet<(VertexKey, VertexKey)>,
    /// Edges with at least one endpoint that is not a vertex yet.
    pending: Vec<(VertexKey, VertexKey)>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph fragment describing a single provider: its own
    /// vertex, a value vertex per parameter and per output, and the edges
    /// between them.
    pub(crate) fn from_provider(provider: ProviderNode) -> Result<Self, Error> {
        if let Some(key) = provider.self_dependency() {
            return Err(Error::SelfDependency(key.name()));
        }

        Ok(Self::fragment(provider))
    }

    /// Same as [`Graph::from_provider`] for providers that cannot depend on
    /// themselves, such as constant values.
    pub(crate) fn fragment(provider: ProviderNode) -> Self {
        let provider = Arc::new(provider);
        let this = VertexKey::Provider(provider.id());

        let mut graph = Graph::new();
        graph.add_vertex(Node::Provider(provider.clone()));

        for &output in provider.outputs() {
            graph.add_vertex(Node::Value(output));
            graph.add_edge(this, VertexKey::Type(output));
        }

        for &param in provider.params() {
            graph.add_vertex(Node::Value(param));
            graph.add_edge(VertexKey::Type(param), this);
        }

        graph
    }

    /// Adds a vertex unless one with the same key exists, returning the index
    /// of whichever vertex ends up in the graph. Pending edges that can now
    /// be attached are attached.
    pub fn add_vertex(&mut self, node: Node) -> NodeIndex {
        let key = node.key();

        if let Some(&index) = self.index.get(&key) {
            return index;
        }

        let index = self.inner.add_node(node);
        self.index.insert(key, index);

        let Graph {
            inner,
            index: lookup,
            pending,
            ..
        } = self;

        pending.retain(|(from, to)| match (lookup.get(from), lookup.get(to)) {
            (Some(&a), Some(&b)) => {
                inner.add_edge(a, b, ());
                false
            }
            _ => true,
        });

        index
    }

    /// Records the edge `from -> to`. Duplicate edges are ignored. If either
    /// endpoint is missing the edge is kept aside until the vertex is added.
    pub fn add_edge(&mut self, from: VertexKey, to: VertexKey) {
        if !self.seen.insert((from, to)) {
            return;
        }

        self.edges.push((from, to));

        match (self.index.get(&from), self.index.get(&to)) {
            (Some(&a), Some(&b)) => {
                self.inner.add_edge(a, b, ());
            }
            _ => self.pending.push((from, to)),
        }
    }

    /// Folds `other` into this graph. Vertices already present here are
    /// kept, edges are de-duplicated by their endpoints.
    pub fn merge(&mut self, other: Graph) {
        let Graph { inner, edges, .. } = other;

        for node in inner.into_nodes_edges().0 {
            self.add_vertex(node.weight);
        }

        for (from, to) in edges {
            self.add_edge(from, to);
        }
    }

    pub fn index_of(&self, key: &TypeKey) -> Option<NodeIndex> {
        self.index.get(&VertexKey::Type(*key)).copied()
    }

    pub fn contains_type(&self, key: &TypeKey) -> bool {
        self.index_of(key).is_some()
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.inner[index]
    }

    /// Providers with an edge into the vertex of `key`.
    pub fn providers_of(&self, key: &TypeKey) -> Vec<&Arc<ProviderNode>> {
        let Some(index) = self.index_of(key) else {
            return vec![];
        };

        let mut providers: Vec<_> = self
            .inner
            .neighbors_directed(index, Direction::Incoming)
            .filter_map(|source| self.inner[source].as_provider())
            .collect();

        // petgraph yields neighbours newest first
        providers.sort_by_key(|provider| provider.id());
        providers
    }

    /// Exactly one provider for `key`, or the configuration error explaining
    /// why there is not.
    pub(crate) fn provider_for(&self, key: &TypeKey) -> Result<&Arc<ProviderNode>, Error> {
        match self.providers_of(key).as_slice() {
            [] => Err(Error::UnresolvableType(key.name())),
            [provider] => Ok(*provider),
            providers => Err(Error::AmbiguousProvider {
                type_name: key.name(),
                providers: providers
                    .iter()
                    .map(|provider| provider.name().to_string().into())
                    .collect(),
            }),
        }
    }

    /// Types that `key` feeds into: the outputs of every provider consuming
    /// it.
    pub fn dependents_of(&self, key: &TypeKey) -> Vec<TypeKey> {
        let Some(index) = self.index_of(key) else {
            return vec![];
        };

        self.inner
            .neighbors_directed(index, Direction::Outgoing)
            .filter_map(|target| self.inner[target].as_provider())
            .flat_map(|provider| provider.outputs().iter().copied())
            .collect()
    }

    /// Edges recorded with an endpoint that never became a vertex.
    pub fn pending_edges(&self) -> &[(VertexKey, VertexKey)] {
        &self.pending
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn providers(&self) -> impl Iterator<Item = &Arc<ProviderNode>> {
        self.inner.node_weights().filter_map(Node::as_provider)
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("vertices", &self.inner.node_count())
            .field("edges", &self.edges.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Config;

    #[derive(Clone)]
    struct Pool;

    #[derive(Clone)]
    struct Repo;

    crate::injectable!(Config, Pool, Repo);

    #[test]
    fn test_from_provider() {
        let graph = Graph::from_provider(ProviderNode::from_handler(|_: Config| Pool)).unwrap();

        // provider, Pool, Config
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.pending_edges().is_empty());
        assert_eq!(graph.providers_of(&TypeKey::of::<Pool>()).len(), 1);
        assert!(graph.providers_of(&TypeKey::of::<Config>()).is_empty());
        assert_eq!(
            graph.dependents_of(&TypeKey::of::<Config>()),
            vec![TypeKey::of::<Pool>()]
        );
    }

    #[test]
    fn test_self_dependency_rejected() {
        let result = Graph::from_provider(ProviderNode::from_handler(|pool: Pool| pool));
        assert!(matches!(result, Err(Error::SelfDependency(_))));
    }

    #[test]
    fn test_add_vertex_idempotent() {
        let mut graph = Graph::new();
        let a = graph.add_vertex(Node::Value(TypeKey::of::<Pool>()));
        let b = graph.add_vertex(Node::Value(TypeKey::of::<Pool>()));

        assert_eq!(a, b);
        assert_eq!(graph.vertex_count(), 1);
    }

    #[test]
    fn test_pending_edge_attached_later() {
        let mut graph = Graph::new();
        let pool = VertexKey::Type(TypeKey::of::<Pool>());
        let repo = VertexKey::Type(TypeKey::of::<Repo>());

        graph.add_vertex(Node::Value(TypeKey::of::<Pool>()));
        graph.add_edge(pool, repo);
        graph.add_edge(pool, repo);

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.pending_edges().len(), 1);
        assert_eq!(graph.inner.edge_count(), 0);

        graph.add_vertex(Node::Value(TypeKey::of::<Repo>()));

        assert!(graph.pending_edges().is_empty());
        assert_eq!(graph.inner.edge_count(), 1);
    }

    #[test]
    fn test_merge_keeps_shared_types() {
        let mut graph = Graph::from_provider(ProviderNode::from_handler(|_: Config| Pool)).unwrap();
        let other = Graph::from_provider(ProviderNode::from_handler(|_: Pool| Repo)).unwrap();

        graph.merge(other);

        // two providers, Config, Pool, Repo
        assert_eq!(graph.vertex_count(), 5);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(
            graph.dependents_of(&TypeKey::of::<Pool>()),
            vec![TypeKey::of::<Repo>()]
        );
    }

    #[test]
    fn test_ambiguous_provider() {
        let mut graph = Graph::from_provider(ProviderNode::from_value(Pool)).unwrap();
        graph.merge(Graph::from_provider(ProviderNode::from_handler(|_: Config| Pool)).unwrap());

        assert_eq!(graph.providers_of(&TypeKey::of::<Pool>()).len(), 2);
        assert!(matches!(
            graph.provider_for(&TypeKey::of::<Pool>()),
            Err(Error::AmbiguousProvider { .. })
        ));
        assert!(matches!(
            graph.provider_for(&TypeKey::of::<Repo>()),
            Err(Error::UnresolvableType(_))
        ));
    }
}
