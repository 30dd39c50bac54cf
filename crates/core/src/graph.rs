use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
};

use crate::Error;

/// A directed graph of units whose edges are variable connections.
///
/// Each input has at most one source; an output may feed any number of
/// inputs. Cycles are allowed and become coupled [`Block`]s.
#[derive(Debug, Default)]
pub struct ConnectionGraph {
    graph: DiGraph<String, Connection>,
    node_map: HashMap<String, NodeIndex>,
    inputs: Vec<Target>,
    sources: HashMap<Target, Source>,
}

/// A unit, or group of mutually dependent units, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// A unit that can be evaluated once its upstream blocks are done.
    Single(String),

    /// Units in a dependency cycle that must be converged together.
    Coupled(Vec<String>),
}

impl Block {
    /// Returns the units in this block, in declaration order.
    #[must_use]
    pub fn units(&self) -> &[String] {
        match self {
            Self::Single(name) => std::slice::from_ref(name),
            Self::Coupled(names) => names,
        }
    }

    #[must_use]
    pub fn is_coupled(&self) -> bool {
        matches!(self, Self::Coupled(_))
    }
}

impl ConnectionGraph {
    /// Creates an empty connection graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit and the inputs it declares.
    ///
    /// Units keep the order in which they are added; that order breaks ties
    /// in [`ConnectionGraph::topological_order`].
    pub fn add_unit<I, S>(&mut self, unit: &str, inputs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.get_or_add_unit(unit);
        self.inputs
            .extend(inputs.into_iter().map(|input| Target::new(unit, input)));
    }

    /// Connects a source output to a target input.
    ///
    /// Units that are not yet in the graph are added automatically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateConnection`] if the target already has a source.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::ConnectionGraph;
    ///
    /// let mut graph = ConnectionGraph::new();
    /// graph.add_connection(("a", "y"), ("b", "x")).unwrap();
    /// assert!(graph.add_connection(("c", "y"), ("b", "x")).is_err());
    /// ```
    pub fn add_connection<S: Into<Source>, T: Into<Target>>(
        &mut self,
        source: S,
        target: T,
    ) -> Result<(), Error> {
        let source = source.into();
        let target = target.into();

        if let Some(existing) = self.sources.get(&target) {
            return Err(Error::DuplicateConnection {
                target: target.to_string(),
                existing: existing.to_string(),
                source_name: source.to_string(),
            });
        }

        let source_index = self.get_or_add_unit(&source.unit);
        let target_index = self.get_or_add_unit(&target.unit);
        self.sources.insert(target.clone(), source.clone());
        self.graph
            .add_edge(source_index, target_index, Connection { source, target });
        Ok(())
    }

    /// Returns the source feeding `target`, if any.
    #[must_use]
    pub fn source_of(&self, target: &Target) -> Option<&Source> {
        self.sources.get(target)
    }

    /// Returns units grouped into blocks, in an order where every block comes
    /// after the blocks it depends on.
    ///
    /// Strongly connected components (including a unit connected to itself)
    /// become [`Block::Coupled`]. Among blocks that are ready at the same
    /// time, the one holding the earliest-added unit goes first.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::{Block, ConnectionGraph};
    ///
    /// let mut graph = ConnectionGraph::new();
    /// graph.add_connection(("a", "y"), ("b", "x")).unwrap();
    /// graph.add_connection(("b", "y"), ("c", "x")).unwrap();
    /// graph.add_connection(("c", "z"), ("b", "w")).unwrap();
    ///
    /// let order = graph.topological_order();
    /// assert_eq!(order[0], Block::Single("a".into()));
    /// assert_eq!(order[1], Block::Coupled(vec!["b".into(), "c".into()]));
    /// ```
    #[must_use]
    pub fn topological_order(&self) -> Vec<Block> {
        let components = tarjan_scc(&self.graph);

        let mut component_of = vec![0; self.graph.node_count()];
        let mut members: Vec<Vec<NodeIndex>> = Vec::with_capacity(components.len());
        for (c, mut nodes) in components.into_iter().enumerate() {
            nodes.sort_unstable();
            for &node in &nodes {
                component_of[node.index()] = c;
            }
            members.push(nodes);
        }

        let n = members.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];
        let mut self_loop = vec![false; n];
        for edge in self.graph.raw_edges() {
            let from = component_of[edge.source().index()];
            let to = component_of[edge.target().index()];
            if from == to {
                self_loop[from] = true;
            } else if !successors[from].contains(&to) {
                successors[from].push(to);
                in_degree[to] += 1;
            }
        }

        // Kahn's algorithm, keyed by each component's earliest node.
        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..n)
            .filter(|&c| in_degree[c] == 0)
            .map(|c| Reverse((members[c][0].index(), c)))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse((_, c))) = ready.pop() {
            let names: Vec<String> = members[c].iter().map(|&i| self.graph[i].clone()).collect();
            let block = if names.len() > 1 || self_loop[c] {
                Block::Coupled(names)
            } else {
                Block::Single(names.into_iter().next().unwrap_or_default())
            };
            order.push(block);

            for &next in &successors[c] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse((members[next][0].index(), next)));
                }
            }
        }
        order
    }

    /// Returns every registered input that has no source.
    ///
    /// This is a diagnostic: unconnected inputs keep their default values and
    /// become independent variables of the model.
    #[must_use]
    pub fn validate(&self) -> Vec<Target> {
        self.inputs
            .iter()
            .filter(|target| !self.sources.contains_key(target))
            .cloned()
            .collect()
    }

    /// Returns the number of units in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of connections in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the connections feeding a unit.
    pub fn incoming_connections(&self, unit: &str) -> impl Iterator<Item = &Connection> {
        self.node_map
            .get(unit)
            .into_iter()
            .flat_map(|&node| self.graph.edges_directed(node, Direction::Incoming))
            .map(|edge| edge.weight())
    }

    /// Returns the connections leaving a unit.
    pub fn outgoing_connections(&self, unit: &str) -> impl Iterator<Item = &Connection> {
        self.node_map
            .get(unit)
            .into_iter()
            .flat_map(|&node| self.graph.edges_directed(node, Direction::Outgoing))
            .map(|edge| edge.weight())
    }

    fn get_or_add_unit(&mut self, unit: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(unit) {
            return index;
        }
        let index = self.graph.add_node(unit.to_owned());
        self.node_map.insert(unit.to_owned(), index);
        index
    }
}

/// The output end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub unit: String,
    pub output: String,
}

impl Source {
    #[must_use]
    pub fn new(unit: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            output: output.into(),
        }
    }
}

/// The input end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub unit: String,
    pub input: String,
}

impl Target {
    #[must_use]
    pub fn new(unit: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            input: input.into(),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.unit, self.output)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.unit, self.input)
    }
}

/// A directed connection from an output to an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: Source,
    pub target: Target,
}

impl<T: Into<String>> From<(T, T)> for Source {
    fn from((unit, output): (T, T)) -> Self {
        Self::new(unit, output)
    }
}

impl<T: Into<String>> From<(T, T)> for Target {
    fn from((unit, input): (T, T)) -> Self {
        Self::new(unit, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(block: &Block) -> Vec<&str> {
        block.units().iter().map(String::as_str).collect()
    }

    #[test]
    fn orders_acyclic_chain() {
        let mut graph = ConnectionGraph::new();
        graph.add_unit("c", ["x"]);
        graph.add_unit("b", ["x"]);
        graph.add_unit("a", Vec::<String>::new());
        graph.add_connection(("a", "y"), ("b", "x")).unwrap();
        graph.add_connection(("b", "y"), ("c", "x")).unwrap();

        let order = graph.topological_order();
        let flat: Vec<_> = order.iter().flat_map(names).collect();
        assert_eq!(flat, vec!["a", "b", "c"]);
        assert!(order.iter().all(|b| !b.is_coupled()));
    }

    #[test]
    fn independent_units_keep_insertion_order() {
        let mut graph = ConnectionGraph::new();
        graph.add_unit("first", ["x"]);
        graph.add_unit("second", ["x"]);
        graph.add_unit("third", ["x"]);

        let flat: Vec<_> = graph
            .topological_order()
            .iter()
            .flat_map(|b| b.units().to_vec())
            .collect();
        assert_eq!(flat, vec!["first", "second", "third"]);
    }

    #[test]
    fn collapses_cycles_into_coupled_blocks() {
        let mut graph = ConnectionGraph::new();
        graph.add_unit("src", Vec::<String>::new());
        graph.add_unit("d1", ["x", "y2"]);
        graph.add_unit("d2", ["y1"]);
        graph.add_unit("obj", ["y1", "y2"]);
        graph.add_connection(("src", "x"), ("d1", "x")).unwrap();
        graph.add_connection(("d1", "y1"), ("d2", "y1")).unwrap();
        graph.add_connection(("d2", "y2"), ("d1", "y2")).unwrap();
        graph.add_connection(("d1", "y1"), ("obj", "y1")).unwrap();
        graph.add_connection(("d2", "y2"), ("obj", "y2")).unwrap();

        let order = graph.topological_order();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], Block::Single("src".into()));
        assert_eq!(order[1], Block::Coupled(vec!["d1".into(), "d2".into()]));
        assert_eq!(order[2], Block::Single("obj".into()));
    }

    #[test]
    fn self_connection_is_coupled() {
        let mut graph = ConnectionGraph::new();
        graph.add_connection(("a", "y"), ("a", "x")).unwrap();
        assert_eq!(
            graph.topological_order(),
            vec![Block::Coupled(vec!["a".into()])]
        );
    }

    #[test]
    fn rejects_second_source_for_an_input() {
        let mut graph = ConnectionGraph::new();
        graph.add_connection(("a", "y"), ("c", "x")).unwrap();
        let err = graph.add_connection(("b", "y"), ("c", "x")).unwrap_err();
        assert!(matches!(err, Error::DuplicateConnection { .. }));
        assert_eq!(graph.edge_count(), 1);

        // Fan-out from one output is fine.
        graph.add_connection(("a", "y"), ("d", "x")).unwrap();
        assert_eq!(graph.outgoing_connections("a").count(), 2);
    }

    #[test]
    fn validate_lists_unconnected_inputs() {
        let mut graph = ConnectionGraph::new();
        graph.add_unit("a", ["p"]);
        graph.add_unit("b", ["x", "q"]);
        graph.add_connection(("a", "y"), ("b", "x")).unwrap();

        let missing: Vec<String> = graph.validate().iter().map(ToString::to_string).collect();
        assert_eq!(missing, vec!["a.p", "b.q"]);
    }
}
