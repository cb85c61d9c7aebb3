// graph.rs — Invariant graph construction and loop detection
//
// Wraps every block of the model in a node and every signal line in an edge,
// stored in arenas addressed by `NodeId`/`EdgeId` with hash indexes from the
// model identities. Edges own the facts describing their signal and track
// which facts have already been pushed across the downstream block.
//
// Preconditions: `order` lists the model's blocks (sorted prefix + residual).
// Postconditions: one node per reachable block, one edge per signal whose
//                 endpoints exist; counts cross-checked against the model.
// Failure modes: count mismatches → non-fatal E0101/E0102 diagnostics.
// Side effects: none.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::diag::{codes, Diagnostic};
use crate::id::{BlockId, EdgeId, IdAllocator, NodeId, SignalId};
use crate::info::{Category, Information, SignalboundaryInformation};
use crate::model::{Block, Model, PortRef, TopoOrder};
use crate::term::{Formula, RelOp, Relation, Term};

// ── Public types ────────────────────────────────────────────────────────────

/// A block of the model, with facts attached directly to it.
#[derive(Debug, Clone)]
pub struct InvariantNode {
    pub id: NodeId,
    pub block: BlockId,
    pub incoming: Vec<EdgeId>,
    pub outgoing: Vec<EdgeId>,
    facts: Vec<Information>,
}

impl InvariantNode {
    pub fn facts(&self) -> &[Information] {
        &self.facts
    }

    /// Attach a fact; returns false if an equal one is already present.
    pub fn add_fact(&mut self, fact: Information) -> bool {
        if self.facts.contains(&fact) {
            return false;
        }
        self.facts.push(fact);
        true
    }
}

/// A signal line with the facts known about its value.
#[derive(Debug, Clone)]
pub struct InvariantEdge {
    pub id: EdgeId,
    pub signal: SignalId,
    pub source: NodeId,
    pub target: NodeId,
    pub src_port: u32,
    pub dst_port: u32,
    /// Variable carrying the signal value (the source's output variable).
    pub var: String,
    facts: Vec<Information>,
    consumed: Vec<bool>,
}

impl InvariantEdge {
    pub fn facts(&self) -> &[Information] {
        &self.facts
    }

    pub fn term(&self) -> Term {
        Term::var(self.var.clone())
    }

    /// Append a fact unless an equal one is present. New facts are unconsumed.
    pub fn add_fact(&mut self, fact: Information) -> bool {
        if self.facts.contains(&fact) {
            return false;
        }
        self.facts.push(fact);
        self.consumed.push(false);
        true
    }

    /// Indices of facts not yet pushed across the target block.
    pub fn unconsumed(&self) -> Vec<usize> {
        (0..self.facts.len()).filter(|&i| !self.consumed[i]).collect()
    }

    pub fn mark_consumed(&mut self, index: usize) {
        if let Some(flag) = self.consumed.get_mut(index) {
            *flag = true;
        }
    }

    pub fn mark_all_consumed(&mut self) {
        self.consumed.iter_mut().for_each(|c| *c = true);
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.facts.iter().any(|f| f.category() == category)
    }

    /// Signal facts of this edge, each as one boundary disjunction.
    pub fn boundaries(&self) -> Vec<SignalboundaryInformation> {
        self.facts
            .iter()
            .filter_map(Information::as_boundary)
            .collect()
    }
}

/// The dataflow graph the inference engine works on.
#[derive(Debug, Default)]
pub struct InvariantGraph {
    nodes: Vec<InvariantNode>,
    edges: Vec<InvariantEdge>,
    node_index: HashMap<BlockId, NodeId>,
    edge_index: HashMap<SignalId, EdgeId>,
    ids: IdAllocator,
    security_obligations: Vec<Formula>,
    data_equalities: Vec<Relation>,
}

/// Result of graph construction.
#[derive(Debug)]
pub struct GraphResult {
    pub graph: InvariantGraph,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Graph API ───────────────────────────────────────────────────────────────

impl InvariantGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for `block`, created on first request.
    pub fn insert_node(&mut self, block: BlockId) -> NodeId {
        if let Some(&id) = self.node_index.get(&block) {
            return id;
        }
        let id = self.ids.alloc_node();
        self.nodes.push(InvariantNode {
            id,
            block,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            facts: Vec::new(),
        });
        self.node_index.insert(block, id);
        id
    }

    /// Edge for `signal`, created on first request.
    pub fn insert_edge(
        &mut self,
        signal: SignalId,
        (source, src_port): (NodeId, u32),
        (target, dst_port): (NodeId, u32),
        var: String,
    ) -> EdgeId {
        if let Some(&id) = self.edge_index.get(&signal) {
            return id;
        }
        let id = self.ids.alloc_edge();
        self.edges.push(InvariantEdge {
            id,
            signal,
            source,
            target,
            src_port,
            dst_port,
            var,
            facts: Vec::new(),
            consumed: Vec::new(),
        });
        self.edge_index.insert(signal, id);
        self.nodes[source.0 as usize].outgoing.push(id);
        self.nodes[target.0 as usize].incoming.push(id);
        id
    }

    pub fn nodes(&self) -> &[InvariantNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[InvariantEdge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> &InvariantNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut InvariantNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &InvariantEdge {
        &self.edges[id.0 as usize]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut InvariantEdge {
        &mut self.edges[id.0 as usize]
    }

    pub fn node_of(&self, block: BlockId) -> Option<NodeId> {
        self.node_index.get(&block).copied()
    }

    pub fn edge_of(&self, signal: SignalId) -> Option<EdgeId> {
        self.edge_index.get(&signal).copied()
    }

    /// Distinct source nodes of `node`'s incoming edges, in port order.
    pub fn predecessors(&self, node: NodeId) -> Vec<NodeId> {
        let mut incoming = self.node(node).incoming.clone();
        incoming.sort_by_key(|&e| self.edge(e).dst_port);
        let mut preds = Vec::new();
        for e in incoming {
            let src = self.edge(e).source;
            if !preds.contains(&src) {
                preds.push(src);
            }
        }
        preds
    }

    /// Distinct target nodes of `node`'s outgoing edges.
    pub fn successors(&self, node: NodeId) -> Vec<NodeId> {
        let mut succs = Vec::new();
        for &e in &self.node(node).outgoing {
            let dst = self.edge(e).target;
            if !succs.contains(&dst) {
                succs.push(dst);
            }
        }
        succs
    }

    /// Incoming edge feeding input port `port`.
    pub fn input_edge(&self, node: NodeId, port: u32) -> Option<EdgeId> {
        self.node(node)
            .incoming
            .iter()
            .copied()
            .find(|&e| self.edge(e).dst_port == port)
    }

    /// Nodes without outgoing edges, in insertion order.
    pub fn sinks(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.outgoing.is_empty())
            .map(|n| n.id)
            .collect()
    }

    pub fn security_obligations(&self) -> &[Formula] {
        &self.security_obligations
    }

    /// Record a proof obligation; returns false if already present.
    pub fn add_obligation(&mut self, obligation: Formula) -> bool {
        if self.security_obligations.contains(&obligation) {
            return false;
        }
        self.security_obligations.push(obligation);
        true
    }

    pub fn data_equalities(&self) -> &[Relation] {
        &self.data_equalities
    }

    pub fn add_data_equality(&mut self, relation: Relation) -> bool {
        if self.data_equalities.contains(&relation) {
            return false;
        }
        self.data_equalities.push(relation);
        true
    }
}

// ── Construction ────────────────────────────────────────────────────────────

/// Build the invariant graph by walking blocks in `order` and resolving the
/// signal feeding each input port.
pub fn build_graph(model: &Model, order: &TopoOrder) -> GraphResult {
    let mut graph = InvariantGraph::new();

    for block_id in order.all() {
        if model.block(block_id).is_none() {
            continue;
        }
        let target = graph.insert_node(block_id);

        let mut feeding: Vec<_> = model
            .signals
            .iter()
            .filter(|s| s.dst.block == block_id)
            .collect();
        feeding.sort_by_key(|s| s.dst.port);

        for signal in feeding {
            let Some(src_block) = model.block(signal.src.block) else {
                log::debug!("graph: signal {} has no source block", signal.id);
                continue;
            };
            let source = graph.insert_node(src_block.id);
            graph.insert_edge(
                signal.id,
                (source, signal.src.port),
                (target, signal.dst.port),
                src_block.output_var(signal.src.port),
            );
        }
    }

    let mut diagnostics = Vec::new();
    if graph.nodes.len() != model.blocks.len() {
        diagnostics.push(
            Diagnostic::error(
                codes::E0101,
                format!(
                    "invariant graph has {} nodes but the model has {} blocks",
                    graph.nodes.len(),
                    model.blocks.len()
                ),
            )
            .with_hint("duplicate block ids collapse into one node"),
        );
    }
    if graph.edges.len() != model.signals.len() {
        diagnostics.push(
            Diagnostic::error(
                codes::E0102,
                format!(
                    "invariant graph has {} edges but the model has {} signal lines",
                    graph.edges.len(),
                    model.signals.len()
                ),
            )
            .with_hint("check for signals with dangling endpoints"),
        );
    }
    log::debug!(
        "graph: built {} nodes, {} edges",
        graph.nodes.len(),
        graph.edges.len()
    );

    GraphResult { graph, diagnostics }
}

// ── Loop detection ──────────────────────────────────────────────────────────

/// Depth-first search for feedback loops along outgoing edges.
pub struct LoopAnalysis<'g> {
    graph: &'g InvariantGraph,
}

impl<'g> LoopAnalysis<'g> {
    pub fn new(graph: &'g InvariantGraph) -> Self {
        LoopAnalysis { graph }
    }

    /// Members of a loop closing back on `start`, beginning with `start` and
    /// following signal direction. Empty when `start` is on no loop.
    pub fn find_loop(&self, start: NodeId) -> Vec<NodeId> {
        let mut path = vec![start];
        let mut explored = HashSet::new();
        if self.extend(start, start, &mut path, &mut explored) {
            path
        } else {
            Vec::new()
        }
    }

    fn extend(
        &self,
        current: NodeId,
        start: NodeId,
        path: &mut Vec<NodeId>,
        explored: &mut HashSet<NodeId>,
    ) -> bool {
        for next in self.graph.successors(current) {
            if next == start {
                return true;
            }
            if path.contains(&next) || !explored.insert(next) {
                continue;
            }
            path.push(next);
            if self.extend(next, start, path, explored) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// Every loop closed by a back edge of a full depth-first traversal.
    pub fn all_loops(&self) -> Vec<Vec<NodeId>> {
        let mut loops = Vec::new();
        let mut visited = HashMap::new(); // 0 = unvisited, 1 = on path, 2 = done
        let mut path = Vec::new();
        for node in &self.graph.nodes {
            if *visited.get(&node.id).unwrap_or(&0) == 0 {
                self.dfs_loops(node.id, &mut visited, &mut path, &mut loops);
            }
        }
        loops
    }

    fn dfs_loops(
        &self,
        node: NodeId,
        visited: &mut HashMap<NodeId, u8>,
        path: &mut Vec<NodeId>,
        loops: &mut Vec<Vec<NodeId>>,
    ) {
        visited.insert(node, 1);
        path.push(node);
        for next in self.graph.successors(node) {
            match visited.get(&next).unwrap_or(&0) {
                0 => self.dfs_loops(next, visited, path, loops),
                1 => {
                    if let Some(pos) = path.iter().position(|&n| n == next) {
                        loops.push(path[pos..].to_vec());
                    }
                }
                _ => {}
            }
        }
        path.pop();
        visited.insert(node, 2);
    }

    /// All nodes lying on at least one loop.
    pub fn nodes_in_loops(&self) -> HashSet<NodeId> {
        self.graph
            .nodes
            .iter()
            .map(|n| n.id)
            .filter(|&id| !self.find_loop(id).is_empty())
            .collect()
    }
}

// ── Cross-block data equalities ─────────────────────────────────────────────

fn input_sources(model: &Model, block: &Block) -> Option<Vec<PortRef>> {
    (0..block.inputs)
        .map(|p| model.incoming_signal(block.id, p).map(|s| s.src))
        .collect()
}

/// `a_out = b_out` for every pair of blocks with the same type, the same
/// parameters and the same fully connected input sources.
pub fn find_data_equalities(model: &Model) -> Vec<Relation> {
    let mut found = Vec::new();
    for (i, a) in model.blocks.iter().enumerate() {
        if a.inputs == 0 || a.outputs == 0 {
            continue;
        }
        let Some(sources) = input_sources(model, a) else {
            continue;
        };
        for b in &model.blocks[i + 1..] {
            let same_shape = b.block_type == a.block_type
                && b.params == a.params
                && b.inputs == a.inputs
                && b.outputs == a.outputs;
            if !same_shape || input_sources(model, b).as_ref() != Some(&sources) {
                continue;
            }
            for k in 0..a.outputs {
                found.push(Relation::new(
                    Term::var(a.output_var(k)),
                    RelOp::Eq,
                    Term::var(b.output_var(k)),
                ));
            }
        }
    }
    found
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for InvariantGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "InvariantGraph ({} nodes, {} edges)",
            self.nodes.len(),
            self.edges.len()
        )?;
        for edge in &self.edges {
            writeln!(
                f,
                "  {} {}:{} -> {}:{} [{}]",
                edge.signal,
                self.node(edge.source).block,
                edge.src_port,
                self.node(edge.target).block,
                edge.dst_port,
                edge.var
            )?;
            for fact in &edge.facts {
                writeln!(f, "    {}", fact)?;
            }
        }
        if !self.security_obligations.is_empty() {
            writeln!(f, "  obligations: {}", self.security_obligations.len())?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{DataInformation, IntervalInformation};
    use crate::model::{Block, Signal};

    fn chain(n: u32) -> Model {
        let blocks = (1..=n)
            .map(|i| Block::new(i, format!("B{i}"), "Gain", 1, 1).with_param("Gain", "1"))
            .collect();
        let signals = (1..n).map(|i| Signal::new(i, (i, 0), (i + 1, 0))).collect();
        Model::new("chain", blocks, signals)
    }

    fn build(model: &Model) -> GraphResult {
        build_graph(model, &model.topological_order())
    }

    #[test]
    fn chain_counts_match_model() {
        let model = chain(5);
        let result = build(&model);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.graph.nodes().len(), 5);
        assert_eq!(result.graph.edges().len(), 4);
        assert_eq!(result.graph.edges()[0].var, "B1_out");
    }

    #[test]
    fn acyclic_chain_has_no_loops() {
        let model = chain(5);
        let graph = build(&model).graph;
        let loops = LoopAnalysis::new(&graph);
        for node in graph.nodes() {
            assert!(loops.find_loop(node.id).is_empty());
        }
        assert!(loops.all_loops().is_empty());
        assert!(loops.nodes_in_loops().is_empty());
    }

    #[test]
    fn feedback_loop_members_in_signal_order() {
        let model = Model::new(
            "fb",
            vec![
                Block::new(1, "G", "Gain", 1, 1),
                Block::new(2, "D", "UnitDelay", 1, 1),
                Block::new(3, "O", "Outport", 1, 0),
            ],
            vec![
                Signal::new(1, (1, 0), (2, 0)),
                Signal::new(2, (2, 0), (1, 0)),
                Signal::new(3, (2, 0), (3, 0)),
            ],
        );
        let graph = build(&model).graph;
        let g = graph.node_of(BlockId(1)).unwrap();
        let d = graph.node_of(BlockId(2)).unwrap();
        let loops = LoopAnalysis::new(&graph);
        assert_eq!(loops.find_loop(d), vec![d, g]);
        assert_eq!(loops.all_loops().len(), 1);
        assert_eq!(loops.nodes_in_loops().len(), 2);
    }

    #[test]
    fn dangling_signal_reports_edge_mismatch() {
        let model = Model::new(
            "dangling",
            vec![Block::new(1, "O", "Outport", 1, 0)],
            vec![Signal::new(1, (9, 0), (1, 0))],
        );
        let result = build(&model);
        assert_eq!(result.graph.edges().len(), 0);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, Some(codes::E0102));
    }

    #[test]
    fn insertion_is_idempotent() {
        let mut graph = InvariantGraph::new();
        let a = graph.insert_node(BlockId(1));
        let b = graph.insert_node(BlockId(2));
        assert_eq!(graph.insert_node(BlockId(1)), a);
        let e = graph.insert_edge(SignalId(5), (a, 0), (b, 0), "a_out".into());
        assert_eq!(graph.insert_edge(SignalId(5), (a, 0), (b, 0), "a_out".into()), e);
        assert_eq!(graph.node(a).outgoing, vec![e]);
        assert_eq!(graph.node(b).incoming, vec![e]);
    }

    #[test]
    fn edge_facts_dedup_and_track_consumption() {
        let mut graph = InvariantGraph::new();
        let a = graph.insert_node(BlockId(1));
        let b = graph.insert_node(BlockId(2));
        let e = graph.insert_edge(SignalId(1), (a, 0), (b, 0), "x".into());
        let fact = Information::Interval(IntervalInformation::closed(Term::var("x"), 0.0, 1.0));
        let edge = graph.edge_mut(e);
        assert!(edge.add_fact(fact.clone()));
        assert!(!edge.add_fact(fact));
        assert!(edge.add_fact(Information::Data(DataInformation::none())));
        assert_eq!(edge.unconsumed(), vec![0, 1]);
        edge.mark_consumed(0);
        assert_eq!(edge.unconsumed(), vec![1]);
        assert!(edge.has_category(Category::Data));
        assert!(!edge.has_category(Category::Control));
    }

    #[test]
    fn twin_blocks_yield_data_equality() {
        let model = Model::new(
            "twins",
            vec![
                Block::new(1, "A", "Inport", 0, 1),
                Block::new(2, "K1", "Gain", 1, 1).with_param("Gain", "2"),
                Block::new(3, "K2", "Gain", 1, 1).with_param("Gain", "2"),
                Block::new(4, "K3", "Gain", 1, 1).with_param("Gain", "3"),
            ],
            vec![
                Signal::new(1, (1, 0), (2, 0)),
                Signal::new(2, (1, 0), (3, 0)),
                Signal::new(3, (1, 0), (4, 0)),
            ],
        );
        let found = find_data_equalities(&model);
        assert_eq!(
            found,
            vec![Relation::new(Term::var("K1_out"), RelOp::Eq, Term::var("K2_out"))]
        );
    }

    #[test]
    fn obligations_are_deduplicated() {
        let mut graph = InvariantGraph::new();
        let ob = Formula::rel(Term::var("a"), crate::term::RelOp::Ne, Term::num(0.0));
        assert!(graph.add_obligation(ob.clone()));
        assert!(!graph.add_obligation(ob));
        assert_eq!(graph.security_obligations().len(), 1);
    }
}
