// propagate.rs — Forward information propagation over the invariant graph
//
// Visits blocks depth-first from the sinks so that every predecessor is done
// before a block is processed. Each unconsumed fact on an incoming edge is
// advanced across the block by its analyzer and written to the outgoing
// edges (or attached to the node); afterwards every outgoing edge is topped
// up with a baseline fact for each category it still lacks. Reaching a block
// that is already on the active visit path hands the enclosing loop to the
// feedback resolver.
//
// Preconditions: `graph` was built from `model`.
// Postconditions: every node is done; every outgoing edge carries at least
//                 one signal, control and data fact.
// Failure modes: none fatal; unknown block types → W0402, loop problems →
//                W0301..W0303.
// Side effects: mutates `graph`.

use std::collections::{HashMap, HashSet};

use crate::analyzer::{AnalyzerRegistry, ApplyContext, Applied, BlockAnalyzer};
use crate::config::AnalysisConfig;
use crate::diag::{codes, Diagnostic};
use crate::feedback::LoopRecord;
use crate::graph::InvariantGraph;
use crate::id::{EdgeId, NodeId};
use crate::info::{Information, ALL_CATEGORIES};
use crate::model::{Block, Model, TopoOrder};

// ── Public entry point ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PropagationResult {
    pub loops: Vec<LoopRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run forward propagation to completion.
pub fn propagate(
    model: &Model,
    order: &TopoOrder,
    graph: &mut InvariantGraph,
    registry: &AnalyzerRegistry,
    config: &AnalysisConfig,
) -> PropagationResult {
    let mut prop = Propagator::new(model, graph, registry, config);
    prop.seed_generated();

    let mut starts = prop.graph.sinks();
    if starts.is_empty() {
        log::debug!("propagate: no sinks, walking the topological order");
    }
    for block in order.all() {
        if let Some(node) = prop.graph.node_of(block) {
            if !starts.contains(&node) {
                starts.push(node);
            }
        }
    }
    for node in starts {
        prop.visit(node);
    }

    PropagationResult {
        loops: prop.loops,
        diagnostics: prop.diagnostics,
    }
}

// ── Propagation state ───────────────────────────────────────────────────────

pub(crate) struct Propagator<'a> {
    pub(crate) model: &'a Model,
    pub(crate) graph: &'a mut InvariantGraph,
    pub(crate) registry: &'a AnalyzerRegistry,
    pub(crate) config: &'a AnalysisConfig,
    pub(crate) done: HashSet<NodeId>,
    /// Nodes on the current depth-first path, innermost last.
    pub(crate) active: Vec<NodeId>,
    /// Members of loops whose resolution is in progress.
    pub(crate) resolving: HashSet<NodeId>,
    /// Facts already advanced across each node.
    seen: HashMap<NodeId, Vec<Information>>,
    warned_types: HashSet<String>,
    pub(crate) loops: Vec<LoopRecord>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl<'a> Propagator<'a> {
    pub(crate) fn new(
        model: &'a Model,
        graph: &'a mut InvariantGraph,
        registry: &'a AnalyzerRegistry,
        config: &'a AnalysisConfig,
    ) -> Self {
        Propagator {
            model,
            graph,
            registry,
            config,
            done: HashSet::new(),
            active: Vec::new(),
            resolving: HashSet::new(),
            seen: HashMap::new(),
            warned_types: HashSet::new(),
            loops: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn block_of(&self, node: NodeId) -> Option<&'a Block> {
        self.model.block(self.graph.node(node).block)
    }

    pub(crate) fn analyzer_of(&mut self, block: &Block) -> &'a dyn BlockAnalyzer {
        if !self.registry.contains(&block.block_type)
            && self.warned_types.insert(block.block_type.clone())
        {
            self.diagnostics.push(
                Diagnostic::warning(
                    codes::W0402,
                    format!("no analyzer for block type '{}'", block.block_type),
                )
                .at_block(block.id)
                .with_hint("facts stop at blocks of this type"),
            );
        }
        self.registry.lookup(&block.block_type)
    }

    /// Write every block's self-generated facts to its outgoing edges.
    fn seed_generated(&mut self) {
        let nodes: Vec<NodeId> = self.graph.nodes().iter().map(|n| n.id).collect();
        for node in nodes {
            let Some(block) = self.block_of(node) else {
                continue;
            };
            let analyzer = self.registry.lookup(&block.block_type);
            for fact in analyzer.generate_information(block) {
                self.write_outgoing(node, &fact);
            }
        }
    }

    /// Depth-first visit ensuring all predecessors are processed first.
    pub(crate) fn visit(&mut self, node: NodeId) {
        if self.done.contains(&node) || self.resolving.contains(&node) {
            return;
        }
        if self.active.contains(&node) {
            self.resolve_loop(node);
            self.done.insert(node);
            return;
        }

        self.active.push(node);
        for pred in self.graph.predecessors(node) {
            self.visit(pred);
        }
        self.active.pop();

        if self.done.contains(&node) {
            return;
        }
        self.process(node);
        self.done.insert(node);
    }

    /// Per-port input variables and current facts of `node`.
    pub(crate) fn inputs_of(&self, node: NodeId) -> (Vec<Option<String>>, Vec<Vec<Information>>) {
        let block_inputs = self.block_of(node).map(|b| b.inputs).unwrap_or(0);
        let incoming = &self.graph.node(node).incoming;
        let ports = incoming
            .iter()
            .map(|&e| self.graph.edge(e).dst_port + 1)
            .max()
            .unwrap_or(0)
            .max(block_inputs) as usize;
        let mut vars = vec![None; ports];
        let mut facts = vec![Vec::new(); ports];
        for &e in incoming {
            let edge = self.graph.edge(e);
            let p = edge.dst_port as usize;
            vars[p] = Some(edge.var.clone());
            facts[p].extend(edge.facts().iter().cloned());
        }
        (vars, facts)
    }

    /// Advance every unconsumed incoming fact across `node`, then fill
    /// category baselines on its outgoing edges.
    pub(crate) fn process(&mut self, node: NodeId) {
        let Some(block) = self.block_of(node) else {
            return;
        };
        let analyzer = self.analyzer_of(block);
        let (input_vars, input_facts) = self.inputs_of(node);

        let mut incoming: Vec<EdgeId> = self.graph.node(node).incoming.clone();
        incoming.sort_by_key(|&e| self.graph.edge(e).dst_port);

        for e in incoming {
            let port = self.graph.edge(e).dst_port;
            for idx in self.graph.edge(e).unconsumed() {
                let fact = self.graph.edge(e).facts()[idx].clone();
                let seen = self.seen.entry(node).or_default();
                if seen.contains(&fact) {
                    self.graph.edge_mut(e).mark_consumed(idx);
                    continue;
                }
                seen.push(fact.clone());

                let ctx = ApplyContext {
                    block,
                    port,
                    input_vars: &input_vars,
                    input_facts: &input_facts,
                };
                match analyzer.apply_information(&fact, &ctx) {
                    Applied::Propagate(out) if !out.is_no_information() => {
                        log::trace!("propagate: {} -> {}: {}", block.name, block.id, out);
                        self.write_outgoing(node, &out);
                    }
                    Applied::TerminalAtNode(out) => {
                        self.graph.node_mut(node).add_fact(out);
                    }
                    Applied::Propagate(_) | Applied::Terminal => {}
                }
                self.graph.edge_mut(e).mark_consumed(idx);
            }
        }

        self.fill_defaults(node, analyzer);
    }

    /// Write `fact` to every outgoing edge, retargeted to the edge variable.
    pub(crate) fn write_outgoing(&mut self, node: NodeId, fact: &Information) {
        let outgoing = self.graph.node(node).outgoing.clone();
        for e in outgoing {
            let term = self.graph.edge(e).term();
            self.graph.edge_mut(e).add_fact(fact.retarget(&term));
        }
    }

    pub(crate) fn fill_defaults(&mut self, node: NodeId, analyzer: &dyn BlockAnalyzer) {
        let outgoing = self.graph.node(node).outgoing.clone();
        for e in outgoing {
            for category in ALL_CATEGORIES {
                if self.graph.edge(e).has_category(category) {
                    continue;
                }
                let var = self.graph.edge(e).var.clone();
                for fact in analyzer.no_information_applied(&var, category) {
                    self.graph.edge_mut(e).add_fact(fact);
                }
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::id::BlockId;
    use crate::info::{Category, IntervalInformation, NumRange};
    use crate::model::Signal;
    use crate::term::Term;

    fn run(model: &Model, seed: impl FnOnce(&mut InvariantGraph)) -> (InvariantGraph, PropagationResult) {
        let order = model.topological_order();
        let mut graph = build_graph(model, &order).graph;
        seed(&mut graph);
        let result = propagate(
            model,
            &order,
            &mut graph,
            &AnalyzerRegistry::with_builtin(),
            &AnalysisConfig::default(),
        );
        (graph, result)
    }

    fn seed_interval(graph: &mut InvariantGraph, block: u32, lo: f64, hi: f64) {
        let node = graph.node_of(BlockId(block)).unwrap();
        for e in graph.node(node).outgoing.clone() {
            let term = graph.edge(e).term();
            graph
                .edge_mut(e)
                .add_fact(Information::Interval(IntervalInformation::closed(term, lo, hi)));
        }
    }

    #[test]
    fn gain_chain_scales_seed() {
        let model = Model::new(
            "m",
            vec![
                Block::new(1, "A", "Inport", 0, 1),
                Block::new(2, "K", "Gain", 1, 1).with_param("Gain", "3"),
                Block::new(3, "Out", "Outport", 1, 0),
            ],
            vec![Signal::new(1, (1, 0), (2, 0)), Signal::new(2, (2, 0), (3, 0))],
        );
        let (graph, result) = run(&model, |g| seed_interval(g, 1, -1.0, 2.0));
        assert!(result.diagnostics.is_empty());
        let edge = &graph.edges()[graph.edge_of(crate::id::SignalId(2)).unwrap().0 as usize];
        let hulls: Vec<_> = edge.boundaries().iter().filter_map(|b| b.hull()).collect();
        assert!(hulls.contains(&NumRange::closed(-3.0, 6.0)));
        let out = graph.node(graph.node_of(BlockId(3)).unwrap());
        assert_eq!(out.facts().len(), 1);
    }

    #[test]
    fn every_outgoing_edge_has_all_categories() {
        let model = Model::new(
            "m",
            vec![
                Block::new(1, "A", "Inport", 0, 1),
                Block::new(2, "X", "SFunction", 1, 1),
                Block::new(3, "Out", "Outport", 1, 0),
            ],
            vec![Signal::new(1, (1, 0), (2, 0)), Signal::new(2, (2, 0), (3, 0))],
        );
        let (graph, result) = run(&model, |_| {});
        for edge in graph.edges() {
            for category in ALL_CATEGORIES {
                assert!(edge.has_category(category), "{} lacks {:?}", edge.var, category);
            }
        }
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, Some(codes::W0402));
    }

    #[test]
    fn facts_are_consumed_once() {
        let model = Model::new(
            "m",
            vec![
                Block::new(1, "A", "Inport", 0, 1),
                Block::new(2, "Out", "Outport", 1, 0),
            ],
            vec![Signal::new(1, (1, 0), (2, 0))],
        );
        let (graph, _) = run(&model, |g| seed_interval(g, 1, 0.0, 1.0));
        let edge = &graph.edges()[0];
        assert!(edge.unconsumed().is_empty());
        assert!(edge.has_category(Category::Signal));
        assert_eq!(
            graph.node(graph.node_of(BlockId(2)).unwrap()).facts()[0].subject(),
            Some(&Term::var("Out"))
        );
    }
}
