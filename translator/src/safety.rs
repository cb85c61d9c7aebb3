// safety.rs — Security-obligation synthesis from propagated facts
//
// Four checks over the finished invariant graph:
//   - division: every divisor input whose facts admit zero needs `d != 0`;
//   - integrator overflow: unsaturated integrators whose input may be
//     negative (positive) need a lower (upper) bound on their output;
//   - feedthrough overflow: edges whose facts reach past the integer limits;
//   - loop overflow: arithmetic blocks on a feedback loop get both bounds.
// Obligations are deduplicated by the graph.
//
// Preconditions: propagation has finished.
// Postconditions: the graph's obligation list holds every derived formula.
// Failure modes: oracle errors and unknowns count as "possible".
// Side effects: mutates the graph's obligation list.

use crate::analyzer::product_ops;
use crate::config::AnalysisConfig;
use crate::graph::{InvariantGraph, LoopAnalysis};
use crate::info::{Category, Information};
use crate::model::Model;
use crate::oracle::{SatOracle, SatResult};
use crate::term::{Formula, RelOp, Term};

const LOOP_ARITHMETIC: [&str; 6] = ["Gain", "Product", "Sum", "Add", "Subtract", "Divide"];

#[derive(Debug, Default)]
pub struct SafetyResult {
    /// Obligations newly added by this pass, in derivation order.
    pub added: Vec<Formula>,
}

pub fn upper_bound(var: &str, config: &AnalysisConfig) -> Formula {
    Formula::rel(Term::var(var), RelOp::Le, Term::num(config.max_int_f64()))
}

pub fn lower_bound(var: &str, config: &AnalysisConfig) -> Formula {
    Formula::rel(Term::var(var), RelOp::Ge, Term::num(config.min_int_f64()))
}

pub fn nonzero(var: &str) -> Formula {
    Formula::rel(Term::var(var), RelOp::Ne, Term::num(0.0))
}

struct SafetyCtx<'a> {
    model: &'a Model,
    oracle: &'a dyn SatOracle,
    config: &'a AnalysisConfig,
    added: Vec<Formula>,
}

impl<'a> SafetyCtx<'a> {
    fn emit(&mut self, graph: &mut InvariantGraph, obligation: Formula) {
        if graph.add_obligation(obligation.clone()) {
            log::debug!("safety: obligation {}", obligation);
            self.added.push(obligation);
        }
    }
}

/// Derive every obligation and record it on the graph.
pub fn analyze_safety(
    model: &Model,
    graph: &mut InvariantGraph,
    oracle: &dyn SatOracle,
    config: &AnalysisConfig,
) -> SafetyResult {
    let mut ctx = SafetyCtx {
        model,
        oracle,
        config,
        added: Vec::new(),
    };
    check_division(&mut ctx, graph);
    check_integrators(&mut ctx, graph);
    check_feedthrough(&mut ctx, graph);
    check_loops(&mut ctx, graph);
    SafetyResult { added: ctx.added }
}

/// Signal facts that carry some information.
fn informative(facts: &[Information]) -> Vec<&Information> {
    facts
        .iter()
        .filter(|f| f.category() == Category::Signal && !f.is_no_information())
        .collect()
}

fn check_division(ctx: &mut SafetyCtx<'_>, graph: &mut InvariantGraph) {
    let nodes: Vec<_> = graph.nodes().iter().map(|n| (n.id, n.block)).collect();
    for (node, block_id) in nodes {
        let Some(block) = ctx.model.block(block_id) else {
            continue;
        };
        if !matches!(block.block_type.as_str(), "Product" | "Divide") {
            continue;
        }
        for (port, op) in product_ops(block).into_iter().enumerate() {
            if op != '/' {
                continue;
            }
            let Some(e) = graph.input_edge(node, port as u32) else {
                continue;
            };
            let edge = graph.edge(e);
            let excludes_zero = informative(edge.facts())
                .iter()
                .any(|f| !f.crosses_zero());
            if !excludes_zero {
                let ob = nonzero(&edge.var);
                ctx.emit(graph, ob);
            }
        }
    }
}

fn check_integrators(ctx: &mut SafetyCtx<'_>, graph: &mut InvariantGraph) {
    let nodes: Vec<_> = graph.nodes().iter().map(|n| (n.id, n.block)).collect();
    for (node, block_id) in nodes {
        let Some(block) = ctx.model.block(block_id) else {
            continue;
        };
        if !matches!(block.block_type.as_str(), "Integrator" | "DiscreteIntegrator") {
            continue;
        }
        if block.param_on("LimitOutput") || block.param_on("WrapState") {
            continue;
        }
        let out = block.output_var(0);
        let input = graph.input_edge(node, 0).map(|e| graph.edge(e));
        let facts: Vec<Formula> = input
            .map(|edge| {
                informative(edge.facts())
                    .iter()
                    .map(|f| f.to_formula())
                    .collect()
            })
            .unwrap_or_default();

        let (may_decrease, may_increase) = match input {
            Some(edge) if !facts.is_empty() => {
                let known = Formula::and(facts);
                let input_term = edge.term();
                let query = |op: RelOp| {
                    let f = Formula::and(vec![
                        known.clone(),
                        Formula::rel(input_term.clone(), op, Term::num(0.0)),
                    ]);
                    let verdict = ctx.oracle.check(&f);
                    if let SatResult::Error(msg) = &verdict {
                        log::warn!("safety: oracle error on {}: {}", f, msg);
                    }
                    verdict.is_possible()
                };
                (query(RelOp::Lt), query(RelOp::Gt))
            }
            // No usable fact on the input: the state may move either way.
            _ => (true, true),
        };
        if may_decrease {
            let ob = lower_bound(&out, ctx.config);
            ctx.emit(graph, ob);
        }
        if may_increase {
            let ob = upper_bound(&out, ctx.config);
            ctx.emit(graph, ob);
        }
    }
}

fn check_feedthrough(ctx: &mut SafetyCtx<'_>, graph: &mut InvariantGraph) {
    let max = ctx.config.max_int_f64();
    let min = ctx.config.min_int_f64();
    let mut found = Vec::new();
    for edge in graph.edges() {
        for boundary in edge.boundaries() {
            let Some(hull) = boundary.hull() else {
                continue;
            };
            if hull.hi.is_finite() && hull.hi > max {
                found.push(upper_bound(&edge.var, ctx.config));
            }
            if hull.lo.is_finite() && hull.lo < min {
                found.push(lower_bound(&edge.var, ctx.config));
            }
        }
    }
    for ob in found {
        ctx.emit(graph, ob);
    }
}

fn check_loops(ctx: &mut SafetyCtx<'_>, graph: &mut InvariantGraph) {
    let in_loops = LoopAnalysis::new(graph).nodes_in_loops();
    let mut found = Vec::new();
    for node in graph.nodes() {
        if !in_loops.contains(&node.id) {
            continue;
        }
        let Some(block) = ctx.model.block(node.block) else {
            continue;
        };
        if LOOP_ARITHMETIC.contains(&block.block_type.as_str()) {
            let out = block.output_var(0);
            found.push(upper_bound(&out, ctx.config));
            found.push(lower_bound(&out, ctx.config));
        }
    }
    for ob in found {
        ctx.emit(graph, ob);
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::BlockId;
    use crate::info::IntervalInformation;
    use crate::model::{Block, Signal};
    use crate::oracle::IntervalOracle;

    fn graph_for(model: &Model) -> InvariantGraph {
        crate::graph::build_graph(model, &model.topological_order()).graph
    }

    fn seed(graph: &mut InvariantGraph, block: u32, lo: f64, hi: f64) {
        let node = graph.node_of(BlockId(block)).unwrap();
        for e in graph.node(node).outgoing.clone() {
            let t = graph.edge(e).term();
            graph
                .edge_mut(e)
                .add_fact(Information::Interval(IntervalInformation::closed(t, lo, hi)));
        }
    }

    fn divide_model() -> Model {
        Model::new(
            "div",
            vec![
                Block::new(1, "C", "Constant", 0, 1).with_param("Value", "1"),
                Block::new(2, "A", "Inport", 0, 1),
                Block::new(3, "Div", "Divide", 2, 1),
            ],
            vec![Signal::new(1, (1, 0), (3, 0)), Signal::new(2, (2, 0), (3, 1))],
        )
    }

    #[test]
    fn unknown_divisor_needs_obligation() {
        let model = divide_model();
        let mut graph = graph_for(&model);
        let result = analyze_safety(
            &model,
            &mut graph,
            &IntervalOracle::default(),
            &AnalysisConfig::default(),
        );
        assert_eq!(result.added, vec![nonzero("A_out")]);
    }

    #[test]
    fn positive_divisor_needs_none() {
        let model = divide_model();
        let mut graph = graph_for(&model);
        seed(&mut graph, 2, 1.0, 2.0);
        let result = analyze_safety(
            &model,
            &mut graph,
            &IntervalOracle::default(),
            &AnalysisConfig::default(),
        );
        assert!(result.added.is_empty());
    }

    #[test]
    fn feedthrough_overflow_uses_finite_bounds() {
        let model = Model::new(
            "big",
            vec![
                Block::new(1, "A", "Inport", 0, 1),
                Block::new(2, "Out", "Outport", 1, 0),
            ],
            vec![Signal::new(1, (1, 0), (2, 0))],
        );
        let mut graph = graph_for(&model);
        seed(&mut graph, 1, -1.0, 1e12);
        let config = AnalysisConfig::default();
        let result = analyze_safety(&model, &mut graph, &IntervalOracle::default(), &config);
        assert_eq!(result.added, vec![upper_bound("A_out", &config)]);
    }

    #[test]
    fn saturated_integrator_is_exempt() {
        let model = Model::new(
            "int",
            vec![
                Block::new(1, "A", "Inport", 0, 1),
                Block::new(2, "I", "Integrator", 1, 1).with_param("LimitOutput", "on"),
            ],
            vec![Signal::new(1, (1, 0), (2, 0))],
        );
        let mut graph = graph_for(&model);
        let result = analyze_safety(
            &model,
            &mut graph,
            &IntervalOracle::default(),
            &AnalysisConfig::default(),
        );
        assert!(result.added.is_empty());
    }
}
