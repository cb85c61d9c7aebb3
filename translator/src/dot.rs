// dot.rs — Graphviz DOT output for invariant graphs
//
// Renders the invariant graph with one node per block and one edge per
// signal line. Edge labels list the informative facts known for the signal;
// edges on a resolved feedback loop are drawn red.
//
// Preconditions: `graph` was built from `model`.
// Postconditions: returns a DOT string; node order follows the graph.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::collections::HashSet;
use std::fmt::{self, Write};

use crate::feedback::{LoopOutcome, LoopRecord};
use crate::graph::InvariantGraph;
use crate::id::BlockId;
use crate::model::Model;

/// Emit the invariant graph as a Graphviz DOT string.
pub fn emit_dot(model: &Model, graph: &InvariantGraph, loops: &[LoopRecord]) -> String {
    let mut buf = String::new();
    // Writing into a String cannot fail.
    let _ = write_dot(&mut buf, model, graph, loops);
    buf
}

fn write_dot(
    buf: &mut String,
    model: &Model,
    graph: &InvariantGraph,
    loops: &[LoopRecord],
) -> fmt::Result {
    writeln!(buf, "digraph {} {{", sanitize(&model.name))?;
    writeln!(buf, "    rankdir=LR;")?;
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];")?;
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];")?;
    writeln!(buf)?;

    let representatives: HashSet<BlockId> =
        loops.iter().filter_map(|l| l.representative).collect();

    for node in graph.nodes() {
        let Some(block) = model.block(node.block) else {
            continue;
        };
        let shape = match block.block_type.as_str() {
            "Inport" | "Outport" => "ellipse",
            _ => "box",
        };
        let style = if representatives.contains(&block.id) {
            ", style=bold"
        } else {
            ""
        };
        writeln!(
            buf,
            "    n{} [label=\"{}\\n{}\", shape={}{}];",
            node.id.0,
            escape(&block.name),
            block.block_type,
            shape,
            style
        )?;
    }
    writeln!(buf)?;

    for edge in graph.edges() {
        let src_block = graph.node(edge.source).block;
        let dst_block = graph.node(edge.target).block;
        let on_loop = loops
            .iter()
            .any(|l| l.members.contains(&src_block) && l.members.contains(&dst_block));

        let mut label = escape(&edge.var);
        for fact in edge.facts().iter().filter(|f| !f.is_no_information()) {
            label.push_str("\\n");
            label.push_str(&escape(&fact.to_string()));
        }
        let attrs = if on_loop {
            ", color=red, penwidth=2"
        } else {
            ""
        };
        writeln!(
            buf,
            "    n{} -> n{} [label=\"{}\"{}];",
            edge.source.0, edge.target.0, label, attrs
        )?;
    }

    if !loops.is_empty() {
        writeln!(buf)?;
        for (i, l) in loops.iter().enumerate() {
            writeln!(buf, "    // loop {}: {}", i, outcome_label(&l.outcome))?;
        }
    }
    writeln!(buf, "}}")
}

fn outcome_label(outcome: &LoopOutcome) -> String {
    match outcome {
        LoopOutcome::Fixpoint { rounds, .. } => format!("fixpoint after {} rounds", rounds),
        LoopOutcome::SignFallback { rounds, fact } => match fact {
            Some(_) => format!("sign fact after {} rounds", rounds),
            None => format!("no fact after {} rounds", rounds),
        },
        LoopOutcome::Failed { .. } => "simulation failed".to_string(),
        LoopOutcome::Unsimulated => "not simulable".to_string(),
    }
}

/// Graph identifier: alphanumerics and underscores only.
fn sanitize(name: &str) -> String {
    let s: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if s.is_empty() {
        "model".to_string()
    } else {
        s
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::model::{Block, Signal};

    fn feedback_model() -> Model {
        Model::new(
            "fb-loop",
            vec![
                Block::new(1, "G", "Gain", 1, 1).with_param("Gain", "1"),
                Block::new(2, "D", "UnitDelay", 1, 1),
                Block::new(3, "Out", "Outport", 1, 0),
            ],
            vec![
                Signal::new(1, (1, 0), (2, 0)),
                Signal::new(2, (2, 0), (1, 0)),
                Signal::new(3, (2, 0), (3, 0)),
            ],
        )
    }

    #[test]
    fn header_and_sanitized_name() {
        let model = feedback_model();
        let graph = build_graph(&model, &model.topological_order()).graph;
        let dot = emit_dot(&model, &graph, &[]);
        assert!(dot.starts_with("digraph fb_loop {"));
        assert!(dot.trim_end().ends_with('}'));
        assert_eq!(dot.matches(" -> ").count(), 3);
    }

    #[test]
    fn loop_edges_are_red() {
        let model = feedback_model();
        let graph = build_graph(&model, &model.topological_order()).graph;
        let loops = vec![LoopRecord {
            members: vec![BlockId(1), BlockId(2)],
            representative: Some(BlockId(2)),
            outcome: LoopOutcome::Unsimulated,
        }];
        let dot = emit_dot(&model, &graph, &loops);
        assert_eq!(dot.matches("color=red").count(), 2);
        assert!(dot.contains("// loop 0: not simulable"));
    }
}
