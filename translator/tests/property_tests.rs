// Property-based tests for translator invariants.
//
// Two categories:
// 1. Graph construction: acyclic, fully connected models yield one node per
//    block, one edge per signal line and no loops.
// 2. Macro closure: finalizing a dataflow-ordered macro set removes every
//    placeholder from the replacements and is idempotent.
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use hpt::config::AnalysisConfig;
use hpt::graph::{build_graph, LoopAnalysis};
use hpt::macros::{finalize, Macro};
use hpt::model::{Block, Model, Signal};
use hpt::pipeline::{translate, TranslationContext};
use hpt::term::Term;
use proptest::prelude::*;

// ── Model generator ─────────────────────────────────────────────────────────

/// Block 1 is an inport; every later block is a two-input Sum fed from
/// earlier blocks, so the diagram is acyclic by construction. The last
/// block drives an outport.
fn arb_acyclic_model() -> impl Strategy<Value = Model> {
    prop::collection::vec((any::<u32>(), any::<u32>()), 1..10).prop_map(|picks| {
        let mut blocks = vec![Block::new(1, "In", "Inport", 0, 1)];
        let mut signals = Vec::new();
        let mut next_signal = 1;
        for (i, (a, b)) in picks.iter().enumerate() {
            let id = i as u32 + 2;
            blocks.push(Block::new(id, format!("S{}", id), "Sum", 2, 1).with_param("Inputs", "+-"));
            for (port, pick) in [*a, *b].into_iter().enumerate() {
                let src = 1 + pick % (id - 1);
                signals.push(Signal::new(next_signal, (src, 0), (id, port as u32)));
                next_signal += 1;
            }
        }
        let last = picks.len() as u32 + 1;
        let out = last + 1;
        blocks.push(Block::new(out, "Out", "Outport", 1, 0));
        signals.push(Signal::new(next_signal, (last, 0), (out, 0)));
        Model::new("generated", blocks, signals)
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn acyclic_graph_matches_model(model in arb_acyclic_model()) {
        let order = model.topological_order();
        prop_assert!(order.residual.is_empty());
        let built = build_graph(&model, &order);
        prop_assert!(built.diagnostics.is_empty(), "{:?}", built.diagnostics);
        prop_assert_eq!(built.graph.nodes().len(), model.blocks.len());
        prop_assert_eq!(built.graph.edges().len(), model.signals.len());
        prop_assert!(LoopAnalysis::new(&built.graph).all_loops().is_empty());
    }

    #[test]
    fn acyclic_translation_has_no_errors(model in arb_acyclic_model()) {
        let t = translate(&model, &TranslationContext::new(AnalysisConfig::default()));
        prop_assert!(!t.has_errors(), "{:?}", t.diagnostics);
        prop_assert!(t.loops.is_empty());
        let symbolic = t.model.as_ref().unwrap();
        for block in model.blocks.iter().filter(|b| b.block_type == "Sum") {
            prop_assert!(!symbolic.mentions(&block.output_var(0)));
        }
    }
}

// ── Macro generator ─────────────────────────────────────────────────────────

/// `x{i} := k * x{j} + x{m}` with j, m < i, or a free input `u` for i = 0.
fn arb_macro_chain() -> impl Strategy<Value = Vec<Macro>> {
    prop::collection::vec((1u32..9, any::<u32>(), any::<u32>()), 1..10).prop_map(|specs| {
        specs
            .iter()
            .enumerate()
            .map(|(i, (k, j, m))| {
                let operand = |pick: u32| {
                    if i == 0 {
                        Term::var("u")
                    } else {
                        Term::var(format!("x{}", pick as usize % i))
                    }
                };
                let replacement = Term::num(f64::from(*k))
                    .mul(operand(*j))
                    .add(operand(*m));
                Macro::simple(format!("x{}", i), replacement)
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn closure_eliminates_placeholders(macros in arb_macro_chain()) {
        let placeholders: Vec<String> =
            macros.iter().map(|m| m.placeholder().to_string()).collect();
        let closed = finalize(macros).unwrap();
        prop_assert_eq!(closed.len(), placeholders.len());
        for m in &closed {
            for p in &placeholders {
                prop_assert!(!m.contains_term(p), "{} still mentions {}", m, p);
            }
        }
    }

    #[test]
    fn closure_is_idempotent(macros in arb_macro_chain()) {
        let once = finalize(macros).unwrap();
        let twice = finalize(once.clone()).unwrap();
        prop_assert_eq!(once, twice);
    }
}
