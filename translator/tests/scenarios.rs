// End-to-end translation scenarios.
//
// Each test builds a small model through the library API, optionally seeds
// user facts from a side-input document, runs the full pass pipeline and
// checks the graph, loop records and obligations that come out.

use hpt::config::AnalysisConfig;
use hpt::diag::codes;
use hpt::feedback::LoopOutcome;
use hpt::graph::{build_graph, LoopAnalysis};
use hpt::id::BlockId;
use hpt::info::NumRange;
use hpt::model::{Block, Model, Signal};
use hpt::pipeline::{translate, Translation, TranslationContext};
use hpt::side_input::SideInput;

// ── Test helpers ────────────────────────────────────────────────────────────

fn interval_side_input(block: &str, lo: &str, hi: &str) -> SideInput {
    let doc = format!(
        r#"<invariants>
  <block name="{block}">
    <port index="1">
      <disjunction><interval lower="{lo}" upper="{hi}"/></disjunction>
    </port>
  </block>
</invariants>"#
    );
    SideInput::parse_str(&doc).unwrap_or_else(|e| panic!("bad side input: {}", e))
}

fn nonzero_side_input(block: &str) -> SideInput {
    let doc = format!(
        r#"<invariants>
  <block name="{block}">
    <port index="1">
      <disjunction><equality op="!=" value="0"/></disjunction>
    </port>
  </block>
</invariants>"#
    );
    SideInput::parse_str(&doc).unwrap_or_else(|e| panic!("bad side input: {}", e))
}

fn run(model: &Model, side: Option<SideInput>) -> Translation {
    let mut ctx = TranslationContext::new(AnalysisConfig::default());
    if let Some(side) = side {
        ctx = ctx.with_side_input(side);
    }
    translate(model, &ctx)
}

fn obligations(t: &Translation) -> Vec<String> {
    t.graph
        .as_ref()
        .map(|g| {
            g.security_obligations()
                .iter()
                .map(|o| o.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn divide_model() -> Model {
    Model::new(
        "divide",
        vec![
            Block::new(1, "C", "Constant", 0, 1).with_param("Value", "1"),
            Block::new(2, "A", "Inport", 0, 1),
            Block::new(3, "Div", "Divide", 2, 1),
            Block::new(4, "Out", "Outport", 1, 0),
        ],
        vec![
            Signal::new(1, (1, 0), (3, 0)),
            Signal::new(2, (2, 0), (3, 1)),
            Signal::new(3, (3, 0), (4, 0)),
        ],
    )
}

// ── Division obligations ────────────────────────────────────────────────────

#[test]
fn divisor_crossing_zero_needs_obligation() {
    let t = run(&divide_model(), Some(interval_side_input("A", "-1", "1")));
    assert_eq!(obligations(&t), vec!["A_out != 0".to_string()]);
}

#[test]
fn positive_divisor_needs_no_obligation() {
    let t = run(&divide_model(), Some(interval_side_input("A", "1", "2")));
    assert!(obligations(&t).is_empty(), "{:?}", obligations(&t));
}

#[test]
fn nonzero_divisor_needs_no_obligation() {
    let t = run(&divide_model(), Some(nonzero_side_input("A")));
    assert!(obligations(&t).is_empty(), "{:?}", obligations(&t));
    let symbolic = t.model.as_ref().unwrap();
    assert!(symbolic.security_properties.is_empty());
}

#[test]
fn divisor_without_facts_needs_obligation() {
    let t = run(&divide_model(), None);
    assert_eq!(obligations(&t), vec!["A_out != 0".to_string()]);
}

#[test]
fn obligation_reaches_symbolic_model() {
    let t = run(&divide_model(), None);
    let model = t.model.as_ref().unwrap();
    assert_eq!(model.security_properties.len(), 1);
    assert!(!model.mentions("Div_out"));
    assert!(!model.mentions("C_out"));
}

// ── Feedback loops ──────────────────────────────────────────────────────────

fn gain_delay_loop() -> Model {
    Model::new(
        "loop",
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
fn identity_loop_reaches_fixpoint() {
    let t = run(&gain_delay_loop(), Some(interval_side_input("D", "-1", "1")));
    assert_eq!(t.loops.len(), 1);
    let record = &t.loops[0];
    assert_eq!(record.representative, Some(BlockId(2)));
    match &record.outcome {
        LoopOutcome::Fixpoint { rounds, summary } => {
            assert!(*rounds <= 2, "took {} rounds", rounds);
            let hull = summary.as_boundary().and_then(|b| b.hull());
            assert_eq!(hull, Some(NumRange::closed(-1.0, 1.0)));
        }
        other => panic!("expected a fixpoint, got {:?}", other),
    }
}

#[test]
fn loop_arithmetic_gets_overflow_bounds() {
    let t = run(&gain_delay_loop(), Some(interval_side_input("D", "-1", "1")));
    let obs = obligations(&t);
    assert!(obs.contains(&"G_out <= 2147483647".to_string()), "{:?}", obs);
    assert!(obs.contains(&"G_out >= -2147483648".to_string()), "{:?}", obs);
}

fn has_code(t: &Translation, code: hpt::diag::DiagCode) -> bool {
    t.diagnostics.iter().any(|d| d.code == Some(code))
}

#[test]
fn growing_accumulator_falls_back_to_sign() {
    let model = Model::new(
        "accumulate",
        vec![
            Block::new(1, "C", "Constant", 0, 1).with_param("Value", "1"),
            Block::new(2, "S", "Sum", 2, 1).with_param("Inputs", "++"),
            Block::new(3, "D", "UnitDelay", 1, 1),
            Block::new(4, "Out", "Outport", 1, 0),
        ],
        vec![
            Signal::new(1, (1, 0), (2, 0)),
            Signal::new(2, (3, 0), (2, 1)),
            Signal::new(3, (2, 0), (3, 0)),
            Signal::new(4, (3, 0), (4, 0)),
        ],
    );
    let t = run(&model, None);
    assert_eq!(t.loops.len(), 1);
    assert_eq!(t.loops[0].representative, Some(BlockId(3)));
    match &t.loops[0].outcome {
        LoopOutcome::SignFallback { fact: Some(fact), .. } => {
            assert_eq!(fact.to_string(), "D_out >= 0");
        }
        other => panic!("expected a sign fallback, got {:?}", other),
    }
    assert!(has_code(&t, codes::W0303), "{:?}", t.diagnostics);
}

#[test]
fn unknown_block_leaves_loop_unsimulated() {
    let model = Model::new(
        "opaque",
        vec![
            Block::new(1, "F", "CustomCode", 1, 1),
            Block::new(2, "D", "UnitDelay", 1, 1),
            Block::new(3, "Out", "Outport", 1, 0),
        ],
        vec![
            Signal::new(1, (1, 0), (2, 0)),
            Signal::new(2, (2, 0), (1, 0)),
            Signal::new(3, (2, 0), (3, 0)),
        ],
    );
    let t = run(&model, None);
    assert_eq!(t.loops.len(), 1);
    assert_eq!(t.loops[0].outcome, LoopOutcome::Unsimulated);
    assert!(has_code(&t, codes::W0301), "{:?}", t.diagnostics);
    assert!(t.model.is_some());
}

#[test]
fn switch_inside_loop_reaches_fixpoint() {
    let model = Model::new(
        "switched",
        vec![
            Block::new(1, "A", "Inport", 0, 1),
            Block::new(2, "Z", "Constant", 0, 1).with_param("Value", "0"),
            Block::new(3, "Sw", "Switch", 3, 1),
            Block::new(4, "D", "UnitDelay", 1, 1),
            Block::new(5, "Out", "Outport", 1, 0),
        ],
        vec![
            Signal::new(1, (4, 0), (3, 0)),
            Signal::new(2, (1, 0), (3, 1)),
            Signal::new(3, (2, 0), (3, 2)),
            Signal::new(4, (3, 0), (4, 0)),
            Signal::new(5, (4, 0), (5, 0)),
        ],
    );
    let t = run(&model, None);
    assert_eq!(t.loops.len(), 1);
    let record = &t.loops[0];
    assert!(record.members.contains(&BlockId(3)));
    assert_eq!(record.representative, Some(BlockId(4)));
    match &record.outcome {
        LoopOutcome::Fixpoint { summary, .. } => {
            let hull = summary.as_boundary().and_then(|b| b.hull());
            assert_eq!(hull, Some(NumRange::point(0.0)));
        }
        other => panic!("expected a fixpoint, got {:?}", other),
    }
    let symbolic = t.model.as_ref().unwrap();
    assert!(!symbolic.mentions("Sw_out"));
}

// ── Integrator overflow ─────────────────────────────────────────────────────

#[test]
fn positive_integrator_input_needs_upper_bound_only() {
    let model = Model::new(
        "integrate",
        vec![
            Block::new(1, "A", "Inport", 0, 1),
            Block::new(2, "I", "Integrator", 1, 1),
            Block::new(3, "Out", "Outport", 1, 0),
        ],
        vec![Signal::new(1, (1, 0), (2, 0)), Signal::new(2, (2, 0), (3, 0))],
    );
    let t = run(&model, Some(interval_side_input("A", "1", "5")));
    assert_eq!(obligations(&t), vec!["I_out <= 2147483647".to_string()]);
    let symbolic = t.model.as_ref().unwrap();
    assert_eq!(symbolic.continuous.len(), 1);
}

#[test]
fn integrator_without_facts_needs_both_bounds() {
    let model = Model::new(
        "integrate",
        vec![
            Block::new(1, "A", "Inport", 0, 1),
            Block::new(2, "I", "Integrator", 1, 1),
            Block::new(3, "Out", "Outport", 1, 0),
        ],
        vec![Signal::new(1, (1, 0), (2, 0)), Signal::new(2, (2, 0), (3, 0))],
    );
    let t = run(&model, None);
    let obs = obligations(&t);
    assert_eq!(obs.len(), 2, "{:?}", obs);
    assert!(obs.contains(&"I_out >= -2147483648".to_string()), "{:?}", obs);
    assert!(obs.contains(&"I_out <= 2147483647".to_string()), "{:?}", obs);
}

// ── Vectors ─────────────────────────────────────────────────────────────────

#[test]
fn muxed_vector_is_resolved_through_gain() {
    let model = Model::new(
        "mux",
        vec![
            Block::new(1, "A", "Inport", 0, 1),
            Block::new(2, "B", "Inport", 0, 1),
            Block::new(3, "M", "Mux", 2, 1),
            Block::new(4, "G", "Gain", 1, 1).with_param("Gain", "2"),
            Block::new(5, "Out", "Outport", 1, 0),
        ],
        vec![
            Signal::new(1, (1, 0), (3, 0)),
            Signal::new(2, (2, 0), (3, 1)),
            Signal::new(3, (3, 0), (4, 0)),
            Signal::new(4, (4, 0), (5, 0)),
        ],
    );
    let t = run(&model, None);
    assert!(!t.has_errors(), "{:?}", t.diagnostics);
    let symbolic = t.model.as_ref().unwrap();
    assert!(!symbolic.mentions("M_out"), "{}", symbolic);
    assert!(!symbolic.mentions("G_out"), "{}", symbolic);
    assert!(symbolic.mentions("A_out"));
    assert!(symbolic.mentions("B_out"));
}

// ── Graph shape ─────────────────────────────────────────────────────────────

#[test]
fn acyclic_chain_has_no_loops() {
    let mut blocks = vec![Block::new(1, "In", "Inport", 0, 1)];
    for i in 2..=4 {
        blocks.push(Block::new(i, &format!("G{}", i), "Gain", 1, 1).with_param("Gain", "2"));
    }
    blocks.push(Block::new(5, "Out", "Outport", 1, 0));
    let signals = (1..=4).map(|i| Signal::new(i, (i, 0), (i + 1, 0))).collect();
    let model = Model::new("chain", blocks, signals);

    let built = build_graph(&model, &model.topological_order());
    assert!(built.diagnostics.is_empty());
    let loops = LoopAnalysis::new(&built.graph);
    for node in built.graph.nodes() {
        assert!(loops.find_loop(node.id).is_empty());
    }
    assert!(loops.nodes_in_loops().is_empty());
}

#[test]
fn twin_blocks_become_contract_equality() {
    let model = Model::new(
        "twins",
        vec![
            Block::new(1, "A", "Inport", 0, 1),
            Block::new(2, "G1", "Gain", 1, 1).with_param("Gain", "3"),
            Block::new(3, "G2", "Gain", 1, 1).with_param("Gain", "3"),
            Block::new(4, "Out1", "Outport", 1, 0),
            Block::new(5, "Out2", "Outport", 1, 0),
        ],
        vec![
            Signal::new(1, (1, 0), (2, 0)),
            Signal::new(2, (1, 0), (3, 0)),
            Signal::new(3, (2, 0), (4, 0)),
            Signal::new(4, (3, 0), (5, 0)),
        ],
    );
    let t = run(&model, None);
    let graph = t.graph.as_ref().unwrap();
    assert_eq!(graph.data_equalities().len(), 1);
    let symbolic = t.model.as_ref().unwrap();
    assert!(!symbolic.mentions("G1_out"));
    assert!(!symbolic.mentions("G2_out"));
}
