// pipeline.rs — Translation state and pass orchestration
//
// Holds every pass artifact in one `Translation` and runs the minimal set of
// passes needed for a terminal `PassId`. Translation never aborts: each pass
// runs on whatever its predecessors produced and reports diagnostics.
//
// Preconditions: the model has been loaded; registries are populated.
// Postconditions: all artifacts for the required passes are populated.
// Failure modes: error-level diagnostics (graph count mismatch, macro
//                cycles or conflicts) are recorded, not returned as Err.
// Side effects: calls on_pass_complete after each pass; `verbose` prints
//               pass timings to stderr.

use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::analyzer::AnalyzerRegistry;
use crate::config::AnalysisConfig;
use crate::diag::{has_errors, Diagnostic};
use crate::encode::{encode_model, EncoderRegistry, Encoding};
use crate::feedback::LoopRecord;
use crate::graph::{build_graph, find_data_equalities, InvariantGraph};
use crate::hybrid::{HybridProgram, SymbolicModel};
use crate::info::Information;
use crate::macros::{apply_all, finalize, Macro};
use crate::model::{Model, TopoOrder};
use crate::oracle::{IntervalOracle, SatOracle};
use crate::pass::{descriptor, required_passes, PassId};
use crate::propagate::propagate;
use crate::safety::analyze_safety;
use crate::side_input::SideInput;
use crate::term::Formula;

// ── Context and artifacts ───────────────────────────────────────────────────

/// Everything a translation needs besides the model itself.
pub struct TranslationContext {
    pub analyzers: AnalyzerRegistry,
    pub encoders: EncoderRegistry,
    pub oracle: Box<dyn SatOracle>,
    pub config: AnalysisConfig,
    pub side_input: Option<SideInput>,
    pub verbose: bool,
}

impl TranslationContext {
    /// Built-in analyzers and encoders with an interval oracle sized by
    /// `config`.
    pub fn new(config: AnalysisConfig) -> Self {
        let oracle = IntervalOracle::new(config.max_oracle_clauses);
        TranslationContext {
            analyzers: AnalyzerRegistry::with_builtin(),
            encoders: EncoderRegistry::with_builtin(),
            oracle: Box::new(oracle),
            config,
            side_input: None,
            verbose: false,
        }
    }

    pub fn with_side_input(mut self, side_input: SideInput) -> Self {
        self.side_input = Some(side_input);
        self
    }
}

#[derive(Debug)]
pub struct Translation {
    pub order: TopoOrder,
    pub graph: Option<InvariantGraph>,
    pub loops: Vec<LoopRecord>,
    pub encoding: Option<Encoding>,
    /// Closed macro set (or the raw set if closure failed).
    pub macros: Vec<Macro>,
    pub model: Option<SymbolicModel>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Translation {
    fn new(order: TopoOrder) -> Self {
        Translation {
            order,
            graph: None,
            loops: Vec::new(),
            encoding: None,
            macros: Vec::new(),
            model: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

// ── Provenance ──────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible reports.
///
/// `source_hash`: SHA-256 of the raw model file.
/// `config_fingerprint`: SHA-256 of the analysis config as compact JSON.
/// `translator_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub config_fingerprint: [u8; 32],
    pub translator_version: &'static str,
}

impl Provenance {
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    pub fn config_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.config_fingerprint)
    }
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn compute_provenance(source: &str, config: &AnalysisConfig) -> Provenance {
    let canonical = serde_json::to_string(config).unwrap_or_default();
    Provenance {
        source_hash: sha256(source.as_bytes()),
        config_fingerprint: sha256(canonical.as_bytes()),
        translator_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Pass runner ─────────────────────────────────────────────────────────────

/// Run every pass needed for `terminal`.
pub fn run_passes(
    model: &Model,
    ctx: &TranslationContext,
    terminal: PassId,
    on_pass_complete: &mut dyn FnMut(PassId, &[Diagnostic]),
) -> Translation {
    let mut t = Translation::new(model.topological_order());
    if !t.order.residual.is_empty() {
        log::debug!(
            "pipeline: {} blocks outside the topological order (feedback)",
            t.order.residual.len()
        );
    }

    for pass in required_passes(terminal) {
        let start = Instant::now();
        let diags = run_pass(pass, model, ctx, &mut t);
        finish_pass(pass, start, diags, ctx.verbose, &mut t, on_pass_complete);
    }
    t
}

/// Full translation: every pass, no per-pass callback.
pub fn translate(model: &Model, ctx: &TranslationContext) -> Translation {
    run_passes(model, ctx, PassId::ResolveMacros, &mut |_, _| {})
}

fn finish_pass(
    pass: PassId,
    start: Instant,
    diags: Vec<Diagnostic>,
    verbose: bool,
    t: &mut Translation,
    on_pass_complete: &mut dyn FnMut(PassId, &[Diagnostic]),
) {
    on_pass_complete(pass, &diags);
    if verbose {
        let elapsed = start.elapsed();
        eprintln!(
            "hpt: {} complete, {:.1}ms",
            descriptor(pass).name,
            elapsed.as_secs_f64() * 1000.0
        );
    }
    t.diagnostics.extend(diags);
}

fn run_pass(
    pass: PassId,
    model: &Model,
    ctx: &TranslationContext,
    t: &mut Translation,
) -> Vec<Diagnostic> {
    match pass {
        PassId::BuildGraph => {
            let result = build_graph(model, &t.order);
            t.graph = Some(result.graph);
            result.diagnostics
        }
        PassId::SeedSideInput => {
            if let (Some(side), Some(graph)) = (&ctx.side_input, t.graph.as_mut()) {
                let added = side.seed(model, graph);
                log::info!("side input: {} facts seeded", added);
            }
            Vec::new()
        }
        PassId::Propagate => {
            let Some(graph) = t.graph.as_mut() else {
                return Vec::new();
            };
            let result = propagate(model, &t.order, graph, &ctx.analyzers, &ctx.config);
            t.loops = result.loops;
            result.diagnostics
        }
        PassId::DataEqualities => {
            if let Some(graph) = t.graph.as_mut() {
                for relation in find_data_equalities(model) {
                    graph.add_data_equality(relation);
                }
            }
            Vec::new()
        }
        PassId::Safety => {
            if let Some(graph) = t.graph.as_mut() {
                let result = analyze_safety(model, graph, ctx.oracle.as_ref(), &ctx.config);
                log::info!("safety: {} obligations", result.added.len());
            }
            Vec::new()
        }
        PassId::Encode => {
            let result = encode_model(model, &t.order, &ctx.encoders);
            t.encoding = Some(result.encoding);
            result.diagnostics
        }
        PassId::ResolveMacros => resolve_macros(model, t),
    }
}

/// Conjunction of every informative fact in the graph.
fn inferred_invariants(graph: &InvariantGraph) -> Formula {
    let informative = |f: &&Information| !f.is_no_information();
    let mut parts: Vec<Formula> = Vec::new();
    let mut push = |f: Formula| {
        if f != Formula::True && !parts.contains(&f) {
            parts.push(f);
        }
    };
    for edge in graph.edges() {
        for fact in edge.facts().iter().filter(informative) {
            push(fact.to_formula());
        }
    }
    for node in graph.nodes() {
        for fact in node.facts().iter().filter(informative) {
            push(fact.to_formula());
        }
    }
    for relation in graph.data_equalities() {
        push(Formula::Rel(relation.clone()));
    }
    Formula::and(parts)
}

fn resolve_macros(model: &Model, t: &mut Translation) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let Some(encoding) = t.encoding.as_ref() else {
        return diagnostics;
    };
    let mut symbolic = encoding.to_model(&model.name);
    if let Some(graph) = t.graph.as_ref() {
        let invariants = inferred_invariants(graph);
        if invariants != Formula::True {
            symbolic.contract = HybridProgram::Test(invariants);
        }
        symbolic.security_properties = graph.security_obligations().to_vec();
    }

    let raw = encoding.macros.clone();
    t.macros = match finalize(raw.clone()) {
        Ok(closed) => closed,
        Err(e) => {
            log::warn!("macros: {}", e);
            diagnostics.push(e.to_diagnostic());
            raw
        }
    };
    apply_all(&mut symbolic, &t.macros);
    t.model = Some(symbolic);
    diagnostics
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, Signal};

    fn gain_chain() -> Model {
        Model::new(
            "chain",
            vec![
                Block::new(1, "In", "Inport", 0, 1),
                Block::new(2, "G", "Gain", 1, 1).with_param("Gain", "2"),
                Block::new(3, "Out", "Outport", 1, 0),
            ],
            vec![Signal::new(1, (1, 0), (2, 0)), Signal::new(2, (2, 0), (3, 0))],
        )
    }

    #[test]
    fn callback_sees_each_pass_once() {
        let model = gain_chain();
        let ctx = TranslationContext::new(AnalysisConfig::default());
        let mut seen = Vec::new();
        run_passes(&model, &ctx, PassId::Propagate, &mut |p, _| seen.push(p));
        assert_eq!(
            seen,
            vec![PassId::BuildGraph, PassId::SeedSideInput, PassId::Propagate]
        );
    }

    #[test]
    fn encode_only_skips_graph() {
        let model = gain_chain();
        let ctx = TranslationContext::new(AnalysisConfig::default());
        let t = run_passes(&model, &ctx, PassId::Encode, &mut |_, _| {});
        assert!(t.graph.is_none());
        assert!(t.encoding.is_some());
    }

    #[test]
    fn translate_removes_gain_placeholder() {
        let model = gain_chain();
        let ctx = TranslationContext::new(AnalysisConfig::default());
        let t = translate(&model, &ctx);
        assert!(!t.has_errors(), "{:?}", t.diagnostics);
        let symbolic = t.model.as_ref().unwrap();
        assert!(!symbolic.mentions("G_out"));
        assert!(symbolic.mentions("In_out"));
    }

    #[test]
    fn provenance_is_stable() {
        let config = AnalysisConfig::default();
        let a = compute_provenance("{}", &config);
        let b = compute_provenance("{}", &config);
        assert_eq!(a.source_hash_hex(), b.source_hash_hex());
        assert_eq!(a.source_hash_hex().len(), 64);
        assert_eq!(a.config_fingerprint, b.config_fingerprint);
        let c = compute_provenance("{ }", &config);
        assert_ne!(a.source_hash, c.source_hash);
    }
}
