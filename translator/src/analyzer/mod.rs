// analyzer/mod.rs — Block-analyzer interface and registry
//
// Each block type contributes the rules the propagation pass needs: facts the
// block generates on its own, how an incoming fact is advanced across it, a
// starting fact for feedback simulation, direct guard evaluation for control
// blocks inside loops, and the "no information" baseline per category.
//
// The registry is a plain value built once per translation and passed by
// reference; unknown block types resolve to an opaque fallback.

mod builtin;

pub use builtin::{
    AbsAnalyzer, ConstantAnalyzer, DelayAnalyzer, GainAnalyzer, InportAnalyzer,
    IntegratorAnalyzer, MinMaxAnalyzer, OpaqueAnalyzer, OutportAnalyzer, ProductAnalyzer,
    RelationalAnalyzer, SaturationAnalyzer, SinkAnalyzer, SumAnalyzer, SwitchAnalyzer,
};
pub(crate) use builtin::{initial_condition, numeric_param, param_term, switch_guard};

use std::collections::HashMap;

use crate::info::{
    Category, ControlInformation, DataInformation, Information, NumRange,
    SignalboundaryInformation,
};
use crate::model::Block;
use crate::term::Term;

// ── Interface ───────────────────────────────────────────────────────────────

/// Coarse behaviour class; decides which loops can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    Source,
    Feedthrough,
    /// Discrete delays, holds and integrators.
    Stateful,
    /// Blocks selecting between inputs by a guard.
    Control,
    Sink,
    Opaque,
}

impl AnalyzerKind {
    pub fn simulable(self) -> bool {
        matches!(
            self,
            AnalyzerKind::Feedthrough | AnalyzerKind::Stateful | AnalyzerKind::Control
        )
    }
}

/// Outcome of pushing one fact across a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Write the fact to every outgoing edge.
    Propagate(Information),
    /// Attach the fact to the block's node.
    TerminalAtNode(Information),
    /// The fact stops here.
    Terminal,
}

/// What an analyzer sees when a fact arrives at one of its input ports.
pub struct ApplyContext<'a> {
    pub block: &'a Block,
    /// Input port the fact arrived on.
    pub port: u32,
    /// Variable carried on each input port, if connected.
    pub input_vars: &'a [Option<String>],
    /// Facts currently known on each input port.
    pub input_facts: &'a [Vec<Information>],
}

impl<'a> ApplyContext<'a> {
    /// Term of the block's (first) output.
    pub fn out_term(&self) -> Term {
        Term::var(self.block.output_var(0))
    }

    pub fn input_var(&self, port: u32) -> Option<&str> {
        self.input_vars.get(port as usize)?.as_deref()
    }

    /// Intersection of the numeric hulls of the signal facts on `port`;
    /// `None` when the port carries no numeric signal fact.
    pub fn input_hull(&self, port: u32) -> Option<NumRange> {
        let facts = self.input_facts.get(port as usize)?;
        let mut acc: Option<NumRange> = None;
        for fact in facts {
            let Some(hull) = fact.as_boundary().and_then(|b| b.hull()) else {
                continue;
            };
            acc = Some(match acc {
                None => hull,
                Some(prev) => prev.intersect(&hull).unwrap_or(prev),
            });
        }
        acc
    }

    /// Number of input ports the block is wired with.
    pub fn input_count(&self) -> u32 {
        (self.input_vars.len() as u32).max(self.block.inputs)
    }
}

/// Per-block-type semantic rules used by propagation and loop simulation.
pub trait BlockAnalyzer {
    fn kind(&self) -> AnalyzerKind;

    /// Facts the block establishes regardless of its inputs.
    fn generate_information(&self, _block: &Block) -> Vec<Information> {
        Vec::new()
    }

    /// Advance `fact` (arriving on `ctx.port`) across the block.
    fn apply_information(&self, fact: &Information, ctx: &ApplyContext<'_>) -> Applied;

    /// Starting fact on the block's output when a loop is simulated.
    fn feedback_simulation_seed(&self, _block: &Block) -> Option<Information> {
        None
    }

    /// Evaluate the block's guard directly against the current input facts.
    /// Only control blocks answer.
    fn evaluate_condition_for_feedback(&self, _ctx: &ApplyContext<'_>) -> Option<Information> {
        None
    }

    /// Baseline facts for an outgoing edge lacking any fact of `category`.
    fn no_information_applied(&self, var: &str, category: Category) -> Vec<Information> {
        vec![no_information(var, category)]
    }
}

/// The "nothing is known" fact of a category about `var`.
pub fn no_information(var: &str, category: Category) -> Information {
    match category {
        Category::Signal => {
            Information::Signalboundary(SignalboundaryInformation::unbounded(Term::var(var)))
        }
        Category::Control => Information::Control(ControlInformation::none()),
        Category::Data => Information::Data(DataInformation::none()),
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Analyzers keyed by block type tag.
pub struct AnalyzerRegistry {
    analyzers: HashMap<String, Box<dyn BlockAnalyzer>>,
    fallback: Box<dyn BlockAnalyzer>,
}

impl AnalyzerRegistry {
    /// An empty registry; every lookup yields the opaque fallback.
    pub fn new() -> Self {
        AnalyzerRegistry {
            analyzers: HashMap::new(),
            fallback: Box::new(OpaqueAnalyzer),
        }
    }

    /// Registry preloaded with the built-in block types.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.register("Inport", InportAnalyzer);
        reg.register("Constant", ConstantAnalyzer);
        reg.register("Gain", GainAnalyzer);
        for ty in ["Sum", "Add", "Subtract"] {
            reg.register(ty, SumAnalyzer);
        }
        for ty in ["Product", "Divide"] {
            reg.register(ty, ProductAnalyzer);
        }
        reg.register("Abs", AbsAnalyzer);
        reg.register("Saturation", SaturationAnalyzer);
        reg.register("MinMax", MinMaxAnalyzer);
        for ty in ["UnitDelay", "Memory", "ZeroOrderHold"] {
            reg.register(ty, DelayAnalyzer);
        }
        for ty in ["Integrator", "DiscreteIntegrator"] {
            reg.register(ty, IntegratorAnalyzer);
        }
        reg.register("Switch", SwitchAnalyzer);
        reg.register("RelationalOperator", RelationalAnalyzer);
        reg.register("Outport", OutportAnalyzer);
        reg.register("Terminator", SinkAnalyzer);
        for ty in ["Mux", "Demux"] {
            reg.register(ty, OpaqueAnalyzer);
        }
        reg
    }

    pub fn register(&mut self, block_type: &str, analyzer: impl BlockAnalyzer + 'static) {
        self.analyzers
            .insert(block_type.to_string(), Box::new(analyzer));
    }

    pub fn contains(&self, block_type: &str) -> bool {
        self.analyzers.contains_key(block_type)
    }

    pub fn lookup(&self, block_type: &str) -> &dyn BlockAnalyzer {
        self.analyzers
            .get(block_type)
            .map(|a| a.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

// ── Parameter helpers shared with safety analysis and encoders ──────────────

/// Per-input signs of a Sum-family block from its `Inputs` parameter.
/// A count yields all `+`; `|` spacers are ignored; a sign list whose length
/// disagrees with the port count falls back to all `+`.
pub fn sum_signs(block: &Block) -> Vec<bool> {
    let default_signs = if block.block_type == "Subtract" { "+-" } else { "" };
    operator_list(block, &['+', '-'], default_signs)
        .into_iter()
        .map(|c| c == '+')
        .collect()
}

/// Per-input operators (`*` or `/`) of a Product-family block.
pub fn product_ops(block: &Block) -> Vec<char> {
    let default_ops = if block.block_type == "Divide" { "*/" } else { "" };
    operator_list(block, &['*', '/'], default_ops)
}

fn operator_list(block: &Block, allowed: &[char; 2], default_spec: &str) -> Vec<char> {
    let n = block.inputs.max(1) as usize;
    let all_first = vec![allowed[0]; n];
    let spec = block.param("Inputs").unwrap_or(default_spec);
    if spec.is_empty() {
        return all_first;
    }
    if spec.parse::<usize>().is_ok() {
        return all_first;
    }
    let ops: Vec<char> = spec.chars().filter(|c| *c != '|').collect();
    if ops.len() != n || ops.iter().any(|c| !allowed.contains(c)) {
        return all_first;
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_falls_back_to_opaque() {
        let reg = AnalyzerRegistry::with_builtin();
        assert!(reg.contains("Gain"));
        assert!(!reg.contains("SFunction"));
        assert_eq!(reg.lookup("SFunction").kind(), AnalyzerKind::Opaque);
        assert_eq!(reg.lookup("UnitDelay").kind(), AnalyzerKind::Stateful);
    }

    #[test]
    fn operator_lists_from_inputs_param() {
        let div = Block::new(1, "D", "Divide", 2, 1);
        assert_eq!(product_ops(&div), vec!['*', '/']);
        let prod = Block::new(2, "P", "Product", 3, 1).with_param("Inputs", "*/*");
        assert_eq!(product_ops(&prod), vec!['*', '/', '*']);
        let malformed = Block::new(3, "P", "Product", 2, 1).with_param("Inputs", "x/");
        assert_eq!(product_ops(&malformed), vec!['*', '*']);
        let counted = Block::new(4, "P", "Product", 2, 1).with_param("Inputs", "2");
        assert_eq!(product_ops(&counted), vec!['*', '*']);
    }

    #[test]
    fn sum_signs_ignore_spacers() {
        let sum = Block::new(1, "S", "Sum", 2, 1).with_param("Inputs", "|+-");
        assert_eq!(sum_signs(&sum), vec![true, false]);
        let sub = Block::new(2, "S", "Subtract", 2, 1);
        assert_eq!(sum_signs(&sub), vec![true, false]);
    }
}
