// encode.rs — Block encoders: blocks → hybrid-program fragments
//
// Pure blocks become placeholders resolved by macros; stateful blocks become
// discrete updates (delays, discrete integrators) or ODEs (integrators);
// inports read nondeterministically and outports assign the model outputs.
// Fragments are merged in block order into one `Encoding`, from which the
// symbolic model skeleton is built.
//
// Preconditions: `order` lists blocks of `model`.
// Postconditions: every block with a registered encoder contributed its
//                 fragment; state updates follow all other assignments.
// Failure modes: blocks without an encoder → W0401, their outputs stay free.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::analyzer::{param_term, product_ops, sum_signs, switch_guard};
use crate::diag::{codes, Diagnostic};
use crate::hybrid::{ContinuousEvolution, HybridProgram, SymbolicModel};
use crate::macros::Macro;
use crate::model::{Block, Model, TopoOrder};
use crate::term::{Formula, RelOp, Term};

// ── Encoding fragments ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encoding {
    pub macros: Vec<Macro>,
    /// Input reads and output assignments.
    pub discrete: Vec<HybridProgram>,
    /// State updates, run after `discrete`.
    pub updates: Vec<HybridProgram>,
    pub odes: Vec<(String, Term)>,
    pub initial: Vec<Formula>,
}

impl Encoding {
    pub fn merge(&mut self, other: Encoding) {
        self.macros.extend(other.macros);
        self.discrete.extend(other.discrete);
        self.updates.extend(other.updates);
        self.odes.extend(other.odes);
        self.initial.extend(other.initial);
    }

    /// Model skeleton without contract or security properties.
    pub fn to_model(&self, name: &str) -> SymbolicModel {
        let mut model = SymbolicModel::new(name);
        model.initial_conditions = Formula::and(self.initial.clone());
        let mut steps = self.discrete.clone();
        steps.extend(self.updates.iter().cloned());
        model.discrete = HybridProgram::seq(steps);
        if !self.odes.is_empty() {
            model.continuous.push(ContinuousEvolution {
                odes: self.odes.clone(),
                domain: Formula::True,
            });
        }
        model
    }

    fn with_macro(mut self, m: Macro) -> Self {
        self.macros.push(m);
        self
    }
}

/// What an encoder sees of its block.
pub struct EncodeContext<'a> {
    pub model: &'a Model,
    pub block: &'a Block,
}

impl<'a> EncodeContext<'a> {
    /// Term on input port `port`; unconnected ports read a free variable.
    pub fn input(&self, port: u32) -> Term {
        match self.model.input_var(self.block.id, port) {
            Some(var) => Term::var(var),
            None => Term::var(format!("{}_in{}", self.block.var_base(), port + 1)),
        }
    }

    pub fn inputs(&self) -> Vec<Term> {
        (0..self.block.inputs.max(1)).map(|p| self.input(p)).collect()
    }

    pub fn out(&self) -> String {
        self.block.output_var(0)
    }
}

pub trait BlockEncoder {
    fn encode(&self, ctx: &EncodeContext<'_>) -> Encoding;
}

impl<F> BlockEncoder for F
where
    F: Fn(&EncodeContext<'_>) -> Encoding,
{
    fn encode(&self, ctx: &EncodeContext<'_>) -> Encoding {
        self(ctx)
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

pub struct EncoderRegistry {
    encoders: HashMap<String, Box<dyn BlockEncoder>>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        EncoderRegistry {
            encoders: HashMap::new(),
        }
    }

    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.register("Inport", encode_inport);
        reg.register("Constant", encode_constant);
        reg.register("Gain", encode_gain);
        for ty in ["Sum", "Add", "Subtract"] {
            reg.register(ty, encode_sum);
        }
        for ty in ["Product", "Divide"] {
            reg.register(ty, encode_product);
        }
        reg.register("Abs", encode_abs);
        reg.register("Saturation", encode_saturation);
        reg.register("MinMax", encode_minmax);
        reg.register("Switch", encode_switch);
        reg.register("RelationalOperator", encode_relational);
        for ty in ["UnitDelay", "Memory"] {
            reg.register(ty, encode_delay);
        }
        reg.register("ZeroOrderHold", encode_hold);
        reg.register("DiscreteIntegrator", encode_discrete_integrator);
        reg.register("Integrator", encode_integrator);
        reg.register("Mux", encode_mux);
        reg.register("Demux", encode_demux);
        reg.register("Outport", encode_outport);
        reg.register("Terminator", encode_nothing);
        reg
    }

    pub fn register(&mut self, block_type: &str, encoder: impl BlockEncoder + 'static) {
        self.encoders
            .insert(block_type.to_string(), Box::new(encoder));
    }

    pub fn lookup(&self, block_type: &str) -> Option<&dyn BlockEncoder> {
        self.encoders.get(block_type).map(|e| e.as_ref())
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

// ── Whole-model encoding ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EncodeResult {
    pub encoding: Encoding,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn encode_model(model: &Model, order: &TopoOrder, registry: &EncoderRegistry) -> EncodeResult {
    let mut encoding = Encoding::default();
    let mut diagnostics = Vec::new();
    let mut warned = HashSet::new();

    for id in order.all() {
        let Some(block) = model.block(id) else {
            continue;
        };
        match registry.lookup(&block.block_type) {
            Some(encoder) => {
                let ctx = EncodeContext { model, block };
                encoding.merge(encoder.encode(&ctx));
            }
            None => {
                if warned.insert(block.block_type.clone()) {
                    diagnostics.push(
                        Diagnostic::warning(
                            codes::W0401,
                            format!("no encoder for block type '{}'", block.block_type),
                        )
                        .at_block(block.id)
                        .with_hint("outputs of this block are left unconstrained"),
                    );
                }
            }
        }
    }
    log::debug!(
        "encode: {} macros, {} assignments, {} updates, {} odes",
        encoding.macros.len(),
        encoding.discrete.len(),
        encoding.updates.len(),
        encoding.odes.len()
    );
    EncodeResult {
        encoding,
        diagnostics,
    }
}

// ── Built-in encoders ───────────────────────────────────────────────────────

fn simple(ctx: &EncodeContext<'_>, replacement: Term) -> Encoding {
    Encoding::default().with_macro(Macro::simple(ctx.out(), replacement))
}

fn conditional(ctx: &EncodeContext<'_>, cases: Vec<(Formula, Term)>) -> Encoding {
    Encoding::default().with_macro(Macro::Conditional {
        placeholder: ctx.out(),
        cases,
    })
}

fn negated(guard: &Formula) -> Formula {
    match guard {
        Formula::Rel(r) => Formula::Rel(r.negate()),
        other => other.clone().not(),
    }
}

/// Initial state as a term; symbolic parameters stay symbolic.
fn initial_term(block: &Block) -> Term {
    ["InitialCondition", "X0", "InitialValue"]
        .iter()
        .find_map(|key| param_term(block, key))
        .unwrap_or(Term::num(0.0))
}

fn initial_state(ctx: &EncodeContext<'_>) -> Formula {
    Formula::rel(Term::var(ctx.out()), RelOp::Eq, initial_term(ctx.block))
}

fn encode_nothing(_ctx: &EncodeContext<'_>) -> Encoding {
    Encoding::default()
}

fn encode_inport(ctx: &EncodeContext<'_>) -> Encoding {
    Encoding {
        discrete: vec![HybridProgram::NondetAssign(ctx.out())],
        ..Encoding::default()
    }
}

fn encode_constant(ctx: &EncodeContext<'_>) -> Encoding {
    simple(ctx, param_term(ctx.block, "Value").unwrap_or(Term::num(0.0)))
}

fn encode_gain(ctx: &EncodeContext<'_>) -> Encoding {
    let k = param_term(ctx.block, "Gain").unwrap_or(Term::num(1.0));
    simple(ctx, k.mul(ctx.input(0)))
}

fn encode_sum(ctx: &EncodeContext<'_>) -> Encoding {
    let terms = sum_signs(ctx.block)
        .into_iter()
        .zip(ctx.inputs())
        .map(|(plus, t)| if plus { t } else { t.neg() })
        .collect();
    simple(ctx, Term::sum(terms))
}

fn encode_product(ctx: &EncodeContext<'_>) -> Encoding {
    let ops = product_ops(ctx.block);
    let inputs = ctx.inputs();
    let numerator: Vec<Term> = ops
        .iter()
        .zip(&inputs)
        .filter(|(op, _)| **op == '*')
        .map(|(_, t)| t.clone())
        .collect();
    let value = ops
        .iter()
        .zip(inputs)
        .filter(|(op, _)| **op == '/')
        .fold(Term::product(numerator), |acc, (_, d)| acc.div(d));
    simple(ctx, value)
}

fn encode_abs(ctx: &EncodeContext<'_>) -> Encoding {
    let u = ctx.input(0);
    conditional(
        ctx,
        vec![
            (Formula::rel(u.clone(), RelOp::Ge, Term::num(0.0)), u.clone()),
            (Formula::rel(u.clone(), RelOp::Lt, Term::num(0.0)), u.neg()),
        ],
    )
}

fn encode_saturation(ctx: &EncodeContext<'_>) -> Encoding {
    let u = ctx.input(0);
    let lower = param_term(ctx.block, "LowerLimit");
    let upper = param_term(ctx.block, "UpperLimit");
    let mut cases = Vec::new();
    let mut inside = Vec::new();
    if let Some(hi) = &upper {
        cases.push((Formula::rel(u.clone(), RelOp::Gt, hi.clone()), hi.clone()));
        inside.push(Formula::rel(u.clone(), RelOp::Le, hi.clone()));
    }
    if let Some(lo) = &lower {
        cases.push((Formula::rel(u.clone(), RelOp::Lt, lo.clone()), lo.clone()));
        inside.push(Formula::rel(u.clone(), RelOp::Ge, lo.clone()));
    }
    if cases.is_empty() {
        return simple(ctx, u);
    }
    cases.push((Formula::and(inside), u));
    conditional(ctx, cases)
}

fn encode_minmax(ctx: &EncodeContext<'_>) -> Encoding {
    let inputs = ctx.inputs();
    if inputs.len() == 1 {
        return simple(ctx, inputs[0].clone());
    }
    let is_max = ctx
        .block
        .param("Function")
        .map(|f| f.eq_ignore_ascii_case("max"))
        .unwrap_or(false);
    // Input k wins when it beats every other input; ties go to the lowest
    // index so the guards stay mutually exclusive.
    let (strict, loose) = if is_max {
        (RelOp::Gt, RelOp::Ge)
    } else {
        (RelOp::Lt, RelOp::Le)
    };
    let cases = inputs
        .iter()
        .enumerate()
        .map(|(k, winner)| {
            let guard = Formula::and(
                inputs
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != k)
                    .map(|(j, other)| {
                        let op = if j < k { strict } else { loose };
                        Formula::rel(winner.clone(), op, other.clone())
                    })
                    .collect(),
            );
            (guard, winner.clone())
        })
        .collect();
    conditional(ctx, cases)
}

fn encode_switch(ctx: &EncodeContext<'_>) -> Encoding {
    let guard = switch_guard(ctx.block, ctx.input(1));
    conditional(
        ctx,
        vec![
            (guard.clone(), ctx.input(0)),
            (negated(&guard), ctx.input(2)),
        ],
    )
}

fn encode_relational(ctx: &EncodeContext<'_>) -> Encoding {
    let op = ctx
        .block
        .param("Operator")
        .map(|s| if s == "~=" { "!=" } else { s })
        .and_then(RelOp::parse)
        .unwrap_or(RelOp::Ge);
    let guard = Formula::rel(ctx.input(0), op, ctx.input(1));
    conditional(
        ctx,
        vec![
            (guard.clone(), Term::num(1.0)),
            (negated(&guard), Term::num(0.0)),
        ],
    )
}

fn encode_delay(ctx: &EncodeContext<'_>) -> Encoding {
    Encoding {
        updates: vec![HybridProgram::Assign(ctx.out(), ctx.input(0))],
        initial: vec![initial_state(ctx)],
        ..Encoding::default()
    }
}

fn encode_hold(ctx: &EncodeContext<'_>) -> Encoding {
    simple(ctx, ctx.input(0))
}

fn encode_discrete_integrator(ctx: &EncodeContext<'_>) -> Encoding {
    let out = ctx.out();
    let step = param_term(ctx.block, "SampleTime")
        .filter(|t| t.eval().map(|v| v > 0.0).unwrap_or(true))
        .unwrap_or(Term::num(1.0));
    let next = Term::var(out.clone()).add(step.mul(ctx.input(0)));
    Encoding {
        updates: vec![HybridProgram::Assign(out, next)],
        initial: vec![initial_state(ctx)],
        ..Encoding::default()
    }
}

fn encode_integrator(ctx: &EncodeContext<'_>) -> Encoding {
    Encoding {
        odes: vec![(ctx.out(), ctx.input(0))],
        initial: vec![initial_state(ctx)],
        ..Encoding::default()
    }
}

fn encode_mux(ctx: &EncodeContext<'_>) -> Encoding {
    let inputs = ctx.inputs();
    let width = inputs.len();
    Encoding::default()
        .with_macro(Macro::Vector {
            placeholder: ctx.out(),
            replacements: inputs,
        })
        .with_macro(Macro::SizePropagation {
            placeholder: ctx.out(),
            width,
        })
}

fn encode_demux(ctx: &EncodeContext<'_>) -> Encoding {
    let source = match ctx.input(0) {
        Term::Var(name) => name,
        _ => return Encoding::default(),
    };
    let macros = (0..ctx.block.outputs.max(1))
        .map(|k| Macro::simple(ctx.block.output_var(k), Term::element(&source, k as usize)))
        .collect();
    Encoding {
        macros,
        ..Encoding::default()
    }
}

fn encode_outport(ctx: &EncodeContext<'_>) -> Encoding {
    Encoding {
        discrete: vec![HybridProgram::Assign(ctx.block.var_base(), ctx.input(0))],
        ..Encoding::default()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
