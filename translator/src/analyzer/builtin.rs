// analyzer/builtin.rs — Analyzers for the built-in block types
//
// Numeric transfer functions over `NumRange`: gains scale, sums add signed
// hulls of the other inputs, products multiply (and invert divisors that
// exclude zero), saturations clamp. Facts whose bounds are symbolic only
// survive blocks that leave the value unchanged.

use crate::info::{
    Bound, BoundaryItem, Category, ControlInformation, DiscreteSignalInformation,
    EqualityInformation, Implication, Information, IntervalInformation, NumRange,
    SignalboundaryInformation,
};
use crate::model::Block;
use crate::term::{Formula, RelOp, Term};

use super::{product_ops, sum_signs, AnalyzerKind, ApplyContext, Applied, BlockAnalyzer};

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Push every disjunct of a signal fact through `f`, keeping discreteness.
/// `None` for non-signal facts and for facts with symbolic bounds.
fn map_signal(
    fact: &Information,
    out: &Term,
    f: impl Fn(&NumRange) -> NumRange,
) -> Option<Information> {
    match fact {
        Information::DiscreteSignal(d) => {
            let mut signals = Vec::with_capacity(d.signals.len());
            for s in &d.signals {
                let mapped = s.map_ranges(out, &f)?;
                if !signals.contains(&mapped) {
                    signals.push(mapped);
                }
            }
            Some(Information::DiscreteSignal(DiscreteSignalInformation::new(
                signals,
            )))
        }
        other => other
            .as_boundary()?
            .map_ranges(out, f)
            .map(Information::Signalboundary),
    }
}

fn propagate_or_terminal(fact: Option<Information>) -> Applied {
    match fact {
        Some(f) => Applied::Propagate(f),
        None => Applied::Terminal,
    }
}

/// Identity transfer: the same claim about the output.
fn pass_through(fact: &Information, out: &Term) -> Applied {
    match fact.category() {
        Category::Signal | Category::Control => Applied::Propagate(fact.retarget(out)),
        Category::Data => Applied::Terminal,
    }
}

fn signed(range: NumRange, positive: bool) -> NumRange {
    if positive {
        range
    } else {
        range.neg()
    }
}

fn point_fact(out: Term, value: f64) -> Information {
    Information::Signalboundary(SignalboundaryInformation::from_range(
        out,
        NumRange::point(value),
    ))
}

/// Numeric value of `key`, or `default` when the parameter is absent.
/// A present but non-numeric value yields `None`.
pub(crate) fn numeric_param(block: &Block, key: &str, default: f64) -> Option<f64> {
    match block.param(key) {
        None | Some("") => Some(default),
        Some(_) => block.param_f64(key),
    }
}

/// A parameter as a term: numeric values become numbers, anything else a
/// variable named after the parameter text.
pub(crate) fn param_term(block: &Block, key: &str) -> Option<Term> {
    let raw = block.param(key)?;
    if raw.is_empty() || raw == "[]" {
        return None;
    }
    Some(match raw.parse::<f64>() {
        Ok(v) => Term::num(v),
        Err(_) => Term::var(raw),
    })
}

/// Initial state of a delay or integrator block.
pub(crate) fn initial_condition(block: &Block) -> Option<f64> {
    for key in ["InitialCondition", "X0", "InitialValue"] {
        if block.param(key).is_some() {
            return block.param_f64(key);
        }
    }
    Some(0.0)
}

// ── Sources ─────────────────────────────────────────────────────────────────

pub struct InportAnalyzer;

impl BlockAnalyzer for InportAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Source
    }

    fn generate_information(&self, block: &Block) -> Vec<Information> {
        let lower = param_term(block, "OutMin").map(Bound::inclusive);
        let upper = param_term(block, "OutMax").map(Bound::inclusive);
        if lower.is_none() && upper.is_none() {
            return Vec::new();
        }
        let out = Term::var(block.output_var(0));
        vec![Information::Interval(IntervalInformation::new(
            out, lower, upper,
        ))]
    }

    fn apply_information(&self, _fact: &Information, _ctx: &ApplyContext<'_>) -> Applied {
        Applied::Terminal
    }
}

pub struct ConstantAnalyzer;

impl BlockAnalyzer for ConstantAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Source
    }

    fn generate_information(&self, block: &Block) -> Vec<Information> {
        match block.param_f64("Value") {
            Some(v) => vec![Information::Equality(EqualityInformation::equals(
                Term::var(block.output_var(0)),
                v,
            ))],
            None => Vec::new(),
        }
    }

    fn apply_information(&self, _fact: &Information, _ctx: &ApplyContext<'_>) -> Applied {
        Applied::Terminal
    }
}

// ── Arithmetic ──────────────────────────────────────────────────────────────

pub struct GainAnalyzer;

impl BlockAnalyzer for GainAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Feedthrough
    }

    fn apply_information(&self, fact: &Information, ctx: &ApplyContext<'_>) -> Applied {
        let out = ctx.out_term();
        let Some(k) = numeric_param(ctx.block, "Gain", 1.0) else {
            return Applied::Terminal;
        };
        if k == 1.0 {
            return pass_through(fact, &out);
        }
        propagate_or_terminal(map_signal(fact, &out, |r| r.scale(k)))
    }
}

pub struct SumAnalyzer;

impl BlockAnalyzer for SumAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Feedthrough
    }

    fn apply_information(&self, fact: &Information, ctx: &ApplyContext<'_>) -> Applied {
        let out = ctx.out_term();
        let signs = sum_signs(ctx.block);
        if signs.len() <= 1 && ctx.input_count() <= 1 {
            return match signs.first() {
                Some(false) => propagate_or_terminal(map_signal(fact, &out, |r| r.neg())),
                _ => pass_through(fact, &out),
            };
        }
        let mut others = NumRange::point(0.0);
        for (q, &positive) in signs.iter().enumerate() {
            if q as u32 == ctx.port {
                continue;
            }
            match ctx.input_hull(q as u32) {
                Some(h) => others = others.add(&signed(h, positive)),
                None => {
                    others = NumRange::full();
                    break;
                }
            }
        }
        let own = signs.get(ctx.port as usize).copied().unwrap_or(true);
        propagate_or_terminal(map_signal(fact, &out, |r| signed(*r, own).add(&others)))
    }
}

pub struct ProductAnalyzer;

impl BlockAnalyzer for ProductAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Feedthrough
    }

    fn apply_information(&self, fact: &Information, ctx: &ApplyContext<'_>) -> Applied {
        let out = ctx.out_term();
        let ops = product_ops(ctx.block);
        if ops.len() <= 1 && ctx.input_count() <= 1 {
            return match ops.first() {
                Some('/') => propagate_or_terminal(map_signal(fact, &out, |r| {
                    r.recip().unwrap_or_else(NumRange::full)
                })),
                _ => pass_through(fact, &out),
            };
        }
        let mut others = NumRange::point(1.0);
        for (q, &op) in ops.iter().enumerate() {
            if q as u32 == ctx.port {
                continue;
            }
            let factor = match (ctx.input_hull(q as u32), op) {
                (Some(h), '/') => h.recip(),
                (Some(h), _) => Some(h),
                (None, _) => None,
            };
            match factor {
                Some(f) => others = others.mul(&f),
                None => {
                    others = NumRange::full();
                    break;
                }
            }
        }
        let own = ops.get(ctx.port as usize).copied().unwrap_or('*');
        if own == '/' {
            if fact.crosses_zero() {
                return Applied::Terminal;
            }
            return propagate_or_terminal(map_signal(fact, &out, |r| {
                r.recip()
                    .map(|inv| inv.mul(&others))
                    .unwrap_or_else(NumRange::full)
            }));
        }
        propagate_or_terminal(map_signal(fact, &out, |r| r.mul(&others)))
    }
}

pub struct AbsAnalyzer;

impl BlockAnalyzer for AbsAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Feedthrough
    }

    fn generate_information(&self, block: &Block) -> Vec<Information> {
        let out = Term::var(block.output_var(0));
        vec![Information::Interval(IntervalInformation::new(
            out,
            Some(Bound::inclusive(Term::num(0.0))),
            None,
        ))]
    }

    fn apply_information(&self, fact: &Information, ctx: &ApplyContext<'_>) -> Applied {
        propagate_or_terminal(map_signal(fact, &ctx.out_term(), NumRange::abs))
    }
}

pub struct SaturationAnalyzer;

fn clamp(r: &NumRange, lo: f64, hi: f64) -> NumRange {
    let c = |v: f64| v.max(lo).min(hi);
    NumRange {
        lo: c(r.lo),
        hi: c(r.hi),
        lo_strict: r.lo_strict && r.lo > lo && r.lo < hi,
        hi_strict: r.hi_strict && r.hi < hi && r.hi > lo,
    }
}

impl BlockAnalyzer for SaturationAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Feedthrough
    }

    fn generate_information(&self, block: &Block) -> Vec<Information> {
        let lower = param_term(block, "LowerLimit").map(Bound::inclusive);
        let upper = param_term(block, "UpperLimit").map(Bound::inclusive);
        if lower.is_none() && upper.is_none() {
            return Vec::new();
        }
        vec![Information::Interval(IntervalInformation::new(
            Term::var(block.output_var(0)),
            lower,
            upper,
        ))]
    }

    fn apply_information(&self, fact: &Information, ctx: &ApplyContext<'_>) -> Applied {
        let lo = numeric_param(ctx.block, "LowerLimit", f64::NEG_INFINITY);
        let hi = numeric_param(ctx.block, "UpperLimit", f64::INFINITY);
        match (lo, hi) {
            (Some(lo), Some(hi)) if lo <= hi => {
                propagate_or_terminal(map_signal(fact, &ctx.out_term(), |r| clamp(r, lo, hi)))
            }
            _ => Applied::Terminal,
        }
    }
}

pub struct MinMaxAnalyzer;

impl BlockAnalyzer for MinMaxAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Feedthrough
    }

    fn apply_information(&self, fact: &Information, ctx: &ApplyContext<'_>) -> Applied {
        let out = ctx.out_term();
        let n = ctx.input_count();
        if n <= 1 {
            return pass_through(fact, &out);
        }
        let is_max = ctx
            .block
            .param("Function")
            .map(|f| f.eq_ignore_ascii_case("max"))
            .unwrap_or(false);
        let pick = |a: f64, b: f64| if is_max { a.max(b) } else { a.min(b) };

        let mut others: Option<NumRange> = None;
        for q in (0..n).filter(|&q| q != ctx.port) {
            let h = ctx.input_hull(q).unwrap_or_else(NumRange::full);
            others = Some(match others {
                None => h,
                Some(o) => NumRange::closed(pick(o.lo, h.lo), pick(o.hi, h.hi)),
            });
        }
        let others = others.unwrap_or_else(NumRange::full);
        propagate_or_terminal(map_signal(fact, &out, |r| {
            NumRange::closed(pick(r.lo, others.lo), pick(r.hi, others.hi))
        }))
    }
}

// ── Stateful ────────────────────────────────────────────────────────────────

/// UnitDelay, Memory and ZeroOrderHold.
pub struct DelayAnalyzer;

impl BlockAnalyzer for DelayAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Stateful
    }

    fn apply_information(&self, fact: &Information, ctx: &ApplyContext<'_>) -> Applied {
        let out = ctx.out_term();
        if fact.category() != Category::Signal {
            return Applied::Terminal;
        }
        if ctx.block.block_type == "ZeroOrderHold" {
            return pass_through(fact, &out);
        }
        match initial_condition(ctx.block) {
            Some(v) => match map_signal(fact, &out, |r| r.hull(&NumRange::point(v))) {
                Some(f) => Applied::Propagate(f),
                None => pass_through(fact, &out),
            },
            None => pass_through(fact, &out),
        }
    }

    fn feedback_simulation_seed(&self, block: &Block) -> Option<Information> {
        if block.block_type == "ZeroOrderHold" {
            return None;
        }
        let v = initial_condition(block)?;
        Some(point_fact(Term::var(block.output_var(0)), v))
    }
}

/// Integrator and DiscreteIntegrator.
pub struct IntegratorAnalyzer;

impl BlockAnalyzer for IntegratorAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Stateful
    }

    fn generate_information(&self, block: &Block) -> Vec<Information> {
        if !block.param_on("LimitOutput") {
            return Vec::new();
        }
        let lower = param_term(block, "LowerSaturationLimit").map(Bound::inclusive);
        let upper = param_term(block, "UpperSaturationLimit").map(Bound::inclusive);
        if lower.is_none() && upper.is_none() {
            return Vec::new();
        }
        vec![Information::Interval(IntervalInformation::new(
            Term::var(block.output_var(0)),
            lower,
            upper,
        ))]
    }

    fn apply_information(&self, _fact: &Information, _ctx: &ApplyContext<'_>) -> Applied {
        Applied::Terminal
    }

    fn feedback_simulation_seed(&self, block: &Block) -> Option<Information> {
        let v = initial_condition(block)?;
        Some(point_fact(Term::var(block.output_var(0)), v))
    }
}

// ── Control ─────────────────────────────────────────────────────────────────

pub struct SwitchAnalyzer;

/// The switch guard over the control input `u2`.
pub(crate) fn switch_guard(block: &Block, control: Term) -> Formula {
    let criteria = block.param("Criteria").unwrap_or("u2 >= Threshold");
    let threshold = param_term(block, "Threshold").unwrap_or(Term::num(0.0));
    if criteria.contains("~=") {
        Formula::rel(control, RelOp::Ne, Term::num(0.0))
    } else if criteria.contains(">=") {
        Formula::rel(control, RelOp::Ge, threshold)
    } else if criteria.contains('>') {
        Formula::rel(control, RelOp::Gt, threshold)
    } else {
        Formula::rel(control, RelOp::Ge, threshold)
    }
}

/// Decide a `control ⋈ c` guard over a numeric range of the control input.
fn decide_guard(guard: &Formula, control: &NumRange) -> Option<bool> {
    let Formula::Rel(rel) = guard else {
        return None;
    };
    let c = rel.rhs.eval()?;
    let shifted = control.offset(-c);
    if shifted.all_satisfy_sign(rel.op) {
        Some(true)
    } else if shifted.all_satisfy_sign(rel.op.negate()) {
        Some(false)
    } else {
        None
    }
}

impl BlockAnalyzer for SwitchAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Control
    }

    fn apply_information(&self, fact: &Information, ctx: &ApplyContext<'_>) -> Applied {
        if ctx.port == 1 || fact.category() != Category::Signal {
            return Applied::Terminal;
        }
        let Some(control) = ctx.input_var(1) else {
            return Applied::Terminal;
        };
        let Some(boundary) = fact.as_boundary() else {
            return Applied::Terminal;
        };
        let guard = switch_guard(ctx.block, Term::var(control));
        let antecedent = if ctx.port == 0 { guard } else { guard.not() };
        Applied::Propagate(Information::Control(ControlInformation {
            implications: vec![Implication {
                antecedent,
                consequent: boundary.retarget(&ctx.out_term()),
            }],
        }))
    }

    fn evaluate_condition_for_feedback(&self, ctx: &ApplyContext<'_>) -> Option<Information> {
        let out = ctx.out_term();
        let guard = switch_guard(ctx.block, Term::var(ctx.input_var(1).unwrap_or("u2")));
        let decision = ctx.input_hull(1).and_then(|h| decide_guard(&guard, &h));
        let range = match decision {
            Some(true) => ctx.input_hull(0)?,
            Some(false) => ctx.input_hull(2)?,
            None => ctx.input_hull(0)?.hull(&ctx.input_hull(2)?),
        };
        Some(Information::Signalboundary(
            SignalboundaryInformation::from_range(out, range),
        ))
    }
}

pub struct RelationalAnalyzer;

impl BlockAnalyzer for RelationalAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Feedthrough
    }

    fn generate_information(&self, block: &Block) -> Vec<Information> {
        let out = Term::var(block.output_var(0));
        vec![Information::Signalboundary(SignalboundaryInformation::new(
            vec![
                BoundaryItem::Equality(EqualityInformation::equals(out.clone(), 0.0)),
                BoundaryItem::Equality(EqualityInformation::equals(out, 1.0)),
            ],
        ))]
    }

    fn apply_information(&self, _fact: &Information, _ctx: &ApplyContext<'_>) -> Applied {
        Applied::Terminal
    }
}

// ── Sinks and opaque blocks ─────────────────────────────────────────────────

pub struct OutportAnalyzer;

impl BlockAnalyzer for OutportAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Sink
    }

    fn apply_information(&self, fact: &Information, ctx: &ApplyContext<'_>) -> Applied {
        match fact.category() {
            Category::Data => Applied::Terminal,
            _ if fact.is_no_information() => Applied::Terminal,
            _ => Applied::TerminalAtNode(fact.retarget(&Term::var(ctx.block.var_base()))),
        }
    }
}

/// Terminator and other blocks that swallow their inputs.
pub struct SinkAnalyzer;

impl BlockAnalyzer for SinkAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Sink
    }

    fn apply_information(&self, _fact: &Information, _ctx: &ApplyContext<'_>) -> Applied {
        Applied::Terminal
    }
}

/// Fallback for unknown block types, and for vector routing blocks.
pub struct OpaqueAnalyzer;

impl BlockAnalyzer for OpaqueAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Opaque
    }

    fn apply_information(&self, _fact: &Information, _ctx: &ApplyContext<'_>) -> Applied {
        Applied::Terminal
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(var: &str, lo: f64, hi: f64) -> Information {
        Information::Interval(IntervalInformation::closed(Term::var(var), lo, hi))
    }

    fn ctx<'a>(
        block: &'a Block,
        port: u32,
        vars: &'a [Option<String>],
        facts: &'a [Vec<Information>],
    ) -> ApplyContext<'a> {
        ApplyContext {
            block,
            port,
            input_vars: vars,
            input_facts: facts,
        }
    }

    fn hull_of(applied: Applied) -> Option<NumRange> {
        match applied {
            Applied::Propagate(f) => f.as_boundary()?.hull(),
            _ => None,
        }
    }

    #[test]
    fn gain_scales_interval() {
        let block = Block::new(1, "G", "Gain", 1, 1).with_param("Gain", "-2");
        let vars = [Some("a_out".to_string())];
        let fact = interval("a_out", -1.0, 3.0);
        let facts = [vec![fact.clone()]];
        let applied = GainAnalyzer.apply_information(&fact, &ctx(&block, 0, &vars, &facts));
        assert_eq!(hull_of(applied), Some(NumRange::closed(-6.0, 2.0)));
    }

    #[test]
    fn unit_gain_keeps_symbolic_bounds() {
        let block = Block::new(1, "G", "Gain", 1, 1).with_param("Gain", "1");
        let fact = Information::Interval(IntervalInformation::new(
            Term::var("a_out"),
            Some(Bound::inclusive(Term::var("lim"))),
            None,
        ));
        let vars = [Some("a_out".to_string())];
        let facts = [vec![fact.clone()]];
        let applied = GainAnalyzer.apply_information(&fact, &ctx(&block, 0, &vars, &facts));
        assert_eq!(applied, Applied::Propagate(fact.retarget(&Term::var("G_out"))));
    }

    #[test]
    fn sum_adds_other_inputs() {
        let block = Block::new(1, "S", "Sum", 2, 1).with_param("Inputs", "+-");
        let vars = [Some("a".to_string()), Some("b".to_string())];
        let a = interval("a", 0.0, 1.0);
        let facts = [vec![a.clone()], vec![interval("b", 2.0, 3.0)]];
        let applied = SumAnalyzer.apply_information(&a, &ctx(&block, 0, &vars, &facts));
        assert_eq!(hull_of(applied), Some(NumRange::closed(-3.0, -1.0)));
    }

    #[test]
    fn divisor_crossing_zero_stops() {
        let block = Block::new(1, "D", "Divide", 2, 1);
        let vars = [Some("n".to_string()), Some("d".to_string())];
        let d = interval("d", -1.0, 1.0);
        let facts = [vec![interval("n", 1.0, 1.0)], vec![d.clone()]];
        let applied = ProductAnalyzer.apply_information(&d, &ctx(&block, 1, &vars, &facts));
        assert_eq!(applied, Applied::Terminal);

        let d2 = interval("d", 1.0, 2.0);
        let facts2 = [vec![interval("n", 4.0, 4.0)], vec![d2.clone()]];
        let applied = ProductAnalyzer.apply_information(&d2, &ctx(&block, 1, &vars, &facts2));
        assert_eq!(hull_of(applied), Some(NumRange::closed(2.0, 4.0)));
    }

    #[test]
    fn saturation_clamps() {
        let block = Block::new(1, "Sat", "Saturation", 1, 1)
            .with_param("UpperLimit", "5")
            .with_param("LowerLimit", "-5");
        let vars = [Some("a".to_string())];
        let a = interval("a", -10.0, 3.0);
        let facts = [vec![a.clone()]];
        let applied = SaturationAnalyzer.apply_information(&a, &ctx(&block, 0, &vars, &facts));
        assert_eq!(hull_of(applied), Some(NumRange::closed(-5.0, 3.0)));
    }

    #[test]
    fn delay_hulls_with_initial_condition() {
        let block = Block::new(1, "D", "UnitDelay", 1, 1).with_param("InitialCondition", "5");
        let vars = [Some("a".to_string())];
        let a = interval("a", -1.0, 1.0);
        let facts = [vec![a.clone()]];
        let applied = DelayAnalyzer.apply_information(&a, &ctx(&block, 0, &vars, &facts));
        assert_eq!(hull_of(applied), Some(NumRange::closed(-1.0, 5.0)));
        assert_eq!(
            DelayAnalyzer.feedback_simulation_seed(&block),
            Some(point_fact(Term::var("D_out"), 5.0))
        );
    }

    #[test]
    fn switch_builds_guarded_implication() {
        let block = Block::new(1, "Sw", "Switch", 3, 1).with_param("Threshold", "2");
        let vars = [
            Some("a".to_string()),
            Some("c".to_string()),
            Some("b".to_string()),
        ];
        let a = interval("a", 0.0, 1.0);
        let facts = [vec![a.clone()], vec![], vec![]];
        let Applied::Propagate(Information::Control(ctrl)) =
            SwitchAnalyzer.apply_information(&a, &ctx(&block, 0, &vars, &facts))
        else {
            panic!("expected a control fact");
        };
        assert_eq!(ctrl.implications[0].antecedent.to_string(), "c >= 2");
        assert_eq!(
            ctrl.implications[0].consequent.subject(),
            Some(&Term::var("Sw_out"))
        );
    }

    #[test]
    fn switch_feedback_evaluation_picks_branch() {
        let block = Block::new(1, "Sw", "Switch", 3, 1);
        let vars = [
            Some("a".to_string()),
            Some("c".to_string()),
            Some("b".to_string()),
        ];
        let facts = [
            vec![interval("a", 1.0, 2.0)],
            vec![interval("c", 3.0, 4.0)],
            vec![interval("b", 7.0, 8.0)],
        ];
        let fact = SwitchAnalyzer
            .evaluate_condition_for_feedback(&ctx(&block, 0, &vars, &facts))
            .unwrap();
        assert_eq!(fact.as_boundary().unwrap().hull(), Some(NumRange::closed(1.0, 2.0)));
    }

    #[test]
    fn outport_attaches_to_node() {
        let block = Block::new(1, "Out", "Outport", 1, 0);
        let vars = [Some("a".to_string())];
        let a = interval("a", 0.0, 1.0);
        let facts = [vec![a.clone()]];
        let applied = OutportAnalyzer.apply_information(&a, &ctx(&block, 0, &vars, &facts));
        assert_eq!(applied, Applied::TerminalAtNode(a.retarget(&Term::var("Out"))));
    }
}
