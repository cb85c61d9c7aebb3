// macros.rs — Placeholder macros and their transitive resolution
//
// Pure blocks are encoded as placeholders (their output variable) plus a
// macro giving the placeholder's value in terms of other variables. Before
// emission the macro set is closed under substitution: whenever one macro's
// replacement mentions another's placeholder, the latter is substituted into
// the former. Whole uses of a vector placeholder are first lifted into
// per-element uses. The closed set is then applied once, in order, to every
// part of the symbolic model so that no placeholder survives.
//
// Preconditions: placeholders are introduced in dataflow order.
// Postconditions: `finalize` returns a set in which no replacement mentions
//                 another macro's placeholder; `apply_all` leaves no
//                 placeholder in the model.
// Failure modes: dependency cycles → `MacroError::Cycle`; two different
//                definitions of one placeholder → `MacroError::Conflict`.
// Side effects: `apply_all` rewrites the model in place.

use std::fmt;

use crate::diag::{codes, Diagnostic};
use crate::hybrid::{ContinuousEvolution, HybridProgram, SymbolicModel};
use crate::term::{element_name, Formula, Term};

// ── Macro variants ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Macro {
    /// `placeholder := replacement`
    Simple {
        placeholder: String,
        replacement: Term,
    },
    /// `placeholder[i] := replacements[i]` for a vector-valued signal.
    Vector {
        placeholder: String,
        replacements: Vec<Term>,
    },
    /// `placeholder := t_k` whenever guard `g_k` holds; guards are mutually
    /// exclusive.
    Conditional {
        placeholder: String,
        cases: Vec<(Formula, Term)>,
    },
    /// Width marker for a vector signal. Never substituted.
    SizePropagation { placeholder: String, width: usize },
}

impl Macro {
    pub fn simple(placeholder: impl Into<String>, replacement: Term) -> Self {
        Macro::Simple {
            placeholder: placeholder.into(),
            replacement,
        }
    }

    pub fn placeholder(&self) -> &str {
        match self {
            Macro::Simple { placeholder, .. }
            | Macro::Vector { placeholder, .. }
            | Macro::Conditional { placeholder, .. }
            | Macro::SizePropagation { placeholder, .. } => placeholder,
        }
    }

    pub fn is_size_marker(&self) -> bool {
        matches!(self, Macro::SizePropagation { .. })
    }

    /// Right-hand side terms, in case order.
    pub fn replacement_terms(&self) -> Vec<&Term> {
        match self {
            Macro::Simple { replacement, .. } => vec![replacement],
            Macro::Vector { replacements, .. } => replacements.iter().collect(),
            Macro::Conditional { cases, .. } => cases.iter().map(|(_, t)| t).collect(),
            Macro::SizePropagation { .. } => Vec::new(),
        }
    }

    /// Whether the replacement (or a guard) mentions variable `name`.
    pub fn contains_term(&self, name: &str) -> bool {
        match self {
            Macro::Conditional { cases, .. } => cases
                .iter()
                .any(|(g, t)| g.contains_var(name) || t.contains_var(name)),
            Macro::SizePropagation { .. } => false,
            _ => self.replacement_terms().iter().any(|t| t.contains_var(name)),
        }
    }

    /// Whether substituting `other` into `self` could change anything.
    pub fn depends_on(&self, other: &Macro) -> bool {
        if self.is_size_marker() || other.is_size_marker() {
            return false;
        }
        let p = other.placeholder();
        if self.contains_term(p) {
            return true;
        }
        match other {
            Macro::Vector { replacements, .. } => {
                (0..replacements.len()).any(|i| self.contains_term(&element_name(p, i)))
            }
            _ => false,
        }
    }

    /// Substitute `other`'s placeholder into this macro's replacement.
    /// An empty result means nothing changed.
    pub fn apply_other_macro(&self, other: &Macro) -> Vec<Macro> {
        if !self.depends_on(other) {
            return Vec::new();
        }
        let results = match other {
            Macro::Simple { .. } | Macro::Vector { .. } => vec![self.apply_plain(other)],
            Macro::Conditional { placeholder, cases } => {
                self.apply_conditional(placeholder, cases)
            }
            Macro::SizePropagation { .. } => Vec::new(),
        };
        if results.len() == 1 && results[0] == *self {
            return Vec::new();
        }
        results
    }

    fn apply_plain(&self, other: &Macro) -> Macro {
        // `y := v` where `v` is a whole vector makes `y` a vector too.
        if let (
            Macro::Simple {
                placeholder,
                replacement: Term::Var(v),
            },
            Macro::Vector {
                placeholder: p,
                replacements,
            },
        ) = (self, other)
        {
            if v == p {
                return Macro::Vector {
                    placeholder: placeholder.clone(),
                    replacements: replacements.clone(),
                };
            }
        }
        match self {
            Macro::Simple {
                placeholder,
                replacement,
            } => Macro::Simple {
                placeholder: placeholder.clone(),
                replacement: substitute_term(replacement, other),
            },
            Macro::Vector {
                placeholder,
                replacements,
            } => Macro::Vector {
                placeholder: placeholder.clone(),
                replacements: replacements
                    .iter()
                    .map(|t| substitute_term(t, other))
                    .collect(),
            },
            Macro::Conditional { placeholder, cases } => Macro::Conditional {
                placeholder: placeholder.clone(),
                cases: cases
                    .iter()
                    .map(|(g, t)| (substitute_formula(g, other), substitute_term(t, other)))
                    .collect(),
            },
            Macro::SizePropagation { .. } => self.clone(),
        }
    }

    fn apply_conditional(&self, p: &str, other_cases: &[(Formula, Term)]) -> Vec<Macro> {
        match self {
            Macro::Simple {
                placeholder,
                replacement,
            } => vec![Macro::Conditional {
                placeholder: placeholder.clone(),
                cases: other_cases
                    .iter()
                    .map(|(g, r)| (g.clone(), replacement.substitute(p, r)))
                    .collect(),
            }],
            Macro::Conditional { placeholder, cases } => {
                let mut merged = Vec::new();
                for (own_guard, own_term) in cases {
                    if !own_guard.contains_var(p) && !own_term.contains_var(p) {
                        merged.push((own_guard.clone(), own_term.clone()));
                        continue;
                    }
                    for (g, r) in other_cases {
                        merged.push((
                            Formula::and(vec![own_guard.substitute(p, r), g.clone()]),
                            own_term.substitute(p, r),
                        ));
                    }
                }
                vec![Macro::Conditional {
                    placeholder: placeholder.clone(),
                    cases: merged,
                }]
            }
            // A guarded element cannot live inside a vector; split into
            // per-element macros instead.
            Macro::Vector {
                placeholder,
                replacements,
            } => replacements
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let element = Macro::simple(element_name(placeholder, i), t.clone());
                    if t.contains_var(p) {
                        element
                            .apply_conditional(p, other_cases)
                            .into_iter()
                            .next()
                            .unwrap_or(element)
                    } else {
                        element
                    }
                })
                .collect(),
            Macro::SizePropagation { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Macro::Simple {
                placeholder,
                replacement,
            } => write!(f, "{} := {}", placeholder, replacement),
            Macro::Vector {
                placeholder,
                replacements,
            } => {
                write!(f, "{} := [", placeholder)?;
                for (i, t) in replacements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "]")
            }
            Macro::Conditional { placeholder, cases } => {
                write!(f, "{} :=", placeholder)?;
                for (i, (g, t)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, " |")?;
                    }
                    write!(f, " {} if {}", t, g)?;
                }
                Ok(())
            }
            Macro::SizePropagation { placeholder, width } => {
                write!(f, "#{} = {}", placeholder, width)
            }
        }
    }
}

fn substitute_term(term: &Term, by: &Macro) -> Term {
    match by {
        Macro::Simple {
            placeholder,
            replacement,
        } => term.substitute(placeholder, replacement),
        Macro::Vector {
            placeholder,
            replacements,
        } => replacements
            .iter()
            .enumerate()
            .fold(term.clone(), |acc, (i, r)| {
                acc.substitute(&element_name(placeholder, i), r)
            }),
        Macro::Conditional { .. } | Macro::SizePropagation { .. } => term.clone(),
    }
}

fn substitute_formula(formula: &Formula, by: &Macro) -> Formula {
    match by {
        Macro::Simple {
            placeholder,
            replacement,
        } => formula.substitute(placeholder, replacement),
        Macro::Vector {
            placeholder,
            replacements,
        } => replacements
            .iter()
            .enumerate()
            .fold(formula.clone(), |acc, (i, r)| {
                acc.substitute(&element_name(placeholder, i), r)
            }),
        Macro::Conditional { .. } | Macro::SizePropagation { .. } => formula.clone(),
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum MacroError {
    /// Placeholders that reference each other, in dependency order.
    Cycle { placeholders: Vec<String> },
    Conflict { placeholder: String },
}

impl fmt::Display for MacroError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroError::Cycle { placeholders } => {
                write!(f, "macro dependency cycle: {}", placeholders.join(" -> "))
            }
            MacroError::Conflict { placeholder } => {
                write!(f, "conflicting definitions for placeholder '{}'", placeholder)
            }
        }
    }
}

impl std::error::Error for MacroError {}

impl MacroError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            MacroError::Cycle { .. } => Diagnostic::error(codes::E0201, self.to_string())
                .with_hint("macros were applied without closure; placeholders may remain"),
            MacroError::Conflict { .. } => Diagnostic::error(codes::E0202, self.to_string()),
        }
    }
}

// ── Finalization ────────────────────────────────────────────────────────────

fn dedup(macros: Vec<Macro>) -> Vec<Macro> {
    let mut out: Vec<Macro> = Vec::with_capacity(macros.len());
    for m in macros {
        if !out.contains(&m) {
            out.push(m);
        }
    }
    out
}

fn check_conflicts(macros: &[Macro]) -> Result<(), MacroError> {
    for (i, a) in macros.iter().enumerate() {
        for b in &macros[i + 1..] {
            if a.is_size_marker() == b.is_size_marker()
                && a.placeholder() == b.placeholder()
                && a != b
            {
                return Err(MacroError::Conflict {
                    placeholder: a.placeholder().to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Depth-first search over "replacement of j mentions placeholder of i".
fn check_acyclic(macros: &[Macro]) -> Result<(), MacroError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Active,
        Done,
    }

    fn visit(
        j: usize,
        macros: &[Macro],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Result<(), MacroError> {
        marks[j] = Mark::Active;
        path.push(j);
        for (i, dep) in macros.iter().enumerate() {
            if !macros[j].depends_on(dep) {
                continue;
            }
            match marks[i] {
                Mark::Active => {
                    let from = path.iter().position(|&k| k == i).unwrap_or(0);
                    let mut placeholders: Vec<String> = path[from..]
                        .iter()
                        .map(|&k| macros[k].placeholder().to_string())
                        .collect();
                    placeholders.push(macros[i].placeholder().to_string());
                    return Err(MacroError::Cycle { placeholders });
                }
                Mark::Unvisited => visit(i, macros, marks, path)?,
                Mark::Done => {}
            }
        }
        path.pop();
        marks[j] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; macros.len()];
    let mut path = Vec::new();
    for j in 0..macros.len() {
        if marks[j] == Mark::Unvisited {
            visit(j, macros, &mut marks, &mut path)?;
        }
    }
    Ok(())
}

/// Close the macro set under substitution.
pub fn finalize(macros: Vec<Macro>) -> Result<Vec<Macro>, MacroError> {
    let mut set = dedup(macros);
    check_conflicts(&set)?;
    check_acyclic(&set)?;
    let mut set = lift_vector_uses(set);

    let mut rounds = 0usize;
    loop {
        let mut changed = false;
        'scan: for i in 0..set.len() {
            for j in 0..set.len() {
                if i == j {
                    continue;
                }
                let results: Vec<Macro> = set[j]
                    .apply_other_macro(&set[i])
                    .into_iter()
                    .filter(|m| *m != set[j])
                    .collect();
                if results.is_empty() {
                    continue;
                }
                log::trace!("macros: {} into {}", set[i].placeholder(), set[j].placeholder());
                set.splice(j..=j, results);
                changed = true;
                break 'scan;
            }
        }
        if !changed {
            break;
        }
        rounds += 1;
    }
    log::debug!("macros: closed {} macros after {} rewrites", set.len(), rounds);
    Ok(dedup(set))
}

// ── Whole-vector uses ──────────────────────────────────────────────────────

/// `name[i]` split into `name` and `i`.
fn parse_element(name: &str) -> Option<(&str, usize)> {
    let (base, rest) = name.split_once('[')?;
    let index = rest.strip_suffix(']')?.parse().ok()?;
    Some((base, index))
}

/// Width of every vector-valued placeholder the set defines, marks or
/// defines element by element.
fn vector_widths(macros: &[Macro]) -> Vec<(String, usize)> {
    let mut widths: Vec<(String, usize)> = Vec::new();
    let mut note = |name: &str, width: usize| {
        match widths.iter_mut().find(|(n, _)| n == name) {
            Some((_, w)) => *w = (*w).max(width),
            None => widths.push((name.to_string(), width)),
        }
    };
    for m in macros {
        match m {
            Macro::Vector { placeholder, replacements } => note(placeholder, replacements.len()),
            Macro::SizePropagation { placeholder, width } => note(placeholder, *width),
            other => {
                if let Some((base, index)) = parse_element(other.placeholder()) {
                    note(base, index + 1);
                }
            }
        }
    }
    widths
}

fn elementwise(term: &Term, vector: &str, index: usize) -> Term {
    term.substitute(vector, &Term::element(vector, index))
}

impl Macro {
    /// Rewrite whole uses of `vector` element by element.
    fn lift_vector_use(&self, vector: &str, width: usize) -> Vec<Macro> {
        match self {
            Macro::Simple { placeholder, replacement } => vec![Macro::Vector {
                placeholder: placeholder.clone(),
                replacements: (0..width).map(|i| elementwise(replacement, vector, i)).collect(),
            }],
            Macro::Vector { placeholder, replacements } => vec![Macro::Vector {
                placeholder: placeholder.clone(),
                replacements: replacements
                    .iter()
                    .enumerate()
                    .map(|(i, t)| elementwise(t, vector, i))
                    .collect(),
            }],
            Macro::Conditional { placeholder, cases } => (0..width)
                .map(|i| Macro::Conditional {
                    placeholder: element_name(placeholder, i),
                    cases: cases
                        .iter()
                        .map(|(g, t)| {
                            (g.substitute(vector, &Term::element(vector, i)), elementwise(t, vector, i))
                        })
                        .collect(),
                })
                .collect(),
            Macro::SizePropagation { .. } => vec![self.clone()],
        }
    }
}

/// Replace every whole use of a vector placeholder by its elements. A lifted
/// macro becomes vector-valued itself, so its users are lifted in turn.
fn lift_vector_uses(mut set: Vec<Macro>) -> Vec<Macro> {
    loop {
        let widths = vector_widths(&set);
        let found = set.iter().enumerate().find_map(|(j, m)| {
            widths
                .iter()
                .find(|(v, _)| m.placeholder() != v && m.contains_term(v))
                .map(|(v, w)| (j, v.clone(), *w))
        });
        let Some((j, vector, width)) = found else {
            return set;
        };
        log::trace!("macros: lifting {} over {}[0..{}]", set[j].placeholder(), vector, width);
        let lifted = set[j].lift_vector_use(&vector, width);
        set.splice(j..=j, lifted);
    }
}

fn lift_formula(formula: &Formula, vector: &str, width: usize) -> Formula {
    if !formula.contains_var(vector) {
        return formula.clone();
    }
    Formula::and(
        (0..width)
            .map(|i| formula.substitute(vector, &Term::element(vector, i)))
            .collect(),
    )
}

/// Lift whole uses of `vector` in `program`; assignment targets that become
/// vector-valued are pushed onto `targets`.
fn lift_program(
    program: &HybridProgram,
    vector: &str,
    width: usize,
    targets: &mut Vec<String>,
) -> HybridProgram {
    match program {
        HybridProgram::Assign(x, t) if t.contains_var(vector) => {
            targets.push(x.clone());
            HybridProgram::seq(
                (0..width)
                    .map(|i| HybridProgram::Assign(element_name(x, i), elementwise(t, vector, i)))
                    .collect(),
            )
        }
        HybridProgram::Test(f) => HybridProgram::Test(lift_formula(f, vector, width)),
        HybridProgram::Seq(parts) => HybridProgram::seq(
            parts.iter().map(|p| lift_program(p, vector, width, targets)).collect(),
        ),
        HybridProgram::Choice(parts) => HybridProgram::choice(
            parts.iter().map(|p| lift_program(p, vector, width, targets)).collect(),
        ),
        HybridProgram::Loop(body) => {
            HybridProgram::Loop(Box::new(lift_program(body, vector, width, targets)))
        }
        other => other.clone(),
    }
}

fn lift_evolution(
    evolution: &ContinuousEvolution,
    vector: &str,
    width: usize,
    targets: &mut Vec<String>,
) -> ContinuousEvolution {
    let mut odes = Vec::with_capacity(evolution.odes.len());
    for (x, t) in &evolution.odes {
        if t.contains_var(vector) {
            targets.push(x.clone());
            odes.extend((0..width).map(|i| (element_name(x, i), elementwise(t, vector, i))));
        } else {
            odes.push((x.clone(), t.clone()));
        }
    }
    ContinuousEvolution {
        odes,
        domain: lift_formula(&evolution.domain, vector, width),
    }
}

/// Lift whole uses of every vector in `model`, following assignments that
/// copy a vector into another variable.
fn lift_model(model: &mut SymbolicModel, macros: &[Macro]) {
    let mut pending = vector_widths(macros);
    let mut done: Vec<String> = Vec::new();
    while let Some((vector, width)) = pending.pop() {
        if done.contains(&vector) {
            continue;
        }
        let mut targets = Vec::new();
        model.initial_conditions = lift_formula(&model.initial_conditions, &vector, width);
        model.discrete = lift_program(&model.discrete, &vector, width, &mut targets);
        model.continuous = model
            .continuous
            .iter()
            .map(|e| lift_evolution(e, &vector, width, &mut targets))
            .collect();
        model.contract = lift_program(&model.contract, &vector, width, &mut targets);
        model.security_properties = model
            .security_properties
            .iter()
            .map(|p| lift_formula(p, &vector, width))
            .collect();
        pending.extend(targets.into_iter().map(|x| (x, width)));
        done.push(vector);
    }
}

// ── Application ─────────────────────────────────────────────────────────────

/// Guarded alternatives for `term` after applying `m`.
fn expand_term(term: &Term, m: &Macro) -> Vec<(Formula, Term)> {
    match m {
        Macro::Conditional { placeholder, cases } if term.contains_var(placeholder) => cases
            .iter()
            .map(|(g, r)| (g.clone(), term.substitute(placeholder, r)))
            .collect(),
        _ => vec![(Formula::True, substitute_term(term, m))],
    }
}

pub fn apply_to_formula(formula: &Formula, m: &Macro) -> Formula {
    match m {
        Macro::Conditional { placeholder, cases } if formula.contains_var(placeholder) => {
            Formula::or(
                cases
                    .iter()
                    .map(|(g, r)| Formula::and(vec![g.clone(), formula.substitute(placeholder, r)]))
                    .collect(),
            )
        }
        _ => substitute_formula(formula, m),
    }
}

pub fn apply_to_program(program: &HybridProgram, m: &Macro) -> HybridProgram {
    match program {
        HybridProgram::Skip | HybridProgram::NondetAssign(_) => program.clone(),
        HybridProgram::Assign(x, t) => {
            let mut alternatives = expand_term(t, m);
            if alternatives.len() == 1 && alternatives[0].0 == Formula::True {
                let (_, t) = alternatives.remove(0);
                return HybridProgram::Assign(x.clone(), t);
            }
            HybridProgram::choice(
                alternatives
                    .into_iter()
                    .map(|(g, t)| {
                        HybridProgram::seq(vec![
                            HybridProgram::Test(g),
                            HybridProgram::Assign(x.clone(), t),
                        ])
                    })
                    .collect(),
            )
        }
        HybridProgram::Test(f) => HybridProgram::Test(apply_to_formula(f, m)),
        HybridProgram::Seq(parts) => {
            HybridProgram::seq(parts.iter().map(|p| apply_to_program(p, m)).collect())
        }
        HybridProgram::Choice(parts) => {
            HybridProgram::choice(parts.iter().map(|p| apply_to_program(p, m)).collect())
        }
        HybridProgram::Loop(body) => HybridProgram::Loop(Box::new(apply_to_program(body, m))),
    }
}

/// Apply `m` to one evolution; a conditional splits it per guard.
pub fn apply_to_evolution(evolution: &ContinuousEvolution, m: &Macro) -> Vec<ContinuousEvolution> {
    match m {
        Macro::Conditional { placeholder, cases } if evolution.contains_var(placeholder) => cases
            .iter()
            .map(|(g, r)| ContinuousEvolution {
                odes: evolution
                    .odes
                    .iter()
                    .map(|(x, t)| (x.clone(), t.substitute(placeholder, r)))
                    .collect(),
                domain: Formula::and(vec![
                    g.clone(),
                    evolution.domain.substitute(placeholder, r),
                ]),
            })
            .collect(),
        _ => vec![ContinuousEvolution {
            odes: evolution
                .odes
                .iter()
                .map(|(x, t)| (x.clone(), substitute_term(t, m)))
                .collect(),
            domain: substitute_formula(&evolution.domain, m),
        }],
    }
}

/// Apply every macro, in order, to every part of `model`.
pub fn apply_all(model: &mut SymbolicModel, macros: &[Macro]) {
    lift_model(model, macros);
    for m in macros.iter().filter(|m| !m.is_size_marker()) {
        model.initial_conditions = apply_to_formula(&model.initial_conditions, m);
        model.discrete = apply_to_program(&model.discrete, m);
        model.continuous = model
            .continuous
            .iter()
            .flat_map(|e| apply_to_evolution(e, m))
            .collect();
        model.contract = apply_to_program(&model.contract, m);
        let mut properties = Vec::with_capacity(model.security_properties.len());
        for p in &model.security_properties {
            let rewritten = apply_to_formula(p, m);
            if !properties.contains(&rewritten) {
                properties.push(rewritten);
            }
        }
        model.security_properties = properties;
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::RelOp;

    fn v(name: &str) -> Term {
        Term::var(name)
    }

    fn guard(name: &str, op: RelOp) -> Formula {
        Formula::rel(v(name), op, Term::num(0.0))
    }

    #[test]
    fn chain_resolves_transitively() {
        let set = vec![
            Macro::simple("c", v("b").mul(Term::num(2.0))),
            Macro::simple("b", v("a").add(Term::num(1.0))),
        ];
        let closed = finalize(set).unwrap();
        assert_eq!(
            closed[0],
            Macro::simple("c", v("a").add(Term::num(1.0)).mul(Term::num(2.0)))
        );
        for m in &closed {
            for other in &closed {
                assert!(!m.depends_on(other));
            }
        }
    }

    #[test]
    fn finalize_is_idempotent() {
        let set = vec![
            Macro::simple("y", v("s").add(v("k"))),
            Macro::Conditional {
                placeholder: "s".into(),
                cases: vec![
                    (guard("u", RelOp::Ge), v("a")),
                    (guard("u", RelOp::Lt), v("b")),
                ],
            },
            Macro::simple("k", Term::num(3.0)),
        ];
        let once = finalize(set).unwrap();
        let twice = finalize(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn conditional_into_simple_becomes_conditional() {
        let s = Macro::Conditional {
            placeholder: "s".into(),
            cases: vec![(guard("u", RelOp::Ge), v("a")), (guard("u", RelOp::Lt), v("b"))],
        };
        let y = Macro::simple("y", v("s").neg());
        let out = y.apply_other_macro(&s);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Macro::Conditional { cases, .. } if cases.len() == 2));
    }

    #[test]
    fn cycle_is_rejected() {
        let set = vec![Macro::simple("a", v("b")), Macro::simple("b", v("a"))];
        let err = finalize(set).unwrap_err();
        assert!(matches!(err, MacroError::Cycle { ref placeholders } if placeholders.len() == 3));
        assert_eq!(err.to_diagnostic().code, Some(codes::E0201));
    }

    #[test]
    fn conflicting_definitions_are_rejected() {
        let set = vec![Macro::simple("a", Term::num(1.0)), Macro::simple("a", Term::num(2.0))];
        assert_eq!(
            finalize(set).unwrap_err(),
            MacroError::Conflict { placeholder: "a".into() }
        );
    }

    #[test]
    fn size_markers_never_substitute() {
        let size = Macro::SizePropagation { placeholder: "m".into(), width: 2 };
        let user = Macro::simple("y", v("m"));
        assert!(user.apply_other_macro(&size).is_empty());
        assert!(size.apply_other_macro(&user).is_empty());
    }

    #[test]
    fn vector_alias_and_elements() {
        let vec_macro = Macro::Vector {
            placeholder: "m".into(),
            replacements: vec![v("a"), v("b")],
        };
        let alias = Macro::simple("w", v("m"));
        assert_eq!(
            alias.apply_other_macro(&vec_macro),
            vec![Macro::Vector { placeholder: "w".into(), replacements: vec![v("a"), v("b")] }]
        );
        let pick = Macro::simple("e", Term::element("m", 1));
        assert_eq!(pick.apply_other_macro(&vec_macro), vec![Macro::simple("e", v("b"))]);
    }

    #[test]
    fn conditional_assignment_becomes_choice() {
        let s = Macro::Conditional {
            placeholder: "s".into(),
            cases: vec![(guard("u", RelOp::Ge), v("a")), (guard("u", RelOp::Lt), v("b"))],
        };
        let prog = HybridProgram::Assign("x".into(), v("s"));
        let out = apply_to_program(&prog, &s);
        let HybridProgram::Choice(branches) = out else {
            panic!("expected a choice");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(
            branches[0],
            HybridProgram::Seq(vec![
                HybridProgram::Test(guard("u", RelOp::Ge)),
                HybridProgram::Assign("x".into(), v("a")),
            ])
        );
    }

    #[test]
    fn whole_vector_use_is_lifted() {
        let set = vec![
            Macro::simple("g", v("m").mul(Term::num(2.0))),
            Macro::Vector { placeholder: "m".into(), replacements: vec![v("a"), v("b")] },
            Macro::SizePropagation { placeholder: "m".into(), width: 2 },
        ];
        let closed = finalize(set).unwrap();
        assert_eq!(
            closed[0],
            Macro::Vector {
                placeholder: "g".into(),
                replacements: vec![v("a").mul(Term::num(2.0)), v("b").mul(Term::num(2.0))],
            }
        );
    }

    #[test]
    fn vector_split_by_switch_stays_resolvable() {
        let set = vec![
            Macro::simple("w", v("m")),
            Macro::Vector { placeholder: "m".into(), replacements: vec![v("s"), v("c")] },
            Macro::Conditional {
                placeholder: "s".into(),
                cases: vec![(guard("u", RelOp::Ge), v("a")), (guard("u", RelOp::Lt), v("b"))],
            },
        ];
        let closed = finalize(set).unwrap();
        let mut model = SymbolicModel::new("v");
        model.discrete = HybridProgram::Assign("out".into(), v("w"));
        apply_all(&mut model, &closed);
        for name in ["w", "m", "s"] {
            assert!(!model.mentions(name), "{name} survived in {}", model.discrete);
        }
        assert!(model.mentions("c"));
    }

    #[test]
    fn vector_assignment_is_split_per_element() {
        let mut model = SymbolicModel::new("v");
        model.discrete = HybridProgram::Assign("out".into(), v("m"));
        let macros =
            finalize(vec![Macro::Vector { placeholder: "m".into(), replacements: vec![v("a"), v("b")] }])
                .unwrap();
        apply_all(&mut model, &macros);
        assert_eq!(
            model.discrete,
            HybridProgram::Seq(vec![
                HybridProgram::Assign("out[0]".into(), v("a")),
                HybridProgram::Assign("out[1]".into(), v("b")),
            ])
        );
    }

    #[test]
    fn apply_all_removes_placeholders() {
        let mut model = SymbolicModel::new("m");
        model.discrete = HybridProgram::Assign("y".into(), v("p"));
        model.continuous.push(ContinuousEvolution {
            odes: vec![("x".into(), v("p"))],
            domain: Formula::True,
        });
        model.contract = HybridProgram::Test(Formula::rel(v("p"), RelOp::Ge, Term::num(0.0)));
        model.security_properties.push(Formula::rel(v("p"), RelOp::Ne, Term::num(0.0)));
        let macros = finalize(vec![
            Macro::simple("p", v("q").mul(Term::num(2.0))),
            Macro::simple("q", v("u")),
        ])
        .unwrap();
        apply_all(&mut model, &macros);
        assert!(!model.mentions("p"));
        assert!(!model.mentions("q"));
        assert!(model.mentions("u"));
    }
}
