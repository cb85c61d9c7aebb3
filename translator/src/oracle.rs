// oracle.rs — Satisfiability oracle interface and the built-in interval oracle
//
// Safety analysis asks "can this conjunction of facts and a sign condition
// hold?" through the `SatOracle` trait so other backends can be plugged in
// (or mocked in tests). The built-in `IntervalOracle` decides formulas whose
// atoms compare a single variable against a constant by expanding to DNF and
// intersecting per-variable ranges in each clause.
//
// Preconditions: none.
// Postconditions: every query is independent; no state survives a call.
// Failure modes: oversized DNF or non-linear atoms → `SatResult::Unknown`;
//                NaN constants → `SatResult::Error`.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use crate::info::NumRange;
use crate::term::{Formula, RelOp, Relation, Term};

// ── Public interface ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Satisfiable,
    Unsatisfiable,
    Unknown,
    Error(String),
}

impl SatResult {
    /// Anything but a definite "unsatisfiable" must be treated as possible.
    pub fn is_possible(&self) -> bool {
        !matches!(self, SatResult::Unsatisfiable)
    }
}

impl fmt::Display for SatResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SatResult::Satisfiable => write!(f, "SATISFIABLE"),
            SatResult::Unsatisfiable => write!(f, "UNSATISFIABLE"),
            SatResult::Unknown => write!(f, "UNKNOWN"),
            SatResult::Error(msg) => write!(f, "ERROR({})", msg),
        }
    }
}

/// A decision procedure for formulas over real-valued terms.
pub trait SatOracle {
    fn check(&self, formula: &Formula) -> SatResult;
}

// ── Interval oracle ─────────────────────────────────────────────────────────

pub struct IntervalOracle {
    max_clauses: usize,
}

impl IntervalOracle {
    pub fn new(max_clauses: usize) -> Self {
        IntervalOracle {
            max_clauses: max_clauses.max(1),
        }
    }
}

impl Default for IntervalOracle {
    fn default() -> Self {
        IntervalOracle::new(64)
    }
}

/// Conjunctive clause of atoms.
type Clause = Vec<Relation>;

impl SatOracle for IntervalOracle {
    fn check(&self, formula: &Formula) -> SatResult {
        let nnf = to_nnf(formula, false);
        let clauses = match to_dnf(&nnf, self.max_clauses) {
            Some(c) => c,
            None => {
                log::debug!("oracle: DNF exceeds {} clauses", self.max_clauses);
                return SatResult::Unknown;
            }
        };

        let mut unknown = false;
        for clause in &clauses {
            match check_clause(clause) {
                ClauseVerdict::Sat => return SatResult::Satisfiable,
                ClauseVerdict::Unsat => {}
                ClauseVerdict::Unknown => unknown = true,
                ClauseVerdict::Error(msg) => return SatResult::Error(msg),
            }
        }
        if unknown {
            SatResult::Unknown
        } else {
            SatResult::Unsatisfiable
        }
    }
}

// ── Normal forms ────────────────────────────────────────────────────────────

/// Negation normal form: `Not` only survives folded into relations.
fn to_nnf(formula: &Formula, negated: bool) -> Formula {
    match (formula, negated) {
        (Formula::True, false) | (Formula::False, true) => Formula::True,
        (Formula::True, true) | (Formula::False, false) => Formula::False,
        (Formula::Rel(r), false) => Formula::Rel(r.clone()),
        (Formula::Rel(r), true) => Formula::Rel(r.negate()),
        (Formula::And(parts), false) | (Formula::Or(parts), true) => {
            Formula::and(parts.iter().map(|p| to_nnf(p, negated)).collect())
        }
        (Formula::Or(parts), false) | (Formula::And(parts), true) => {
            Formula::or(parts.iter().map(|p| to_nnf(p, negated)).collect())
        }
        (Formula::Not(inner), _) => to_nnf(inner, !negated),
        (Formula::Implies(a, b), false) => {
            Formula::or(vec![to_nnf(a, true), to_nnf(b, false)])
        }
        (Formula::Implies(a, b), true) => {
            Formula::and(vec![to_nnf(a, false), to_nnf(b, true)])
        }
    }
}

/// Disjunctive normal form of an NNF formula; `None` past `limit` clauses.
fn to_dnf(formula: &Formula, limit: usize) -> Option<Vec<Clause>> {
    match formula {
        Formula::True => Some(vec![Vec::new()]),
        Formula::False => Some(Vec::new()),
        Formula::Rel(r) => Some(vec![vec![r.clone()]]),
        Formula::Or(parts) => {
            let mut out = Vec::new();
            for p in parts {
                out.extend(to_dnf(p, limit)?);
                if out.len() > limit {
                    return None;
                }
            }
            Some(out)
        }
        Formula::And(parts) => {
            let mut acc: Vec<Clause> = vec![Vec::new()];
            for p in parts {
                let rhs = to_dnf(p, limit)?;
                if acc.len() * rhs.len() > limit {
                    return None;
                }
                let mut next = Vec::with_capacity(acc.len() * rhs.len());
                for left in &acc {
                    for right in &rhs {
                        let mut clause = left.clone();
                        clause.extend(right.iter().cloned());
                        next.push(clause);
                    }
                }
                acc = next;
            }
            Some(acc)
        }
        // Unreachable after NNF, but stay total.
        Formula::Not(_) | Formula::Implies(..) => to_dnf(&to_nnf(formula, false), limit),
    }
}

// ── Clause decision ─────────────────────────────────────────────────────────

enum ClauseVerdict {
    Sat,
    Unsat,
    Unknown,
    Error(String),
}

/// Normalise an atom to `var ⋈ c`.
enum Atom {
    Bound(String, RelOp, f64),
    Ground(bool),
    Opaque,
}

fn classify(rel: &Relation) -> Result<Atom, String> {
    let lhs_val = rel.lhs.eval();
    let rhs_val = rel.rhs.eval();
    for v in [lhs_val, rhs_val].into_iter().flatten() {
        if v.is_nan() {
            return Err(format!("non-numeric constant in `{}`", rel));
        }
    }
    Ok(match (&rel.lhs, lhs_val, &rel.rhs, rhs_val) {
        (_, Some(a), _, Some(b)) => Atom::Ground(rel.op.holds(a, b)),
        (Term::Var(x), None, _, Some(c)) => Atom::Bound(x.clone(), rel.op, c),
        (_, Some(c), Term::Var(x), None) => Atom::Bound(x.clone(), rel.op.flip(), c),
        _ => Atom::Opaque,
    })
}

fn check_clause(clause: &[Relation]) -> ClauseVerdict {
    let mut ranges: HashMap<String, NumRange> = HashMap::new();
    let mut excluded: Vec<(String, f64)> = Vec::new();
    let mut opaque = false;

    for rel in clause {
        let atom = match classify(rel) {
            Ok(a) => a,
            Err(msg) => return ClauseVerdict::Error(msg),
        };
        let (var, op, c) = match atom {
            Atom::Ground(true) => continue,
            Atom::Ground(false) => return ClauseVerdict::Unsat,
            Atom::Opaque => {
                opaque = true;
                continue;
            }
            Atom::Bound(var, op, c) => (var, op, c),
        };
        if op == RelOp::Ne {
            excluded.push((var, c));
            continue;
        }
        let constraint = match op {
            RelOp::Eq => NumRange::point(c),
            RelOp::Lt => NumRange {
                hi: c,
                hi_strict: true,
                ..NumRange::full()
            },
            RelOp::Le => NumRange {
                hi: c,
                hi_strict: false,
                ..NumRange::full()
            },
            RelOp::Gt => NumRange {
                lo: c,
                lo_strict: true,
                ..NumRange::full()
            },
            RelOp::Ge => NumRange {
                lo: c,
                lo_strict: false,
                ..NumRange::full()
            },
            RelOp::Ne => continue,
        };
        let current = ranges.entry(var).or_insert_with(NumRange::full);
        match current.intersect(&constraint) {
            Some(r) => *current = r,
            None => return ClauseVerdict::Unsat,
        }
    }

    for (var, c) in &excluded {
        if let Some(r) = ranges.get(var) {
            if r.lo == *c && r.hi == *c {
                return ClauseVerdict::Unsat;
            }
        }
    }

    if opaque {
        ClauseVerdict::Unknown
    } else {
        ClauseVerdict::Sat
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn x_rel(op: RelOp, c: f64) -> Formula {
        Formula::rel(Term::var("x"), op, Term::num(c))
    }

    #[test]
    fn positive_interval_with_negative_sign_is_unsat() {
        let f = Formula::and(vec![
            x_rel(RelOp::Ge, 1.0),
            x_rel(RelOp::Le, 5.0),
            x_rel(RelOp::Lt, 0.0),
        ]);
        assert_eq!(IntervalOracle::default().check(&f), SatResult::Unsatisfiable);
    }

    #[test]
    fn overlapping_constraints_are_sat() {
        let f = Formula::and(vec![x_rel(RelOp::Ge, -1.0), x_rel(RelOp::Gt, 0.0)]);
        assert_eq!(IntervalOracle::default().check(&f), SatResult::Satisfiable);
    }

    #[test]
    fn strict_bounds_meeting_at_a_point_are_unsat() {
        let f = Formula::and(vec![x_rel(RelOp::Gt, 0.0), x_rel(RelOp::Le, 0.0)]);
        assert_eq!(IntervalOracle::default().check(&f), SatResult::Unsatisfiable);
    }

    #[test]
    fn disjunction_needs_one_satisfiable_branch() {
        let f = Formula::and(vec![
            Formula::or(vec![x_rel(RelOp::Le, -3.0), x_rel(RelOp::Ge, 3.0)]),
            x_rel(RelOp::Gt, 0.0),
        ]);
        assert_eq!(IntervalOracle::default().check(&f), SatResult::Satisfiable);
    }

    #[test]
    fn negation_and_implication_are_normalised() {
        // !(x >= 0) & (x < 0 -> false)
        let f = Formula::and(vec![
            x_rel(RelOp::Ge, 0.0).not(),
            x_rel(RelOp::Lt, 0.0).implies(Formula::False),
        ]);
        assert_eq!(IntervalOracle::default().check(&f), SatResult::Unsatisfiable);
    }

    #[test]
    fn point_excluded_by_disequality() {
        let f = Formula::and(vec![x_rel(RelOp::Eq, 2.0), x_rel(RelOp::Ne, 2.0)]);
        assert_eq!(IntervalOracle::default().check(&f), SatResult::Unsatisfiable);
    }

    #[test]
    fn non_linear_atom_is_unknown() {
        let f = Formula::rel(
            Term::var("x").mul(Term::var("y")),
            RelOp::Gt,
            Term::num(0.0),
        );
        assert_eq!(IntervalOracle::default().check(&f), SatResult::Unknown);
        assert!(SatResult::Unknown.is_possible());
    }

    #[test]
    fn oversized_dnf_is_unknown() {
        let pair = |i: u32| {
            let c = f64::from(i);
            Formula::or(vec![x_rel(RelOp::Lt, -c), x_rel(RelOp::Gt, c)])
        };
        let wide = Formula::and((0..8).map(pair).collect());
        assert_eq!(IntervalOracle::new(4).check(&wide), SatResult::Unknown);
        assert_eq!(IntervalOracle::new(4).check(&pair(1)), SatResult::Satisfiable);
    }
}
