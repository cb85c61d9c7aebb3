// info.rs — The invariant information lattice
//
// Facts the engine attaches to signals and nodes: interval bounds, single
// (in)equalities, disjunctions of those ("signal boundaries"), disjunctions
// of boundaries for discretely sampled signals, guarded implications
// ("control") and cross-signal relations ("data"). Facts are immutable
// values compared structurally; consumption is tracked by the graph, not
// by the fact.
//
// Numeric reasoning goes through `NumRange`, a closed/open interval over
// the extended reals. Facts whose bounds are symbolic have no range and are
// treated conservatively (they may contain anything).

use std::fmt;

use crate::term::{Formula, RelOp, Relation, Term};

// ── Numeric ranges ──────────────────────────────────────────────────────────

/// An interval over the extended reals. `lo`/`hi` may be infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumRange {
    pub lo: f64,
    pub hi: f64,
    pub lo_strict: bool,
    pub hi_strict: bool,
}

impl NumRange {
    pub fn closed(lo: f64, hi: f64) -> Self {
        NumRange {
            lo,
            hi,
            lo_strict: false,
            hi_strict: false,
        }
    }

    pub fn full() -> Self {
        NumRange {
            lo: f64::NEG_INFINITY,
            hi: f64::INFINITY,
            lo_strict: true,
            hi_strict: true,
        }
    }

    pub fn point(v: f64) -> Self {
        NumRange::closed(v, v)
    }

    pub fn is_full(&self) -> bool {
        self.lo == f64::NEG_INFINITY && self.hi == f64::INFINITY
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi || (self.lo == self.hi && (self.lo_strict || self.hi_strict))
    }

    pub fn contains(&self, v: f64) -> bool {
        let above = if self.lo_strict { v > self.lo } else { v >= self.lo };
        let below = if self.hi_strict { v < self.hi } else { v <= self.hi };
        above && below
    }

    pub fn contains_zero(&self) -> bool {
        self.contains(0.0)
    }

    /// Smallest range containing both.
    pub fn hull(&self, other: &NumRange) -> NumRange {
        let (lo, lo_strict) = if self.lo < other.lo {
            (self.lo, self.lo_strict)
        } else if other.lo < self.lo {
            (other.lo, other.lo_strict)
        } else {
            (self.lo, self.lo_strict && other.lo_strict)
        };
        let (hi, hi_strict) = if self.hi > other.hi {
            (self.hi, self.hi_strict)
        } else if other.hi > self.hi {
            (other.hi, other.hi_strict)
        } else {
            (self.hi, self.hi_strict && other.hi_strict)
        };
        NumRange {
            lo,
            hi,
            lo_strict,
            hi_strict,
        }
    }

    /// Intersection; `None` when empty.
    pub fn intersect(&self, other: &NumRange) -> Option<NumRange> {
        let (lo, lo_strict) = if self.lo > other.lo {
            (self.lo, self.lo_strict)
        } else if other.lo > self.lo {
            (other.lo, other.lo_strict)
        } else {
            (self.lo, self.lo_strict || other.lo_strict)
        };
        let (hi, hi_strict) = if self.hi < other.hi {
            (self.hi, self.hi_strict)
        } else if other.hi < self.hi {
            (other.hi, other.hi_strict)
        } else {
            (self.hi, self.hi_strict || other.hi_strict)
        };
        let r = NumRange {
            lo,
            hi,
            lo_strict,
            hi_strict,
        };
        (!r.is_empty()).then_some(r)
    }

    pub fn add(&self, other: &NumRange) -> NumRange {
        NumRange {
            lo: nan_to(self.lo + other.lo, f64::NEG_INFINITY),
            hi: nan_to(self.hi + other.hi, f64::INFINITY),
            lo_strict: self.lo_strict || other.lo_strict,
            hi_strict: self.hi_strict || other.hi_strict,
        }
    }

    pub fn neg(&self) -> NumRange {
        NumRange {
            lo: -self.hi,
            hi: -self.lo,
            lo_strict: self.hi_strict,
            hi_strict: self.lo_strict,
        }
    }

    pub fn scale(&self, k: f64) -> NumRange {
        if k == 0.0 {
            NumRange::point(0.0)
        } else if k > 0.0 {
            NumRange {
                lo: self.lo * k,
                hi: self.hi * k,
                ..*self
            }
        } else {
            self.neg().scale(-k)
        }
    }

    pub fn offset(&self, c: f64) -> NumRange {
        NumRange {
            lo: self.lo + c,
            hi: self.hi + c,
            ..*self
        }
    }

    /// Product of two ranges (endpoints closed, a sound over-approximation).
    pub fn mul(&self, other: &NumRange) -> NumRange {
        let candidates = [
            mul_ext(self.lo, other.lo),
            mul_ext(self.lo, other.hi),
            mul_ext(self.hi, other.lo),
            mul_ext(self.hi, other.hi),
        ];
        let lo = candidates.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = candidates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        NumRange::closed(lo, hi)
    }

    /// `1 / x`; `None` when the range contains zero.
    pub fn recip(&self) -> Option<NumRange> {
        if self.contains_zero() || self.is_full() {
            return None;
        }
        let a = 1.0 / self.hi;
        let b = 1.0 / self.lo;
        Some(NumRange {
            lo: a.min(b),
            hi: a.max(b),
            lo_strict: self.hi_strict,
            hi_strict: self.lo_strict,
        })
    }

    pub fn abs(&self) -> NumRange {
        if self.lo >= 0.0 {
            *self
        } else if self.hi <= 0.0 {
            self.neg()
        } else {
            NumRange {
                lo: 0.0,
                hi: (-self.lo).max(self.hi),
                lo_strict: false,
                hi_strict: if -self.lo > self.hi {
                    self.lo_strict
                } else {
                    self.hi_strict
                },
            }
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lo.is_finite() && self.hi.is_finite()
    }

    /// Whether every value of the range satisfies `v ⋈ 0`.
    pub fn all_satisfy_sign(&self, op: RelOp) -> bool {
        match op {
            RelOp::Gt => self.lo > 0.0 || (self.lo == 0.0 && self.lo_strict),
            RelOp::Ge => self.lo >= 0.0,
            RelOp::Lt => self.hi < 0.0 || (self.hi == 0.0 && self.hi_strict),
            RelOp::Le => self.hi <= 0.0,
            RelOp::Eq => self.lo == 0.0 && self.hi == 0.0,
            RelOp::Ne => !self.contains_zero(),
        }
    }

    /// Interval fact for `term` with the bounds of this range.
    pub fn to_interval(&self, term: Term) -> IntervalInformation {
        let lower = self.lo.is_finite().then(|| Bound {
            value: Term::num(self.lo),
            strict: self.lo_strict,
        });
        let upper = self.hi.is_finite().then(|| Bound {
            value: Term::num(self.hi),
            strict: self.hi_strict,
        });
        IntervalInformation { term, lower, upper }
    }
}

fn nan_to(v: f64, fallback: f64) -> f64 {
    if v.is_nan() {
        fallback
    } else {
        v
    }
}

fn mul_ext(a: f64, b: f64) -> f64 {
    if a == 0.0 || b == 0.0 {
        0.0
    } else {
        a * b
    }
}

// ── Leaf facts ──────────────────────────────────────────────────────────────

/// One side of an interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: Term,
    pub strict: bool,
}

impl Bound {
    pub fn inclusive(value: Term) -> Self {
        Bound {
            value,
            strict: false,
        }
    }

    pub fn exclusive(value: Term) -> Self {
        Bound {
            value,
            strict: true,
        }
    }
}

/// `lower ⋈ term ⋈ upper`; a missing side is unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalInformation {
    pub term: Term,
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl IntervalInformation {
    pub fn new(term: Term, lower: Option<Bound>, upper: Option<Bound>) -> Self {
        IntervalInformation { term, lower, upper }
    }

    pub fn closed(term: Term, lo: f64, hi: f64) -> Self {
        NumRange::closed(lo, hi).to_interval(term)
    }

    pub fn unbounded(term: Term) -> Self {
        IntervalInformation::new(term, None, None)
    }

    pub fn lower_relation(&self) -> Option<Relation> {
        self.lower.as_ref().map(|b| {
            let op = if b.strict { RelOp::Gt } else { RelOp::Ge };
            Relation::new(self.term.clone(), op, b.value.clone())
        })
    }

    pub fn upper_relation(&self) -> Option<Relation> {
        self.upper.as_ref().map(|b| {
            let op = if b.strict { RelOp::Lt } else { RelOp::Le };
            Relation::new(self.term.clone(), op, b.value.clone())
        })
    }

    pub fn to_formula(&self) -> Formula {
        Formula::and(
            [self.lower_relation(), self.upper_relation()]
                .into_iter()
                .flatten()
                .map(Formula::Rel)
                .collect(),
        )
    }

    /// Numeric range; `None` when a present bound is symbolic.
    pub fn range(&self) -> Option<NumRange> {
        let (lo, lo_strict) = match &self.lower {
            Some(b) => (b.value.eval()?, b.strict),
            None => (f64::NEG_INFINITY, true),
        };
        let (hi, hi_strict) = match &self.upper {
            Some(b) => (b.value.eval()?, b.strict),
            None => (f64::INFINITY, true),
        };
        Some(NumRange {
            lo,
            hi,
            lo_strict,
            hi_strict,
        })
    }
}

/// A single relation `term ⋈ value`.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualityInformation {
    pub relation: Relation,
}

impl EqualityInformation {
    pub fn new(term: Term, op: RelOp, value: Term) -> Self {
        EqualityInformation {
            relation: Relation::new(term, op, value),
        }
    }

    pub fn equals(term: Term, value: f64) -> Self {
        EqualityInformation::new(term, RelOp::Eq, Term::num(value))
    }

    pub fn range(&self) -> Option<NumRange> {
        let v = self.relation.rhs.eval()?;
        Some(match self.relation.op {
            RelOp::Eq => NumRange::point(v),
            RelOp::Ne => NumRange::full(),
            RelOp::Lt => NumRange {
                hi: v,
                hi_strict: true,
                ..NumRange::full()
            },
            RelOp::Le => NumRange {
                hi: v,
                hi_strict: false,
                ..NumRange::full()
            },
            RelOp::Gt => NumRange {
                lo: v,
                lo_strict: true,
                ..NumRange::full()
            },
            RelOp::Ge => NumRange {
                lo: v,
                lo_strict: false,
                ..NumRange::full()
            },
        })
    }

    /// Whether the relation rules out the value zero.
    fn excludes_zero(&self) -> bool {
        match (self.relation.op, self.relation.rhs.eval()) {
            (RelOp::Ne, Some(v)) => v == 0.0,
            (_, Some(_)) => self.range().map(|r| !r.contains_zero()).unwrap_or(false),
            (_, None) => false,
        }
    }
}

/// Member of a signal-boundary disjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryItem {
    Interval(IntervalInformation),
    Equality(EqualityInformation),
}

impl BoundaryItem {
    pub fn subject(&self) -> &Term {
        match self {
            BoundaryItem::Interval(i) => &i.term,
            BoundaryItem::Equality(e) => &e.relation.lhs,
        }
    }

    pub fn range(&self) -> Option<NumRange> {
        match self {
            BoundaryItem::Interval(i) => i.range(),
            BoundaryItem::Equality(e) => e.range(),
        }
    }

    /// An interval with neither bound.
    pub fn is_unconstrained(&self) -> bool {
        matches!(self, BoundaryItem::Interval(i) if i.lower.is_none() && i.upper.is_none())
    }

    pub fn to_formula(&self) -> Formula {
        match self {
            BoundaryItem::Interval(i) => i.to_formula(),
            BoundaryItem::Equality(e) => Formula::Rel(e.relation.clone()),
        }
    }

    fn excludes_zero(&self) -> bool {
        match self {
            BoundaryItem::Interval(i) => i.range().map(|r| !r.contains_zero()).unwrap_or(false),
            BoundaryItem::Equality(e) => e.excludes_zero(),
        }
    }

    fn retarget(&self, term: &Term) -> BoundaryItem {
        match self {
            BoundaryItem::Interval(i) => BoundaryItem::Interval(IntervalInformation {
                term: term.clone(),
                ..i.clone()
            }),
            BoundaryItem::Equality(e) => BoundaryItem::Equality(EqualityInformation {
                relation: Relation::new(term.clone(), e.relation.op, e.relation.rhs.clone()),
            }),
        }
    }
}

// ── Composite facts ─────────────────────────────────────────────────────────

/// "This continuous signal lies in one of these ranges."
#[derive(Debug, Clone, PartialEq)]
pub struct SignalboundaryInformation {
    pub items: Vec<BoundaryItem>,
}

impl SignalboundaryInformation {
    pub fn new(items: Vec<BoundaryItem>) -> Self {
        SignalboundaryInformation { items }
    }

    pub fn from_interval(interval: IntervalInformation) -> Self {
        SignalboundaryInformation::new(vec![BoundaryItem::Interval(interval)])
    }

    pub fn from_range(term: Term, range: NumRange) -> Self {
        Self::from_interval(range.to_interval(term))
    }

    /// The "no information" boundary: `term` is unconstrained.
    pub fn unbounded(term: Term) -> Self {
        Self::from_interval(IntervalInformation::unbounded(term))
    }

    pub fn subject(&self) -> Option<&Term> {
        self.items.first().map(BoundaryItem::subject)
    }

    /// Hull of all disjuncts; `None` when any disjunct is symbolic.
    pub fn hull(&self) -> Option<NumRange> {
        let mut iter = self.items.iter();
        let mut acc = iter.next()?.range()?;
        for item in iter {
            acc = acc.hull(&item.range()?);
        }
        Some(acc)
    }

    /// Whether zero is a possible value. Symbolic disjuncts may contain it.
    pub fn crosses_zero(&self) -> bool {
        self.items.is_empty() || self.items.iter().any(|i| !i.excludes_zero())
    }

    pub fn is_unbounded(&self) -> bool {
        self.items
            .iter()
            .any(|i| i.range().map(|r| r.is_full()).unwrap_or(false))
    }

    pub fn to_formula(&self) -> Formula {
        Formula::or(self.items.iter().map(BoundaryItem::to_formula).collect())
    }

    pub fn retarget(&self, term: &Term) -> SignalboundaryInformation {
        SignalboundaryInformation::new(self.items.iter().map(|i| i.retarget(term)).collect())
    }

    /// Apply a numeric transfer function to every disjunct. `None` when any
    /// disjunct is symbolic.
    pub fn map_ranges(
        &self,
        term: &Term,
        f: impl Fn(&NumRange) -> NumRange,
    ) -> Option<SignalboundaryInformation> {
        let mut items = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let mapped = f(&item.range()?);
            let new_item = BoundaryItem::Interval(mapped.to_interval(term.clone()));
            if !items.contains(&new_item) {
                items.push(new_item);
            }
        }
        Some(SignalboundaryInformation::new(items))
    }
}

/// "This discretely sampled signal takes one of these value sets over time."
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteSignalInformation {
    pub signals: Vec<SignalboundaryInformation>,
}

impl DiscreteSignalInformation {
    pub fn new(signals: Vec<SignalboundaryInformation>) -> Self {
        DiscreteSignalInformation { signals }
    }

    /// All value sets flattened into one boundary.
    pub fn flatten(&self) -> SignalboundaryInformation {
        let mut items = Vec::new();
        for s in &self.signals {
            for item in &s.items {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
        }
        SignalboundaryInformation::new(items)
    }
}

/// `antecedent → consequent`.
#[derive(Debug, Clone, PartialEq)]
pub struct Implication {
    pub antecedent: Formula,
    pub consequent: SignalboundaryInformation,
}

/// Guarded facts: "if this guard holds, this fact holds."
#[derive(Debug, Clone, PartialEq)]
pub struct ControlInformation {
    pub implications: Vec<Implication>,
}

impl ControlInformation {
    pub fn none() -> Self {
        ControlInformation {
            implications: Vec::new(),
        }
    }

    pub fn subject(&self) -> Option<&Term> {
        self.implications.first()?.consequent.subject()
    }

    pub fn to_formula(&self) -> Formula {
        Formula::and(
            self.implications
                .iter()
                .map(|imp| imp.antecedent.clone().implies(imp.consequent.to_formula()))
                .collect(),
        )
    }
}

/// Relations between block output variables.
#[derive(Debug, Clone, PartialEq)]
pub struct DataInformation {
    pub relations: Vec<Relation>,
}

impl DataInformation {
    pub fn none() -> Self {
        DataInformation {
            relations: Vec::new(),
        }
    }

    pub fn to_formula(&self) -> Formula {
        Formula::and(self.relations.iter().cloned().map(Formula::Rel).collect())
    }
}

// ── The tagged union ────────────────────────────────────────────────────────

/// Fact category; each outgoing edge carries at least one fact per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Signal,
    Control,
    Data,
}

pub const ALL_CATEGORIES: [Category; 3] = [Category::Signal, Category::Control, Category::Data];

/// A symbolic claim about a signal's or node's possible values.
#[derive(Debug, Clone, PartialEq)]
pub enum Information {
    Interval(IntervalInformation),
    Equality(EqualityInformation),
    Signalboundary(SignalboundaryInformation),
    DiscreteSignal(DiscreteSignalInformation),
    Control(ControlInformation),
    Data(DataInformation),
}

impl Information {
    pub fn category(&self) -> Category {
        match self {
            Information::Interval(_)
            | Information::Equality(_)
            | Information::Signalboundary(_)
            | Information::DiscreteSignal(_) => Category::Signal,
            Information::Control(_) => Category::Control,
            Information::Data(_) => Category::Data,
        }
    }

    /// The term this fact constrains, when it constrains a single one.
    pub fn subject(&self) -> Option<&Term> {
        match self {
            Information::Interval(i) => Some(&i.term),
            Information::Equality(e) => Some(&e.relation.lhs),
            Information::Signalboundary(s) => s.subject(),
            Information::DiscreteSignal(d) => d.signals.first()?.subject(),
            Information::Control(c) => c.subject(),
            Information::Data(_) => None,
        }
    }

    /// Signal facts as one boundary disjunction.
    pub fn as_boundary(&self) -> Option<SignalboundaryInformation> {
        match self {
            Information::Interval(i) => Some(SignalboundaryInformation::from_interval(i.clone())),
            Information::Equality(e) => Some(SignalboundaryInformation::new(vec![
                BoundaryItem::Equality(e.clone()),
            ])),
            Information::Signalboundary(s) => Some(s.clone()),
            Information::DiscreteSignal(d) => Some(d.flatten()),
            Information::Control(_) | Information::Data(_) => None,
        }
    }

    /// Whether a signal fact admits zero. Non-signal facts say nothing.
    pub fn crosses_zero(&self) -> bool {
        self.as_boundary().map(|b| b.crosses_zero()).unwrap_or(true)
    }

    /// Whether this is a category's "no information" baseline.
    pub fn is_no_information(&self) -> bool {
        match self {
            Information::Control(c) => c.implications.is_empty(),
            Information::Data(d) => d.relations.is_empty(),
            // A wide hull is not enough: `x != 0` has a full hull but still
            // excludes zero.
            other => other
                .as_boundary()
                .map(|b| b.items.iter().any(BoundaryItem::is_unconstrained))
                .unwrap_or(false),
        }
    }

    /// The same claim made about `term` instead of the current subject.
    pub fn retarget(&self, term: &Term) -> Information {
        match self {
            Information::Interval(i) => Information::Interval(IntervalInformation {
                term: term.clone(),
                ..i.clone()
            }),
            Information::Equality(e) => Information::Equality(EqualityInformation::new(
                term.clone(),
                e.relation.op,
                e.relation.rhs.clone(),
            )),
            Information::Signalboundary(s) => Information::Signalboundary(s.retarget(term)),
            Information::DiscreteSignal(d) => Information::DiscreteSignal(
                DiscreteSignalInformation::new(d.signals.iter().map(|s| s.retarget(term)).collect()),
            ),
            Information::Control(c) => Information::Control(ControlInformation {
                implications: c
                    .implications
                    .iter()
                    .map(|imp| Implication {
                        antecedent: imp.antecedent.clone(),
                        consequent: imp.consequent.retarget(term),
                    })
                    .collect(),
            }),
            Information::Data(d) => Information::Data(d.clone()),
        }
    }

    pub fn to_formula(&self) -> Formula {
        match self {
            Information::Interval(i) => i.to_formula(),
            Information::Equality(e) => Formula::Rel(e.relation.clone()),
            Information::Signalboundary(s) => s.to_formula(),
            Information::DiscreteSignal(d) => d.flatten().to_formula(),
            Information::Control(c) => c.to_formula(),
            Information::Data(d) => d.to_formula(),
        }
    }
}

impl fmt::Display for Information {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Information::DiscreteSignal(d) => {
                write!(f, "discrete[")?;
                for (i, s) in d.signals.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", s.to_formula())?;
                }
                write!(f, "]")
            }
            other => write!(f, "{}", other.to_formula()),
        }
    }
}

/// Intersect the numeric hulls of several conjunctive signal facts into one
/// boundary about `term`. A single fact is kept as is (its disjuncts
/// survive); symbolic facts fall back to the first one.
pub fn conjoin_boundaries(term: &Term, facts: &[Information]) -> Option<SignalboundaryInformation> {
    let boundaries: Vec<SignalboundaryInformation> =
        facts.iter().filter_map(Information::as_boundary).collect();
    match boundaries.len() {
        0 => None,
        1 => Some(boundaries[0].retarget(term)),
        _ => {
            let mut acc = NumRange::full();
            for b in &boundaries {
                match b.hull() {
                    Some(r) => match acc.intersect(&r) {
                        Some(next) => acc = next,
                        None => return Some(boundaries[0].retarget(term)),
                    },
                    None => continue,
                }
            }
            Some(SignalboundaryInformation::from_range(term.clone(), acc))
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
