// term.rs — Symbolic terms, relations and formulas
//
// The algebraic vocabulary the inference engine reasons in. Terms are real
// valued (numbers, variables, n-ary sums and products, negation, division,
// power); relations compare two terms; formulas combine relations with the
// usual connectives. Displayed in a dL-like concrete syntax.
//
// Preconditions: none.
// Postconditions: constructors flatten nested sums/products and conjunctions.
// Failure modes: none (evaluation returns `None` for symbolic terms).
// Side effects: none.

use std::collections::BTreeSet;
use std::fmt;

// ── Terms ───────────────────────────────────────────────────────────────────

/// A real-valued symbolic term.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Num(f64),
    Var(String),
    Add(Vec<Term>),
    Mul(Vec<Term>),
    Neg(Box<Term>),
    Div(Box<Term>, Box<Term>),
    Pow(Box<Term>, Box<Term>),
}

impl Term {
    pub fn num(value: f64) -> Self {
        Term::Num(value)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    /// Reference to element `index` of a vector-valued variable.
    pub fn element(name: &str, index: usize) -> Self {
        Term::Var(element_name(name, index))
    }

    /// Sum of `terms`; the empty sum is `0`.
    pub fn sum(terms: Vec<Term>) -> Self {
        let mut flat = Vec::with_capacity(terms.len());
        for t in terms {
            match t {
                Term::Add(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Term::Num(0.0),
            1 => flat.pop().unwrap_or(Term::Num(0.0)),
            _ => Term::Add(flat),
        }
    }

    /// Product of `terms`; the empty product is `1`.
    pub fn product(terms: Vec<Term>) -> Self {
        let mut flat = Vec::with_capacity(terms.len());
        for t in terms {
            match t {
                Term::Mul(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Term::Num(1.0),
            1 => flat.pop().unwrap_or(Term::Num(1.0)),
            _ => Term::Mul(flat),
        }
    }

    pub fn add(self, other: Term) -> Self {
        Term::sum(vec![self, other])
    }

    pub fn mul(self, other: Term) -> Self {
        Term::product(vec![self, other])
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Self {
        match self {
            Term::Num(v) => Term::Num(-v),
            Term::Neg(inner) => *inner,
            other => Term::Neg(Box::new(other)),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(self, other: Term) -> Self {
        Term::Div(Box::new(self), Box::new(other))
    }

    pub fn pow(self, exponent: Term) -> Self {
        Term::Pow(Box::new(self), Box::new(exponent))
    }

    /// The variable name if this term is a bare variable.
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Term::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Evaluate to a number when the term is variable-free.
    pub fn eval(&self) -> Option<f64> {
        match self {
            Term::Num(v) => Some(*v),
            Term::Var(_) => None,
            Term::Add(items) => items.iter().map(Term::eval).sum(),
            Term::Mul(items) => items.iter().map(Term::eval).product(),
            Term::Neg(inner) => inner.eval().map(|v| -v),
            Term::Div(a, b) => {
                let denom = b.eval()?;
                if denom == 0.0 {
                    return None;
                }
                Some(a.eval()? / denom)
            }
            Term::Pow(base, exp) => Some(base.eval()?.powf(exp.eval()?)),
        }
    }

    /// Replace a variable-free term by its value; other terms are kept.
    pub fn folded(self) -> Self {
        match self.eval() {
            Some(v) if v.is_finite() => Term::Num(v),
            _ => self,
        }
    }

    pub fn contains_var(&self, name: &str) -> bool {
        match self {
            Term::Num(_) => false,
            Term::Var(v) => v == name,
            Term::Add(items) | Term::Mul(items) => items.iter().any(|t| t.contains_var(name)),
            Term::Neg(inner) => inner.contains_var(name),
            Term::Div(a, b) | Term::Pow(a, b) => a.contains_var(name) || b.contains_var(name),
        }
    }

    /// Substitute every occurrence of variable `name` by `replacement`.
    pub fn substitute(&self, name: &str, replacement: &Term) -> Term {
        match self {
            Term::Var(v) if v == name => replacement.clone(),
            Term::Num(_) | Term::Var(_) => self.clone(),
            Term::Add(items) => Term::sum(
                items
                    .iter()
                    .map(|t| t.substitute(name, replacement))
                    .collect(),
            ),
            Term::Mul(items) => Term::product(
                items
                    .iter()
                    .map(|t| t.substitute(name, replacement))
                    .collect(),
            ),
            Term::Neg(inner) => Term::Neg(Box::new(inner.substitute(name, replacement))),
            Term::Div(a, b) => Term::Div(
                Box::new(a.substitute(name, replacement)),
                Box::new(b.substitute(name, replacement)),
            ),
            Term::Pow(a, b) => Term::Pow(
                Box::new(a.substitute(name, replacement)),
                Box::new(b.substitute(name, replacement)),
            ),
        }
    }

    pub fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Term::Num(_) => {}
            Term::Var(v) => {
                out.insert(v.clone());
            }
            Term::Add(items) | Term::Mul(items) => {
                for t in items {
                    t.collect_vars(out);
                }
            }
            Term::Neg(inner) => inner.collect_vars(out),
            Term::Div(a, b) | Term::Pow(a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Term::Add(_) => 1,
            Term::Mul(_) | Term::Div(..) => 2,
            Term::Neg(_) => 3,
            Term::Num(v) if *v < 0.0 => 3,
            Term::Pow(..) => 4,
            Term::Num(_) | Term::Var(_) => 5,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        let own = self.precedence();
        if own < parent {
            write!(f, "(")?;
        }
        match self {
            Term::Num(v) => write!(f, "{}", v)?,
            Term::Var(name) => write!(f, "{}", name)?,
            Term::Add(items) => {
                for (i, item) in items.iter().enumerate() {
                    match (i, item) {
                        (0, _) => item.fmt_prec(f, 1)?,
                        (_, Term::Neg(inner)) => {
                            write!(f, " - ")?;
                            inner.fmt_prec(f, 2)?;
                        }
                        (_, Term::Num(v)) if *v < 0.0 => write!(f, " - {}", -v)?,
                        _ => {
                            write!(f, " + ")?;
                            item.fmt_prec(f, 1)?;
                        }
                    }
                }
            }
            Term::Mul(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " * ")?;
                    }
                    item.fmt_prec(f, 2)?;
                }
            }
            Term::Neg(inner) => {
                write!(f, "-")?;
                inner.fmt_prec(f, 4)?;
            }
            Term::Div(a, b) => {
                a.fmt_prec(f, 2)?;
                write!(f, " / ")?;
                b.fmt_prec(f, 3)?;
            }
            Term::Pow(a, b) => {
                a.fmt_prec(f, 5)?;
                write!(f, "^")?;
                b.fmt_prec(f, 5)?;
            }
        }
        if own < parent {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

/// Variable name used for element `index` of vector variable `name`.
pub fn element_name(name: &str, index: usize) -> String {
    format!("{name}[{index}]")
}

// ── Relations ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl RelOp {
    /// The operator of the negated relation.
    pub fn negate(self) -> Self {
        match self {
            RelOp::Lt => RelOp::Ge,
            RelOp::Le => RelOp::Gt,
            RelOp::Eq => RelOp::Ne,
            RelOp::Ne => RelOp::Eq,
            RelOp::Ge => RelOp::Lt,
            RelOp::Gt => RelOp::Le,
        }
    }

    /// The operator obtained by swapping the two sides.
    pub fn flip(self) -> Self {
        match self {
            RelOp::Lt => RelOp::Gt,
            RelOp::Le => RelOp::Ge,
            RelOp::Ge => RelOp::Le,
            RelOp::Gt => RelOp::Lt,
            other => other,
        }
    }

    pub fn holds(self, a: f64, b: f64) -> bool {
        match self {
            RelOp::Lt => a < b,
            RelOp::Le => a <= b,
            RelOp::Eq => a == b,
            RelOp::Ne => a != b,
            RelOp::Ge => a >= b,
            RelOp::Gt => a > b,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Eq => "=",
            RelOp::Ne => "!=",
            RelOp::Ge => ">=",
            RelOp::Gt => ">",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "<" => Some(RelOp::Lt),
            "<=" => Some(RelOp::Le),
            "=" | "==" => Some(RelOp::Eq),
            "!=" | "~=" => Some(RelOp::Ne),
            ">=" => Some(RelOp::Ge),
            ">" => Some(RelOp::Gt),
            _ => None,
        }
    }
}

/// A binary comparison between two terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub lhs: Term,
    pub op: RelOp,
    pub rhs: Term,
}

impl Relation {
    pub fn new(lhs: Term, op: RelOp, rhs: Term) -> Self {
        Relation { lhs, op, rhs }
    }

    pub fn negate(&self) -> Self {
        Relation::new(self.lhs.clone(), self.op.negate(), self.rhs.clone())
    }

    /// Truth value when both sides are variable-free.
    pub fn eval(&self) -> Option<bool> {
        Some(self.op.holds(self.lhs.eval()?, self.rhs.eval()?))
    }

    pub fn contains_var(&self, name: &str) -> bool {
        self.lhs.contains_var(name) || self.rhs.contains_var(name)
    }

    pub fn substitute(&self, name: &str, replacement: &Term) -> Relation {
        Relation::new(
            self.lhs.substitute(name, replacement),
            self.op,
            self.rhs.substitute(name, replacement),
        )
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op.symbol(), self.rhs)
    }
}

// ── Formulas ────────────────────────────────────────────────────────────────

/// A first-order formula over real-valued relations.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    True,
    False,
    Rel(Relation),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Not(Box<Formula>),
    Implies(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn rel(lhs: Term, op: RelOp, rhs: Term) -> Self {
        Formula::Rel(Relation::new(lhs, op, rhs))
    }

    /// Conjunction, flattened; `true` operands are dropped.
    pub fn and(parts: Vec<Formula>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for p in parts {
            match p {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => flat.extend(inner),
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        match flat.len() {
            0 => Formula::True,
            1 => flat.pop().unwrap_or(Formula::True),
            _ => Formula::And(flat),
        }
    }

    /// Disjunction, flattened; `false` operands are dropped.
    pub fn or(parts: Vec<Formula>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for p in parts {
            match p {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => flat.extend(inner),
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        match flat.len() {
            0 => Formula::False,
            1 => flat.pop().unwrap_or(Formula::False),
            _ => Formula::Or(flat),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Not(inner) => *inner,
            other => Formula::Not(Box::new(other)),
        }
    }

    pub fn implies(self, consequent: Formula) -> Self {
        Formula::Implies(Box::new(self), Box::new(consequent))
    }

    pub fn contains_var(&self, name: &str) -> bool {
        match self {
            Formula::True | Formula::False => false,
            Formula::Rel(r) => r.contains_var(name),
            Formula::And(parts) | Formula::Or(parts) => parts.iter().any(|p| p.contains_var(name)),
            Formula::Not(inner) => inner.contains_var(name),
            Formula::Implies(a, b) => a.contains_var(name) || b.contains_var(name),
        }
    }

    pub fn substitute(&self, name: &str, replacement: &Term) -> Formula {
        match self {
            Formula::True | Formula::False => self.clone(),
            Formula::Rel(r) => Formula::Rel(r.substitute(name, replacement)),
            Formula::And(parts) => Formula::And(
                parts
                    .iter()
                    .map(|p| p.substitute(name, replacement))
                    .collect(),
            ),
            Formula::Or(parts) => Formula::Or(
                parts
                    .iter()
                    .map(|p| p.substitute(name, replacement))
                    .collect(),
            ),
            Formula::Not(inner) => Formula::Not(Box::new(inner.substitute(name, replacement))),
            Formula::Implies(a, b) => Formula::Implies(
                Box::new(a.substitute(name, replacement)),
                Box::new(b.substitute(name, replacement)),
            ),
        }
    }

    pub fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Rel(r) => {
                r.lhs.collect_vars(out);
                r.rhs.collect_vars(out);
            }
            Formula::And(parts) | Formula::Or(parts) => {
                for p in parts {
                    p.collect_vars(out);
                }
            }
            Formula::Not(inner) => inner.collect_vars(out),
            Formula::Implies(a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => write!(f, "true"),
            Formula::False => write!(f, "false"),
            Formula::Rel(r) => write!(f, "{}", r),
            Formula::And(parts) => write_joined(f, parts, " & "),
            Formula::Or(parts) => write_joined(f, parts, " | "),
            Formula::Not(inner) => write!(f, "!({})", inner),
            Formula::Implies(a, b) => write!(f, "({} -> {})", a, b),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Formula], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", p)?;
    }
    write!(f, ")")
}

// ── Tests ───────────────────────────────────────────────────────────────────
