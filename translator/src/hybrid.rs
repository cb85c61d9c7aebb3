// hybrid.rs — Hybrid program trees and the emitted symbolic model
//
// The target representation of a translation: a discrete controller program,
// a set of continuous evolutions (ODE systems with evolution domains), the
// initial-condition conjunction and a contract behaviour carrying the
// inferred invariants. Macros are applied to all four before emission.

use std::fmt;

use crate::term::{Formula, Term};

/// A hybrid program in dL style.
#[derive(Debug, Clone, PartialEq)]
pub enum HybridProgram {
    Skip,
    /// `x := t`
    Assign(String, Term),
    /// `x := *`
    NondetAssign(String),
    /// `?F`
    Test(Formula),
    Seq(Vec<HybridProgram>),
    Choice(Vec<HybridProgram>),
    Loop(Box<HybridProgram>),
}

impl HybridProgram {
    /// Sequential composition, flattened; `skip` parts are dropped.
    pub fn seq(parts: Vec<HybridProgram>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for p in parts {
            match p {
                HybridProgram::Skip => {}
                HybridProgram::Seq(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => HybridProgram::Skip,
            1 => flat.pop().unwrap_or(HybridProgram::Skip),
            _ => HybridProgram::Seq(flat),
        }
    }

    pub fn choice(parts: Vec<HybridProgram>) -> Self {
        match parts.len() {
            0 => HybridProgram::Skip,
            1 => parts.into_iter().next().unwrap_or(HybridProgram::Skip),
            _ => HybridProgram::Choice(parts),
        }
    }

    pub fn contains_var(&self, name: &str) -> bool {
        match self {
            HybridProgram::Skip | HybridProgram::NondetAssign(_) => false,
            HybridProgram::Assign(_, t) => t.contains_var(name),
            HybridProgram::Test(f) => f.contains_var(name),
            HybridProgram::Seq(parts) | HybridProgram::Choice(parts) => {
                parts.iter().any(|p| p.contains_var(name))
            }
            HybridProgram::Loop(body) => body.contains_var(name),
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            HybridProgram::Skip => writeln!(f, "{pad}skip;"),
            HybridProgram::Assign(x, t) => writeln!(f, "{pad}{x} := {t};"),
            HybridProgram::NondetAssign(x) => writeln!(f, "{pad}{x} := *;"),
            HybridProgram::Test(c) => writeln!(f, "{pad}?{c};"),
            HybridProgram::Seq(parts) => {
                for p in parts {
                    p.fmt_indented(f, indent)?;
                }
                Ok(())
            }
            HybridProgram::Choice(parts) => {
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        writeln!(f, "{pad}++")?;
                    }
                    writeln!(f, "{pad}{{")?;
                    p.fmt_indented(f, indent + 1)?;
                    writeln!(f, "{pad}}}")?;
                }
                Ok(())
            }
            HybridProgram::Loop(body) => {
                writeln!(f, "{pad}{{")?;
                body.fmt_indented(f, indent + 1)?;
                writeln!(f, "{pad}}}*")
            }
        }
    }
}

impl fmt::Display for HybridProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// An ODE system `{x' = t, ... & domain}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousEvolution {
    pub odes: Vec<(String, Term)>,
    pub domain: Formula,
}

impl ContinuousEvolution {
    pub fn contains_var(&self, name: &str) -> bool {
        self.odes.iter().any(|(_, t)| t.contains_var(name)) || self.domain.contains_var(name)
    }
}

impl fmt::Display for ContinuousEvolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (x, t)) in self.odes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{x}' = {t}")?;
        }
        if self.domain != Formula::True {
            write!(f, " & {}", self.domain)?;
        }
        write!(f, "}}")
    }
}

/// The emitted symbolic model.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicModel {
    pub name: String,
    pub initial_conditions: Formula,
    pub discrete: HybridProgram,
    pub continuous: Vec<ContinuousEvolution>,
    pub contract: HybridProgram,
    pub security_properties: Vec<Formula>,
}

impl SymbolicModel {
    pub fn new(name: impl Into<String>) -> Self {
        SymbolicModel {
            name: name.into(),
            initial_conditions: Formula::True,
            discrete: HybridProgram::Skip,
            continuous: Vec::new(),
            contract: HybridProgram::Skip,
            security_properties: Vec::new(),
        }
    }

    /// Whether any part of the model still mentions `name`.
    pub fn mentions(&self, name: &str) -> bool {
        self.initial_conditions.contains_var(name)
            || self.discrete.contains_var(name)
            || self.continuous.iter().any(|c| c.contains_var(name))
            || self.contract.contains_var(name)
            || self.security_properties.iter().any(|p| p.contains_var(name))
    }
}

impl fmt::Display for SymbolicModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "model {}", self.name)?;
        writeln!(f, "init: {}", self.initial_conditions)?;
        writeln!(f, "ctrl:")?;
        self.discrete.fmt_indented(f, 1)?;
        writeln!(f, "plant:")?;
        for evolution in &self.continuous {
            writeln!(f, "  {}", evolution)?;
        }
        writeln!(f, "contract:")?;
        self.contract.fmt_indented(f, 1)?;
        if !self.security_properties.is_empty() {
            writeln!(f, "security:")?;
            for p in &self.security_properties {
                writeln!(f, "  {}", p)?;
            }
        }
        Ok(())
    }
}
