// side_input/mod.rs — Starting facts supplied by the user
//
// An XML file listing, per block (by id or normalised name) and per 1-based
// output port, facts that hold on every signal leaving that port:
//
//   <invariants>
//     <block name="A">
//       <port index="1">
//         <disjunction> <interval lower="-1" upper="1"/> </disjunction>
//         <conjunction> <equality op="!=" value="0"/> </conjunction>
//         <control>
//           <antecedent> <interval term="mode" lower="1"/> </antecedent>
//           <consequent> <interval lower="0"/> </consequent>
//         </control>
//       </port>
//     </block>
//   </invariants>
//
// A disjunction becomes one signal-boundary fact; a conjunction becomes one
// fact per child. Bounds are numbers, `inf`/`-inf`, or variable names.
//
// Preconditions: none.
// Postconditions: `seed` writes facts onto the matching outgoing edges.
// Failure modes: I/O, syntax and attribute errors → `SideInputError`.
// Side effects: `SideInput::load` reads a file; `seed` mutates the graph.

mod lexer;
mod parser;

pub use parser::Element;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::graph::InvariantGraph;
use crate::id::BlockId;
use crate::info::{
    Bound, BoundaryItem, ControlInformation, EqualityInformation, Implication, Information,
    IntervalInformation, SignalboundaryInformation,
};
use crate::model::{normalize_name, Block, Model};
use crate::term::{Formula, RelOp, Term};

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SideInputError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Syntax(Vec<String>),
    /// Well-formed XML that does not describe facts.
    Invalid(String),
}

impl fmt::Display for SideInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideInputError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            SideInputError::Syntax(errors) => {
                write!(f, "side-input syntax error: {}", errors.join("; "))
            }
            SideInputError::Invalid(msg) => write!(f, "invalid side input: {}", msg),
        }
    }
}

impl std::error::Error for SideInputError {}

fn invalid<T>(msg: impl Into<String>) -> Result<T, SideInputError> {
    Err(SideInputError::Invalid(msg.into()))
}

// ── Parsed form ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum BlockSelector {
    Id(BlockId),
    /// Already normalised.
    Name(String),
}

impl BlockSelector {
    fn matches(&self, block: &Block) -> bool {
        match self {
            BlockSelector::Id(id) => block.id == *id,
            BlockSelector::Name(name) => block.normalized_name() == *name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AtomKind {
    Interval {
        lower: Option<Bound>,
        upper: Option<Bound>,
    },
    Equality {
        op: RelOp,
        value: Term,
    },
}

/// One `<interval>` or `<equality>` element. `term` overrides the subject.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    term: Option<String>,
    kind: AtomKind,
}

impl Atom {
    fn subject(&self, default: &Term) -> Term {
        match &self.term {
            Some(name) => Term::var(name.clone()),
            None => default.clone(),
        }
    }

    fn to_item(&self, default: &Term) -> BoundaryItem {
        let term = self.subject(default);
        match &self.kind {
            AtomKind::Interval { lower, upper } => BoundaryItem::Interval(
                IntervalInformation::new(term, lower.clone(), upper.clone()),
            ),
            AtomKind::Equality { op, value } => {
                BoundaryItem::Equality(EqualityInformation::new(term, *op, value.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FactSpec {
    /// Disjunction of atoms about the port's signal.
    Signal(Vec<Atom>),
    Control {
        antecedent: Vec<Atom>,
        consequent: Vec<Atom>,
    },
}

impl FactSpec {
    /// The fact about `subject`.
    pub fn to_information(&self, subject: &Term) -> Information {
        match self {
            FactSpec::Signal(atoms) => Information::Signalboundary(SignalboundaryInformation::new(
                atoms.iter().map(|a| a.to_item(subject)).collect(),
            )),
            FactSpec::Control {
                antecedent,
                consequent,
            } => Information::Control(ControlInformation {
                implications: vec![Implication {
                    antecedent: Formula::and(
                        antecedent
                            .iter()
                            .map(|a| a.to_item(subject).to_formula())
                            .collect(),
                    ),
                    consequent: SignalboundaryInformation::new(
                        consequent.iter().map(|a| a.to_item(subject)).collect(),
                    ),
                }],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortEntry {
    /// 1-based output port.
    pub index: u32,
    pub facts: Vec<FactSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockEntry {
    pub selector: BlockSelector,
    pub ports: Vec<PortEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideInput {
    pub blocks: Vec<BlockEntry>,
}

// ── Interpretation ──────────────────────────────────────────────────────────

fn bound_value(raw: &str) -> Option<Term> {
    let raw = raw.trim();
    match raw {
        "" | "inf" | "+inf" | "-inf" | "Inf" | "-Inf" => None,
        _ => Some(match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Term::num(v),
            Ok(_) => return None,
            Err(_) => Term::var(raw),
        }),
    }
}

fn flag(el: &Element, key: &str) -> bool {
    matches!(el.attr(key), Some("true") | Some("1") | Some("on"))
}

fn parse_atom(el: &Element) -> Result<Atom, SideInputError> {
    let term = el.attr("term").map(str::to_string);
    let kind = match el.name.as_str() {
        "interval" => {
            let bound = |key: &str, strict_key: &str| {
                el.attr(key).and_then(bound_value).map(|v| Bound {
                    value: v,
                    strict: flag(el, strict_key),
                })
            };
            AtomKind::Interval {
                lower: bound("lower", "lowerStrict"),
                upper: bound("upper", "upperStrict"),
            }
        }
        "equality" => {
            let Some(raw) = el.attr("value") else {
                return invalid("<equality> without a value");
            };
            let op_text = el.attr("op").unwrap_or("=");
            let Some(op) = RelOp::parse(op_text) else {
                return invalid(format!("unknown relation '{}'", op_text));
            };
            let value = match raw.trim().parse::<f64>() {
                Ok(v) => Term::num(v),
                Err(_) => Term::var(raw.trim()),
            };
            AtomKind::Equality { op, value }
        }
        other => return invalid(format!("unexpected <{}> inside a fact", other)),
    };
    Ok(Atom { term, kind })
}

fn parse_atoms(el: &Element) -> Result<Vec<Atom>, SideInputError> {
    el.children.iter().map(parse_atom).collect()
}

fn parse_port(el: &Element) -> Result<PortEntry, SideInputError> {
    let index = match el.attr("index").map(|s| s.trim().parse::<u32>()) {
        Some(Ok(i)) if i >= 1 => i,
        _ => return invalid("<port> needs a 1-based index"),
    };
    let mut facts = Vec::new();
    for child in &el.children {
        match child.name.as_str() {
            "disjunction" => facts.push(FactSpec::Signal(parse_atoms(child)?)),
            "conjunction" => {
                for atom in parse_atoms(child)? {
                    facts.push(FactSpec::Signal(vec![atom]));
                }
            }
            "control" => {
                let part = |name: &str| -> Result<Vec<Atom>, SideInputError> {
                    match child.children_named(name).next() {
                        Some(p) => parse_atoms(p),
                        None => Ok(Vec::new()),
                    }
                };
                let antecedent = part("antecedent")?;
                let consequent = part("consequent")?;
                if consequent.is_empty() {
                    return invalid("<control> without a consequent");
                }
                facts.push(FactSpec::Control {
                    antecedent,
                    consequent,
                });
            }
            "interval" | "equality" => facts.push(FactSpec::Signal(vec![parse_atom(child)?])),
            other => return invalid(format!("unexpected <{}> inside <port>", other)),
        }
    }
    Ok(PortEntry { index, facts })
}

fn parse_block(el: &Element) -> Result<BlockEntry, SideInputError> {
    let selector = match (el.attr("id"), el.attr("name")) {
        (Some(id), _) => match id.trim().parse::<u32>() {
            Ok(n) => BlockSelector::Id(BlockId(n)),
            Err(_) => return invalid(format!("block id '{}' is not a number", id)),
        },
        (None, Some(name)) => BlockSelector::Name(normalize_name(name)),
        (None, None) => return invalid("<block> needs an id or a name"),
    };
    let ports = el
        .children_named("port")
        .map(parse_port)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BlockEntry { selector, ports })
}

impl SideInput {
    pub fn parse_str(source: &str) -> Result<SideInput, SideInputError> {
        let root = parser::parse_document(source).map_err(SideInputError::Syntax)?;
        if root.name != "invariants" {
            return invalid(format!("root element is <{}>, expected <invariants>", root.name));
        }
        let blocks = root
            .children_named("block")
            .map(parse_block)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SideInput { blocks })
    }

    pub fn load(path: &Path) -> Result<SideInput, SideInputError> {
        let source = std::fs::read_to_string(path).map_err(|e| SideInputError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse_str(&source)
    }

    /// Write every entry's facts onto the signals leaving its port.
    /// Returns the number of facts added; unmatched entries are skipped.
    pub fn seed(&self, model: &Model, graph: &mut InvariantGraph) -> usize {
        let mut added = 0;
        for entry in &self.blocks {
            let Some(block) = model.blocks.iter().find(|b| entry.selector.matches(b)) else {
                log::warn!("side input: no block matches {:?}", entry.selector);
                continue;
            };
            let Some(node) = graph.node_of(block.id) else {
                continue;
            };
            for port in &entry.ports {
                let edges: Vec<_> = graph
                    .node(node)
                    .outgoing
                    .iter()
                    .copied()
                    .filter(|&e| graph.edge(e).src_port + 1 == port.index)
                    .collect();
                for e in edges {
                    let subject = graph.edge(e).term();
                    for spec in &port.facts {
                        if graph.edge_mut(e).add_fact(spec.to_information(&subject)) {
                            added += 1;
                        }
                    }
                }
            }
        }
        log::debug!("side input: seeded {} facts", added);
        added
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
