// model.rs — Read-only view of a block-diagram model
//
// Blocks carry a type tag, port counts and string-valued parameters; signals
// connect one output port to one input port. The view is deserialised from the
// JSON interchange form produced by an upstream diagram parser.
//
// Preconditions: none (dangling signal endpoints are tolerated and surface
//                later as graph-size mismatches).
// Postconditions: `Model::new` builds an O(1) block index.
// Failure modes: I/O and JSON decoding errors → `ModelError`.
// Side effects: `Model::load` reads a file.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::id::{BlockId, SignalId};

// ── Blocks and signals ──────────────────────────────────────────────────────

/// A block of the diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub inputs: u32,
    #[serde(default)]
    pub outputs: u32,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Block {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        block_type: impl Into<String>,
        inputs: u32,
        outputs: u32,
    ) -> Self {
        Block {
            id: BlockId(id),
            name: name.into(),
            block_type: block_type.into(),
            inputs,
            outputs,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.trim())
    }

    /// Numeric parameter value; non-numeric strings yield `None`.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.param(key)?.parse::<f64>().ok()
    }

    /// Whether an on/off parameter is switched on.
    pub fn param_on(&self, key: &str) -> bool {
        matches!(self.param(key), Some("on") | Some("true") | Some("1"))
    }

    /// Identifier-safe base name used for all variables of this block.
    pub fn var_base(&self) -> String {
        let mut base: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        if base.is_empty() || base.starts_with(|c: char| c.is_ascii_digit()) {
            base.insert(0, 'b');
        }
        base
    }

    /// Variable carrying the value of output port `port` (0-based).
    pub fn output_var(&self, port: u32) -> String {
        if self.outputs <= 1 {
            format!("{}_out", self.var_base())
        } else {
            format!("{}_out{}", self.var_base(), port + 1)
        }
    }

    /// Name used when matching side-input entries: lower-case, whitespace
    /// collapsed to `_`.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Normalise a block name for side-input lookup.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() {
                '_'
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

/// One end of a signal: a block and a 0-based port index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub block: BlockId,
    pub port: u32,
}

/// A signal line from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub src: PortRef,
    pub dst: PortRef,
}

impl Signal {
    pub fn new(id: u32, src: (u32, u32), dst: (u32, u32)) -> Self {
        Signal {
            id: SignalId(id),
            src: PortRef {
                block: BlockId(src.0),
                port: src.1,
            },
            dst: PortRef {
                block: BlockId(dst.0),
                port: dst.1,
            },
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ModelError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json(serde_json::Error),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            ModelError::Json(e) => write!(f, "invalid model JSON: {}", e),
        }
    }
}

impl std::error::Error for ModelError {}

// ── Model ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ModelFile {
    name: String,
    #[serde(default)]
    blocks: Vec<Block>,
    #[serde(default)]
    signals: Vec<Signal>,
}

impl From<ModelFile> for Model {
    fn from(file: ModelFile) -> Self {
        Model::new(file.name, file.blocks, file.signals)
    }
}

/// The block diagram: ordered blocks and signal lines.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "ModelFile")]
pub struct Model {
    pub name: String,
    pub blocks: Vec<Block>,
    pub signals: Vec<Signal>,
    block_index: HashMap<BlockId, usize>,
}

/// Result of topological sorting: the sortable prefix plus the blocks left
/// on or behind a cycle, both in model order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopoOrder {
    pub sorted: Vec<BlockId>,
    pub residual: Vec<BlockId>,
}

impl TopoOrder {
    /// Sorted blocks followed by the residual ones.
    pub fn all(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.sorted.iter().chain(self.residual.iter()).copied()
    }
}

impl Model {
    pub fn new(name: impl Into<String>, blocks: Vec<Block>, signals: Vec<Signal>) -> Self {
        let mut block_index = HashMap::with_capacity(blocks.len());
        for (idx, block) in blocks.iter().enumerate() {
            block_index.entry(block.id).or_insert(idx);
        }
        Model {
            name: name.into(),
            blocks,
            signals,
            block_index,
        }
    }

    pub fn from_json(source: &str) -> Result<Model, ModelError> {
        serde_json::from_str(source).map_err(ModelError::Json)
    }

    pub fn load(path: &Path) -> Result<Model, ModelError> {
        let source = std::fs::read_to_string(path).map_err(|e| ModelError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&source)
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.block_index.get(&id).map(|&idx| &self.blocks[idx])
    }

    /// The signal feeding input port `port` of `block`.
    pub fn incoming_signal(&self, block: BlockId, port: u32) -> Option<&Signal> {
        self.signals
            .iter()
            .find(|s| s.dst.block == block && s.dst.port == port)
    }

    /// Signals leaving any output port of `block`, in model order.
    pub fn outgoing_signals(&self, block: BlockId) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(move |s| s.src.block == block)
    }

    /// Variable carried on input port `port` of `block`, if connected.
    pub fn input_var(&self, block: BlockId, port: u32) -> Option<String> {
        let signal = self.incoming_signal(block, port)?;
        let src = self.block(signal.src.block)?;
        Some(src.output_var(signal.src.port))
    }

    /// Kahn topological order over blocks. Blocks on (or downstream of) a
    /// cycle end up in `residual`.
    pub fn topological_order(&self) -> TopoOrder {
        let mut in_degree: HashMap<BlockId, usize> =
            self.blocks.iter().map(|b| (b.id, 0)).collect();
        let mut successors: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for signal in &self.signals {
            if !in_degree.contains_key(&signal.src.block) {
                continue;
            }
            if let Some(d) = in_degree.get_mut(&signal.dst.block) {
                *d += 1;
                successors
                    .entry(signal.src.block)
                    .or_default()
                    .push(signal.dst.block);
            }
        }

        let mut queue: VecDeque<BlockId> = self
            .blocks
            .iter()
            .filter(|b| in_degree.get(&b.id) == Some(&0))
            .map(|b| b.id)
            .collect();
        let mut sorted = Vec::with_capacity(self.blocks.len());
        while let Some(id) = queue.pop_front() {
            if sorted.contains(&id) {
                continue;
            }
            sorted.push(id);
            for succ in successors.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(d) = in_degree.get_mut(succ) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(*succ);
                    }
                }
            }
        }

        let residual = self
            .blocks
            .iter()
            .map(|b| b.id)
            .filter(|id| !sorted.contains(id))
            .collect();
        TopoOrder { sorted, residual }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
