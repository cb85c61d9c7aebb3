// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all translation passes.
// Diagnostics never abort a translation: every pass returns its artifact
// together with whatever it had to report.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::id::BlockId;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `W0301`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered diagnostic codes.
pub mod codes {
    use super::DiagCode;

    /// Invariant graph node count differs from the model's block count.
    pub const E0101: DiagCode = DiagCode("E0101");
    /// Invariant graph edge count differs from the model's signal count.
    pub const E0102: DiagCode = DiagCode("E0102");
    /// Macro placeholders reference each other cyclically.
    pub const E0201: DiagCode = DiagCode("E0201");
    /// Two macros define the same placeholder differently.
    pub const E0202: DiagCode = DiagCode("E0202");
    /// Feedback loop contains blocks that cannot be simulated.
    pub const W0301: DiagCode = DiagCode("W0301");
    /// Feedback loop simulation failed; partial result used.
    pub const W0302: DiagCode = DiagCode("W0302");
    /// Feedback loop simulation exhausted its round budget.
    pub const W0303: DiagCode = DiagCode("W0303");
    /// No encoder registered for a block type.
    pub const W0401: DiagCode = DiagCode("W0401");
    /// No analyzer registered for a block type.
    pub const W0402: DiagCode = DiagCode("W0402");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any translation pass.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub block: Option<BlockId>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, location, or hint.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            block: None,
            message: message.into(),
            hint: None,
        }
    }

    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, message).with_code(code)
    }

    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach the block the diagnostic is about.
    pub fn at_block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(block) = &self.block {
            write!(f, " (block {})", block)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True when any diagnostic is error-level.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}
