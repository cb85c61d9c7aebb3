// hpt — Hybrid Program Translator
//
// Library root. Translates block-diagram models into hybrid programs,
// inferring signal invariants and safety obligations along the way.

pub mod analyzer;
pub mod config;
pub mod diag;
pub mod dot;
pub mod encode;
pub mod feedback;
pub mod graph;
pub mod hybrid;
pub mod id;
pub mod info;
pub mod macros;
pub mod model;
pub mod oracle;
pub mod pass;
pub mod pipeline;
pub mod propagate;
pub mod report;
pub mod safety;
pub mod side_input;
pub mod term;
