// report.rs — Text and JSON reports of a finished translation
//
// The text report lists every distinct resolved macro right-hand side, one
// per line, followed by a `to-be-shown:` section with one security
// obligation per line, in its macro-resolved form once the symbolic model
// exists. The JSON report adds per-edge facts, loop outcomes,
// diagnostics and provenance.
//
// Preconditions: the translation ran at least to the pass whose artifacts
//                are rendered; missing artifacts render as empty sections.
// Postconditions: output is deterministic for a given translation.
// Failure modes: JSON serialization errors are returned.
// Side effects: none.

use std::fmt::Write;

use serde::Serialize;

use crate::feedback::LoopOutcome;
use crate::pipeline::{Provenance, Translation};

/// Obligations as they appear in the symbolic model, or straight from the
/// graph when macro resolution has not run.
fn shown_obligations(t: &Translation) -> Vec<String> {
    match (&t.model, &t.graph) {
        (Some(model), _) => model.security_properties.iter().map(|p| p.to_string()).collect(),
        (None, Some(graph)) => graph
            .security_obligations()
            .iter()
            .map(|o| o.to_string())
            .collect(),
        (None, None) => Vec::new(),
    }
}

/// Plain-text report: resolved terms, then the obligations to be shown.
pub fn render_text(t: &Translation) -> String {
    let mut out = String::new();
    let mut seen: Vec<String> = Vec::new();
    for m in t.macros.iter().filter(|m| !m.is_size_marker()) {
        for term in m.replacement_terms() {
            let line = term.to_string();
            if !seen.contains(&line) {
                let _ = writeln!(out, "{}", line);
                seen.push(line);
            }
        }
    }
    let _ = writeln!(out, "to-be-shown:");
    for obligation in shown_obligations(t) {
        let _ = writeln!(out, "{}", obligation);
    }
    out
}

// ── JSON report ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonReport<'a> {
    model: &'a str,
    translator_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_sha256: Option<String>,
    edges: Vec<JsonEdge>,
    obligations: Vec<String>,
    data_equalities: Vec<String>,
    macros: Vec<String>,
    loops: Vec<JsonLoop>,
    diagnostics: Vec<String>,
}

#[derive(Serialize)]
struct JsonEdge {
    signal: u32,
    var: String,
    facts: Vec<String>,
}

#[derive(Serialize)]
struct JsonLoop {
    members: Vec<u32>,
    representative: Option<u32>,
    outcome: String,
}

fn outcome_text(outcome: &LoopOutcome) -> String {
    match outcome {
        LoopOutcome::Fixpoint { rounds, summary } => {
            format!("fixpoint after {} rounds: {}", rounds, summary)
        }
        LoopOutcome::SignFallback {
            rounds,
            fact: Some(fact),
        } => format!("sign fallback after {} rounds: {}", rounds, fact),
        LoopOutcome::SignFallback { rounds, fact: None } => {
            format!("no fact after {} rounds", rounds)
        }
        LoopOutcome::Failed { message } => format!("failed: {}", message),
        LoopOutcome::Unsimulated => "unsimulated".to_string(),
    }
}

/// JSON summary of the translation.
pub fn render_json(
    model_name: &str,
    t: &Translation,
    provenance: Option<&Provenance>,
) -> Result<String, serde_json::Error> {
    let (edges, data_equalities) = match &t.graph {
        Some(graph) => (
            graph
                .edges()
                .iter()
                .map(|e| JsonEdge {
                    signal: e.signal.0,
                    var: e.var.clone(),
                    facts: e
                        .facts()
                        .iter()
                        .filter(|f| !f.is_no_information())
                        .map(|f| f.to_string())
                        .collect(),
                })
                .collect(),
            graph
                .data_equalities()
                .iter()
                .map(|r| r.to_string())
                .collect(),
        ),
        None => (Vec::new(), Vec::new()),
    };
    let report = JsonReport {
        model: model_name,
        translator_version: env!("CARGO_PKG_VERSION"),
        source_sha256: provenance.map(|p| p.source_hash_hex()),
        config_sha256: provenance.map(|p| p.config_fingerprint_hex()),
        edges,
        obligations: shown_obligations(t),
        data_equalities,
        macros: t.macros.iter().map(|m| m.to_string()).collect(),
        loops: t
            .loops
            .iter()
            .map(|l| JsonLoop {
                members: l.members.iter().map(|b| b.0).collect(),
                representative: l.representative.map(|b| b.0),
                outcome: outcome_text(&l.outcome),
            })
            .collect(),
        diagnostics: t.diagnostics.iter().map(|d| d.to_string()).collect(),
    };
    serde_json::to_string_pretty(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::model::{Block, Model, Signal};
    use crate::pipeline::{compute_provenance, translate, TranslationContext};

    fn divide_model() -> Model {
        Model::new(
            "div",
            vec![
                Block::new(1, "C", "Constant", 0, 1).with_param("Value", "1"),
                Block::new(2, "A", "Inport", 0, 1),
                Block::new(3, "Div", "Divide", 2, 1),
                Block::new(4, "Out", "Outport", 1, 0),
            ],
            vec![
                Signal::new(1, (1, 0), (3, 0)),
                Signal::new(2, (2, 0), (3, 1)),
                Signal::new(3, (3, 0), (4, 0)),
            ],
        )
    }

    #[test]
    fn text_report_ends_with_obligations() {
        let model = divide_model();
        let t = translate(&model, &TranslationContext::new(AnalysisConfig::default()));
        let text = render_text(&t);
        let tail: Vec<&str> = text
            .lines()
            .skip_while(|l| *l != "to-be-shown:")
            .collect();
        assert_eq!(tail, vec!["to-be-shown:", "A_out != 0"]);
    }

    #[test]
    fn obligations_on_placeholders_are_shown_resolved() {
        let model = Model::new(
            "scaled",
            vec![
                Block::new(1, "C", "Constant", 0, 1).with_param("Value", "1"),
                Block::new(2, "A", "Inport", 0, 1),
                Block::new(3, "G", "Gain", 1, 1).with_param("Gain", "2"),
                Block::new(4, "Div", "Divide", 2, 1),
                Block::new(5, "Out", "Outport", 1, 0),
            ],
            vec![
                Signal::new(1, (1, 0), (4, 0)),
                Signal::new(2, (2, 0), (3, 0)),
                Signal::new(3, (3, 0), (4, 1)),
                Signal::new(4, (4, 0), (5, 0)),
            ],
        );
        let t = translate(&model, &TranslationContext::new(AnalysisConfig::default()));
        let text = render_text(&t);
        let tail: Vec<&str> = text
            .lines()
            .skip_while(|l| *l != "to-be-shown:")
            .collect();
        assert_eq!(tail, vec!["to-be-shown:", "2 * A_out != 0"]);
        let json = render_json(&model.name, &t, None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["obligations"][0], "2 * A_out != 0");
    }

    #[test]
    fn json_report_carries_fingerprint() {
        let model = divide_model();
        let config = AnalysisConfig::default();
        let t = translate(&model, &TranslationContext::new(config.clone()));
        let provenance = compute_provenance("{}", &config);
        let json = render_json(&model.name, &t, Some(&provenance)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["model"], "div");
        assert_eq!(
            value["source_sha256"].as_str().map(str::len),
            Some(64)
        );
        assert_eq!(value["edges"].as_array().map(Vec::len), Some(3));
        assert_eq!(value["obligations"][0], "A_out != 0");
    }
}
