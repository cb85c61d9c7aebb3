// Snapshot tests: lock the plain-text report format.
//
// Uses the library API (translate → render_text) and an inline `insta`
// snapshot. Run `cargo insta review` after intentional output changes.

use hpt::config::AnalysisConfig;
use hpt::model::{Block, Model, Signal};
use hpt::pipeline::{translate, TranslationContext};
use hpt::report::render_text;

fn scaled_quotient() -> Model {
    Model::new(
        "quotient",
        vec![
            Block::new(1, "A", "Inport", 0, 1),
            Block::new(2, "B", "Inport", 0, 1),
            Block::new(3, "Div", "Divide", 2, 1),
            Block::new(4, "G", "Gain", 1, 1).with_param("Gain", "2"),
            Block::new(5, "Out", "Outport", 1, 0),
        ],
        vec![
            Signal::new(1, (1, 0), (3, 0)),
            Signal::new(2, (2, 0), (3, 1)),
            Signal::new(3, (3, 0), (4, 0)),
            Signal::new(4, (4, 0), (5, 0)),
        ],
    )
}

#[test]
fn snapshot_text_report() {
    let t = translate(
        &scaled_quotient(),
        &TranslationContext::new(AnalysisConfig::default()),
    );
    insta::assert_snapshot!(render_text(&t), @r"
    A_out / B_out
    2 * A_out / B_out
    to-be-shown:
    B_out != 0
    ");
}
