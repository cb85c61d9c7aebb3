use clap::Parser;
use std::path::PathBuf;

use hpt::config::AnalysisConfig;
use hpt::diag::DiagLevel;
use hpt::model::Model;
use hpt::pass::PassId;
use hpt::pipeline::{compute_provenance, run_passes, TranslationContext};
use hpt::side_input::SideInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Resolved terms and obligations, plain text
    Report,
    /// JSON summary with provenance
    Json,
    /// Graphviz view of the invariant graph
    Dot,
    /// The emitted symbolic model
    Model,
}

#[derive(Parser, Debug)]
#[command(
    name = "hpt",
    version,
    about = "Hybrid Program Translator — infers invariants and safety obligations for block diagrams"
)]
struct Cli {
    /// Input model (JSON)
    model: PathBuf,

    /// Side-input file with user-supplied facts
    #[arg(short = 's', long = "side-input")]
    side_input: Option<PathBuf>,

    /// Analysis limits (JSON)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Report)]
    emit: EmitStage,

    /// Print pass timing and debug logs
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Warn
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );

    if cli.verbose {
        eprintln!("hpt: model = {}", cli.model.display());
        if let Some(side) = &cli.side_input {
            eprintln!("hpt: side input = {}", side.display());
        }
    }

    // ── Load inputs ──
    let source = match std::fs::read_to_string(&cli.model) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("hpt: error: {}: {}", cli.model.display(), e);
            std::process::exit(2);
        }
    };
    let model = match Model::from_json(&source) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("hpt: error: {}: {}", cli.model.display(), e);
            std::process::exit(2);
        }
    };
    let config = match &cli.config {
        Some(path) => match AnalysisConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("hpt: error: {}", e);
                std::process::exit(2);
            }
        },
        None => AnalysisConfig::default(),
    };

    let provenance = compute_provenance(&source, &config);
    let mut ctx = TranslationContext::new(config);
    ctx.verbose = cli.verbose;
    if let Some(path) = &cli.side_input {
        match SideInput::load(path) {
            Ok(side) => ctx = ctx.with_side_input(side),
            Err(e) => log::warn!("ignoring side input: {}", e),
        }
    }

    // ── Translate ──
    let terminal = match cli.emit {
        EmitStage::Dot => PassId::Propagate,
        EmitStage::Report | EmitStage::Json | EmitStage::Model => PassId::ResolveMacros,
    };
    let translation = run_passes(&model, &ctx, terminal, &mut |_, diags| {
        for d in diags {
            eprintln!("{}", d);
        }
    });

    let output = match cli.emit {
        EmitStage::Report => hpt::report::render_text(&translation),
        EmitStage::Json => {
            match hpt::report::render_json(&model.name, &translation, Some(&provenance)) {
                Ok(json) => json,
                Err(e) => {
                    eprintln!("hpt: error: cannot serialize report: {}", e);
                    std::process::exit(1);
                }
            }
        }
        EmitStage::Dot => match &translation.graph {
            Some(graph) => hpt::dot::emit_dot(&model, graph, &translation.loops),
            None => String::new(),
        },
        EmitStage::Model => translation
            .model
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_default(),
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &output) {
                eprintln!("hpt: error: cannot write {}: {}", path.display(), e);
                std::process::exit(1);
            }
            if cli.verbose {
                eprintln!("hpt: wrote {}", path.display());
            }
        }
        None => print!("{}", output),
    }

    let errors = translation
        .diagnostics
        .iter()
        .filter(|d| d.level == DiagLevel::Error)
        .count();
    if errors > 0 {
        eprintln!("hpt: {} error(s)", errors);
        std::process::exit(1);
    }
}
