// pass.rs — Pass descriptors: metadata, dependency resolution, artifact IDs
//
// Declares the translator's passes, their dependency edges and the
// artifacts they produce. The pipeline runner uses these to compute the
// minimal pass prefix for each --emit target.

use std::collections::HashSet;

// ── Pass and artifact identifiers ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    BuildGraph,
    SeedSideInput,
    Propagate,
    DataEqualities,
    Safety,
    Encode,
    ResolveMacros,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Graph,          // InvariantGraph
    Facts,          // facts on the graph's edges and nodes
    Loops,          // Vec<LoopRecord>
    DataEqualities, // InvariantGraph::data_equalities
    Obligations,    // InvariantGraph::security_obligations
    Encoding,       // Encoding
    Macros,         // Vec<Macro>, closed
    SymbolicModel,  // SymbolicModel
}

// ── Pass descriptor ─────────────────────────────────────────────────────────

pub struct PassDescriptor {
    /// Name shown in verbose output.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
    pub outputs: &'static [ArtifactId],
    /// What invalidates this pass's output.
    pub invalidation_key: &'static str,
    /// Postconditions, documentation only.
    pub invariants: &'static str,
}

pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::BuildGraph => PassDescriptor {
            name: "build_graph",
            inputs: &[],
            outputs: &[ArtifactId::Graph],
            invalidation_key: "model",
            invariants: "one node per block, one edge per signal line",
        },
        PassId::SeedSideInput => PassDescriptor {
            name: "seed_side_input",
            inputs: &[PassId::BuildGraph],
            outputs: &[ArtifactId::Facts],
            invalidation_key: "graph + side input",
            invariants: "user facts on the matching outgoing edges",
        },
        PassId::Propagate => PassDescriptor {
            name: "propagate",
            inputs: &[PassId::SeedSideInput],
            outputs: &[ArtifactId::Facts, ArtifactId::Loops],
            invalidation_key: "graph + analyzers + config",
            invariants: "every outgoing edge carries a fact per category",
        },
        PassId::DataEqualities => PassDescriptor {
            name: "data_equalities",
            inputs: &[PassId::BuildGraph],
            outputs: &[ArtifactId::DataEqualities],
            invalidation_key: "model",
            invariants: "equal-input twins related by equality",
        },
        PassId::Safety => PassDescriptor {
            name: "safety",
            inputs: &[PassId::Propagate],
            outputs: &[ArtifactId::Obligations],
            invalidation_key: "facts + oracle + config",
            invariants: "obligations deduplicated",
        },
        PassId::Encode => PassDescriptor {
            name: "encode",
            inputs: &[],
            outputs: &[ArtifactId::Encoding],
            invalidation_key: "model + encoders",
            invariants: "state updates after output assignments",
        },
        PassId::ResolveMacros => PassDescriptor {
            name: "resolve_macros",
            inputs: &[
                PassId::Propagate,
                PassId::DataEqualities,
                PassId::Safety,
                PassId::Encode,
            ],
            outputs: &[ArtifactId::Macros, ArtifactId::SymbolicModel],
            invalidation_key: "encoding + facts + obligations",
            invariants: "no placeholder survives in the emitted model",
        },
    }
}

// ── Dependency resolution ───────────────────────────────────────────────────

pub const ALL_PASSES: [PassId; 7] = [
    PassId::BuildGraph,
    PassId::SeedSideInput,
    PassId::Propagate,
    PassId::DataEqualities,
    PassId::Safety,
    PassId::Encode,
    PassId::ResolveMacros,
];

/// Minimal ordered set of passes needed to produce `terminal`, in
/// execution order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagate_needs_graph_and_seeds_only() {
        assert_eq!(
            required_passes(PassId::Propagate),
            vec![PassId::BuildGraph, PassId::SeedSideInput, PassId::Propagate]
        );
    }

    #[test]
    fn encode_is_standalone() {
        assert_eq!(required_passes(PassId::Encode), vec![PassId::Encode]);
    }

    #[test]
    fn resolve_macros_includes_all() {
        let passes = required_passes(PassId::ResolveMacros);
        assert_eq!(passes.len(), ALL_PASSES.len());
        assert_eq!(
            passes,
            ALL_PASSES.to_vec()
        );
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            assert!(
                !descriptor(*pass).outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependencies_precede_dependents() {
        for pass in &ALL_PASSES {
            let order = required_passes(*pass);
            let self_pos = order.iter().position(|p| p == pass);
            for dep in descriptor(*pass).inputs {
                let dep_pos = order.iter().position(|p| p == dep);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later",
                    pass,
                    dep
                );
            }
        }
    }
}
