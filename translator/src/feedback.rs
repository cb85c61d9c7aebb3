// feedback.rs — Feedback-loop resolution by bounded simulation
//
// When propagation closes a cycle, the loop's members are simulated round by
// round on abstract facts: the representative member (the first stateful
// block of the loop) starts from its existing or analyzer-provided seed, and
// each round pushes the current facts once around the loop. A round whose
// result repeats an earlier trace entry is a fixpoint; the distinct trace
// entries become the loop's discretized summary fact. Without a fixpoint
// inside the round budget, a one-sided sign fact is inferred from the trace
// when every entry agrees on a sign.
//
// Preconditions: called from propagation with `start` on the active path.
// Postconditions: every loop member is marked done; the summary (if any) is
//                 on the representative's outgoing edges.
// Failure modes: unsimulable members → W0301; simulation errors → W0302;
//                exhausted budget → W0303. None abort propagation.
// Side effects: mutates the graph through the propagator.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::analyzer::{AnalyzerKind, ApplyContext, Applied};
use crate::diag::{codes, Diagnostic};
use crate::graph::LoopAnalysis;
use crate::id::{BlockId, NodeId};
use crate::info::{
    conjoin_boundaries, Bound, Category, DiscreteSignalInformation, Information,
    IntervalInformation, SignalboundaryInformation,
};
use crate::propagate::Propagator;
use crate::term::{RelOp, Term};

// ── Public types ────────────────────────────────────────────────────────────

/// How a loop was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// Fixpoint reached; summary written.
    Fixpoint { rounds: usize, summary: Information },
    /// Budget exhausted; a sign fact was inferred (or none could be).
    SignFallback {
        rounds: usize,
        fact: Option<Information>,
    },
    /// Simulation failed part-way.
    Failed { message: String },
    /// Some member cannot be simulated.
    Unsimulated,
}

/// A resolved feedback loop, for reports and graph rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopRecord {
    pub members: Vec<BlockId>,
    pub representative: Option<BlockId>,
    pub outcome: LoopOutcome,
}

/// A simulation round could not be computed.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    MissingBlock(NodeId),
    EmptyLoop,
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::MissingBlock(n) => write!(f, "loop node {} has no block", n.0),
            SimulationError::EmptyLoop => write!(f, "loop has no members"),
        }
    }
}

impl std::error::Error for SimulationError {}

// ── Sign fallback ───────────────────────────────────────────────────────────

/// The strongest sign predicate every trace entry satisfies.
pub fn infer_sign(trace: &[SignalboundaryInformation]) -> Option<RelOp> {
    if trace.is_empty() {
        return None;
    }
    let hulls: Option<Vec<_>> = trace.iter().map(|s| s.hull()).collect();
    let hulls = hulls?;
    [RelOp::Gt, RelOp::Ge, RelOp::Lt, RelOp::Le]
        .into_iter()
        .find(|&op| hulls.iter().all(|h| h.all_satisfy_sign(op)))
}

/// One-sided unbounded interval `term ⋈ 0`.
fn sign_fact(term: Term, op: RelOp) -> Information {
    let zero = || Term::num(0.0);
    let (lower, upper) = match op {
        RelOp::Gt => (Some(Bound::exclusive(zero())), None),
        RelOp::Ge => (Some(Bound::inclusive(zero())), None),
        RelOp::Lt => (None, Some(Bound::exclusive(zero()))),
        _ => (None, Some(Bound::inclusive(zero()))),
    };
    Information::Interval(IntervalInformation::new(term, lower, upper))
}

// ── Trace ───────────────────────────────────────────────────────────────────

struct Simulation {
    trace: Vec<SignalboundaryInformation>,
    rounds: usize,
    fixpoint: bool,
}

impl Simulation {
    /// Record a round result; true when it closes a fixpoint.
    fn record(&mut self, entry: SignalboundaryInformation) -> bool {
        self.rounds += 1;
        if self.trace.contains(&entry) {
            self.fixpoint = true;
        } else {
            self.trace.push(entry);
        }
        self.fixpoint
    }

    /// Distinct trace entries as one fact; `None` if any entry is unbounded.
    fn summary(&self) -> Option<Information> {
        if self.trace.is_empty() || self.trace.iter().any(|s| s.is_unbounded()) {
            return None;
        }
        if self.trace.len() == 1 {
            return Some(Information::Signalboundary(self.trace[0].clone()));
        }
        Some(Information::DiscreteSignal(DiscreteSignalInformation::new(
            self.trace.clone(),
        )))
    }
}

// ── Loop resolution ─────────────────────────────────────────────────────────

impl<'a> Propagator<'a> {
    /// Resolve the loop closing on `start` and process all of its members.
    pub(crate) fn resolve_loop(&mut self, start: NodeId) {
        let members = LoopAnalysis::new(self.graph).find_loop(start);
        if members.is_empty() {
            return;
        }
        let member_set: HashSet<NodeId> = members.iter().copied().collect();
        self.resolving.extend(members.iter().copied());
        let member_blocks: Vec<BlockId> =
            members.iter().map(|&n| self.graph.node(n).block).collect();
        log::debug!("feedback: loop {:?}", member_blocks);

        // External predecessors first.
        for &m in &members {
            for pred in self.graph.predecessors(m) {
                if !member_set.contains(&pred) {
                    self.visit(pred);
                }
            }
        }

        let kinds: Vec<AnalyzerKind> = members
            .iter()
            .map(|&m| {
                self.block_of(m)
                    .map(|b| self.registry.lookup(&b.block_type).kind())
                    .unwrap_or(AnalyzerKind::Opaque)
            })
            .collect();
        let representative = members
            .iter()
            .zip(&kinds)
            .find(|(_, k)| **k == AnalyzerKind::Stateful)
            .map(|(&m, _)| m)
            .unwrap_or(start);

        let outcome = if kinds.iter().all(|k| k.simulable()) {
            self.simulate_loop(&members, &member_set, representative)
        } else {
            let offending = members
                .iter()
                .zip(&kinds)
                .find(|(_, k)| !k.simulable())
                .map(|(&m, _)| self.graph.node(m).block);
            let mut d = Diagnostic::warning(
                codes::W0301,
                format!(
                    "feedback loop through {} blocks contains a block that cannot be simulated",
                    members.len()
                ),
            );
            if let Some(b) = offending {
                d = d.at_block(b);
            }
            self.diagnostics.push(d);
            LoopOutcome::Unsimulated
        };

        // Regular propagation around the loop, representative last.
        let rep_pos = members
            .iter()
            .position(|&m| m == representative)
            .unwrap_or(0);
        let rotated: Vec<NodeId> = members[rep_pos + 1..]
            .iter()
            .chain(members[..=rep_pos].iter())
            .copied()
            .collect();
        for &m in &rotated {
            if !self.done.contains(&m) {
                self.process(m);
            }
        }
        for &m in &members {
            for e in self.graph.node(m).incoming.clone() {
                if member_set.contains(&self.graph.edge(e).source) {
                    self.graph.edge_mut(e).mark_all_consumed();
                }
            }
            self.done.insert(m);
            self.resolving.remove(&m);
        }

        self.loops.push(LoopRecord {
            members: member_blocks,
            representative: Some(self.graph.node(representative).block),
            outcome,
        });
    }

    fn simulate_loop(
        &mut self,
        members: &[NodeId],
        member_set: &HashSet<NodeId>,
        representative: NodeId,
    ) -> LoopOutcome {
        let Some(rep_block) = self.block_of(representative) else {
            return LoopOutcome::Failed {
                message: SimulationError::MissingBlock(representative).to_string(),
            };
        };
        let rep_term = Term::var(rep_block.output_var(0));

        // Seed from facts already on the representative's output, else ask
        // its analyzer.
        let existing: Vec<Information> = self
            .graph
            .node(representative)
            .outgoing
            .iter()
            .flat_map(|&e| self.graph.edge(e).facts().to_vec())
            .filter(|f| f.category() == Category::Signal && !f.is_no_information())
            .collect();
        let seed = conjoin_boundaries(&rep_term, &existing).or_else(|| {
            self.registry
                .lookup(&rep_block.block_type)
                .feedback_simulation_seed(rep_block)
                .and_then(|f| f.as_boundary())
        });
        let Some(seed) = seed else {
            self.diagnostics.push(
                Diagnostic::warning(codes::W0302, "feedback loop has no starting fact")
                    .at_block(rep_block.id),
            );
            return LoopOutcome::Failed {
                message: "no seed".to_string(),
            };
        };

        let rep_pos = members
            .iter()
            .position(|&m| m == representative)
            .unwrap_or(0);
        let order: Vec<NodeId> = members[rep_pos + 1..]
            .iter()
            .chain(members[..=rep_pos].iter())
            .copied()
            .collect();

        let mut sim = Simulation {
            trace: vec![seed.clone()],
            rounds: 0,
            fixpoint: false,
        };
        let mut current = seed;
        let budget = self.config.max_simulation_rounds;
        let mut failure = None;

        while sim.rounds < budget {
            match self.simulate_round(&order, member_set, representative, &current) {
                Ok(next) => {
                    log::trace!("feedback: round {}: {}", sim.rounds + 1, next.to_formula());
                    if sim.record(next.clone()) {
                        break;
                    }
                    current = next;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let rep_id = rep_block.id;
        if let Some(err) = failure {
            self.diagnostics.push(
                Diagnostic::warning(
                    codes::W0302,
                    format!("feedback loop simulation failed: {}", err),
                )
                .at_block(rep_id),
            );
            let fact = infer_sign(&sim.trace).map(|op| sign_fact(rep_term.clone(), op));
            if let Some(f) = &fact {
                self.write_outgoing(representative, f);
            }
            return LoopOutcome::Failed {
                message: err.to_string(),
            };
        }

        if sim.fixpoint {
            log::debug!(
                "feedback: fixpoint after {} rounds, {} trace entries",
                sim.rounds,
                sim.trace.len()
            );
            return match sim.summary() {
                Some(summary) => {
                    self.write_outgoing(representative, &summary);
                    LoopOutcome::Fixpoint {
                        rounds: sim.rounds,
                        summary,
                    }
                }
                None => LoopOutcome::SignFallback {
                    rounds: sim.rounds,
                    fact: None,
                },
            };
        }

        let fact = infer_sign(&sim.trace).map(|op| sign_fact(rep_term, op));
        let message = match &fact {
            Some(f) => format!(
                "feedback loop reached no fixpoint in {} rounds; inferred {}",
                budget, f
            ),
            None => format!(
                "feedback loop reached no fixpoint in {} rounds; no invariant inferred",
                budget
            ),
        };
        self.diagnostics
            .push(Diagnostic::warning(codes::W0303, message).at_block(rep_id));
        if let Some(f) = &fact {
            self.write_outgoing(representative, f);
        }
        LoopOutcome::SignFallback {
            rounds: sim.rounds,
            fact,
        }
    }

    /// Push `current` (the representative's output) once around the loop and
    /// return the representative's new output.
    fn simulate_round(
        &self,
        order: &[NodeId],
        member_set: &HashSet<NodeId>,
        representative: NodeId,
        current: &SignalboundaryInformation,
    ) -> Result<SignalboundaryInformation, SimulationError> {
        if order.is_empty() {
            return Err(SimulationError::EmptyLoop);
        }
        let mut values: HashMap<NodeId, Vec<Information>> = HashMap::new();
        values.insert(
            representative,
            vec![Information::Signalboundary(current.clone())],
        );

        for &member in order {
            let block = self
                .block_of(member)
                .ok_or(SimulationError::MissingBlock(member))?;
            let analyzer = self.registry.lookup(&block.block_type);

            let (input_vars, mut input_facts) = self.inputs_of(member);
            for &e in &self.graph.node(member).incoming {
                let edge = self.graph.edge(e);
                if !member_set.contains(&edge.source) {
                    continue;
                }
                let p = edge.dst_port as usize;
                let term = edge.term();
                input_facts[p] = values
                    .get(&edge.source)
                    .map(|fs| fs.iter().map(|f| f.retarget(&term)).collect())
                    .unwrap_or_default();
            }

            let mut out: Vec<Information> = analyzer.generate_information(block);
            let probe = ApplyContext {
                block,
                port: 0,
                input_vars: &input_vars,
                input_facts: &input_facts,
            };
            if analyzer.kind() == AnalyzerKind::Control {
                if let Some(f) = analyzer.evaluate_condition_for_feedback(&probe) {
                    out.push(f);
                }
            } else {
                for (port, facts) in input_facts.iter().enumerate() {
                    for fact in facts.iter().filter(|f| f.category() == Category::Signal) {
                        let ctx = ApplyContext {
                            port: port as u32,
                            ..probe
                        };
                        if let Applied::Propagate(f) = analyzer.apply_information(fact, &ctx) {
                            if !f.is_no_information() && !out.contains(&f) {
                                out.push(f);
                            }
                        }
                    }
                }
            }
            values.insert(member, out);
        }

        let rep_block = self
            .block_of(representative)
            .ok_or(SimulationError::MissingBlock(representative))?;
        let rep_term = Term::var(rep_block.output_var(0));
        let produced = values.remove(&representative).unwrap_or_default();
        Ok(conjoin_boundaries(&rep_term, &produced)
            .unwrap_or_else(|| SignalboundaryInformation::unbounded(rep_term)))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::NumRange;

    fn sb(lo: f64, hi: f64) -> SignalboundaryInformation {
        SignalboundaryInformation::from_range(Term::var("x"), NumRange::closed(lo, hi))
    }

    #[test]
    fn sign_inference_prefers_strict() {
        assert_eq!(infer_sign(&[sb(1.0, 2.0), sb(3.0, 9.0)]), Some(RelOp::Gt));
        assert_eq!(infer_sign(&[sb(0.0, 2.0), sb(3.0, 9.0)]), Some(RelOp::Ge));
        assert_eq!(infer_sign(&[sb(-2.0, -1.0)]), Some(RelOp::Lt));
        assert_eq!(infer_sign(&[sb(-2.0, 0.0)]), Some(RelOp::Le));
        assert_eq!(infer_sign(&[sb(-1.0, 1.0)]), None);
        assert_eq!(infer_sign(&[]), None);
    }

    #[test]
    fn trace_repeat_is_fixpoint() {
        let mut sim = Simulation {
            trace: vec![sb(0.0, 1.0)],
            rounds: 0,
            fixpoint: false,
        };
        assert!(!sim.record(sb(0.0, 2.0)));
        assert!(sim.record(sb(0.0, 1.0)));
        assert_eq!(sim.rounds, 2);
        match sim.summary() {
            Some(Information::DiscreteSignal(d)) => assert_eq!(d.signals.len(), 2),
            other => panic!("unexpected summary {:?}", other),
        }
    }

    #[test]
    fn growing_trace_keeps_every_entry() {
        let mut sim = Simulation {
            trace: vec![sb(0.0, 0.0)],
            rounds: 0,
            fixpoint: false,
        };
        for hi in 1..=3 {
            assert!(!sim.record(sb(0.0, hi as f64)));
        }
        assert_eq!(sim.trace.len(), 4);
        assert!(sim.record(sb(0.0, 3.0)));
        assert_eq!(sim.trace.len(), 4);
        assert_eq!(sim.rounds, 4);
    }

    #[test]
    fn sign_fact_shapes() {
        let f = sign_fact(Term::var("x"), RelOp::Gt);
        assert_eq!(f.to_string(), "x > 0");
        let f = sign_fact(Term::var("x"), RelOp::Le);
        assert_eq!(f.to_string(), "x <= 0");
    }

    #[test]
    fn unbounded_entry_yields_no_summary() {
        let sim = Simulation {
            trace: vec![sb(0.0, 1.0), SignalboundaryInformation::unbounded(Term::var("x"))],
            rounds: 2,
            fixpoint: true,
        };
        assert_eq!(sim.summary(), None);
    }
}
