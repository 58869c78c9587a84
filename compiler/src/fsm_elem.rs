// fsm_elem.rs — FSM Element: state-register control
//
// An FSM element holds exactly one transaction and walks its states in
// order, spending one clock per state when that state's join passes.
// Values produced in a state are registered once at the state boundary
// and then persist: later states never re-trigger the producing logic,
// so no further shift registers are needed (the persistence ranges are
// fixed at instantiation time, before any consumer grows a chain).
//
// Element-internal backward-edge channels turn into loop transitions:
// a state containing a loop gate and a backedge write whose paired read
// lives in an earlier state branches back to that state while the gate
// holds, and falls through to the next state otherwise.
//
// Preconditions: states are instantiated in state order; imports are
//                declared (with persistence) before their consumers.
// Postconditions: every state record carries its acknowledge; control is
//                 a single case statement over the state register.
// Failure modes: persistence misuse surfaces as E0204 from the resource
//                layer.
// Side effects: allocates the state register in the RTL arena.

use std::fmt;

use crate::diag::Diagnostic;
use crate::element::ElementCore;
use crate::id::{NodeId, SignalId};
use crate::netlist::{Netlist, NodeKind};
use crate::resource::ValueResource;
use crate::rtl::{BoolExpr, RtlArena, RtlExpr, RtlStmt};
use crate::schedule::ScheduledNetlist;

/// One state: its clock index in the schedule and its nodes.
#[derive(Debug, Clone)]
pub struct FsmState {
    pub clock: i64,
    pub nodes: Vec<NodeId>,
}

/// One outgoing transition of a state.
#[derive(Debug, Clone)]
pub struct Transition {
    pub cond: BoolExpr,
    pub target: usize,
}

/// A finalized FSM element.
#[derive(Debug)]
pub struct FsmElement {
    pub core: ElementCore,
    pub states: Vec<FsmState>,
    /// None for a single-state FSM (no encoding needed).
    pub state_reg: Option<SignalId>,
    /// Per-state outgoing transitions, in priority order. The last entry
    /// is the unconditional fallthrough.
    pub transitions: Vec<Vec<Transition>>,
    /// Acknowledge condition per state (valid within its case arm).
    pub acks: Vec<BoolExpr>,
    /// The state machine: one case statement plus per-state loads.
    pub control: Vec<RtlStmt>,
}

impl FsmElement {
    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}

fn state_bits(n: usize) -> u32 {
    let mut bits = 1;
    while (1usize << bits) < n {
        bits += 1;
    }
    bits
}

/// Instantiate the states of an FSM element in order, fixing persistence
/// of every produced value before any later state consumes it: a value
/// produced in state S is registered once at the S -> S+1 boundary and
/// held untouched from state S+2 onward.
pub fn instantiate_states(
    core: &mut ElementCore,
    rtl: &mut RtlArena,
    netlist: &Netlist,
    sched: &ScheduledNetlist,
    states: &[FsmState],
) -> Result<(), Diagnostic> {
    let last_clock = states.last().map(|s| s.clock).unwrap_or(0);
    let order = netlist.topo_order();
    for state in states {
        let mut nodes = state.nodes.clone();
        // Topological order within the state.
        nodes.sort_by_key(|n| order.iter().position(|&o| o == *n));
        for &node in &nodes {
            core.instantiate_node(rtl, netlist, sched, node)?;
            for &out in &netlist.node(node).outputs {
                if let Some(res) = core.output_resource_mut(out) {
                    // One boundary register at clock+1, then held.
                    res.mark_persistent(res.origin_clock() + 2, last_clock)?;
                }
            }
        }
    }
    core.apply_gates(netlist, sched);
    Ok(())
}

/// Persistence for a value imported into an FSM: held stable from two
/// states past its arrival until the last state.
pub fn mark_import_persistent(
    resource: &mut ValueResource,
    states: &[FsmState],
    arrival_clock: i64,
) -> Result<(), Diagnostic> {
    if let Some(last) = states.last() {
        resource.mark_persistent(arrival_clock + 2, last.clock)?;
    }
    Ok(())
}

/// Build the state machine over an instantiated core.
pub fn finalize(
    mut core: ElementCore,
    rtl: &mut RtlArena,
    netlist: &Netlist,
    states: Vec<FsmState>,
) -> FsmElement {
    let n = states.len().max(1);
    let state_reg = (n > 1).then(|| {
        rtl.reg(format!("{}_state", core.name), state_bits(n), Some(0))
    });

    let transitions = detect_transitions(&core, netlist, &states);

    // Per-state acknowledge: the join of that state's record. State
    // residency is expressed by the enclosing case arm.
    let acks: Vec<BoolExpr> = states
        .iter()
        .map(|s| core.join_condition(netlist, s.clock))
        .collect();

    // Value-register links per state boundary: the register at clock c
    // loads when the state at clock c-1 acknowledges.
    let mut links: Vec<(i64, SignalId, SignalId)> = Vec::new();
    for (_, res) in core.output_resources() {
        links.extend(res.reg_links());
    }
    for (_, res) in core.import_resources_mut() {
        links.extend(res.reg_links());
    }
    links.sort_by_key(|&(clock, _, dst)| (clock, dst));

    let mut arms: Vec<(u64, Vec<RtlStmt>)> = Vec::new();
    let mut single_state_stmts = Vec::new();
    for (si, state) in states.iter().enumerate() {
        let ack = acks[si].clone();
        core.record_mut(state.clock).ack = Some(ack.clone());
        let mut stmts = std::mem::take(&mut core.record_mut(state.clock).stmts);
        // Boundary loads leaving this state.
        for &(_, src, dst) in links.iter().filter(|l| l.0 == state.clock + 1) {
            stmts.push(RtlStmt::RegLoad {
                dst,
                src: RtlExpr::Sig(src),
                enable: ack.clone(),
            });
        }
        // Backedge loads commit with the state's acknowledge.
        let loads = std::mem::take(&mut core.record_mut(state.clock).loads);
        for (dst, src) in loads {
            stmts.push(RtlStmt::RegLoad {
                dst,
                src,
                enable: ack.clone(),
            });
        }
        // State advance.
        if let Some(reg) = state_reg {
            let mut taken = BoolExpr::False;
            for t in &transitions[si] {
                let guard = ack.clone().and(t.cond.clone()).and(taken.clone().negate());
                stmts.push(RtlStmt::RegLoad {
                    dst: reg,
                    src: RtlExpr::Const {
                        value: t.target as u64,
                        width: state_bits(n),
                    },
                    enable: guard,
                });
                taken = taken.or(t.cond.clone());
            }
            arms.push((si as u64, stmts));
        } else {
            single_state_stmts = stmts;
        }
    }

    // Handshake drives, gated by state residency (for the multi-state
    // case the drive condition carries the residency since the assigns
    // sit inside the case arm; enable stays on for documentation of the
    // single-state case).
    for state in &states {
        core.emit_handshake(netlist, state.clock, BoolExpr::True);
    }
    // Move freshly emitted handshake stmts into the case arms.
    if state_reg.is_some() {
        for (si, state) in states.iter().enumerate() {
            let extra = std::mem::take(&mut core.record_mut(state.clock).stmts);
            arms[si].1.extend(extra);
        }
    } else if let Some(state) = states.first() {
        let extra = std::mem::take(&mut core.record_mut(state.clock).stmts);
        single_state_stmts.extend(extra);
    }

    let control = if let Some(reg) = state_reg {
        vec![RtlStmt::Case {
            sel: reg,
            arms,
            default: Vec::new(),
        }]
    } else {
        single_state_stmts
    };

    FsmElement {
        core,
        states,
        state_reg,
        transitions,
        acks,
        control,
    }
}

/// Transition table: round-robin by default; a state holding a loop gate
/// and a backedge write pointing at an earlier state's read loops back
/// while the gate holds.
fn detect_transitions(
    core: &ElementCore,
    netlist: &Netlist,
    states: &[FsmState],
) -> Vec<Vec<Transition>> {
    let n = states.len().max(1);
    let state_of = |node: NodeId| states.iter().position(|s| s.nodes.contains(&node));
    states
        .iter()
        .enumerate()
        .map(|(si, state)| {
            let fallthrough = Transition {
                cond: BoolExpr::True,
                target: (si + 1) % n,
            };
            let gate = state.nodes.iter().find_map(|&node| {
                matches!(netlist.node(node).kind, NodeKind::LoopGate)
                    .then(|| core.gate_signal(node))
                    .flatten()
            });
            let loop_head = state.nodes.iter().find_map(|&node| {
                match netlist.node(node).kind {
                    NodeKind::BackedgeWrite { paired_read, .. } => state_of(paired_read),
                    _ => None,
                }
            });
            match (gate, loop_head) {
                (Some(g), Some(head)) if head <= si => vec![
                    Transition {
                        cond: BoolExpr::Sig(g),
                        target: head,
                    },
                    fallthrough,
                ],
                _ => vec![fallthrough],
            }
        })
        .collect()
}

impl fmt::Display for FsmElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "fsm '{}' ({} states{})",
            self.core.name,
            self.state_count(),
            match self.state_reg {
                Some(r) => format!(", state reg s{}", r.0),
                None => String::new(),
            }
        )?;
        for (si, trans) in self.transitions.iter().enumerate() {
            for t in trans {
                writeln!(f, "  {} -> {} when {}", si, t.target, t.cond)?;
            }
        }
        write!(f, "{}", self.core)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
