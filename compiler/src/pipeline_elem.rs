// pipeline_elem.rs — Pipeline Element: stage-validity control
//
// A pipeline element accepts a new transaction whenever its first stage's
// join passes, and carries it forward one stage per clock. Each stage
// past the first has a validity register; a stage's acknowledge is its
// join AND its validity AND the next stage's readiness. Value registers
// between stages load on the acknowledge of the stage they leave.
//
// Preconditions: all owned nodes are instantiated and all cross-element
//                chains are grown before `finalize` (register loads are
//                derived from the final chains).
// Postconditions: every active record carries its acknowledge; control
//                 statements cover every validity and value register.
// Failure modes: none (control synthesis is total).
// Side effects: allocates validity registers in the RTL arena.

use std::collections::BTreeMap;
use std::fmt;

use crate::element::ElementCore;
use crate::netlist::Netlist;
use crate::rtl::{BoolExpr, RtlArena, RtlExpr, RtlStmt};

/// A finalized pipeline element.
#[derive(Debug)]
pub struct PipelineElement {
    pub core: ElementCore,
    /// Validity register per stage; stage 0 has none (always accepting).
    pub stage_valid: Vec<Option<crate::id::SignalId>>,
    /// Acknowledge condition per stage.
    pub acks: Vec<BoolExpr>,
    /// Control statements: validity shifts and value-register loads.
    pub control: Vec<RtlStmt>,
}

impl PipelineElement {
    pub fn stage_count(&self) -> usize {
        self.stage_valid.len()
    }
}

/// Build the control layer over an instantiated core. The stage range
/// covers every active record and every value-register link, so chains
/// grown for cross-element departures get their loads too.
pub fn finalize(mut core: ElementCore, rtl: &mut RtlArena, netlist: &Netlist) -> PipelineElement {
    let mut last = core.active_clocks().into_iter().max().unwrap_or(0);
    for (_, res) in core.output_resources() {
        if let Some((clock, _, _)) = res.reg_links().last() {
            last = last.max(*clock);
        }
    }
    let mut import_links = Vec::new();
    for (_, res) in core.import_resources_mut() {
        for link in res.reg_links() {
            last = last.max(link.0);
            import_links.push(link);
        }
    }
    let stages = (last + 1) as usize;

    // Validity registers for stages past the first, cleared at reset.
    let mut stage_valid: Vec<Option<crate::id::SignalId>> = vec![None; stages];
    for (i, slot) in stage_valid.iter_mut().enumerate().skip(1) {
        *slot = Some(rtl.reg(format!("{}_v{}", core.name, i), 1, Some(0)));
    }

    // Acknowledges back to front: a stage fires when its join passes, it
    // holds a transaction, and the next stage can take it.
    let joins: BTreeMap<i64, BoolExpr> = (0..stages as i64)
        .map(|c| (c, core.join_condition(netlist, c)))
        .collect();
    let mut acks: Vec<BoolExpr> = vec![BoolExpr::True; stages];
    for i in (0..stages).rev() {
        let active = match stage_valid[i] {
            Some(v) => BoolExpr::Sig(v),
            None => BoolExpr::True,
        };
        let next_ok = if i + 1 < stages {
            match stage_valid[i + 1] {
                Some(v) => BoolExpr::Sig(v).negate().or(acks[i + 1].clone()),
                None => BoolExpr::True,
            }
        } else {
            BoolExpr::True
        };
        acks[i] = joins[&(i as i64)].clone().and(active).and(next_ok);
    }

    let mut control = Vec::new();
    // Validity shift: stage i+1 holds a transaction next cycle iff stage
    // i fired this cycle.
    for i in 1..stages {
        if let Some(v) = stage_valid[i] {
            control.push(RtlStmt::RegLoad {
                dst: v,
                src: RtlExpr::Bool(acks[i - 1].clone()),
                enable: BoolExpr::True,
            });
        }
    }
    // Value registers load when the stage producing their input fires.
    let mut value_links = import_links;
    for (_, res) in core.output_resources() {
        value_links.extend(res.reg_links());
    }
    value_links.sort_by_key(|&(clock, _, dst)| (clock, dst));
    for (clock, src, dst) in value_links {
        let stage = (clock - 1).max(0) as usize;
        control.push(RtlStmt::RegLoad {
            dst,
            src: RtlExpr::Sig(src),
            enable: acks[stage].clone(),
        });
    }
    // Backedge and other record-level loads commit on their own ack.
    for clock in core.active_clocks() {
        let ack = acks[clock as usize].clone();
        let loads = std::mem::take(&mut core.record_mut(clock).loads);
        for (dst, src) in loads {
            control.push(RtlStmt::RegLoad {
                dst,
                src,
                enable: ack.clone(),
            });
        }
    }
    // Seal records: acknowledge plus handshake drives gated by validity.
    for clock in core.active_clocks() {
        let i = clock as usize;
        let enable = match stage_valid[i] {
            Some(v) => BoolExpr::Sig(v),
            None => BoolExpr::True,
        };
        core.record_mut(clock).ack = Some(acks[i].clone());
        core.emit_handshake(netlist, clock, enable);
    }

    PipelineElement {
        core,
        stage_valid,
        acks,
        control,
    }
}

impl fmt::Display for PipelineElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "pipeline '{}' ({} stages, {} control stmts)",
            self.core.name,
            self.stage_count(),
            self.control.len()
        )?;
        write!(f, "{}", self.core)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
