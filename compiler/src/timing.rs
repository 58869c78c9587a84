// timing.rs — Mermaid Gantt timing chart output for nac schedules
//
// Transforms a Netlist + ScheduledNetlist into a Mermaid Gantt chart
// showing node start times and combinational spans per clock cycle.
//
// Preconditions: `sched` is a computed schedule for `netlist`.
// Postconditions: returns a valid Mermaid Gantt chart string.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::netlist::{Netlist, NodeKind};
use crate::schedule::ScheduledNetlist;

/// Emit the schedule as a Mermaid Gantt chart string.
///
/// Times are rendered in picoseconds (`dateFormat x` needs integers; the
/// schedule is in nanoseconds). One section per clock cycle; sync
/// barriers are zero-duration ordering points and are omitted.
pub fn emit_timing_chart(netlist: &Netlist, sched: &ScheduledNetlist) -> String {
    let mut buf = String::new();
    writeln!(buf, "gantt").unwrap();
    writeln!(buf, "    title nac Schedule Timing").unwrap();
    writeln!(buf, "    dateFormat x").unwrap();
    writeln!(buf, "    axisFormat %Q").unwrap();

    // Sort by (clock, start time, id) for deterministic output
    let mut nodes: Vec<_> = netlist.node_ids().collect();
    nodes.sort_by(|&a, &b| {
        let ka = (sched.start_clock(a), sched.times(a).start);
        let kb = (sched.start_clock(b), sched.times(b).start);
        ka.partial_cmp(&kb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut current_clock = None;
    let mut task_index = 0usize;
    for id in nodes {
        let node = netlist.node(id);
        if matches!(node.kind, NodeKind::Sync) {
            continue;
        }
        let clock = sched.start_clock(id);
        if current_clock != Some(clock) {
            writeln!(buf).unwrap();
            writeln!(buf, "    section cycle {clock}").unwrap();
            current_clock = Some(clock);
        }
        let start = to_ps(sched.times(id).start);
        let end = start + to_ps(node.pre_latency);
        let label = format!("{} [{}]", sanitize(&node.name), node.kind.label());
        writeln!(buf, "    {} :t_{}, {}, {}", label, task_index, start, end).unwrap();
        task_index += 1;
    }

    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn to_ps(ns: f64) -> u64 {
    (ns * 1000.0).round().max(0.0) as u64
}

/// Sanitize a name to Mermaid-safe label characters. `:` is the Mermaid
/// task/metadata separator and must never appear in a label.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────────────
