// export.rs — JSON exports of compilation artifacts
//
// Serializes the schedule and the architecture summary for downstream
// tooling (`--emit schedule`, `--emit arch`). Exports are deliberately
// flat summaries keyed by stable names, not dumps of internal arenas:
// the JSON shape is a compatibility surface, the arenas are not.
//
// Preconditions: the artifacts being exported were produced without
//                error-level diagnostics.
// Postconditions: output is deterministic for a given input (fixed
//                 iteration order, no map types with hash ordering).
// Failure modes: none (serialization of these shapes cannot fail).
// Side effects: none.

use serde::Serialize;

use crate::connect::{ArchElement, Architecture};
use crate::netlist::Netlist;
use crate::schedule::ScheduledNetlist;

// ── Schedule export ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ScheduleExport<'a> {
    clock_period: f64,
    nodes: Vec<NodeScheduleExport<'a>>,
}

#[derive(Debug, Serialize)]
struct NodeScheduleExport<'a> {
    name: &'a str,
    operator: String,
    start: f64,
    clock: i64,
}

/// Render the schedule as a JSON document, one entry per node in id order.
pub fn export_schedule(netlist: &Netlist, sched: &ScheduledNetlist) -> String {
    let nodes = netlist
        .node_ids()
        .map(|id| {
            let node = netlist.node(id);
            NodeScheduleExport {
                name: &node.name,
                operator: node.kind.label(),
                start: sched.times(id).start,
                clock: sched.start_clock(id),
            }
        })
        .collect();
    let doc = ScheduleExport {
        clock_period: sched.clock.period(),
        nodes,
    };
    to_pretty(&doc)
}

// ── Architecture export ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ArchitectureExport<'a> {
    elements: Vec<ElementExport<'a>>,
    channels: Vec<ChannelExport<'a>>,
    register_count: usize,
}

#[derive(Debug, Serialize)]
struct ElementExport<'a> {
    name: &'a str,
    kind: &'static str,
    /// Pipeline stages or FSM states.
    phases: usize,
}

#[derive(Debug, Serialize)]
struct ChannelExport<'a> {
    name: &'a str,
    src: &'a str,
    dst: &'a str,
    clock: i64,
}

/// Render the architecture summary as a JSON document.
pub fn export_architecture(arch: &Architecture) -> String {
    let elements = arch
        .elements
        .iter()
        .map(|e| match e {
            ArchElement::Pipeline(p) => ElementExport {
                name: &p.core.name,
                kind: "pipeline",
                phases: p.stage_count(),
            },
            ArchElement::Fsm(f) => ElementExport {
                name: &f.core.name,
                kind: "fsm",
                phases: f.states.len(),
            },
        })
        .collect();
    let channels = arch
        .channels
        .iter()
        .map(|c| ChannelExport {
            name: &c.name,
            src: arch.element(c.src).name(),
            dst: arch.element(c.dst).name(),
            clock: c.clock,
        })
        .collect();
    let doc = ArchitectureExport {
        elements,
        channels,
        register_count: arch.reg_count(),
    };
    to_pretty(&doc)
}

fn to_pretty<T: Serialize>(doc: &T) -> String {
    let mut out = serde_json::to_string_pretty(doc).unwrap_or_else(|_| "{}".to_string());
    out.push('\n');
    out
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockModel;
    use crate::connect;
    use crate::discover::{self, DiscoverOptions};
    use crate::netlist::{InterfaceKind, NodeKind, OpKind};
    use crate::schedule::{self, ScheduleOptions};

    fn compiled() -> (Netlist, ScheduledNetlist, Architecture) {
        let mut n = Netlist::new();
        let din = n.add_interface("din", InterfaceKind::Handshake, 1);
        let dout = n.add_interface("dout", InterfaceKind::Handshake, 1);
        let rd = n.add_node("rd", NodeKind::Read(din), &[], &[32], 0.5, 0.0);
        let inc = n.add_node("inc", NodeKind::Op(OpKind::Add), &[32, 32], &[32], 1.0, 0.0);
        let one = n.add_node("one", NodeKind::Const(1), &[], &[32], 0.0, 0.0);
        let wr = n.add_node("wr", NodeKind::Write(dout), &[32], &[], 0.5, 0.0);
        n.connect(n.output(rd, 0), n.input(inc, 0));
        n.connect(n.output(one, 0), n.input(inc, 1));
        n.connect(n.output(inc, 0), n.input(wr, 0));
        let sched = schedule::schedule(&n, ClockModel::new(10.0), &ScheduleOptions::default())
            .schedule
            .expect("schedule");
        let plan = discover::discover(&n, &sched, &DiscoverOptions::default()).plan;
        let arch = connect::connect(&n, &sched, &plan)
            .architecture
            .expect("architecture");
        (n, sched, arch)
    }

    #[test]
    fn schedule_export_lists_every_node() {
        let (n, sched, _) = compiled();
        let json = export_schedule(&n, &sched);
        let doc: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(doc["clock_period"], 10.0);
        assert_eq!(doc["nodes"].as_array().map(|a| a.len()), Some(4));
        assert_eq!(doc["nodes"][0]["name"], "rd");
        assert_eq!(doc["nodes"][0]["clock"], 0);
    }

    #[test]
    fn architecture_export_summarizes_elements() {
        let (_, _, arch) = compiled();
        let json = export_architecture(&arch);
        let doc: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        let elements = doc["elements"].as_array().expect("elements");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0]["kind"], "pipeline");
        assert!(doc["channels"].as_array().expect("channels").is_empty());
    }

    #[test]
    fn exports_are_deterministic() {
        let (n, sched, arch) = compiled();
        assert_eq!(export_schedule(&n, &sched), export_schedule(&n, &sched));
        assert_eq!(export_architecture(&arch), export_architecture(&arch));
    }
}
