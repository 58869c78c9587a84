// connect.rs — Cross-element analysis and architecture assembly
//
// Orchestrates the architecture build on top of a discovery plan:
//
//   1. group element-crossing value uses by port synonym (full-width part
//      references alias their source output),
//   2. route every group, deciding which endpoint carries the value
//      across clock cycles (or inserting a buffering pipeline element
//      when neither can),
//   3. declare imports in every consuming element (forward declarations),
//   4. instantiate all elements,
//   5. wire the channels, growing register chains to departure clocks
//      and batching all values of one (clock, src, dst) crossing into a
//      single handshake channel,
//   6. finalize element control.
//
// The two-phase declare/connect split means instantiation order between
// elements never matters: by the time any consumer resolves an input, its
// import wire exists.
//
// Preconditions: the plan covers every node; the schedule is verified.
// Postconditions: every cross edge has a channel path; ownership stays a
//                 partition (buffers own no nodes).
// Failure modes: synonym ports resolving to different RTL objects
//                (E0203); internal wiring inconsistencies surface as
//                E0202 from the element layer.
// Side effects: owns and populates the RTL arena of the result.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::discover::{ArchPlan, ElementKindPlan};
use crate::element::ElementCore;
use crate::fsm_elem::{self, FsmElement, FsmState};
use crate::id::{ElementId, ElementIdAllocator, NodeId, PortId, SignalId};
use crate::netlist::{Netlist, NodeKind};
use crate::pipeline_elem::{self, PipelineElement};
use crate::rtl::{RtlArena, RtlExpr, RtlStmt};
use crate::schedule::ScheduledNetlist;

// ── Public types ────────────────────────────────────────────────────────────

/// A finalized architecture element.
#[derive(Debug)]
pub enum ArchElement {
    Pipeline(PipelineElement),
    Fsm(FsmElement),
}

impl ArchElement {
    pub fn core(&self) -> &ElementCore {
        match self {
            ArchElement::Pipeline(p) => &p.core,
            ArchElement::Fsm(f) => &f.core,
        }
    }

    pub fn name(&self) -> &str {
        &self.core().name
    }
}

/// One value delivered by a channel: the crossing output port and the
/// import wire receiving it at the destination.
#[derive(Debug, Clone)]
pub struct ChannelSlot {
    pub port: PortId,
    pub wire: SignalId,
}

/// One inter-element handshake channel. Every value crossing from `src`
/// to `dst` at `clock` rides the same channel and shares its
/// valid/ready pair; the payloads are the slots.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub src: ElementId,
    pub dst: ElementId,
    pub clock: i64,
    pub vld: SignalId,
    pub rdy: SignalId,
    pub slots: Vec<ChannelSlot>,
}

/// The clock-synchronous circuit description.
#[derive(Debug)]
pub struct Architecture {
    pub rtl: RtlArena,
    pub elements: Vec<ArchElement>,
    pub channels: Vec<Channel>,
    /// Top-level channel assignments (element output to import wire).
    pub wiring: Vec<RtlStmt>,
}

impl Architecture {
    pub fn element(&self, id: ElementId) -> &ArchElement {
        &self.elements[id.index()]
    }

    pub fn reg_count(&self) -> usize {
        self.rtl.reg_count()
    }
}

#[derive(Debug)]
pub struct ConnectResult {
    pub architecture: Option<Architecture>,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Verification ────────────────────────────────────────────────────────────

/// Machine-checkable evidence for architecture postconditions (A1-A3).
#[derive(Debug, Clone)]
pub struct ArchCert {
    /// A1: node ownership is a total partition.
    pub a1_ownership_total: bool,
    /// A2: every cross-element value group lands in a channel slot at
    /// its consumer.
    pub a2_channels_cover: bool,
    /// A3: every channel slot wire is driven exactly once.
    pub a3_imports_driven_once: bool,
}

impl crate::pass::StageCert for ArchCert {
    fn all_pass(&self) -> bool {
        self.a1_ownership_total && self.a2_channels_cover && self.a3_imports_driven_once
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("A1_ownership_total", self.a1_ownership_total),
            ("A2_channels_cover", self.a2_channels_cover),
            ("A3_imports_driven_once", self.a3_imports_driven_once),
        ]
    }
}

pub fn verify_architecture(
    netlist: &Netlist,
    sched: &ScheduledNetlist,
    plan: &ArchPlan,
    arch: &Architecture,
) -> ArchCert {
    let a1 = plan.node_owner.iter().all(|o| o.is_some());
    let aliases = PortAliases::build(netlist);
    let mut a2 = true;
    for ((dst, _), group) in cross_uses(netlist, sched, plan, &aliases) {
        let covered = arch.channels.iter().any(|c| {
            c.dst == dst && c.slots.iter().any(|s| group.ports.contains(&s.port))
        });
        if !covered {
            a2 = false;
        }
    }
    let mut driven: BTreeMap<SignalId, u32> = BTreeMap::new();
    for stmt in &arch.wiring {
        if let RtlStmt::Assign { dst, .. } = stmt {
            *driven.entry(*dst).or_insert(0) += 1;
        }
    }
    let a3 = driven.values().all(|&n| n == 1)
        && arch
            .channels
            .iter()
            .all(|c| c.slots.iter().all(|s| driven.contains_key(&s.wire)));
    ArchCert {
        a1_ownership_total: a1,
        a2_channels_cover: a2,
        a3_imports_driven_once: a3,
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Assemble the architecture from a discovery plan.
pub fn connect(netlist: &Netlist, sched: &ScheduledNetlist, plan: &ArchPlan) -> ConnectResult {
    let mut ctx = ConnectCtx::new(netlist, sched, plan);
    if let Err(diag) = ctx.run() {
        ctx.diagnostics.push(diag);
    }
    let ok = !crate::diag::has_errors(&ctx.diagnostics);
    let diagnostics = std::mem::take(&mut ctx.diagnostics);
    ConnectResult {
        architecture: ok.then(|| ctx.into_architecture()),
        diagnostics,
    }
}

// ── Port synonyms ───────────────────────────────────────────────────────────

/// Union-find over output ports. A full-width part reference exposes the
/// same value as its source output, so the two ports are synonyms and
/// share one channel slot; partial fragments are real slices and stay
/// separate values.
struct PortAliases {
    parent: Vec<u32>,
}

impl PortAliases {
    fn build(netlist: &Netlist) -> Self {
        let mut aliases = PortAliases {
            parent: (0..netlist.port_count() as u32).collect(),
        };
        for node in netlist.node_ids() {
            if let NodeKind::PartRef { of, lsb, width } = &netlist.node(node).kind {
                let base = netlist.output(*of, 0);
                if *lsb == 0 && *width == netlist.port(base).width {
                    aliases.union(netlist.output(node, 0), base);
                }
            }
        }
        aliases
    }

    fn root(&self, p: PortId) -> PortId {
        let mut i = p.0;
        while self.parent[i as usize] != i {
            i = self.parent[i as usize];
        }
        PortId(i)
    }

    fn union(&mut self, a: PortId, b: PortId) {
        let (ra, rb) = (self.root(a), self.root(b));
        if ra != rb {
            // Lower root wins for determinism.
            let (lo, hi) = if ra.0 < rb.0 { (ra, rb) } else { (rb, ra) };
            self.parent[hi.0 as usize] = lo.0;
        }
    }
}

/// Every synonym port with a source-side resource must stand for the
/// same RTL object; returns the port to tap the chain through. The
/// earliest-origin member wins so the tap covers the whole group's
/// clock range.
fn synonym_tap(core: &ElementCore, ports: &[PortId]) -> Result<PortId, Diagnostic> {
    let mut tap: Option<(PortId, SignalId, i64)> = None;
    for &p in ports {
        if let Some(res) = core.output_resource(p) {
            match tap {
                None => tap = Some((p, res.origin_signal(), res.origin_clock())),
                Some((_, sig, clock)) if sig == res.origin_signal() => {
                    if res.origin_clock() < clock {
                        tap = Some((p, sig, res.origin_clock()));
                    }
                }
                Some(_) => {
                    return Err(Diagnostic::error(
                        codes::E0203,
                        format!(
                            "synonym ports of element '{}' resolved to different RTL objects",
                            core.name
                        ),
                    ))
                }
            }
        }
    }
    tap.map(|(p, _, _)| p).ok_or_else(|| {
        Diagnostic::error(
            codes::E0202,
            format!(
                "source element '{}' has no resource for the crossing value",
                core.name
            ),
        )
    })
}

// ── Cross-use analysis ──────────────────────────────────────────────────────

/// One synonym-grouped cross-element use: the producing element, clock
/// bounds, and every port of the group the consumer references.
#[derive(Debug, Clone)]
struct CrossUse {
    src: ElementId,
    prod: i64,
    min_use: i64,
    ports: Vec<PortId>,
}

/// All element-crossing value uses, grouped by (consuming element,
/// synonym root of the source output port).
fn cross_uses(
    netlist: &Netlist,
    sched: &ScheduledNetlist,
    plan: &ArchPlan,
    aliases: &PortAliases,
) -> BTreeMap<(ElementId, PortId), CrossUse> {
    let mut groups: BTreeMap<(ElementId, PortId), CrossUse> = BTreeMap::new();
    let mut record = |src_port: PortId, dst_node: NodeId, use_clock: i64| {
        let src_node = netlist.port(src_port).node;
        let (Some(a), Some(b)) = (plan.owner_of(src_node), plan.owner_of(dst_node)) else {
            return;
        };
        if a == b {
            return;
        }
        let prod = sched.out_clock(netlist, src_port);
        let entry = groups
            .entry((b, aliases.root(src_port)))
            .or_insert(CrossUse {
                src: a,
                prod,
                min_use: use_clock,
                ports: Vec::new(),
            });
        entry.prod = entry.prod.min(prod);
        entry.min_use = entry.min_use.min(use_clock);
        if !entry.ports.contains(&src_port) {
            entry.ports.push(src_port);
        }
    };
    for node in netlist.node_ids() {
        for &input in &netlist.node(node).inputs {
            if let Some(driver) = netlist.port(input).driver {
                record(driver, node, sched.in_clock(netlist, input));
            }
        }
        if let NodeKind::PartRef { of, .. } = &netlist.node(node).kind {
            record(netlist.output(*of, 0), node, sched.start_clock(node));
        }
    }
    groups
}

// ── Internal context ────────────────────────────────────────────────────────

/// One resolved cross-element path: depart the source at `depart`,
/// traverse zero or more buffer elements, arrive at the consumer.
#[derive(Debug)]
struct Route {
    src: ElementId,
    /// Synonym ports delivered together; all stand for one RTL object.
    ports: Vec<PortId>,
    /// (element, arrival clock, departure clock) per carrier after the
    /// source, ending with the consumer (whose departure is unused).
    hops: Vec<(ElementId, i64, i64)>,
    /// Clock at which the value leaves the source element.
    depart: i64,
}

enum Role {
    Planned(usize),
    Buffer,
}

struct ConnectCtx<'a> {
    netlist: &'a Netlist,
    sched: &'a ScheduledNetlist,
    plan: &'a ArchPlan,
    rtl: RtlArena,
    cores: BTreeMap<ElementId, ElementCore>,
    roles: BTreeMap<ElementId, Role>,
    routes: Vec<Route>,
    channels: Vec<Channel>,
    wiring: Vec<RtlStmt>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ConnectCtx<'a> {
    fn new(netlist: &'a Netlist, sched: &'a ScheduledNetlist, plan: &'a ArchPlan) -> Self {
        let mut cores = BTreeMap::new();
        let mut roles = BTreeMap::new();
        for (i, elem) in plan.elements.iter().enumerate() {
            cores.insert(elem.id, ElementCore::new(elem.id, elem.name.clone()));
            roles.insert(elem.id, Role::Planned(i));
        }
        ConnectCtx {
            netlist,
            sched,
            plan,
            rtl: RtlArena::new(),
            cores,
            roles,
            routes: Vec::new(),
            channels: Vec::new(),
            wiring: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<(), Diagnostic> {
        self.plan_routes();
        self.declare_imports()?;
        self.instantiate_elements()?;
        self.wire_channels()?;
        Ok(())
    }

    /// Can this element carry a value from `prod` to `use_clock`?
    /// Pipelines always can (their stage range extends); an FSM can as
    /// long as the target clock does not outlive its last state (one
    /// boundary register plus persistence covers the rest).
    fn carries(&self, elem: ElementId, use_clock: i64) -> bool {
        match &self.roles[&elem] {
            Role::Buffer => true,
            Role::Planned(i) => match &self.plan.elements[*i].kind {
                ElementKindPlan::Pipeline { .. } => true,
                ElementKindPlan::Fsm { states } => states
                    .last()
                    .is_some_and(|s| use_clock <= s.clock),
            },
        }
    }

    /// Can this element latch a value arriving at `clock`? A pipeline
    /// always has the stage; an FSM needs a state resident in that cycle.
    fn can_receive_at(&self, elem: ElementId, clock: i64) -> bool {
        match &self.roles[&elem] {
            Role::Buffer => true,
            Role::Planned(i) => match &self.plan.elements[*i].kind {
                ElementKindPlan::Pipeline { .. } => true,
                ElementKindPlan::Fsm { states } => states.iter().any(|s| s.clock == clock),
            },
        }
    }

    /// Record clock an element synchronizes a channel transfer on: FSMs
    /// use the state resident at (or last before) the transfer clock.
    fn endpoint_clock(&self, elem: ElementId, clock: i64) -> i64 {
        match &self.roles[&elem] {
            Role::Buffer => clock,
            Role::Planned(i) => match &self.plan.elements[*i].kind {
                ElementKindPlan::Pipeline { .. } => clock,
                ElementKindPlan::Fsm { states } => states
                    .iter()
                    .filter(|s| s.clock <= clock)
                    .map(|s| s.clock)
                    .last()
                    .unwrap_or(clock),
            },
        }
    }

    fn plan_routes(&mut self) {
        let aliases = PortAliases::build(self.netlist);
        let groups = cross_uses(self.netlist, self.sched, self.plan, &aliases);
        let mut alloc = ElementIdAllocator::starting_at(self.plan.elements.len());
        let mut buffers: BTreeMap<(PortId, i64, i64), ElementId> = BTreeMap::new();
        for ((dst, root), group) in groups {
            let CrossUse {
                src,
                prod,
                min_use,
                ports,
            } = group;
            let route = if self.carries(src, min_use) {
                Route {
                    src,
                    ports,
                    hops: vec![(dst, min_use, min_use)],
                    depart: min_use,
                }
            } else if self.can_receive_at(dst, prod) {
                Route {
                    src,
                    ports,
                    hops: vec![(dst, prod, prod)],
                    depart: prod,
                }
            } else {
                // Neither endpoint aligns: insert a buffering pipeline
                // element that takes the value at production and holds it
                // until the consumer's cycle.
                let key = (root, prod, min_use);
                let buf = if let Some(&b) = buffers.get(&key) {
                    b
                } else {
                    let id = alloc.alloc();
                    self.cores
                        .insert(id, ElementCore::new(id, format!("buf{}", id.0)));
                    self.roles.insert(id, Role::Buffer);
                    let value = &self.netlist.node(self.netlist.port(root).node).name;
                    self.diagnostics.push(
                        Diagnostic::new(
                            DiagLevel::Warning,
                            format!(
                                "no clock alignment between '{}' and '{}' for value '{}'; \
                                 inserted buffering element buf{}",
                                self.element_name(src),
                                self.element_name(dst),
                                value,
                                id.0
                            ),
                        )
                        .with_code(codes::W0400),
                    );
                    buffers.insert(key, id);
                    id
                };
                Route {
                    src,
                    ports,
                    hops: vec![(buf, prod, min_use), (dst, min_use, min_use)],
                    depart: prod,
                }
            };
            self.routes.push(route);
        }
    }

    fn fsm_states(&self, plan_idx: usize) -> Vec<FsmState> {
        match &self.plan.elements[plan_idx].kind {
            ElementKindPlan::Fsm { states } => states
                .iter()
                .map(|s| FsmState {
                    clock: s.clock,
                    nodes: s.nodes.clone(),
                })
                .collect(),
            ElementKindPlan::Pipeline { .. } => Vec::new(),
        }
    }

    fn declare_imports(&mut self) -> Result<(), Diagnostic> {
        for ri in 0..self.routes.len() {
            let (ports, hops) = {
                let r = &self.routes[ri];
                (r.ports.clone(), r.hops.clone())
            };
            for (elem, arrival, _) in hops {
                let states = match &self.roles[&elem] {
                    Role::Planned(i) => self.fsm_states(*i),
                    Role::Buffer => Vec::new(),
                };
                for &port in &ports {
                    let width = self.netlist.port(port).width;
                    let src_name =
                        self.netlist.node(self.netlist.port(port).node).name.clone();
                    let core = self.cores.get_mut(&elem).ok_or_else(|| {
                        Diagnostic::error(codes::E0202, format!("no element core for e{}", elem.0))
                    })?;
                    core.declare_import(&mut self.rtl, port, width, arrival, &src_name);
                    if !states.is_empty() {
                        if let Some(res) = core.import_resource_mut(port) {
                            fsm_elem::mark_import_persistent(res, &states, arrival)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn instantiate_elements(&mut self) -> Result<(), Diagnostic> {
        let order = self.netlist.topo_order();
        for (i, elem) in self.plan.elements.iter().enumerate() {
            let states = self.fsm_states(i);
            let core = self
                .cores
                .get_mut(&elem.id)
                .ok_or_else(|| {
                    Diagnostic::error(codes::E0202, format!("no core for element e{}", elem.id.0))
                })?;
            match &elem.kind {
                ElementKindPlan::Pipeline { stages } => {
                    for stage in stages {
                        let mut nodes = stage.clone();
                        nodes.sort_by_key(|n| order.iter().position(|&o| o == *n));
                        for node in nodes {
                            core.instantiate_node(&mut self.rtl, self.netlist, self.sched, node)?;
                        }
                    }
                    core.apply_gates(self.netlist, self.sched);
                }
                ElementKindPlan::Fsm { .. } => {
                    fsm_elem::instantiate_states(
                        core,
                        &mut self.rtl,
                        self.netlist,
                        self.sched,
                        &states,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn wire_channels(&mut self) -> Result<(), Diagnostic> {
        // Slot payloads batched per (arrival clock, carrier, receiver).
        let mut batches: BTreeMap<(i64, ElementId, ElementId), Vec<ChannelSlot>> = BTreeMap::new();
        // Shared buffers may sit on several routes; wire each import once.
        let mut wired: BTreeSet<(ElementId, PortId)> = BTreeSet::new();
        for ri in 0..self.routes.len() {
            let (src, ports, depart, hops) = {
                let r = &self.routes[ri];
                (r.src, r.ports.clone(), r.depart, r.hops.clone())
            };
            // Tap the source chain at the departure clock.
            let mut carrier = src;
            let mut sig = {
                let core = self.cores.get_mut(&src).ok_or_else(|| {
                    Diagnostic::error(codes::E0202, format!("no core for element e{}", src.0))
                })?;
                let tap = synonym_tap(core, &ports)?;
                let res = core.output_resource_mut(tap).ok_or_else(|| {
                    Diagnostic::error(
                        codes::E0202,
                        format!("source element has no resource for port {}", tap.0),
                    )
                })?;
                res.get(&mut self.rtl, depart)?
            };
            for (elem, arrival, departure) in hops {
                let core = self.cores.get_mut(&elem).ok_or_else(|| {
                    Diagnostic::error(codes::E0202, format!("no core for element e{}", elem.0))
                })?;
                for &port in &ports {
                    if !wired.insert((elem, port)) {
                        continue;
                    }
                    let wire = core.import_signal(port).ok_or_else(|| {
                        Diagnostic::error(
                            codes::E0202,
                            format!("element '{}' missing import for port {}", core.name, port.0),
                        )
                    })?;
                    self.wiring.push(RtlStmt::Assign {
                        dst: wire,
                        src: RtlExpr::Sig(sig),
                    });
                    batches
                        .entry((arrival, carrier, elem))
                        .or_default()
                        .push(ChannelSlot { port, wire });
                }
                // Intermediate carriers re-export at their departure clock.
                let core = self.cores.get_mut(&elem).ok_or_else(|| {
                    Diagnostic::error(codes::E0202, format!("no core for element e{}", elem.0))
                })?;
                if let Some(res) = core.import_resource_mut(ports[0]) {
                    sig = res.get(&mut self.rtl, departure)?;
                }
                carrier = elem;
            }
        }
        // One handshake channel per batch, with a deterministic name.
        for ((clock, src, dst), slots) in batches {
            let name = format!(
                "ch_{}_to_{}_c{}",
                self.element_name(src),
                self.element_name(dst),
                clock
            );
            let vld = self.rtl.wire(format!("{name}_vld"), 1);
            let rdy = self.rtl.wire(format!("{name}_rdy"), 1);
            let src_clock = self.endpoint_clock(src, clock);
            if let Some(core) = self.cores.get_mut(&src) {
                core.record_mut(src_clock).chan_outs.push((vld, rdy));
            }
            let dst_clock = self.endpoint_clock(dst, clock);
            if let Some(core) = self.cores.get_mut(&dst) {
                core.record_mut(dst_clock).chan_ins.push((vld, rdy));
            }
            self.channels.push(Channel {
                name,
                src,
                dst,
                clock,
                vld,
                rdy,
                slots,
            });
        }
        Ok(())
    }

    fn element_name(&self, id: ElementId) -> String {
        self.cores
            .get(&id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("e{}", id.0))
    }

    fn into_architecture(mut self) -> Architecture {
        let cores = std::mem::take(&mut self.cores);
        let mut elements = Vec::new();
        for (id, core) in cores {
            let elem = match &self.roles[&id] {
                Role::Buffer => {
                    ArchElement::Pipeline(pipeline_elem::finalize(core, &mut self.rtl, self.netlist))
                }
                Role::Planned(i) => match &self.plan.elements[*i].kind {
                    ElementKindPlan::Pipeline { .. } => ArchElement::Pipeline(
                        pipeline_elem::finalize(core, &mut self.rtl, self.netlist),
                    ),
                    ElementKindPlan::Fsm { .. } => {
                        let states = self.fsm_states(*i);
                        ArchElement::Fsm(fsm_elem::finalize(
                            core,
                            &mut self.rtl,
                            self.netlist,
                            states,
                        ))
                    }
                },
            };
            elements.push(elem);
        }
        Architecture {
            rtl: self.rtl,
            elements,
            channels: self.channels,
            wiring: self.wiring,
        }
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Architecture ({} elements, {} channels, {} registers)",
            self.elements.len(),
            self.channels.len(),
            self.reg_count()
        )?;
        for elem in &self.elements {
            match elem {
                ArchElement::Pipeline(p) => write!(f, "{p}")?,
                ArchElement::Fsm(m) => write!(f, "{m}")?,
            }
        }
        for ch in &self.channels {
            let ports: Vec<u32> = ch.slots.iter().map(|s| s.port.0).collect();
            writeln!(
                f,
                "  channel {} (ports {:?}, vld s{}, rdy s{})",
                ch.name, ports, ch.vld.0, ch.rdy.0
            )?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockModel;
    use crate::discover::{discover, DiscoverOptions};
    use crate::netlist::{InterfaceKind, NodeKind, OpKind};
    use crate::pass::StageCert;
    use crate::schedule::{schedule, ScheduleOptions};

    fn compile(netlist: &Netlist) -> (ScheduledNetlist, ArchPlan, Architecture, Vec<Diagnostic>) {
        let sched = schedule(netlist, ClockModel::new(10.0), &ScheduleOptions::default())
            .schedule
            .expect("schedule");
        let plan = discover(netlist, &sched, &DiscoverOptions::default()).plan;
        let result = connect(netlist, &sched, &plan);
        assert!(
            !crate::diag::has_errors(&result.diagnostics),
            "diagnostics: {:#?}",
            result.diagnostics
        );
        let arch = result.architecture.expect("architecture");
        (sched, plan, arch, result.diagnostics)
    }

    #[test]
    fn single_element_has_no_channels() {
        let mut n = Netlist::new();
        let din = n.add_interface("din", InterfaceKind::Handshake, 1);
        let dout = n.add_interface("dout", InterfaceKind::Handshake, 1);
        let rd = n.add_node("rd", NodeKind::Read(din), &[], &[32], 0.5, 0.0);
        let add = n.add_node("acc", NodeKind::Op(OpKind::Add), &[32, 32], &[32], 1.0, 0.0);
        let wr = n.add_node("wr", NodeKind::Write(dout), &[32], &[], 0.5, 0.0);
        n.connect(n.output(rd, 0), n.input(add, 0));
        n.connect(n.output(rd, 0), n.input(add, 1));
        n.connect(n.output(add, 0), n.input(wr, 0));
        let (sched, plan, arch, diags) = compile(&n);
        assert_eq!(arch.elements.len(), 1);
        assert!(arch.channels.is_empty());
        assert!(diags.is_empty());
        assert!(matches!(arch.elements[0], ArchElement::Pipeline(_)));
        let cert = verify_architecture(&n, &sched, &plan, &arch);
        assert!(cert.all_pass(), "{:?}", cert.obligations());
    }

    #[test]
    fn fsm_to_pipeline_channel() {
        // Two ordered reads form an FSM; the summed result crosses into
        // the pipeline element that writes it out.
        let mut n = Netlist::new();
        let bus = n.add_interface("bus", InterfaceKind::Handshake, 1);
        let dout = n.add_interface("dout", InterfaceKind::Handshake, 1);
        let r0 = n.add_node("r0", NodeKind::Read(bus), &[], &[8], 0.5, 0.0);
        let r1 = n.add_node("r1", NodeKind::Read(bus), &[], &[8], 0.5, 0.0);
        n.add_ordering(r0, r1);
        let add = n.add_node("add", NodeKind::Op(OpKind::Add), &[8, 8], &[8], 1.0, 0.0);
        n.connect(n.output(r0, 0), n.input(add, 0));
        n.connect(n.output(r1, 0), n.input(add, 1));
        let wr = n.add_node("wr", NodeKind::Write(dout), &[8], &[], 8.0, 0.0);
        n.connect(n.output(add, 0), n.input(wr, 0));
        let (sched, plan, arch, _) = compile(&n);
        assert_eq!(plan.elements.len(), 2);
        assert_eq!(arch.channels.len(), 1);
        assert_eq!(arch.channels[0].slots.len(), 1);
        let cert = verify_architecture(&n, &sched, &plan, &arch);
        assert!(cert.all_pass(), "{:?}\n{}", cert.obligations(), arch);
    }

    #[test]
    fn crossings_share_one_channel_per_clock() {
        // Both FSM values land in the pipeline in the same cycle: one
        // channel, one valid/ready pair, two payload slots.
        let mut n = Netlist::new();
        let bus = n.add_interface("bus", InterfaceKind::Handshake, 1);
        let douta = n.add_interface("douta", InterfaceKind::Handshake, 1);
        let doutb = n.add_interface("doutb", InterfaceKind::Handshake, 1);
        let r0 = n.add_node("r0", NodeKind::Read(bus), &[], &[8], 0.5, 0.0);
        let r1 = n.add_node("r1", NodeKind::Read(bus), &[], &[8], 0.5, 0.0);
        n.add_ordering(r0, r1);
        let wa = n.add_node("wa", NodeKind::Write(douta), &[8], &[], 0.5, 0.0);
        n.connect(n.output(r0, 0), n.input(wa, 0));
        n.add_ordering(r1, wa);
        let wb = n.add_node("wb", NodeKind::Write(doutb), &[8], &[], 0.5, 0.0);
        n.connect(n.output(r1, 0), n.input(wb, 0));
        let (sched, plan, arch, _) = compile(&n);
        assert_eq!(sched.start_clock(wa), sched.start_clock(wb));
        assert_eq!(arch.channels.len(), 1, "{arch}");
        let ch = &arch.channels[0];
        assert_eq!(ch.slots.len(), 2);
        assert_ne!(ch.vld, ch.rdy);
        assert_eq!(ch.name, format!("ch_{}_to_{}_c{}",
            arch.element(ch.src).name(), arch.element(ch.dst).name(), ch.clock));
        let cert = verify_architecture(&n, &sched, &plan, &arch);
        assert!(cert.all_pass(), "{:?}\n{}", cert.obligations(), arch);
    }

    #[test]
    fn full_width_fragment_shares_the_channel_slot_group() {
        // One consumer uses the value through a full-width part
        // reference, another uses it directly: one channel batch, both
        // wires driven from the same source chain.
        let mut n = Netlist::new();
        let bus = n.add_interface("bus", InterfaceKind::Handshake, 1);
        let douta = n.add_interface("douta", InterfaceKind::Handshake, 1);
        let doutb = n.add_interface("doutb", InterfaceKind::Handshake, 1);
        let r0 = n.add_node("r0", NodeKind::Read(bus), &[], &[8], 0.5, 0.0);
        let r1 = n.add_node("r1", NodeKind::Read(bus), &[], &[8], 0.5, 0.0);
        n.add_ordering(r0, r1);
        let frag = n.add_node(
            "frag",
            NodeKind::PartRef {
                of: r1,
                lsb: 0,
                width: 8,
            },
            &[],
            &[8],
            0.5,
            0.0,
        );
        n.add_ordering(r1, frag);
        let wa = n.add_node("wa", NodeKind::Write(douta), &[8], &[], 0.5, 0.0);
        n.connect(n.output(frag, 0), n.input(wa, 0));
        let wb = n.add_node("wb", NodeKind::Write(doutb), &[8], &[], 0.5, 0.0);
        n.connect(n.output(r1, 0), n.input(wb, 0));
        n.add_ordering(r1, wb);
        let (sched, plan, arch, _) = compile(&n);
        // frag joins the FSM's second state; both writes sit outside.
        assert_eq!(plan.owner_of(frag), plan.owner_of(r1));
        let to_pipe: Vec<&Channel> = arch.channels.iter().collect();
        assert_eq!(to_pipe.len(), 1, "{arch}");
        assert_eq!(to_pipe[0].slots.len(), 2);
        let slot_ports: Vec<PortId> = to_pipe[0].slots.iter().map(|s| s.port).collect();
        assert!(slot_ports.contains(&n.output(frag, 0)));
        assert!(slot_ports.contains(&n.output(r1, 0)));
        let cert = verify_architecture(&n, &sched, &plan, &arch);
        assert!(cert.all_pass(), "{:?}\n{}", cert.obligations(), arch);
    }

    #[test]
    fn divergent_synonym_objects_are_e0203() {
        let mut n = Netlist::new();
        let c0 = n.add_node("c0", NodeKind::Const(1), &[], &[8], 0.5, 0.0);
        let c1 = n.add_node("c1", NodeKind::Const(2), &[], &[8], 0.5, 0.0);
        let sched = schedule(&n, ClockModel::new(10.0), &ScheduleOptions::default())
            .schedule
            .expect("schedule");
        let mut rtl = RtlArena::new();
        let mut core = ElementCore::new(ElementId(0), "e");
        core.instantiate_node(&mut rtl, &n, &sched, c0).unwrap();
        core.instantiate_node(&mut rtl, &n, &sched, c1).unwrap();
        // Distinct constants can never be one RTL object.
        let err = synonym_tap(&core, &[n.output(c0, 0), n.output(c1, 0)]).unwrap_err();
        assert_eq!(err.code, Some(codes::E0203));
        // A lone port taps cleanly.
        assert_eq!(synonym_tap(&core, &[n.output(c0, 0)]).unwrap(), n.output(c0, 0));
    }

    #[test]
    fn misaligned_fsms_get_a_buffer_element() {
        // Element A: two ordered reads of `bus` (states at clocks 0-1);
        // its clock-0 value is needed by element B, whose states sit at
        // clocks 2-3 (pushed there by a slow write). Neither FSM covers
        // the gap, so a buffering pipeline element bridges it.
        let mut n = Netlist::new();
        let bus = n.add_interface("bus", InterfaceKind::Handshake, 1);
        let bus2 = n.add_interface("bus2", InterfaceKind::Handshake, 1);
        let dbg = n.add_interface("dbg", InterfaceKind::Handshake, 1);
        let r0 = n.add_node("r0", NodeKind::Read(bus), &[], &[8], 0.5, 0.0);
        let r1 = n.add_node("r1", NodeKind::Read(bus), &[], &[8], 0.5, 0.0);
        n.add_ordering(r0, r1);
        // Clock-0 work anchored in A by a same-cycle consumer.
        let inv = n.add_node("inv", NodeKind::Op(OpKind::Not), &[8], &[8], 0.5, 0.0);
        let wd = n.add_node("wd", NodeKind::Write(dbg), &[8], &[], 0.5, 0.0);
        n.connect(n.output(r0, 0), n.input(inv, 0));
        n.connect(n.output(inv, 0), n.input(wd, 0));
        // Element B: slow write pushed to clock 2, then an ordered read
        // at clock 3 whose consumer also needs A's clock-0 value.
        let w2 = n.add_node("w2", NodeKind::Write(bus2), &[8], &[], 9.6, 0.0);
        n.connect(n.output(r1, 0), n.input(w2, 0));
        let r2 = n.add_node("r2", NodeKind::Read(bus2), &[], &[8], 0.5, 0.0);
        n.add_ordering(w2, r2);
        let add = n.add_node("add", NodeKind::Op(OpKind::Add), &[8, 8], &[8], 1.0, 0.0);
        n.connect(n.output(r2, 0), n.input(add, 0));
        n.connect(n.output(inv, 0), n.input(add, 1));
        let (sched, plan, arch, diags) = compile(&n);
        assert_eq!(sched.start_clock(w2), 2);
        assert_eq!(sched.start_clock(r2), 3);
        let buffers: Vec<&ArchElement> = arch
            .elements
            .iter()
            .filter(|e| e.name().starts_with("buf"))
            .collect();
        assert!(!buffers.is_empty(), "{}", arch);
        // Buffer insertion is reported, not silent.
        assert!(
            diags
                .iter()
                .any(|d| d.code == Some(codes::W0400) && d.message.contains("buffering")),
            "{diags:#?}"
        );
        let buffered: Vec<&Channel> = arch
            .channels
            .iter()
            .filter(|c| arch.element(c.dst).name().starts_with("buf"))
            .collect();
        assert!(!buffered.is_empty());
        let cert = verify_architecture(&n, &sched, &plan, &arch);
        assert!(cert.all_pass(), "{:?}\n{}", cert.obligations(), arch);
    }

    #[test]
    fn channel_wires_are_driven_from_source_chains() {
        let mut n = Netlist::new();
        let bus = n.add_interface("bus", InterfaceKind::Handshake, 1);
        let dout = n.add_interface("dout", InterfaceKind::Handshake, 1);
        let r0 = n.add_node("r0", NodeKind::Read(bus), &[], &[8], 0.5, 0.0);
        let r1 = n.add_node("r1", NodeKind::Read(bus), &[], &[8], 0.5, 0.0);
        n.add_ordering(r0, r1);
        let add = n.add_node("add", NodeKind::Op(OpKind::Add), &[8, 8], &[8], 1.0, 0.0);
        n.connect(n.output(r0, 0), n.input(add, 0));
        n.connect(n.output(r1, 0), n.input(add, 1));
        let wr = n.add_node("wr", NodeKind::Write(dout), &[8], &[], 8.0, 0.0);
        n.connect(n.output(add, 0), n.input(wr, 0));
        let (_, _, arch, _) = compile(&n);
        let slot_count: usize = arch.channels.iter().map(|c| c.slots.len()).sum();
        assert_eq!(arch.wiring.len(), slot_count);
        for ch in &arch.channels {
            for slot in &ch.slots {
                assert!(arch
                    .wiring
                    .iter()
                    .any(|s| matches!(s, RtlStmt::Assign { dst, .. } if *dst == slot.wire)));
            }
        }
    }
}
