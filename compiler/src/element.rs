// element.rs — Element base: node instantiation, records, handshake joins
//
// Shared machinery of both element kinds. An element instantiates its
// owned nodes into RTL primitives, keeping one ConnectionRecord per clock
// index it is active in: which interfaces it touches, under what extra or
// skip conditions, and the combinational statements of that cycle. The
// control discipline on top (stage validity or a state register) is the
// concrete element's job.
//
// Cross-element values enter through import resources declared before any
// consumer is instantiated; resolving an input that is neither owned nor
// imported is a wiring-phase bug (E0202).
//
// Preconditions: nodes are instantiated in topological order within their
//                clock, after all imports for the element are declared.
// Postconditions: every owned output port has a ValueResource; every
//                 active clock has a ConnectionRecord.
// Failure modes: unresolvable input (E0202), unsupported node kind in
//                this position (E0300).
// Side effects: allocates signals in the shared RTL arena.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::diag::{codes, Diagnostic};
use crate::id::{ElementId, InterfaceId, NodeId, PortId, SignalId};
use crate::netlist::{InterfaceKind, Netlist, NodeKind};
use crate::resource::ValueResource;
use crate::rtl::{BoolExpr, RtlArena, RtlExpr, RtlStmt};
use crate::schedule::ScheduledNetlist;

// ── Connection records ──────────────────────────────────────────────────────

/// One pending write arm of an interface data mux, keyed by the writing
/// node so gating conditions land on the right arm.
#[derive(Debug, Clone)]
pub struct IoMuxArm {
    pub node: NodeId,
    pub cond: BoolExpr,
    pub value: RtlExpr,
}

/// Everything an element does in one clock index: the interfaces it
/// synchronizes with, per-interface gating, the combinational statements,
/// and (once control is built) the acknowledge condition under which the
/// cycle's transactions commit.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub clock: i64,
    /// Interfaces read in this cycle.
    pub inputs: BTreeSet<InterfaceId>,
    /// Interfaces written in this cycle.
    pub outputs: BTreeSet<InterfaceId>,
    /// Transaction is live only when this holds (loop gates, state guards).
    pub extra_cond: BTreeMap<InterfaceId, BoolExpr>,
    /// Transaction is bypassed entirely when this holds.
    pub skip_when: BTreeMap<InterfaceId, BoolExpr>,
    /// Pending data-mux arms per written interface, in node order.
    pub io_muxes: BTreeMap<InterfaceId, Vec<IoMuxArm>>,
    /// Inter-element channel endpoints this record receives on: the
    /// channel's valid (sampled) and ready (driven back).
    pub chan_ins: Vec<(SignalId, SignalId)>,
    /// Channel endpoints this record sends on: valid (driven) and the
    /// consumer's ready (sampled).
    pub chan_outs: Vec<(SignalId, SignalId)>,
    /// Register loads gated by this record's acknowledge.
    pub loads: Vec<(SignalId, RtlExpr)>,
    /// Combinational statements of this cycle.
    pub stmts: Vec<RtlStmt>,
    /// Acknowledge condition; set by the control layer.
    pub ack: Option<BoolExpr>,
}

impl ConnectionRecord {
    fn new(clock: i64) -> Self {
        ConnectionRecord {
            clock,
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
            extra_cond: BTreeMap::new(),
            skip_when: BTreeMap::new(),
            io_muxes: BTreeMap::new(),
            chan_ins: Vec::new(),
            chan_outs: Vec::new(),
            loads: Vec::new(),
            stmts: Vec::new(),
            ack: None,
        }
    }

    /// AND `cond` into the extra condition of one interface.
    pub fn add_extra_cond(&mut self, iface: InterfaceId, cond: BoolExpr) {
        let entry = self.extra_cond.entry(iface).or_insert(BoolExpr::True);
        *entry = std::mem::replace(entry, BoolExpr::True).and(cond);
    }

    /// OR `cond` into the skip condition of one interface.
    pub fn add_skip(&mut self, iface: InterfaceId, cond: BoolExpr) {
        let entry = self.skip_when.entry(iface).or_insert(BoolExpr::False);
        *entry = std::mem::replace(entry, BoolExpr::False).or(cond);
    }

    fn extra(&self, iface: InterfaceId) -> BoolExpr {
        self.extra_cond.get(&iface).cloned().unwrap_or(BoolExpr::True)
    }

    fn skip(&self, iface: InterfaceId) -> BoolExpr {
        self.skip_when.get(&iface).cloned().unwrap_or(BoolExpr::False)
    }
}

// ── Interface signals ───────────────────────────────────────────────────────

/// External pins of one interface as seen by one element. Direction
/// depends on use: a read treats `data`/`vld` as inputs and drives `rdy`;
/// a write drives `data`/`vld` and samples `rdy`. Wire-kind interfaces
/// only use `data`.
#[derive(Debug, Clone, Copy)]
pub struct IfaceSignals {
    pub data: SignalId,
    pub data_width: u32,
    pub vld: SignalId,
    pub rdy: SignalId,
}

/// Identity of one synchronization partner within a record's join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinKey {
    Iface(InterfaceId),
    Chan(SignalId),
}

// ── Element core ────────────────────────────────────────────────────────────

/// State shared by both element kinds.
#[derive(Debug)]
pub struct ElementCore {
    pub id: ElementId,
    pub name: String,
    records: BTreeMap<i64, ConnectionRecord>,
    /// Resources of owned node outputs.
    outputs: BTreeMap<PortId, ValueResource>,
    /// Resources of values imported from other elements.
    imports: BTreeMap<PortId, ValueResource>,
    iface_sigs: BTreeMap<InterfaceId, IfaceSignals>,
    /// Holding registers of element-internal backward-edge channels.
    backedge_regs: BTreeMap<InterfaceId, SignalId>,
    /// Loop-gate condition signals by gate node, with their clock.
    gates: BTreeMap<NodeId, (i64, SignalId)>,
}

impl ElementCore {
    pub fn new(id: ElementId, name: impl Into<String>) -> Self {
        ElementCore {
            id,
            name: name.into(),
            records: BTreeMap::new(),
            outputs: BTreeMap::new(),
            imports: BTreeMap::new(),
            iface_sigs: BTreeMap::new(),
            backedge_regs: BTreeMap::new(),
            gates: BTreeMap::new(),
        }
    }

    pub fn record_mut(&mut self, clock: i64) -> &mut ConnectionRecord {
        self.records
            .entry(clock)
            .or_insert_with(|| ConnectionRecord::new(clock))
    }

    pub fn record(&self, clock: i64) -> Option<&ConnectionRecord> {
        self.records.get(&clock)
    }

    pub fn records(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.records.values()
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ConnectionRecord> {
        self.records.values_mut()
    }

    pub fn active_clocks(&self) -> Vec<i64> {
        self.records.keys().copied().collect()
    }

    /// Resource of an owned output port, if instantiated.
    pub fn output_resource(&self, port: PortId) -> Option<&ValueResource> {
        self.outputs.get(&port)
    }

    pub fn output_resource_mut(&mut self, port: PortId) -> Option<&mut ValueResource> {
        self.outputs.get_mut(&port)
    }

    pub fn output_resources(&self) -> impl Iterator<Item = (&PortId, &ValueResource)> {
        self.outputs.iter()
    }

    pub fn output_resources_mut(&mut self) -> impl Iterator<Item = (&PortId, &mut ValueResource)> {
        self.outputs.iter_mut()
    }

    pub fn import_resources_mut(&mut self) -> impl Iterator<Item = (&PortId, &mut ValueResource)> {
        self.imports.iter_mut()
    }

    /// External pins of an interface, allocated on first use with names
    /// derived from the interface name.
    pub fn iface_signals(
        &mut self,
        rtl: &mut RtlArena,
        netlist: &Netlist,
        iface: InterfaceId,
    ) -> IfaceSignals {
        if let Some(&sigs) = self.iface_sigs.get(&iface) {
            return sigs;
        }
        let def = netlist.interface(iface);
        let data_width = netlist
            .nodes()
            .iter()
            .find_map(|n| match &n.kind {
                k if k.interface() == Some(iface) && k.is_read() && !n.outputs.is_empty() => {
                    Some(netlist.port(n.outputs[0]).width)
                }
                k if k.interface() == Some(iface) && k.is_write() && !n.inputs.is_empty() => {
                    Some(netlist.port(n.inputs[0]).width)
                }
                _ => None,
            })
            .unwrap_or(1);
        let sigs = IfaceSignals {
            data: rtl.wire(format!("{}_data", def.name), data_width),
            data_width,
            vld: rtl.wire(format!("{}_vld", def.name), 1),
            rdy: rtl.wire(format!("{}_rdy", def.name), 1),
        };
        self.iface_sigs.insert(iface, sigs);
        sigs
    }

    pub fn used_interfaces(&self) -> Vec<InterfaceId> {
        self.iface_sigs.keys().copied().collect()
    }

    /// Holding register of an element-internal backward-edge channel.
    pub fn backedge_reg(
        &mut self,
        rtl: &mut RtlArena,
        netlist: &Netlist,
        iface: InterfaceId,
        width: u32,
    ) -> SignalId {
        if let Some(&reg) = self.backedge_regs.get(&iface) {
            return reg;
        }
        let name = format!("be_{}", netlist.interface(iface).name);
        let reg = rtl.reg(name, width, None);
        self.backedge_regs.insert(iface, reg);
        reg
    }

    pub fn backedge_registers(&self) -> impl Iterator<Item = (&InterfaceId, &SignalId)> {
        self.backedge_regs.iter()
    }

    /// Condition signal of an instantiated loop gate.
    pub fn gate_signal(&self, node: NodeId) -> Option<SignalId> {
        self.gates.get(&node).map(|&(_, sig)| sig)
    }

    // ── Imports ─────────────────────────────────────────────────────────

    /// Declare a value produced by another element, arriving on a wire at
    /// `arrival_clock`. Must precede instantiation of any consumer.
    pub fn declare_import(
        &mut self,
        rtl: &mut RtlArena,
        port: PortId,
        width: u32,
        arrival_clock: i64,
        src_name: &str,
    ) -> SignalId {
        if let Some(existing) = self.imports.get(&port) {
            return existing.origin_signal();
        }
        let wire = rtl.wire(format!("{}_{}_in", self.name, src_name), width);
        self.imports.insert(
            port,
            ValueResource::new(
                wire,
                width,
                arrival_clock,
                self.id,
                format!("{}_{}_in", self.name, src_name),
            ),
        );
        wire
    }

    /// Arrival wire of a declared import, for the wiring phase.
    pub fn import_signal(&self, port: PortId) -> Option<SignalId> {
        self.imports.get(&port).map(|r| r.origin_signal())
    }

    pub fn import_resource_mut(&mut self, port: PortId) -> Option<&mut ValueResource> {
        self.imports.get_mut(&port)
    }

    // ── Node instantiation ──────────────────────────────────────────────

    /// Instantiate one owned node at its scheduled clock. Inputs resolve
    /// through owned or imported resources at the consumption clock,
    /// growing register chains on demand.
    pub fn instantiate_node(
        &mut self,
        rtl: &mut RtlArena,
        netlist: &Netlist,
        sched: &ScheduledNetlist,
        node: NodeId,
    ) -> Result<(), Diagnostic> {
        let clock = sched.start_clock(node);
        let def = netlist.node(node);
        match def.kind.clone() {
            NodeKind::Const(value) => {
                let out = def.outputs[0];
                let width = netlist.port(out).width;
                let wire = rtl.wire(def.name.clone(), width);
                self.record_mut(clock)
                    .stmts
                    .push(RtlStmt::Assign {
                        dst: wire,
                        src: RtlExpr::Const { value, width },
                    });
                self.bind_output(netlist, sched, out, wire);
            }
            NodeKind::Op(op) => {
                let out = def.outputs[0];
                let width = netlist.port(out).width;
                let wire = rtl.wire(def.name.clone(), width);
                let src = if def.inputs.len() == 1 {
                    RtlExpr::Unary {
                        op,
                        arg: Box::new(self.resolve_input(rtl, netlist, sched, def.inputs[0])?),
                    }
                } else {
                    RtlExpr::Binary {
                        op,
                        lhs: Box::new(self.resolve_input(rtl, netlist, sched, def.inputs[0])?),
                        rhs: Box::new(self.resolve_input(rtl, netlist, sched, def.inputs[1])?),
                    }
                };
                self.record_mut(clock).stmts.push(RtlStmt::Assign { dst: wire, src });
                self.bind_output(netlist, sched, out, wire);
            }
            NodeKind::Mux => {
                let out = def.outputs[0];
                let width = netlist.port(out).width;
                let wire = rtl.wire(def.name.clone(), width);
                let sel = self.resolve_input(rtl, netlist, sched, def.inputs[0])?;
                let mut arms = Vec::with_capacity(def.inputs.len() - 1);
                for &input in &def.inputs[1..] {
                    arms.push(self.resolve_input(rtl, netlist, sched, input)?);
                }
                self.record_mut(clock).stmts.push(RtlStmt::Assign {
                    dst: wire,
                    src: RtlExpr::Mux {
                        sel: Box::new(sel),
                        arms,
                    },
                });
                self.bind_output(netlist, sched, out, wire);
            }
            NodeKind::PartRef { of, lsb, width } => {
                let out = def.outputs[0];
                let src_port = netlist.output(of, 0);
                let arg = self.resolve_port(rtl, netlist, src_port, clock)?;
                // A full-width fragment is a pure alias: expose the source
                // signal itself so synonym ports stay one RTL object.
                if lsb == 0 && width == netlist.port(src_port).width {
                    if let RtlExpr::Sig(sig) = arg {
                        self.bind_output(netlist, sched, out, sig);
                        return Ok(());
                    }
                }
                let wire = rtl.wire(def.name.clone(), width);
                self.record_mut(clock).stmts.push(RtlStmt::Assign {
                    dst: wire,
                    src: RtlExpr::Slice {
                        arg: Box::new(arg),
                        lsb,
                        width,
                    },
                });
                self.bind_output(netlist, sched, out, wire);
            }
            NodeKind::Read(iface) => {
                let sigs = self.iface_signals(rtl, netlist, iface);
                let record = self.record_mut(clock);
                record.inputs.insert(iface);
                let out = def.outputs[0];
                self.bind_output(netlist, sched, out, sigs.data);
            }
            NodeKind::Write(iface) => {
                let value = self.resolve_input(rtl, netlist, sched, def.inputs[0])?;
                self.iface_signals(rtl, netlist, iface);
                let record = self.record_mut(clock);
                record.outputs.insert(iface);
                record
                    .io_muxes
                    .entry(iface)
                    .or_default()
                    .push(IoMuxArm {
                        node,
                        cond: BoolExpr::True,
                        value,
                    });
            }
            NodeKind::Sync => {
                // Ordering barrier only: materializes the record.
                self.record_mut(clock);
            }
            NodeKind::LoopGate => {
                let out = def.outputs[0];
                let cond = rtl.wire(def.name.clone(), 1);
                let src = self.resolve_input(rtl, netlist, sched, def.inputs[0])?;
                self.record_mut(clock).stmts.push(RtlStmt::Assign { dst: cond, src });
                self.gates.insert(node, (clock, cond));
                self.bind_output(netlist, sched, out, cond);
            }
            NodeKind::BackedgeRead(iface) => {
                let out = def.outputs[0];
                let width = netlist.port(out).width;
                let reg = self.backedge_reg(rtl, netlist, iface, width);
                self.record_mut(clock);
                self.bind_output(netlist, sched, out, reg);
            }
            NodeKind::BackedgeWrite { iface, .. } => {
                let value = self.resolve_input(rtl, netlist, sched, def.inputs[0])?;
                let width = netlist.port(def.inputs[0]).width;
                let reg = self.backedge_reg(rtl, netlist, iface, width);
                self.record_mut(clock).loads.push((reg, value));
            }
        }
        Ok(())
    }

    fn bind_output(
        &mut self,
        netlist: &Netlist,
        sched: &ScheduledNetlist,
        port: PortId,
        signal: SignalId,
    ) {
        let width = netlist.port(port).width;
        let origin_clock = sched.out_clock(netlist, port);
        let name = netlist.node(netlist.port(port).node).name.clone();
        self.outputs.insert(
            port,
            ValueResource::new(signal, width, origin_clock, self.id, name),
        );
    }

    /// Resolve the value feeding an input port at its consumption clock.
    pub fn resolve_input(
        &mut self,
        rtl: &mut RtlArena,
        netlist: &Netlist,
        sched: &ScheduledNetlist,
        input: PortId,
    ) -> Result<RtlExpr, Diagnostic> {
        let driver = netlist.port(input).driver.ok_or_else(|| {
            Diagnostic::error(
                codes::E0301,
                format!("input port {} resolved without a driver", input.0),
            )
        })?;
        let clock = sched.in_clock(netlist, input);
        self.resolve_port(rtl, netlist, driver, clock)
    }

    /// Resolve an output port's value as seen at `clock`.
    fn resolve_port(
        &mut self,
        rtl: &mut RtlArena,
        netlist: &Netlist,
        port: PortId,
        clock: i64,
    ) -> Result<RtlExpr, Diagnostic> {
        if let Some(resource) = self.outputs.get_mut(&port) {
            return Ok(RtlExpr::Sig(resource.get(rtl, clock)?));
        }
        if let Some(resource) = self.imports.get_mut(&port) {
            return Ok(RtlExpr::Sig(resource.get(rtl, clock)?));
        }
        let owner = netlist.port(port).node;
        Err(Diagnostic::error(
            codes::E0202,
            format!(
                "element '{}' consumes output of node {} with no forward declaration",
                self.name, owner.0
            ),
        )
        .with_node(netlist.node_ref(owner, None)))
    }

    // ── Gating ──────────────────────────────────────────────────────────

    /// Apply loop-gate conditions: each gate's condition is ANDed into
    /// the extra condition of every interface accessed in the gate's
    /// clock by a node downstream of the gate (data or ordering edges).
    /// When several writers compete for one interface, the condition
    /// lands on the gated writer's own mux arm instead, so the other
    /// writers stay selectable.
    pub fn apply_gates(&mut self, netlist: &Netlist, sched: &ScheduledNetlist) {
        let gates: Vec<(NodeId, i64, SignalId)> = self
            .gates
            .iter()
            .map(|(&n, &(c, s))| (n, c, s))
            .collect();
        for (gate, clock, cond_sig) in gates {
            let mut reach = BTreeSet::new();
            let mut stack = vec![gate];
            while let Some(n) = stack.pop() {
                let mut next = netlist.data_succs(n);
                next.extend_from_slice(netlist.ordering_succs(n));
                for s in next {
                    if reach.insert(s) {
                        stack.push(s);
                    }
                }
            }
            for n in reach {
                if sched.start_clock(n) != clock {
                    continue;
                }
                let kind = &netlist.node(n).kind;
                if let Some(iface) = kind.interface() {
                    let record = self.record_mut(clock);
                    let mut competing = false;
                    if kind.is_write() {
                        if let Some(arms) = record.io_muxes.get_mut(&iface) {
                            competing = arms.len() > 1;
                            if let Some(arm) = arms.iter_mut().find(|a| a.node == n) {
                                let prev = std::mem::replace(&mut arm.cond, BoolExpr::True);
                                arm.cond = prev.and(BoolExpr::Sig(cond_sig));
                            }
                        }
                    }
                    if !competing {
                        record.add_extra_cond(iface, BoolExpr::Sig(cond_sig));
                    }
                }
            }
        }
    }

    // ── Joins and handshake emission ────────────────────────────────────

    /// The synchronization join of one record: AND over all handshake
    /// interfaces of ((pin AND extra) OR skip), where `pin` is the
    /// partner's valid for inputs and ready for outputs, plus the plain
    /// valid/ready of every inter-element channel endpoint. Wire-kind
    /// interfaces never participate. An empty join is constant true.
    pub fn join_condition(&self, netlist: &Netlist, clock: i64) -> BoolExpr {
        let record = match self.records.get(&clock) {
            Some(r) => r,
            None => return BoolExpr::True,
        };
        self.join_terms(netlist, record)
            .into_iter()
            .fold(BoolExpr::True, |join, (_, term)| join.and(term))
    }

    /// One join term per synchronization partner, keyed so a driver can
    /// exclude its own partner's term.
    fn join_terms(
        &self,
        netlist: &Netlist,
        record: &ConnectionRecord,
    ) -> Vec<(JoinKey, BoolExpr)> {
        let mut terms = Vec::new();
        for &iface in &record.inputs {
            if netlist.interface(iface).kind != InterfaceKind::Handshake {
                continue;
            }
            let sigs = self.iface_sigs[&iface];
            let term = BoolExpr::Sig(sigs.vld)
                .and(record.extra(iface))
                .or(record.skip(iface));
            terms.push((JoinKey::Iface(iface), term));
        }
        for &iface in &record.outputs {
            if netlist.interface(iface).kind != InterfaceKind::Handshake {
                continue;
            }
            let sigs = self.iface_sigs[&iface];
            let term = BoolExpr::Sig(sigs.rdy)
                .and(record.extra(iface))
                .or(record.skip(iface));
            terms.push((JoinKey::Iface(iface), term));
        }
        for &(vld, _) in &record.chan_ins {
            terms.push((JoinKey::Chan(vld), BoolExpr::Sig(vld)));
        }
        for &(_, rdy) in &record.chan_outs {
            terms.push((JoinKey::Chan(rdy), BoolExpr::Sig(rdy)));
        }
        terms
    }

    /// Emit data muxes and handshake drives of one record into its
    /// statement list. `enable` is the control-layer condition under
    /// which the record's cycle is active (stage validity or state
    /// residency); vld/rdy drives are ANDed with it.
    pub fn emit_handshake(&mut self, netlist: &Netlist, clock: i64, enable: BoolExpr) {
        let (muxes, record) = match self.records.get_mut(&clock) {
            Some(r) => (std::mem::take(&mut r.io_muxes), r.clone()),
            None => return,
        };
        // Data muxes for written interfaces: a single unconditional arm
        // collapses to a plain assignment; otherwise a priority chain
        // keyed by each writer's condition, with a no-op default so no
        // stale value leaks when no writer fires.
        let mut stmts = Vec::new();
        for (iface, arms) in muxes {
            let sigs = self.iface_sigs[&iface];
            if arms.len() == 1 && arms[0].cond.is_true() {
                stmts.push(RtlStmt::Assign {
                    dst: sigs.data,
                    src: arms[0].value.clone(),
                });
            } else {
                stmts.push(RtlStmt::CondChain {
                    dst: sigs.data,
                    arms: arms.into_iter().map(|a| (a.cond, a.value)).collect(),
                    default: Some(RtlExpr::Const {
                        value: 0,
                        width: sigs.data_width,
                    }),
                });
            }
        }
        // Partner-facing drives: each interface sees the join of all the
        // *other* interfaces, so no combinational feedback through its
        // own partner signal.
        let inputs: Vec<InterfaceId> = record.inputs.iter().copied().collect();
        let outputs: Vec<InterfaceId> = record.outputs.iter().copied().collect();
        for &iface in &inputs {
            if netlist.interface(iface).kind != InterfaceKind::Handshake {
                continue;
            }
            let others = self.join_excluding(netlist, &record, JoinKey::Iface(iface));
            let sigs = self.iface_sigs[&iface];
            let drive = others
                .and(record.extra(iface))
                .and(record.skip(iface).negate())
                .and(enable.clone());
            stmts.push(RtlStmt::Assign {
                dst: sigs.rdy,
                src: RtlExpr::Bool(drive),
            });
        }
        for &iface in &outputs {
            if netlist.interface(iface).kind != InterfaceKind::Handshake {
                continue;
            }
            let others = self.join_excluding(netlist, &record, JoinKey::Iface(iface));
            let sigs = self.iface_sigs[&iface];
            let drive = others
                .and(record.extra(iface))
                .and(record.skip(iface).negate())
                .and(enable.clone());
            stmts.push(RtlStmt::Assign {
                dst: sigs.vld,
                src: RtlExpr::Bool(drive),
            });
        }
        // Channel endpoints handshake like interfaces: the driven pin
        // carries the join of everything but its own partner signal.
        for &(vld, rdy) in &record.chan_ins {
            let drive = self
                .join_excluding(netlist, &record, JoinKey::Chan(vld))
                .and(enable.clone());
            stmts.push(RtlStmt::Assign {
                dst: rdy,
                src: RtlExpr::Bool(drive),
            });
        }
        for &(vld, rdy) in &record.chan_outs {
            let drive = self
                .join_excluding(netlist, &record, JoinKey::Chan(rdy))
                .and(enable.clone());
            stmts.push(RtlStmt::Assign {
                dst: vld,
                src: RtlExpr::Bool(drive),
            });
        }
        self.record_mut(clock).stmts.extend(stmts);
    }

    fn join_excluding(
        &self,
        netlist: &Netlist,
        record: &ConnectionRecord,
        excluded: JoinKey,
    ) -> BoolExpr {
        self.join_terms(netlist, record)
            .into_iter()
            .filter(|(key, _)| *key != excluded)
            .fold(BoolExpr::True, |join, (_, term)| join.and(term))
    }
}

impl fmt::Display for ElementCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "element '{}' ({} records, {} outputs, {} imports)",
            self.name,
            self.records.len(),
            self.outputs.len(),
            self.imports.len()
        )?;
        for record in self.records.values() {
            writeln!(
                f,
                "  clk {}: in {:?} out {:?} stmts {}",
                record.clock,
                record.inputs.iter().map(|i| i.0).collect::<Vec<_>>(),
                record.outputs.iter().map(|i| i.0).collect::<Vec<_>>(),
                record.stmts.len()
            )?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
