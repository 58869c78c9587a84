// netlist.rs — Scheduled-dataflow netlist data model
//
// The input IR of the backend: an arena of nodes and ports produced by the
// front end, already simplified and deduplicated. Data edges form a DAG;
// control/data cycles arrive pre-broken as paired backward-edge channel
// nodes with an explicit minimum buffer depth. Ordering edges sequence
// accesses to the same external interface without implying data flow.
//
// Nodes and ports are never mutated in shape after construction — later
// phases only annotate them through side tables keyed by id.
//
// Preconditions: none (constructed incrementally by the front end).
// Postconditions: `validate` reports structural defects as diagnostics.
// Failure modes: builder misuse (wrong port direction) is an assertion.
// Side effects: none.

use std::fmt;

use crate::diag::{codes, Diagnostic, NodeRef};
use crate::id::{InterfaceId, NodeId, PortId};

// ── Node kinds ──────────────────────────────────────────────────────────────

/// Arithmetic/logic operator of an `Op` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Not,
    Eq,
    Ne,
    Lt,
    Shl,
    Shr,
}

impl OpKind {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::And => "and",
            OpKind::Or => "or",
            OpKind::Xor => "xor",
            OpKind::Not => "not",
            OpKind::Eq => "eq",
            OpKind::Ne => "ne",
            OpKind::Lt => "lt",
            OpKind::Shl => "shl",
            OpKind::Shr => "shr",
        }
    }
}

/// The kind of a netlist node.
///
/// Backward-edge channels are a distinct tagged pair (`BackedgeRead` /
/// `BackedgeWrite`): a message-passing abstraction for control/data cycles
/// that keeps the data-edge graph acyclic for scheduling.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Combinational operator.
    Op(OpKind),
    /// Constant value.
    Const(u64),
    /// Read of an external channel interface.
    Read(InterfaceId),
    /// Write of an external channel interface.
    Write(InterfaceId),
    /// Multiplexer: input 0 selects among inputs 1..N.
    Mux,
    /// Explicit synchronization barrier (ordering only, no data).
    Sync,
    /// Loop gate: produces the condition under which the loop body's
    /// transactions are live in its cycle.
    LoopGate,
    /// Read side of a backward-edge channel.
    BackedgeRead(InterfaceId),
    /// Write side of a backward-edge channel, paired with its read.
    BackedgeWrite {
        iface: InterfaceId,
        paired_read: NodeId,
        min_depth: u32,
    },
    /// Reference to a bit-range fragment of another node's output, used
    /// when ownership analysis splits a node across elements.
    PartRef { of: NodeId, lsb: u32, width: u32 },
}

impl NodeKind {
    /// Operator name for diagnostics and reports.
    pub fn label(&self) -> String {
        match self {
            NodeKind::Op(op) => op.mnemonic().to_string(),
            NodeKind::Const(v) => format!("const {v}"),
            NodeKind::Read(i) => format!("read if{}", i.0),
            NodeKind::Write(i) => format!("write if{}", i.0),
            NodeKind::Mux => "mux".to_string(),
            NodeKind::Sync => "sync".to_string(),
            NodeKind::LoopGate => "loop_gate".to_string(),
            NodeKind::BackedgeRead(i) => format!("backedge_read if{}", i.0),
            NodeKind::BackedgeWrite { iface, .. } => format!("backedge_write if{}", iface.0),
            NodeKind::PartRef { of, lsb, width } => {
                format!("part_ref n{}[{}+:{}]", of.0, lsb, width)
            }
        }
    }

    /// Interface accessed by this node, if it is an I/O node.
    pub fn interface(&self) -> Option<InterfaceId> {
        match self {
            NodeKind::Read(i)
            | NodeKind::Write(i)
            | NodeKind::BackedgeRead(i)
            | NodeKind::BackedgeWrite { iface: i, .. } => Some(*i),
            _ => None,
        }
    }

    pub fn is_io(&self) -> bool {
        self.interface().is_some()
    }

    pub fn is_write(&self) -> bool {
        matches!(self, NodeKind::Write(_) | NodeKind::BackedgeWrite { .. })
    }

    pub fn is_read(&self) -> bool {
        matches!(self, NodeKind::Read(_) | NodeKind::BackedgeRead(_))
    }
}

// ── Ports and nodes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDir {
    In,
    Out,
}

/// A typed endpoint owned by exactly one node. An output may fan out to
/// many inputs; an input has at most one driver.
#[derive(Debug, Clone)]
pub struct Port {
    pub id: PortId,
    pub node: NodeId,
    pub dir: PortDir,
    /// Position within the owning node's input or output list.
    pub index: usize,
    pub width: u32,
    /// For inputs: the driving output port.
    pub driver: Option<PortId>,
    /// For outputs: the driven input ports, in connection order.
    pub consumers: Vec<PortId>,
}

/// An operation node with ordered input and output ports and resolved
/// operator latency (pre-register and post-register delay, in the same
/// continuous unit as the clock period).
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub inputs: Vec<PortId>,
    pub outputs: Vec<PortId>,
    pub pre_latency: f64,
    pub post_latency: f64,
}

// ── Interfaces ──────────────────────────────────────────────────────────────

/// Capability class of an external interface handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    /// Ready/valid handshake pair; participates in synchronization joins.
    Handshake,
    /// Plain wire; unconditional, never joins a handshake.
    Wire,
}

/// An opaque external interface handle.
#[derive(Debug, Clone)]
pub struct Interface {
    pub id: InterfaceId,
    pub name: String,
    pub kind: InterfaceKind,
    /// Maximum concurrent accesses per clock cycle (default 1).
    pub max_concurrent: u32,
}

// ── Netlist arena ───────────────────────────────────────────────────────────

/// The complete netlist: node/port/interface arenas plus ordering edges.
#[derive(Debug, Default)]
pub struct Netlist {
    nodes: Vec<Node>,
    ports: Vec<Port>,
    interfaces: Vec<Interface>,
    ordering_succs: Vec<Vec<NodeId>>,
    ordering_preds: Vec<Vec<NodeId>>,
}

impl Netlist {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ────────────────────────────────────────────────────

    pub fn add_interface(
        &mut self,
        name: impl Into<String>,
        kind: InterfaceKind,
        max_concurrent: u32,
    ) -> InterfaceId {
        let id = InterfaceId(self.interfaces.len() as u32);
        self.interfaces.push(Interface {
            id,
            name: name.into(),
            kind,
            max_concurrent,
        });
        id
    }

    /// Create a node with the given input/output port widths.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        in_widths: &[u32],
        out_widths: &[u32],
        pre_latency: f64,
        post_latency: f64,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let mut inputs = Vec::with_capacity(in_widths.len());
        for (index, &width) in in_widths.iter().enumerate() {
            let pid = PortId(self.ports.len() as u32);
            self.ports.push(Port {
                id: pid,
                node: id,
                dir: PortDir::In,
                index,
                width,
                driver: None,
                consumers: Vec::new(),
            });
            inputs.push(pid);
        }
        let mut outputs = Vec::with_capacity(out_widths.len());
        for (index, &width) in out_widths.iter().enumerate() {
            let pid = PortId(self.ports.len() as u32);
            self.ports.push(Port {
                id: pid,
                node: id,
                dir: PortDir::Out,
                index,
                width,
                driver: None,
                consumers: Vec::new(),
            });
            outputs.push(pid);
        }
        self.nodes.push(Node {
            id,
            name: name.into(),
            kind,
            inputs,
            outputs,
            pre_latency,
            post_latency,
        });
        self.ordering_succs.push(Vec::new());
        self.ordering_preds.push(Vec::new());
        id
    }

    /// Connect an output port to an input port (a data edge).
    pub fn connect(&mut self, from: PortId, to: PortId) {
        assert_eq!(self.ports[from.index()].dir, PortDir::Out, "connect: from must be an output");
        assert_eq!(self.ports[to.index()].dir, PortDir::In, "connect: to must be an input");
        assert!(
            self.ports[to.index()].driver.is_none(),
            "connect: input already driven"
        );
        self.ports[to.index()].driver = Some(from);
        self.ports[from.index()].consumers.push(to);
    }

    /// Add an ordering-only edge: `after` must not run in a cycle earlier
    /// than `before`. Used to sequence same-interface accesses.
    pub fn add_ordering(&mut self, before: NodeId, after: NodeId) {
        self.ordering_succs[before.index()].push(after);
        self.ordering_preds[after.index()].push(before);
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id.index()]
    }

    pub fn interface(&self, id: InterfaceId) -> &Interface {
        &self.interfaces[id.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Output port `i` of a node.
    pub fn output(&self, node: NodeId, i: usize) -> PortId {
        self.nodes[node.index()].outputs[i]
    }

    /// Input port `i` of a node.
    pub fn input(&self, node: NodeId, i: usize) -> PortId {
        self.nodes[node.index()].inputs[i]
    }

    /// Node driving an input port, if connected.
    pub fn driver_node(&self, input: PortId) -> Option<NodeId> {
        self.ports[input.index()]
            .driver
            .map(|d| self.ports[d.index()].node)
    }

    pub fn ordering_preds(&self, node: NodeId) -> &[NodeId] {
        &self.ordering_preds[node.index()]
    }

    pub fn ordering_succs(&self, node: NodeId) -> &[NodeId] {
        &self.ordering_succs[node.index()]
    }

    /// Distinct data-edge predecessors, in input-port order.
    pub fn data_preds(&self, node: NodeId) -> Vec<NodeId> {
        let mut preds = Vec::new();
        for &input in &self.nodes[node.index()].inputs {
            if let Some(p) = self.driver_node(input) {
                if !preds.contains(&p) {
                    preds.push(p);
                }
            }
        }
        preds
    }

    /// Distinct data-edge successors, in output/consumer order.
    pub fn data_succs(&self, node: NodeId) -> Vec<NodeId> {
        let mut succs = Vec::new();
        for &output in &self.nodes[node.index()].outputs {
            for &consumer in &self.ports[output.index()].consumers {
                let n = self.ports[consumer.index()].node;
                if !succs.contains(&n) {
                    succs.push(n);
                }
            }
        }
        succs
    }

    /// A node with no data consumers and no ordering successors.
    pub fn is_terminal(&self, node: NodeId) -> bool {
        self.data_succs(node).is_empty() && self.ordering_succs(node).is_empty()
    }

    /// Diagnostic context for a node.
    pub fn node_ref(&self, id: NodeId, start_time: Option<f64>) -> NodeRef {
        NodeRef {
            node: id,
            operator: self.nodes[id.index()].kind.label(),
            start_time,
        }
    }

    // ── Validation ──────────────────────────────────────────────────────

    /// Structural validation of the arena. The front end is trusted for
    /// semantics; this catches wiring mistakes in the interchange layer.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for node in &self.nodes {
            for &input in &node.inputs {
                // Sync barriers may have unconnected ordering-only inputs.
                if self.ports[input.index()].driver.is_none()
                    && !matches!(node.kind, NodeKind::Sync)
                {
                    diagnostics.push(
                        Diagnostic::error(
                            codes::E0301,
                            format!("input port {} of node {} has no driver", input.0, node.id.0),
                        )
                        .with_node(self.node_ref(node.id, None)),
                    );
                }
            }
            if let NodeKind::BackedgeWrite { paired_read, .. } = node.kind {
                let read = &self.nodes[paired_read.index()];
                if !matches!(read.kind, NodeKind::BackedgeRead(_)) {
                    diagnostics.push(
                        Diagnostic::error(
                            codes::E0301,
                            format!(
                                "backedge write {} pairs with node {}, which is not a backedge read",
                                node.id.0, paired_read.0
                            ),
                        )
                        .with_node(self.node_ref(node.id, None)),
                    );
                }
            }
            if matches!(node.kind, NodeKind::Mux) && node.inputs.len() < 3 {
                diagnostics.push(
                    Diagnostic::error(
                        codes::E0301,
                        format!("mux node {} needs a select and at least two operands", node.id.0),
                    )
                    .with_node(self.node_ref(node.id, None)),
                );
            }
            if let Some(msg) = self.shape_error(node) {
                diagnostics.push(
                    Diagnostic::error(codes::E0300, msg).with_node(self.node_ref(node.id, None)),
                );
            }
        }
        if diagnostics.is_empty() {
            if let Some(cycle) = self.find_data_cycle() {
                diagnostics.push(Diagnostic::error(
                    codes::E0301,
                    format!(
                        "data-edge cycle through nodes {:?}; cycles must arrive as backedge channel pairs",
                        cycle.iter().map(|n| n.0).collect::<Vec<_>>()
                    ),
                ));
            }
        }
        diagnostics
    }

    /// Port-count (and range) check per node kind. The allocators index
    /// `inputs[0]` / `outputs[0]` by shape, so a malformed node must be
    /// rejected here rather than panic later.
    fn shape_error(&self, node: &Node) -> Option<String> {
        let want = match &node.kind {
            NodeKind::Op(OpKind::Not) => (1, 1),
            NodeKind::Op(_) => (2, 1),
            NodeKind::Const(_) | NodeKind::Read(_) | NodeKind::BackedgeRead(_) => (0, 1),
            NodeKind::Write(_) => (1, 0),
            NodeKind::BackedgeWrite { min_depth, .. } => {
                if *min_depth > 1 {
                    return Some(format!(
                        "backedge write {} requires channel depth {}; only depth-1 register channels are lowered",
                        node.id.0, min_depth
                    ));
                }
                (1, 0)
            }
            NodeKind::LoopGate => (1, 1),
            NodeKind::PartRef { of, lsb, width } => {
                let src = &self.nodes[of.index()];
                let Some(&out) = src.outputs.first() else {
                    return Some(format!("part_ref source node {} has no output", of.0));
                };
                let src_width = self.ports[out.index()].width;
                if lsb + width > src_width {
                    return Some(format!(
                        "part_ref [{}+:{}] exceeds the {}-bit output of node {}",
                        lsb, width, src_width, of.0
                    ));
                }
                (0, 1)
            }
            // Mux input arity is checked above; Sync is ordering-only.
            NodeKind::Mux => return (node.outputs.len() != 1).then(|| {
                format!("mux node {} must have exactly one output", node.id.0)
            }),
            NodeKind::Sync => return None,
        };
        if node.inputs.len() != want.0 || node.outputs.len() != want.1 {
            return Some(format!(
                "{} node {} has {} inputs and {} outputs, expected {} and {}",
                node.kind.label(),
                node.id.0,
                node.inputs.len(),
                node.outputs.len(),
                want.0,
                want.1
            ));
        }
        None
    }

    /// Detect a cycle in the combined data + ordering edge relation.
    fn find_data_cycle(&self) -> Option<Vec<NodeId>> {
        // Kahn over data + ordering edges; leftovers form cycles.
        let mut in_degree = vec![0usize; self.nodes.len()];
        for node in self.node_ids() {
            for succ in self.data_succs(node) {
                in_degree[succ.index()] += 1;
            }
            for &succ in self.ordering_succs(node) {
                in_degree[succ.index()] += 1;
            }
        }
        let mut queue: Vec<NodeId> = self
            .node_ids()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();
        let mut seen = 0usize;
        while let Some(node) = queue.pop() {
            seen += 1;
            let mut succs = self.data_succs(node);
            succs.extend_from_slice(self.ordering_succs(node));
            for succ in succs {
                in_degree[succ.index()] -= 1;
                if in_degree[succ.index()] == 0 {
                    queue.push(succ);
                }
            }
        }
        if seen == self.nodes.len() {
            None
        } else {
            Some(
                self.node_ids()
                    .filter(|n| in_degree[n.index()] > 0)
                    .collect(),
            )
        }
    }

    /// Deterministic topological order over data + ordering edges,
    /// tie-broken by NodeId. Shared by the scheduler and the allocators.
    pub fn topo_order(&self) -> Vec<NodeId> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for node in self.node_ids() {
            for succ in self.data_succs(node) {
                in_degree[succ.index()] += 1;
            }
            for &succ in self.ordering_succs(node) {
                in_degree[succ.index()] += 1;
            }
        }
        let mut ready: Vec<NodeId> = self
            .node_ids()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();
        ready.sort();
        let mut ready: std::collections::VecDeque<NodeId> = ready.into();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_front() {
            order.push(node);
            let mut succs = self.data_succs(node);
            succs.extend_from_slice(self.ordering_succs(node));
            for succ in succs {
                in_degree[succ.index()] -= 1;
                if in_degree[succ.index()] == 0 {
                    // Insert keeping the queue sorted for determinism.
                    let pos = ready.iter().position(|&r| r > succ).unwrap_or(ready.len());
                    ready.insert(pos, succ);
                }
            }
        }
        order
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for Netlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Netlist ({} nodes, {} ports, {} interfaces)",
            self.nodes.len(),
            self.ports.len(),
            self.interfaces.len()
        )?;
        for node in &self.nodes {
            writeln!(
                f,
                "  n{}: {} '{}' ({} in, {} out, pre={}, post={})",
                node.id.0,
                node.kind.label(),
                node.name,
                node.inputs.len(),
                node.outputs.len(),
                node.pre_latency,
                node.post_latency
            )?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
