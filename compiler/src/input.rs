// input.rs — JSON netlist loader
//
// Deserializes the front end's netlist exchange format into the arena
// model. The format is index-based: nodes reference interfaces and other
// nodes by their position in the respective arrays, and edges are
// `[node, port]` pairs. Structural problems found while building (bad
// indices, unknown operators, duplicate drivers) are reported as E0301
// diagnostics rather than panics, since the input comes from outside the
// process.
//
// Preconditions: none.
// Postconditions: on success the returned netlist passes the index
//                 consistency checks done here; `validate()` still runs
//                 as its own pass.
// Failure modes: malformed JSON or inconsistent indices (E0301).
// Side effects: none.

use serde::Deserialize;

use crate::diag::{codes, Diagnostic};
use crate::id::NodeId;
use crate::netlist::{InterfaceKind, Netlist, NodeKind, OpKind, PortDir};

// ── Exchange format ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NetlistDto {
    #[serde(default)]
    interfaces: Vec<InterfaceDto>,
    #[serde(default)]
    nodes: Vec<NodeDto>,
    #[serde(default)]
    data_edges: Vec<EdgeDto>,
    #[serde(default)]
    ordering_edges: Vec<(usize, usize)>,
}

#[derive(Debug, Deserialize)]
struct InterfaceDto {
    name: String,
    #[serde(default)]
    kind: InterfaceKindDto,
    #[serde(default = "default_concurrency")]
    max_concurrent: u32,
}

fn default_concurrency() -> u32 {
    1
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum InterfaceKindDto {
    #[default]
    Handshake,
    Wire,
}

#[derive(Debug, Deserialize)]
struct NodeDto {
    name: String,
    kind: NodeKindDto,
    #[serde(default)]
    in_widths: Vec<u32>,
    #[serde(default)]
    out_widths: Vec<u32>,
    pre_latency: f64,
    #[serde(default)]
    post_latency: f64,
}

/// Internally tagged node kind. Operators are carried as their mnemonic
/// string so the set can grow without a wire-format change.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum NodeKindDto {
    Op { op: String },
    Const { value: u64 },
    Read { iface: usize },
    Write { iface: usize },
    Mux,
    Sync,
    LoopGate,
    BackedgeRead { iface: usize },
    BackedgeWrite {
        iface: usize,
        paired_read: usize,
        #[serde(default = "default_depth")]
        min_depth: u32,
    },
    PartRef { of: usize, lsb: u32, width: u32 },
}

fn default_depth() -> u32 {
    1
}

/// An edge from `[node, output-port]` to `[node, input-port]`.
#[derive(Debug, Deserialize)]
struct EdgeDto {
    from: (usize, usize),
    to: (usize, usize),
}

// ── Result ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct LoadResult {
    pub netlist: Option<Netlist>,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Loader ──────────────────────────────────────────────────────────────────

/// Parse a JSON netlist document.
pub fn load_netlist(source: &str) -> LoadResult {
    let dto: NetlistDto = match serde_json::from_str(source) {
        Ok(dto) => dto,
        Err(e) => {
            return LoadResult {
                netlist: None,
                diagnostics: vec![Diagnostic::error(
                    codes::E0301,
                    format!("netlist input is not valid JSON: {e}"),
                )],
            }
        }
    };
    build(dto)
}

fn build(dto: NetlistDto) -> LoadResult {
    let mut diagnostics = Vec::new();
    let mut netlist = Netlist::new();

    let mut ifaces = Vec::with_capacity(dto.interfaces.len());
    for iface in &dto.interfaces {
        let kind = match iface.kind {
            InterfaceKindDto::Handshake => InterfaceKind::Handshake,
            InterfaceKindDto::Wire => InterfaceKind::Wire,
        };
        ifaces.push(netlist.add_interface(iface.name.clone(), kind, iface.max_concurrent));
    }

    let node_count = dto.nodes.len();
    let iface_of = |idx: usize, node: &NodeDto, diagnostics: &mut Vec<Diagnostic>| {
        if idx < ifaces.len() {
            Some(ifaces[idx])
        } else {
            diagnostics.push(Diagnostic::error(
                codes::E0301,
                format!(
                    "node `{}` references interface {idx}, but only {} are declared",
                    node.name,
                    ifaces.len()
                ),
            ));
            None
        }
    };
    let node_ref = |idx: usize, node: &NodeDto, diagnostics: &mut Vec<Diagnostic>| {
        if idx < node_count {
            Some(NodeId(idx as u32))
        } else {
            diagnostics.push(Diagnostic::error(
                codes::E0301,
                format!(
                    "node `{}` references node {idx}, but only {node_count} are declared",
                    node.name
                ),
            ));
            None
        }
    };

    for node in &dto.nodes {
        let kind = match &node.kind {
            NodeKindDto::Op { op } => match op_from_mnemonic(op) {
                Some(op) => NodeKind::Op(op),
                None => {
                    diagnostics.push(Diagnostic::error(
                        codes::E0301,
                        format!("node `{}` has unknown operator `{op}`", node.name),
                    ));
                    continue;
                }
            },
            NodeKindDto::Const { value } => NodeKind::Const(*value),
            NodeKindDto::Read { iface } => match iface_of(*iface, node, &mut diagnostics) {
                Some(i) => NodeKind::Read(i),
                None => continue,
            },
            NodeKindDto::Write { iface } => match iface_of(*iface, node, &mut diagnostics) {
                Some(i) => NodeKind::Write(i),
                None => continue,
            },
            NodeKindDto::Mux => NodeKind::Mux,
            NodeKindDto::Sync => NodeKind::Sync,
            NodeKindDto::LoopGate => NodeKind::LoopGate,
            NodeKindDto::BackedgeRead { iface } => {
                match iface_of(*iface, node, &mut diagnostics) {
                    Some(i) => NodeKind::BackedgeRead(i),
                    None => continue,
                }
            }
            NodeKindDto::BackedgeWrite {
                iface,
                paired_read,
                min_depth,
            } => {
                let iface = iface_of(*iface, node, &mut diagnostics);
                let paired = node_ref(*paired_read, node, &mut diagnostics);
                match (iface, paired) {
                    (Some(iface), Some(paired_read)) => NodeKind::BackedgeWrite {
                        iface,
                        paired_read,
                        min_depth: *min_depth,
                    },
                    _ => continue,
                }
            }
            NodeKindDto::PartRef { of, lsb, width } => {
                match node_ref(*of, node, &mut diagnostics) {
                    Some(of) => NodeKind::PartRef {
                        of,
                        lsb: *lsb,
                        width: *width,
                    },
                    None => continue,
                }
            }
        };
        netlist.add_node(
            node.name.clone(),
            kind,
            &node.in_widths,
            &node.out_widths,
            node.pre_latency,
            node.post_latency,
        );
    }

    // Node indices must have survived intact for edges to make sense.
    if crate::diag::has_errors(&diagnostics) {
        return LoadResult {
            netlist: None,
            diagnostics,
        };
    }

    for edge in &dto.data_edges {
        match (
            port_at(&netlist, edge.from, PortDir::Out),
            port_at(&netlist, edge.to, PortDir::In),
        ) {
            (Some(from), Some(to)) => {
                if netlist.port(to).driver.is_some() {
                    diagnostics.push(Diagnostic::error(
                        codes::E0301,
                        format!(
                            "input {} of node {} is driven by more than one edge",
                            edge.to.1, edge.to.0
                        ),
                    ));
                } else {
                    netlist.connect(from, to);
                }
            }
            _ => diagnostics.push(Diagnostic::error(
                codes::E0301,
                format!(
                    "edge [{},{}] -> [{},{}] references a port that does not exist",
                    edge.from.0, edge.from.1, edge.to.0, edge.to.1
                ),
            )),
        }
    }

    for &(before, after) in &dto.ordering_edges {
        if before >= node_count || after >= node_count {
            diagnostics.push(Diagnostic::error(
                codes::E0301,
                format!("ordering edge {before} -> {after} references a missing node"),
            ));
        } else {
            netlist.add_ordering(NodeId(before as u32), NodeId(after as u32));
        }
    }

    let ok = !crate::diag::has_errors(&diagnostics);
    LoadResult {
        netlist: ok.then_some(netlist),
        diagnostics,
    }
}

fn port_at(
    netlist: &Netlist,
    (node, port): (usize, usize),
    dir: PortDir,
) -> Option<crate::id::PortId> {
    if node >= netlist.node_ids().count() {
        return None;
    }
    let n = netlist.node(NodeId(node as u32));
    let list = match dir {
        PortDir::Out => &n.outputs,
        PortDir::In => &n.inputs,
    };
    list.get(port).copied()
}

fn op_from_mnemonic(s: &str) -> Option<OpKind> {
    let op = match s {
        "add" => OpKind::Add,
        "sub" => OpKind::Sub,
        "mul" => OpKind::Mul,
        "and" => OpKind::And,
        "or" => OpKind::Or,
        "xor" => OpKind::Xor,
        "not" => OpKind::Not,
        "eq" => OpKind::Eq,
        "ne" => OpKind::Ne,
        "lt" => OpKind::Lt,
        "shl" => OpKind::Shl,
        "shr" => OpKind::Shr,
        _ => return None,
    };
    Some(op)
}

// ── Tests ───────────────────────────────────────────────────────────────────
