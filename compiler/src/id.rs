// id.rs — Stable semantic identifiers for nac compiler phases
//
// These IDs provide deterministic, allocation-order identity for compiler
// artifacts. Nodes, ports, and interfaces are allocated by the netlist
// builder in front-end order; elements and signals by the architecture
// passes. All IDs are plain arena indices, so ownership and annotation
// live in side tables rather than in the objects themselves.

/// Stable identifier for a netlist node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Stable identifier for a node port (input or output endpoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

/// Stable identifier for an external interface handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(pub u32);

/// Stable identifier for an architecture element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

/// Stable identifier for an RTL signal (wire or register).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl PortId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl InterfaceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ElementId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl SignalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Allocator for element IDs. Discovery allocates in partition order;
/// the orchestrator continues the sequence for inserted buffer elements,
/// so IDs stay dense and deterministic.
#[derive(Debug, Default)]
pub struct ElementIdAllocator {
    next: u32,
}

impl ElementIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue an existing sequence (e.g. after discovery allocated
    /// `count` element IDs).
    pub fn starting_at(count: usize) -> Self {
        ElementIdAllocator {
            next: count as u32,
        }
    }

    pub fn alloc(&mut self) -> ElementId {
        let id = ElementId(self.next);
        self.next += 1;
        id
    }
}
