// discover.rs — Architecture discovery: partition into pipeline/FSM elements
//
// Splits the scheduled netlist into independently controlled architecture
// elements. Interfaces accessed by more than one I/O node form FSMs: each
// access's same-cycle dependency/use neighborhood (flood fill over data
// and ordering edges) becomes one FSM state, states linked by a default
// round-robin transition. Everything untouched by the grouping falls per
// clock index into the global Pipeline Element's stage list.
//
// Preconditions: `sched` covers every node of `netlist`.
// Postconditions: every node is owned by exactly one element plan.
// Failure modes: none (partitioning is total); degenerate results warn.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::id::{ElementId, InterfaceId, NodeId};
use crate::netlist::Netlist;
use crate::schedule::ScheduledNetlist;

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    /// Reinterpret a single-stage pipeline as a trivial one-state FSM,
    /// for uniform downstream handling.
    pub single_stage_as_fsm: bool,
}

/// One planned FSM state: the nodes of one same-cycle neighborhood.
#[derive(Debug, Clone)]
pub struct FsmStatePlan {
    pub clock: i64,
    pub nodes: Vec<NodeId>,
}

/// Planned control discipline of an element.
#[derive(Debug, Clone)]
pub enum ElementKindPlan {
    /// Straight per-clock stages; index = absolute clock. Leading stages
    /// may be empty so clock indices stay uniform across elements.
    Pipeline { stages: Vec<Vec<NodeId>> },
    /// Multi-state FSM; states sorted by clock index.
    Fsm { states: Vec<FsmStatePlan> },
}

#[derive(Debug, Clone)]
pub struct ElementPlan {
    pub id: ElementId,
    pub name: String,
    pub kind: ElementKindPlan,
}

impl ElementPlan {
    /// All nodes owned by this element, ascending.
    pub fn owned_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = match &self.kind {
            ElementKindPlan::Pipeline { stages } => {
                stages.iter().flatten().copied().collect()
            }
            ElementKindPlan::Fsm { states } => {
                states.iter().flat_map(|s| s.nodes.iter().copied()).collect()
            }
        };
        nodes.sort();
        nodes
    }

    /// Clock indices this element has a stage/state for.
    pub fn covered_clocks(&self) -> BTreeSet<i64> {
        match &self.kind {
            ElementKindPlan::Pipeline { stages } => (0..stages.len() as i64).collect(),
            ElementKindPlan::Fsm { states } => states.iter().map(|s| s.clock).collect(),
        }
    }
}

/// The discovery artifact: element plans plus the node-ownership
/// side table (index = NodeId).
#[derive(Debug, Clone)]
pub struct ArchPlan {
    pub elements: Vec<ElementPlan>,
    pub node_owner: Vec<Option<ElementId>>,
}

impl ArchPlan {
    pub fn owner_of(&self, node: NodeId) -> Option<ElementId> {
        self.node_owner[node.index()]
    }

    pub fn element(&self, id: ElementId) -> &ElementPlan {
        &self.elements[id.index()]
    }
}

#[derive(Debug)]
pub struct DiscoverResult {
    pub plan: ArchPlan,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Partition the scheduled netlist into architecture elements.
pub fn discover(
    netlist: &Netlist,
    sched: &ScheduledNetlist,
    options: &DiscoverOptions,
) -> DiscoverResult {
    let mut ctx = DiscoverCtx::new(netlist, sched);
    ctx.group_fsm_clusters();
    ctx.build_plan(options)
}

// ── Internal context ────────────────────────────────────────────────────────

struct DiscoverCtx<'a> {
    netlist: &'a Netlist,
    sched: &'a ScheduledNetlist,
    /// Union-find over cluster indices.
    cluster_parent: Vec<usize>,
    /// Nodes claimed by FSM grouping: node -> cluster index.
    claimed: BTreeMap<NodeId, usize>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> DiscoverCtx<'a> {
    fn new(netlist: &'a Netlist, sched: &'a ScheduledNetlist) -> Self {
        DiscoverCtx {
            netlist,
            sched,
            cluster_parent: Vec::new(),
            claimed: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn find(&mut self, mut c: usize) -> usize {
        while self.cluster_parent[c] != c {
            self.cluster_parent[c] = self.cluster_parent[self.cluster_parent[c]];
            c = self.cluster_parent[c];
        }
        c
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower root wins for determinism.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.cluster_parent[hi] = lo;
            lo
        } else {
            ra
        }
    }

    fn new_cluster(&mut self) -> usize {
        let c = self.cluster_parent.len();
        self.cluster_parent.push(c);
        c
    }

    /// FSM grouping: one cluster per repeatedly-accessed interface, with
    /// each access's same-cycle neighborhood claimed into it. Overlapping
    /// neighborhoods merge clusters.
    fn group_fsm_clusters(&mut self) {
        for iface_idx in 0..self.netlist.interface_count() {
            let iface = InterfaceId(iface_idx as u32);
            let accesses: Vec<NodeId> = self
                .netlist
                .node_ids()
                .filter(|&n| self.netlist.node(n).kind.interface() == Some(iface))
                .collect();
            if accesses.len() < 2 {
                continue;
            }
            let mut cluster = self.new_cluster();
            for access in accesses {
                cluster = self.claim_neighborhood(access, cluster);
            }
        }
    }

    /// Flood fill the same-cycle dependency/use neighborhood of `seed`
    /// (data and ordering edges, both directions), claiming reached nodes
    /// into `cluster`; merges with any cluster already met.
    fn claim_neighborhood(&mut self, seed: NodeId, mut cluster: usize) -> usize {
        let clock = self.sched.start_clock(seed);
        let iface = self.netlist.node(seed).kind.interface();
        let mut queue = VecDeque::new();
        let mut seen = BTreeSet::new();
        queue.push_back(seed);
        seen.insert(seed);
        while let Some(node) = queue.pop_front() {
            if let Some(&existing) = self.claimed.get(&node) {
                cluster = self.union(cluster, existing);
            }
            self.claimed.insert(node, cluster);
            let mut neighbors = self.netlist.data_preds(node);
            neighbors.extend(self.netlist.data_succs(node));
            neighbors.extend_from_slice(self.netlist.ordering_preds(node));
            neighbors.extend_from_slice(self.netlist.ordering_succs(node));
            neighbors.sort();
            neighbors.dedup();
            for next in neighbors {
                // Accesses of other interfaces keep their own control
                // discipline; the fill stops short of them.
                let next_io = self.netlist.node(next).kind.interface();
                if next_io.is_some() && next_io != iface {
                    continue;
                }
                if self.sched.start_clock(next) == clock && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        // Re-root earlier claims that were merged into this cluster.
        let root = self.find(cluster);
        for slot in self.claimed.values_mut() {
            let mut c = *slot;
            while self.cluster_parent[c] != c {
                c = self.cluster_parent[c];
            }
            *slot = c;
        }
        root
    }

    fn build_plan(mut self, options: &DiscoverOptions) -> DiscoverResult {
        // Collect clusters: root -> (clock -> nodes).
        let claimed = std::mem::take(&mut self.claimed);
        let mut clusters: BTreeMap<usize, BTreeMap<i64, Vec<NodeId>>> = BTreeMap::new();
        for (node, cluster) in &claimed {
            let root = self.find(*cluster);
            clusters
                .entry(root)
                .or_default()
                .entry(self.sched.start_clock(*node))
                .or_default()
                .push(*node);
        }

        let mut elements = Vec::new();
        let mut node_owner: Vec<Option<ElementId>> = vec![None; self.netlist.node_count()];

        // FSM elements, in cluster-root order (deterministic: roots are
        // the lowest cluster index of each merged family, and clusters
        // were created in interface order).
        for states_by_clock in clusters.into_values() {
            let id = ElementId(elements.len() as u32);
            let states: Vec<FsmStatePlan> = states_by_clock
                .into_iter()
                .map(|(clock, nodes)| FsmStatePlan { clock, nodes })
                .collect();
            for state in &states {
                for &node in &state.nodes {
                    node_owner[node.index()] = Some(id);
                }
            }
            if states.len() == 1 {
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagLevel::Warning,
                        format!("FSM element fsm{} collapsed to a single state", id.0),
                    )
                    .with_code(codes::W0400),
                );
            }
            elements.push(ElementPlan {
                id,
                name: format!("fsm{}", id.0),
                kind: ElementKindPlan::Fsm { states },
            });
        }

        // Global pipeline element from everything unclaimed, bucketed per
        // clock index with leading empty stages preserved.
        let unclaimed: Vec<NodeId> = self
            .netlist
            .node_ids()
            .filter(|n| node_owner[n.index()].is_none())
            .collect();
        if !unclaimed.is_empty() {
            let max_clock = unclaimed
                .iter()
                .map(|&n| self.sched.start_clock(n))
                .max()
                .unwrap_or(0);
            let mut stages: Vec<Vec<NodeId>> = vec![Vec::new(); (max_clock + 1) as usize];
            for &node in &unclaimed {
                stages[self.sched.start_clock(node) as usize].push(node);
            }
            let id = ElementId(elements.len() as u32);
            for &node in &unclaimed {
                node_owner[node.index()] = Some(id);
            }
            let non_empty = stages.iter().filter(|s| !s.is_empty()).count();
            if options.single_stage_as_fsm && non_empty == 1 {
                let (clock, nodes) = stages
                    .iter()
                    .enumerate()
                    .find(|(_, s)| !s.is_empty())
                    .map(|(c, s)| (c as i64, s.clone()))
                    .unwrap_or((0, Vec::new()));
                elements.push(ElementPlan {
                    id,
                    name: format!("fsm{}", id.0),
                    kind: ElementKindPlan::Fsm {
                        states: vec![FsmStatePlan { clock, nodes }],
                    },
                });
            } else {
                elements.push(ElementPlan {
                    id,
                    name: format!("pipe{}", id.0),
                    kind: ElementKindPlan::Pipeline { stages },
                });
            }
        }

        DiscoverResult {
            plan: ArchPlan {
                elements,
                node_owner,
            },
            diagnostics: self.diagnostics,
        }
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for ArchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ArchPlan ({} elements)", self.elements.len())?;
        for elem in &self.elements {
            match &elem.kind {
                ElementKindPlan::Pipeline { stages } => {
                    writeln!(f, "  {} [pipeline, {} stages]", elem.name, stages.len())?;
                    for (i, stage) in stages.iter().enumerate() {
                        if !stage.is_empty() {
                            let ids: Vec<u32> = stage.iter().map(|n| n.0).collect();
                            writeln!(f, "    stage {}: nodes {:?}", i, ids)?;
                        }
                    }
                }
                ElementKindPlan::Fsm { states } => {
                    writeln!(f, "  {} [fsm, {} states]", elem.name, states.len())?;
                    for (i, state) in states.iter().enumerate() {
                        let ids: Vec<u32> = state.nodes.iter().map(|n| n.0).collect();
                        writeln!(f, "    state {} (clk {}): nodes {:?}", i, state.clock, ids)?;
                    }
                }
            }
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
