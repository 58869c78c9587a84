// rtl.rs — RTL primitive capability layer
//
// The backend does not emit text; it builds circuit descriptions from a
// small set of primitives: named wires and registers in an arena, boolean
// condition expressions, and combinational statements (assignments,
// priority chains, state cases). A separate emission layer, outside this
// repository, turns these into HDL.
//
// Conditions are an explicit small expression builder (AND/OR/NOT over
// signal handles) instead of operator overloading, so join-construction
// logic stays inspectable and simplification rules live in one place.
//
// Preconditions: none (types plus an arena).
// Postconditions: signal handles are dense arena indices.
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::id::SignalId;
use crate::netlist::OpKind;

// ── Signals ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    /// Combinational signal.
    Wire,
    /// Clocked register with an optional reset/default value.
    Reg { init: Option<u64> },
}

#[derive(Debug, Clone)]
pub struct RtlSignal {
    pub name: String,
    pub width: u32,
    pub kind: SignalKind,
}

/// Arena of RTL signal objects. Handles are dense indices, allocated in
/// deterministic pass order, so two identical compiles produce identical
/// signal numbering.
#[derive(Debug, Default)]
pub struct RtlArena {
    signals: Vec<RtlSignal>,
}

impl RtlArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a combinational signal.
    pub fn wire(&mut self, name: impl Into<String>, width: u32) -> SignalId {
        let id = SignalId(self.signals.len() as u32);
        self.signals.push(RtlSignal {
            name: name.into(),
            width,
            kind: SignalKind::Wire,
        });
        id
    }

    /// Create a register with a default value.
    pub fn reg(&mut self, name: impl Into<String>, width: u32, init: Option<u64>) -> SignalId {
        let id = SignalId(self.signals.len() as u32);
        self.signals.push(RtlSignal {
            name: name.into(),
            width,
            kind: SignalKind::Reg { init },
        });
        id
    }

    pub fn signal(&self, id: SignalId) -> &RtlSignal {
        &self.signals[id.index()]
    }

    pub fn is_reg(&self, id: SignalId) -> bool {
        matches!(self.signals[id.index()].kind, SignalKind::Reg { .. })
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Count of register signals, for reports and tests.
    pub fn reg_count(&self) -> usize {
        self.signals
            .iter()
            .filter(|s| matches!(s.kind, SignalKind::Reg { .. }))
            .count()
    }
}

// ── Boolean condition expressions ───────────────────────────────────────────

/// Boolean condition over signal handles. Constructors fold constants so
/// `True` stays `True` through joins and never materializes a gate.
#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr {
    True,
    False,
    Sig(SignalId),
    Not(Box<BoolExpr>),
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
}

impl BoolExpr {
    pub fn and(self, other: BoolExpr) -> BoolExpr {
        match (self, other) {
            (BoolExpr::True, b) => b,
            (a, BoolExpr::True) => a,
            (BoolExpr::False, _) | (_, BoolExpr::False) => BoolExpr::False,
            (a, b) => BoolExpr::And(Box::new(a), Box::new(b)),
        }
    }

    pub fn or(self, other: BoolExpr) -> BoolExpr {
        match (self, other) {
            (BoolExpr::False, b) => b,
            (a, BoolExpr::False) => a,
            (BoolExpr::True, _) | (_, BoolExpr::True) => BoolExpr::True,
            (a, b) => BoolExpr::Or(Box::new(a), Box::new(b)),
        }
    }

    pub fn negate(self) -> BoolExpr {
        match self {
            BoolExpr::True => BoolExpr::False,
            BoolExpr::False => BoolExpr::True,
            BoolExpr::Not(inner) => *inner,
            other => BoolExpr::Not(Box::new(other)),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, BoolExpr::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, BoolExpr::False)
    }
}

impl fmt::Display for BoolExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolExpr::True => write!(f, "1"),
            BoolExpr::False => write!(f, "0"),
            BoolExpr::Sig(s) => write!(f, "s{}", s.0),
            BoolExpr::Not(e) => write!(f, "!{}", e),
            BoolExpr::And(a, b) => write!(f, "({} & {})", a, b),
            BoolExpr::Or(a, b) => write!(f, "({} | {})", a, b),
        }
    }
}

// ── Value expressions ───────────────────────────────────────────────────────

/// Combinational value expression.
#[derive(Debug, Clone, PartialEq)]
pub enum RtlExpr {
    Sig(SignalId),
    Const { value: u64, width: u32 },
    Bool(BoolExpr),
    Unary {
        op: OpKind,
        arg: Box<RtlExpr>,
    },
    Binary {
        op: OpKind,
        lhs: Box<RtlExpr>,
        rhs: Box<RtlExpr>,
    },
    /// Bit-range extraction `arg[lsb +: width]`.
    Slice {
        arg: Box<RtlExpr>,
        lsb: u32,
        width: u32,
    },
    /// Select-indexed multiplexer over `arms`.
    Mux {
        sel: Box<RtlExpr>,
        arms: Vec<RtlExpr>,
    },
}

impl RtlExpr {
    pub fn sig(id: SignalId) -> RtlExpr {
        RtlExpr::Sig(id)
    }
}

// ── Statements ──────────────────────────────────────────────────────────────

/// Per-clock-cycle circuit statement.
#[derive(Debug, Clone, PartialEq)]
pub enum RtlStmt {
    /// Unconditional combinational assignment.
    Assign { dst: SignalId, src: RtlExpr },
    /// Register load, gated by an enable condition.
    RegLoad {
        dst: SignalId,
        src: RtlExpr,
        enable: BoolExpr,
    },
    /// Priority condition chain: first matching arm drives `dst`;
    /// `default` (when present) drives it otherwise.
    CondChain {
        dst: SignalId,
        arms: Vec<(BoolExpr, RtlExpr)>,
        default: Option<RtlExpr>,
    },
    /// Case statement keyed by a state/select signal.
    Case {
        sel: SignalId,
        arms: Vec<(u64, Vec<RtlStmt>)>,
        default: Vec<RtlStmt>,
    },
}

// ── Tests ───────────────────────────────────────────────────────────────────
