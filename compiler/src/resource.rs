// resource.rs — Value Resource: per-value register-chain retiming
//
// Wraps one produced signal and lazily materializes the pipeline/FSM
// registers that carry it from its production clock to every later
// consumption clock. Incarnation 0 is the combinational origin; each
// later incarnation is a register fed by its predecessor, unless the
// target clock lies in a persistence range, in which case the nearest
// prior incarnation is reused (the value is already held stable, e.g. by
// FSM state residency).
//
// Preconditions: persistence ranges must be fixed before any `get` beyond
//                the origin clock (checked, E0204).
// Postconditions: `get` is idempotent; repeated calls allocate nothing new.
// Failure modes: a clock earlier than the origin is a fatal internal
//                error (E0205 — a backward-edge channel was missed).
// Side effects: `get` may allocate registers in the RTL arena.

use std::fmt;

use crate::diag::{codes, Diagnostic};
use crate::id::{ElementId, SignalId};
use crate::rtl::RtlArena;

/// One link in the register chain: the signal valid at one clock index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Incarnation {
    pub signal: SignalId,
    /// False when this clock is covered by a persistence range and the
    /// previous incarnation's signal is reused.
    pub is_reg: bool,
}

/// The register-chain abstraction for one produced value.
#[derive(Debug, Clone)]
pub struct ValueResource {
    name: String,
    width: u32,
    origin_clock: i64,
    owner: ElementId,
    /// Index i holds the incarnation valid at clock `origin_clock + i`.
    /// Entry 0 is the origin and is never a register.
    incarnations: Vec<Incarnation>,
    /// Disjoint inclusive clock-index intervals, sorted.
    persistence: Vec<(i64, i64)>,
}

impl ValueResource {
    pub fn new(
        origin: SignalId,
        width: u32,
        origin_clock: i64,
        owner: ElementId,
        name: impl Into<String>,
    ) -> Self {
        ValueResource {
            name: name.into(),
            width,
            origin_clock,
            owner,
            incarnations: vec![Incarnation {
                signal: origin,
                is_reg: false,
            }],
            persistence: Vec::new(),
        }
    }

    pub fn owner(&self) -> ElementId {
        self.owner
    }

    pub fn origin_clock(&self) -> i64 {
        self.origin_clock
    }

    pub fn origin_signal(&self) -> SignalId {
        self.incarnations[0].signal
    }

    /// Last clock index the chain currently reaches.
    pub fn last_clock(&self) -> i64 {
        self.origin_clock + self.incarnations.len() as i64 - 1
    }

    /// Chain length in incarnations (origin included).
    pub fn chain_len(&self) -> usize {
        self.incarnations.len()
    }

    fn persistent_at(&self, clock: i64) -> bool {
        self.persistence.iter().any(|&(a, b)| a <= clock && clock <= b)
    }

    /// Mark [from, to] (inclusive clock indices) as requiring no new
    /// incarnations. Must be decided up front: calling this after the
    /// chain has grown past the origin is a usage-order error.
    pub fn mark_persistent(&mut self, from: i64, to: i64) -> Result<(), Diagnostic> {
        if self.incarnations.len() > 1 {
            return Err(Diagnostic::error(
                codes::E0204,
                format!(
                    "persistence [{from}, {to}] set on '{}' after {} incarnations already exist",
                    self.name,
                    self.incarnations.len()
                ),
            ));
        }
        if from > to {
            return Ok(());
        }
        debug_assert!(
            !self.persistence.iter().any(|&(a, b)| from <= b && a <= to),
            "overlapping persistence ranges on '{}'",
            self.name
        );
        self.persistence.push((from, to));
        self.persistence.sort_unstable();
        Ok(())
    }

    /// The incarnation valid at `clock`, allocating intermediate
    /// registers on demand. Names are deterministic: `{origin}_c{clock}`.
    pub fn get(&mut self, rtl: &mut RtlArena, clock: i64) -> Result<SignalId, Diagnostic> {
        if clock < self.origin_clock {
            return Err(Diagnostic::error(
                codes::E0205,
                format!(
                    "value '{}' requested at clock {} before its origin clock {}; \
                     a backward-edge channel should have carried it",
                    self.name, clock, self.origin_clock
                ),
            ));
        }
        let offset = (clock - self.origin_clock) as usize;
        while self.incarnations.len() <= offset {
            let next_clock = self.origin_clock + self.incarnations.len() as i64;
            let prev = self.incarnations[self.incarnations.len() - 1];
            if self.persistent_at(next_clock) {
                // Covered: the prior incarnation stays valid, no register.
                self.incarnations.push(Incarnation {
                    signal: prev.signal,
                    is_reg: false,
                });
            } else {
                let reg = rtl.reg(format!("{}_c{}", self.name, next_clock), self.width, None);
                self.incarnations.push(Incarnation {
                    signal: reg,
                    is_reg: true,
                });
            }
        }
        Ok(self.incarnations[offset].signal)
    }

    /// Non-allocating lookup: is there a register incarnation exactly at
    /// `clock`? Used for stage/state boundary bookkeeping (finding which
    /// register's load-enable needs gating).
    pub fn exists_at(&self, clock: i64) -> bool {
        if clock < self.origin_clock {
            return false;
        }
        let offset = (clock - self.origin_clock) as usize;
        self.incarnations
            .get(offset)
            .is_some_and(|inc| inc.is_reg)
    }

    /// Non-allocating lookup of the signal valid at `clock`, if the chain
    /// already reaches it.
    pub fn signal_at(&self, clock: i64) -> Option<SignalId> {
        if clock < self.origin_clock {
            return None;
        }
        self.incarnations
            .get((clock - self.origin_clock) as usize)
            .map(|inc| inc.signal)
    }

    /// Register links of the chain: (clock, source signal, register),
    /// one per materialized register, in clock order. The owning element
    /// turns each into a load statement gated by the acknowledge of the
    /// stage/state ending at `clock - 1`.
    pub fn reg_links(&self) -> Vec<(i64, SignalId, SignalId)> {
        let mut links = Vec::new();
        for (i, inc) in self.incarnations.iter().enumerate().skip(1) {
            if inc.is_reg {
                links.push((
                    self.origin_clock + i as i64,
                    self.incarnations[i - 1].signal,
                    inc.signal,
                ));
            }
        }
        links
    }
}

impl fmt::Display for ValueResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' origin_clk={} chain={} persist={:?}",
            self.name,
            self.origin_clock,
            self.incarnations.len(),
            self.persistence
        )
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(rtl: &mut RtlArena) -> ValueResource {
        let origin = rtl.wire("v", 16);
        ValueResource::new(origin, 16, 0, ElementId(0), "v")
    }

    #[test]
    fn origin_needs_no_register() {
        let mut rtl = RtlArena::new();
        let mut r = resource(&mut rtl);
        let s = r.get(&mut rtl, 0).unwrap();
        assert_eq!(s, r.origin_signal());
        assert_eq!(rtl.reg_count(), 0);
    }

    #[test]
    fn chain_allocates_one_register_per_clock() {
        let mut rtl = RtlArena::new();
        let mut r = resource(&mut rtl);
        let s3 = r.get(&mut rtl, 3).unwrap();
        assert_eq!(rtl.reg_count(), 3);
        assert_eq!(rtl.signal(s3).name, "v_c3");
        assert_eq!(r.reg_links().len(), 3);
    }

    #[test]
    fn get_is_idempotent() {
        let mut rtl = RtlArena::new();
        let mut r = resource(&mut rtl);
        let a = r.get(&mut rtl, 2).unwrap();
        let regs = rtl.reg_count();
        let b = r.get(&mut rtl, 2).unwrap();
        let c = r.get(&mut rtl, 1).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(rtl.reg_count(), regs, "no duplicate registers");
    }

    #[test]
    fn persistence_reuses_prior_incarnation() {
        let mut rtl = RtlArena::new();
        let mut r = resource(&mut rtl);
        r.mark_persistent(2, 5).unwrap();
        // Clock 1 needs one register; clocks 2..=5 reuse it.
        let s1 = r.get(&mut rtl, 1).unwrap();
        let s4 = r.get(&mut rtl, 4).unwrap();
        assert_eq!(s1, s4);
        assert_eq!(rtl.reg_count(), 1);
        assert!(r.exists_at(1));
        assert!(!r.exists_at(4));
    }

    #[test]
    fn persistence_after_growth_is_an_error() {
        let mut rtl = RtlArena::new();
        let mut r = resource(&mut rtl);
        r.get(&mut rtl, 1).unwrap();
        let err = r.mark_persistent(2, 4).unwrap_err();
        assert_eq!(err.code, Some(codes::E0204));
    }

    #[test]
    fn before_origin_is_an_error() {
        let mut rtl = RtlArena::new();
        let origin = rtl.wire("w", 8);
        let mut r = ValueResource::new(origin, 8, 5, ElementId(0), "w");
        let err = r.get(&mut rtl, 4).unwrap_err();
        assert_eq!(err.code, Some(codes::E0205));
    }

    #[test]
    fn exists_at_is_non_allocating() {
        let mut rtl = RtlArena::new();
        let r = resource(&mut rtl);
        assert!(!r.exists_at(2));
        assert_eq!(rtl.reg_count(), 0);
        assert_eq!(r.signal_at(2), None);
        assert_eq!(r.signal_at(0), Some(r.origin_signal()));
    }

    #[test]
    fn reg_links_skip_persistent_clocks() {
        let mut rtl = RtlArena::new();
        let mut r = resource(&mut rtl);
        r.mark_persistent(2, 3).unwrap();
        r.get(&mut rtl, 4).unwrap();
        // Registers at clocks 1 and 4; clocks 2-3 covered.
        let links = r.reg_links();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].0, 1);
        assert_eq!(links[1].0, 4);
        // The clock-4 register is fed by the clock-1 register's value.
        assert_eq!(links[1].1, links[0].2);
    }
}
