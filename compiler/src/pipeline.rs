// pipeline.rs — Compilation state and pass orchestration
//
// Holds all pass artifacts in one struct and runs the minimal set of
// passes for a given terminal PassId. Every stage with a verification
// certificate is checked immediately after it runs; a failing obligation
// is an error-level diagnostic like any other.
//
// Preconditions: `state.netlist` is set before `run_pipeline`.
// Postconditions: artifacts for all required passes are populated, or
//                 `has_error` is set.
// Failure modes: any pass emitting error-level diagnostics.
// Side effects: calls `on_pass_complete` after each pass for immediate
//               display.

use std::time::Instant;

use crate::clock::ClockModel;
use crate::connect::{self, Architecture};
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::discover::{ArchPlan, DiscoverOptions};
use crate::netlist::Netlist;
use crate::pass::{PassId, StageCert};
use crate::schedule::{ScheduleOptions, ScheduledNetlist};

// ── Options and artifacts ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub clock: ClockModel,
    pub schedule: ScheduleOptions,
    pub discover: DiscoverOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            clock: ClockModel::from_freq_hz(100.0e6),
            schedule: ScheduleOptions::default(),
            discover: DiscoverOptions::default(),
        }
    }
}

/// Provenance metadata for hermetic builds and cache-key use.
///
/// `input_hash`: SHA-256 of the raw netlist input text.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub input_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the input hash (64 characters).
    pub fn input_hash_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.input_hash {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
        }
        s
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"input_hash\": \"{}\",\n  \"manifest_schema_version\": 1,\n  \"compiler_version\": \"{}\"\n}}\n",
            self.input_hash_hex(),
            self.compiler_version,
        )
    }
}

/// Compute provenance from the raw input text.
pub fn compute_provenance(input: &str) -> Provenance {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    let mut input_hash = [0u8; 32];
    input_hash.copy_from_slice(&result);
    Provenance {
        input_hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub netlist: Netlist,
    pub schedule: Option<ScheduledNetlist>,
    pub plan: Option<ArchPlan>,
    pub architecture: Option<Architecture>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn new(netlist: Netlist) -> Self {
        CompilationState {
            netlist,
            schedule: None,
            plan: None,
            architecture: None,
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }
}

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    pub failing_pass: PassId,
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Per-pass post-processing: callback, accumulate, verbose, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: std::time::Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = crate::diag::has_errors(&diags);
    state.diagnostics.extend(diags);
    if verbose {
        eprintln!(
            "nac: {} complete, {:.1}ms",
            pass_id.name(),
            elapsed.as_secs_f64() * 1000.0
        );
    }
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

/// Turn a failed certificate into an E0500 diagnostic.
fn cert_failure(stage: &str, cert: &dyn StageCert) -> Option<Diagnostic> {
    if cert.all_pass() {
        return None;
    }
    let failed: Vec<&str> = cert
        .obligations()
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect();
    Some(
        Diagnostic::new(
            DiagLevel::Error,
            format!("{stage} verification failed: {}", failed.join(", ")),
        )
        .with_code(codes::E0500),
    )
}

// ── Pipeline runner ─────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute, on_pass_complete callback, verbose line,
/// error check.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &CompileOptions,
    verbose: bool,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    let mut passes: Vec<PassId> = terminal.required_passes().to_vec();
    passes.push(terminal);

    for &pass_id in &passes {
        match pass_id {
            PassId::Validate => {
                let t = Instant::now();
                let diags = state.netlist.validate();
                finish_pass(
                    state,
                    PassId::Validate,
                    diags,
                    t.elapsed(),
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
            PassId::Schedule => {
                let t = Instant::now();
                let result =
                    crate::schedule::schedule(&state.netlist, options.clock, &options.schedule);
                let mut diags = result.diagnostics;
                if let Some(sched) = &result.schedule {
                    let cert = crate::schedule::verify_schedule(&state.netlist, sched);
                    diags.extend(cert_failure("schedule", &cert));
                }
                state.schedule = result.schedule;
                finish_pass(
                    state,
                    PassId::Schedule,
                    diags,
                    t.elapsed(),
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
            PassId::Discover => {
                let t = Instant::now();
                let sched = state.schedule.as_ref().expect("schedule pass ran");
                let result = crate::discover::discover(&state.netlist, sched, &options.discover);
                state.plan = Some(result.plan);
                finish_pass(
                    state,
                    PassId::Discover,
                    result.diagnostics,
                    t.elapsed(),
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
            PassId::Architect => {
                let t = Instant::now();
                let sched = state.schedule.as_ref().expect("schedule pass ran");
                let plan = state.plan.as_ref().expect("discover pass ran");
                let result = connect::connect(&state.netlist, sched, plan);
                let mut diags = result.diagnostics;
                if let Some(arch) = &result.architecture {
                    let cert = connect::verify_architecture(&state.netlist, sched, plan, arch);
                    diags.extend(cert_failure("architecture", &cert));
                }
                state.architecture = result.architecture;
                finish_pass(
                    state,
                    PassId::Architect,
                    diags,
                    t.elapsed(),
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::{InterfaceKind, NodeKind, OpKind};

    fn chain_netlist() -> Netlist {
        let mut n = Netlist::new();
        let din = n.add_interface("din", InterfaceKind::Handshake, 1);
        let dout = n.add_interface("dout", InterfaceKind::Handshake, 1);
        let rd = n.add_node("rd", NodeKind::Read(din), &[], &[32], 0.5, 0.0);
        let add = n.add_node("acc", NodeKind::Op(OpKind::Add), &[32, 32], &[32], 1.0, 0.0);
        let wr = n.add_node("wr", NodeKind::Write(dout), &[32], &[], 0.5, 0.0);
        n.connect(n.output(rd, 0), n.input(add, 0));
        n.connect(n.output(rd, 0), n.input(add, 1));
        n.connect(n.output(add, 0), n.input(wr, 0));
        n
    }

    #[test]
    fn full_pipeline_produces_architecture() {
        let mut state = CompilationState::new(chain_netlist());
        let mut seen = Vec::new();
        run_pipeline(
            &mut state,
            PassId::Architect,
            &CompileOptions::default(),
            false,
            |id, _| seen.push(id),
        )
        .expect("pipeline");
        assert!(!state.has_error);
        assert!(state.architecture.is_some());
        assert_eq!(
            seen,
            vec![
                PassId::Validate,
                PassId::Schedule,
                PassId::Discover,
                PassId::Architect
            ]
        );
    }

    #[test]
    fn terminal_schedule_stops_early() {
        let mut state = CompilationState::new(chain_netlist());
        run_pipeline(
            &mut state,
            PassId::Schedule,
            &CompileOptions::default(),
            false,
            |_, _| {},
        )
        .expect("pipeline");
        assert!(state.schedule.is_some());
        assert!(state.plan.is_none());
        assert!(state.architecture.is_none());
    }

    #[test]
    fn validation_failure_halts() {
        let mut n = Netlist::new();
        let dout = n.add_interface("dout", InterfaceKind::Handshake, 1);
        n.add_node("wr", NodeKind::Write(dout), &[8], &[], 0.5, 0.0); // dangling input
        let mut state = CompilationState::new(n);
        let err = run_pipeline(
            &mut state,
            PassId::Architect,
            &CompileOptions::default(),
            false,
            |_, _| {},
        )
        .unwrap_err();
        assert_eq!(err.failing_pass, PassId::Validate);
        assert!(state.has_error);
        assert!(state.schedule.is_none());
    }

    #[test]
    fn malformed_node_shape_halts_validation() {
        // An operator with no inputs must be rejected up front, not
        // crash a later pass.
        let mut n = Netlist::new();
        let dout = n.add_interface("dout", InterfaceKind::Handshake, 1);
        let bad = n.add_node("bad", NodeKind::Op(OpKind::Add), &[], &[32], 1.0, 0.0);
        let wr = n.add_node("wr", NodeKind::Write(dout), &[32], &[], 0.5, 0.0);
        n.connect(n.output(bad, 0), n.input(wr, 0));
        let mut state = CompilationState::new(n);
        let err = run_pipeline(
            &mut state,
            PassId::Architect,
            &CompileOptions::default(),
            false,
            |_, _| {},
        )
        .unwrap_err();
        assert_eq!(err.failing_pass, PassId::Validate);
        assert!(state
            .diagnostics
            .iter()
            .any(|d| d.code == Some(crate::diag::codes::E0300)));
        assert!(state.architecture.is_none());
    }

    #[test]
    fn provenance_hash_is_stable() {
        let a = compute_provenance("{ \"nodes\": [] }");
        let b = compute_provenance("{ \"nodes\": [] }");
        let c = compute_provenance("{ \"nodes\": [1] }");
        assert_eq!(a.input_hash, b.input_hash);
        assert_ne!(a.input_hash, c.input_hash);
        assert_eq!(a.input_hash_hex().len(), 64);
        assert!(a.to_json().contains("compiler_version"));
    }
}
