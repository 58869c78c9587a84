use clap::Parser;
use std::path::PathBuf;

use nac::clock::ClockModel;
use nac::pass::PassId;
use nac::pipeline::{compute_provenance, CompilationState, CompileOptions};

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    Arch,
    Schedule,
    Timing,
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "nac",
    version,
    about = "Netlist architecture compiler — converts scheduled dataflow netlists to clock-synchronous circuit descriptions"
)]
struct Cli {
    /// Input netlist JSON file
    source: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Arch)]
    emit: EmitStage,

    /// Target clock frequency in MHz
    #[arg(long, default_value_t = 100.0)]
    freq_mhz: f64,

    /// Treat single-stage pipelines as one-state FSMs
    #[arg(long)]
    single_stage_fsm: bool,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("nac: source = {}", cli.source.display());
        eprintln!("nac: emit   = {:?}", cli.emit);
        eprintln!("nac: clock  = {}MHz", cli.freq_mhz);
    }

    // ── Read and load the netlist ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("nac: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };
    let provenance = compute_provenance(&source);

    if matches!(cli.emit, EmitStage::BuildInfo) {
        write_output(cli.output.as_deref(), &provenance.to_json());
        return;
    }

    let load = nac::input::load_netlist(&source);
    for diag in &load.diagnostics {
        eprintln!("nac: {}", diag);
    }
    let netlist = match load.netlist {
        Some(n) => n,
        None => std::process::exit(1),
    };

    if cli.verbose {
        eprintln!("nac: loaded {} nodes", netlist.node_ids().count());
    }

    // ── Run the pipeline ──
    let mut options = CompileOptions::default();
    options.clock = ClockModel::from_freq_hz(cli.freq_mhz * 1.0e6);
    options.discover.single_stage_as_fsm = cli.single_stage_fsm;

    let terminal = match cli.emit {
        EmitStage::Schedule | EmitStage::Timing => PassId::Schedule,
        EmitStage::Arch => PassId::Architect,
        EmitStage::BuildInfo => unreachable!("handled above"),
    };

    let mut state = CompilationState::new(netlist);
    state.provenance = Some(provenance);
    let run = nac::pipeline::run_pipeline(
        &mut state,
        terminal,
        &options,
        cli.verbose,
        |_, diags| {
            for diag in diags {
                eprintln!("nac: {}", diag);
            }
        },
    );
    if run.is_err() {
        std::process::exit(1);
    }

    // ── Emit ──
    let sched = state.schedule.as_ref().expect("schedule artifact");
    if cli.verbose {
        eprint!("{}", nac::schedule::render_schedule(&state.netlist, sched));
    }
    let out = match cli.emit {
        EmitStage::Schedule => nac::export::export_schedule(&state.netlist, sched),
        EmitStage::Timing => nac::timing::emit_timing_chart(&state.netlist, sched),
        EmitStage::Arch => {
            let arch = state.architecture.as_ref().expect("architecture artifact");
            nac::export::export_architecture(arch)
        }
        EmitStage::BuildInfo => unreachable!("handled above"),
    };
    write_output(cli.output.as_deref(), &out);
}

fn write_output(path: Option<&std::path::Path>, contents: &str) {
    match path {
        Some(path) => {
            if let Err(e) = std::fs::write(path, contents) {
                eprintln!("nac: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        }
        None => print!("{contents}"),
    }
}
