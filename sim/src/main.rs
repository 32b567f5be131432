use std::path::PathBuf;

use anyhow::{bail, Result};
use binutils::clap;
use clap::Parser;
use relay_sim::{
    build, free_run, run_script, MachineKind, TestBundle, TraceLevel,
};

// Relay hardware validator: simulate a test program and check it
// against the reference comparison file.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Test name (subfolder of the tests folder)
    test: String,

    /// Trace level: [N]one, [I]nstruction, [C]lock or [S]ettle
    #[arg(short, long, default_value = "i")]
    trace: TraceLevel,

    /// Hardware revision to simulate
    #[arg(short, long, default_value = "v2")]
    machine: MachineKind,

    /// Pin the settling-order shuffle for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Folder containing the test subfolders
    #[arg(long, default_value = "Tests")]
    tests_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.trace >= TraceLevel::Clock {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    binutils::logging_setup(log_level, None::<&std::fs::File>);

    let dir = args.tests_dir.join(&args.test);
    if !dir.exists() {
        bail!("{}: does not exist", dir.display());
    }
    if !dir.is_dir() {
        bail!("{}: not a folder", dir.display());
    }

    let bundle = TestBundle::load(&dir, &args.test)?;
    let (mut machine, signals) = build(args.machine, bundle.code, bundle.asm, args.seed)?;

    if args.trace != TraceLevel::Off {
        relay_sim::report::print_machine(&machine)?;
    }

    // One instruction with RESET held, then release it.
    let (signals, _) = machine.cycle(signals, TraceLevel::Off, 0)?;
    machine.drop_reset()?;

    match &bundle.script {
        Some(script) => {
            run_script(
                &mut machine,
                signals,
                script,
                bundle.results.as_deref(),
                args.trace,
            )?;
            println!("# SCRIPT VALIDATED CORRECTLY!");
        }
        None => {
            free_run(&mut machine, signals, args.trace)?;
            println!(
                "# Program halted at PC = {}.",
                machine.register_value("PC")?
            );
        }
    }
    Ok(())
}
