//! The two supported hardware revisions, wired board by board.
//!
//! Combining overlapping phase lines like S1,S2,S3 into one control
//! signal looks redundant, but it mirrors the physical matrix: control
//! windows are built from two-phase pulses precisely so they cannot
//! flicker at a clock edge.

use anyhow::Result;

use crate::framework::{Machine, MachineBuilder};
use crate::hardware::Board;
use crate::report::TraceLevel;
use crate::signal::{SignalMap, Value};

/// Which hardware revision to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineKind {
    /// 10-phase wiring with dedicated ALUOUT/ALUCC latches.
    V1,
    /// 5-phase wiring with the ASAV/XREG/YREG staging registers.
    V2,
}

impl std::str::FromStr for MachineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "v1" => Ok(MachineKind::V1),
            "v2" => Ok(MachineKind::V2),
            _ => anyhow::bail!("unknown machine revision [{s}]; expected v1 or v2"),
        }
    }
}

pub fn build(
    kind: MachineKind,
    code: Vec<u16>,
    asm: Option<Vec<String>>,
    seed: Option<u64>,
) -> Result<(Machine, SignalMap)> {
    match kind {
        MachineKind::V1 => ten_phase(code, asm, seed),
        MachineKind::V2 => five_phase(code, asm, seed),
    }
}

fn prev_snapshot() -> Board {
    Board::mocked(
        "PREV",
        vec![
            ("_A", Value::Word(0)),
            ("_D", Value::Word(0)),
            // Sentinel -1: the halt comparison must not fire before the
            // first real cycle has taken a snapshot.
            ("_PC", Value::Word(0xFFFF)),
            ("_RESET", Value::Bit(false)),
            ("_M", Value::Word(0)),
        ],
    )
}

/// Raise RESET and settle once, so callers receive a machine already
/// held in its reset posture.
fn finish(builder: MachineBuilder, seed: Option<u64>) -> Result<(Machine, SignalMap)> {
    let mut machine = builder.build(seed)?;
    machine.raise_reset()?;
    let signals = machine.initial_signals();
    let signals = machine.settle(signals, TraceLevel::Off)?;
    Ok((machine, signals))
}

/// V1: the 10-phase wiring. The ALU result and flags are caught in
/// dedicated latches mid-cycle, registers are written at phase 6 and
/// the PC at phase 8; a branch therefore reads AREG live, after any
/// write to it.
pub fn ten_phase(
    code: Vec<u16>,
    asm: Option<Vec<String>>,
    seed: Option<u64>,
) -> Result<(Machine, SignalMap)> {
    tracing::info!("loading hardware V1 simulation");
    let mut b = MachineBuilder::new("v1");

    b.add(Board::reset("RESET", ["RESET", "~RESET"]).with_sequence(-100))?;
    b.add(Board::clock("CLOCK"))?;

    b.add(Board::rom("ROM", "PC", ["ROM", "ASM"], code, asm)?)?;
    b.add(Board::ram(
        "RAM",
        ["AREG", "ALUOUT", "CLRMEM", "STOMEM", "STOM"],
    ))?;

    b.add(Board::register("AREG", ["AMUX", "CLRAD", "STOAD", "STOA"]).with_sequence(-90))?;
    b.add(Board::register("DREG", ["ALUOUT", "CLRAD", "STOAD", "STOD"]).with_sequence(-80))?;
    b.add(
        Board::register("PC", ["PCMUX", "CLRPC", "STOPC", "TRUE"])
            .powered_by(&["~RESET"])
            .with_sequence(-70),
    )?;

    b.add(
        Board::alu(
            "ALU",
            ["DREG", "ALUMUX", "ZX", "NX", "ZY", "NY", "F", "NO"],
            ["ALU", "CCZR", "CCNG"],
        )
        .powered_by(&["ALUON"])
        .with_sequence(-50),
    )?;
    b.add(
        Board::register("ALUOUT", ["ALU", "CLRALU", "STOALU", "TRUE"])
            .powered_by(&["ALUOUTON"])
            .with_sequence(-40),
    )?;
    b.add(
        Board::condition_codes(
            "ALUCC",
            ["CCZR", "CCNG", "CLRALU", "STOALU", "TRUE"],
            ["ZR", "NG"],
        )
        .powered_by(&["ALUCCON"])
        .with_sequence(-30),
    )?;

    b.add(Board::register("INSTR", ["ROM", "CLRIN", "STOIN", "TRUE"]))?;
    b.add(Board::register("INM", ["RAM", "CLRIN", "STOIN", "TRUE"]))?;

    b.add(Board::sequencer("SEQUENCER", ["CLOCK", "RESET"], 10))?;
    b.add(Board::matrix(
        "MATRIX",
        &[
            "S0", "S1", "S2", "S3", "S4", "S5", "S6", "S7", "S8", "S9", "S0A", "S1A", "S2A",
            "S3A", "S4A", "S5A", "S6A", "S7A", "S8A", "S9A",
        ],
        &[
            ("MEM", &["S0"]),
            ("CLRIN", &["S0A"]),
            ("STOIN", &["S0"]),
            ("DECODEON", &["S3", "S4", "S5", "S6", "S7", "S8"]),
            ("ALUMUXON", &["S1", "S2", "S3"]),
            ("ALUON", &["S2", "S3"]),
            ("ALUOUTON", &["S3", "S4", "S5", "S6"]),
            ("ALUCCON", &["S3", "S4", "S5", "S6", "S7", "S8"]),
            ("CLRALU", &["S3A"]),
            ("STOALU", &["S3"]),
            ("AMUXON", &["S3", "S4", "S5", "S6"]),
            ("PCMUXON", &["S6", "S7", "S8"]),
            ("CLRMEM", &["S4A"]),
            ("STOMEM", &["S4"]),
            ("CLRAD", &["S6A"]),
            ("STOAD", &["S6"]),
            ("CLRPC", &["S8A"]),
            ("STOPC", &["S8"]),
        ],
    )?)?;
    b.add(Board::decoder("DECODE", "INSTR").powered_by(&["DECODEON"]).with_sequence(-60))?;

    b.add(Board::multiplexer("AMUX", ["CINST", "ALUOUT", "INSTR"]).powered_by(&["AMUXON"]))?;
    b.add(Board::multiplexer("ALUMUX", ["A", "INM", "AREG"]).powered_by(&["ALUMUXON"]))?;

    b.add(Board::incrementor("INCR", "PC").powered_by(&["ALUON"]))?;
    b.add(Board::register("PCINC", ["INCR", "CLRALU", "STOALU", "TRUE"]))?;

    b.add(Board::branch("BRANCH", ["ZR", "NG", "JLT", "JEQ", "JGT"]).powered_by(&["PCMUXON"]))?;
    b.add(Board::multiplexer("PCMUX", ["BRANCH", "AREG", "PCINC"]).powered_by(&["PCMUXON"]))?;

    b.add(prev_snapshot())?;

    finish(b, seed)
}

/// V2: the 5-phase wiring. The operands are staged into XREG/YREG while
/// ASAV keeps a race-free copy of A from the start of the instruction;
/// the RAM write address comes from ASAV once STOIN falls, and a taken
/// branch targets ALU when the instruction also stores A (that is the
/// value AREG is being loaded with), ASAV otherwise.
pub fn five_phase(
    code: Vec<u16>,
    asm: Option<Vec<String>>,
    seed: Option<u64>,
) -> Result<(Machine, SignalMap)> {
    tracing::info!("loading hardware V2 simulation");
    let mut b = MachineBuilder::new("v2");

    b.add(Board::reset("RESET", ["RESET", "~RESET"]).with_sequence(-100))?;
    b.add(Board::clock("CLOCK"))?;

    b.add(Board::sequencer("SEQUENCER", ["CLOCK", "RESET"], 5))?;
    b.add(Board::matrix(
        "MATRIX",
        &[
            "S0", "S1", "S2", "S3", "S4", "S0A", "S1A", "S2A", "S3A", "S4A",
        ],
        &[
            ("CLRIN", &["S0A"]),
            ("STOIN", &["S0"]),
            ("DECON", &["S1", "S2", "S3"]),
            ("CLRXY", &["S1A"]),
            ("STOXY", &["S1"]),
            ("ALUON", &["S2", "S3"]),
            ("CLROUT", &["S3A"]),
            ("STOOUT", &["S3"]),
        ],
    )?)?;
    b.add(Board::decoder("DECODE", "INSTR").powered_by(&["DECON"]).with_sequence(-60))?;

    b.add(Board::rom("ROM", "PC", ["ROM", "ASM"], code, asm)?)?;
    b.add(Board::ram(
        "RAM",
        ["ADDRMUX", "ALU", "CLROUT", "STOOUT", "STOM"],
    ))?;

    b.add(Board::register("AREG", ["AMUX", "CLROUT", "STOOUT", "STOA"]).with_sequence(-90))?;
    b.add(Board::register("DREG", ["ALU", "CLROUT", "STOOUT", "STOD"]).with_sequence(-80))?;
    b.add(
        Board::register("PC", ["PCMUX", "CLROUT", "STOOUT", "TRUE"])
            .powered_by(&["~RESET"])
            .with_sequence(-70),
    )?;

    b.add(Board::multiplexer("ALUMUX", ["A", "INM", "AREG"]).powered_by(&["STOXY"]))?;

    b.add(Board::register("ASAV", ["AREG", "CLRIN", "STOIN", "TRUE"]).with_sequence(-67))?;
    b.add(Board::register("XREG", ["DREG", "CLRXY", "STOXY", "TRUE"]).with_sequence(-65))?;
    b.add(Board::register("YREG", ["ALUMUX", "CLRXY", "CLRXY", "TRUE"]).with_sequence(-63))?;

    b.add(
        Board::alu(
            "ALU",
            ["XREG", "YREG", "ZX", "NX", "ZY", "NY", "F", "NO"],
            ["ALU", "ZR", "NG"],
        )
        .powered_by(&["ALUON"])
        .with_sequence(-50),
    )?;

    b.add(Board::register("INSTR", ["ROM", "CLRIN", "STOIN", "TRUE"]))?;
    b.add(Board::register("INM", ["RAM", "CLRIN", "STOIN", "TRUE"]))?;

    b.add(Board::multiplexer("AMUX", ["CINST", "ALU", "INSTR"]).powered_by(&["ALUON"]))?;
    b.add(Board::multiplexer("ADDRMUX", ["STOIN", "AREG", "ASAV"]).powered_by(&["TRUE"]))?;

    b.add(Board::incrementor("INCR", "PC").powered_by(&["STOXY"]))?;
    b.add(Board::register("PCINC", ["INCR", "CLRXY", "STOXY", "TRUE"]).powered_by(&["DECON"]))?;

    b.add(Board::branch("BRANCH", ["ZR", "NG", "JLT", "JEQ", "JGT"]).powered_by(&["ALUON"]))?;

    b.add(Board::multiplexer("JMPMUX", ["STOA", "ALU", "ASAV"]).powered_by(&["ALUON"]))?;
    b.add(Board::multiplexer("PCMUX", ["BRANCH", "JMPMUX", "PCINC"]).powered_by(&["ALUON"]))?;

    b.add(prev_snapshot())?;

    finish(b, seed)
}
