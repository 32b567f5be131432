//! Diagnostic views of a running machine: the multicolumn signal dump
//! and the three-pane ROM/RAM/register summary.

use ansi_term::{Colour, Style};
use anyhow::{Context, Result};

use crate::framework::Machine;
use crate::signal::{signed, SignalMap, Value};

/// How much of the run to narrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    /// Results only.
    Off,
    /// Machine state at the start of every instruction.
    Instruction,
    /// Signal dump after every clock tick.
    Clock,
    /// Signal dump after every settling round.
    Settle,
}

impl std::str::FromStr for TraceLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "n" | "none" => Ok(TraceLevel::Off),
            "i" | "instruction" => Ok(TraceLevel::Instruction),
            "c" | "clock" => Ok(TraceLevel::Clock),
            "s" | "settle" => Ok(TraceLevel::Settle),
            _ => anyhow::bail!(
                "unknown trace level [{s}]; must be [N]one|[I]nstruction|[C]lock|[S]ettle"
            ),
        }
    }
}

/// Fixed-width rendering of a wire level.
pub fn vfmt(value: &Value) -> String {
    match value {
        Value::Bit(false) => " --  ".to_string(),
        Value::Bit(true) => "HIGH ".to_string(),
        Value::Word(w) => format!("{w:04x}"),
        Value::Text(s) => s.clone(),
    }
}

fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(132)
}

pub fn print_cycle_banner(instr_count: u64) {
    println!(
        "{}",
        Colour::Green
            .bold()
            .paint(format!("Instruction {instr_count}: Initial State"))
    );
}

/// Multicolumn dump of every signal with its producer, in declaration
/// sequence. Entries that differ from `previous` are highlighted.
pub fn print_state(machine: &Machine, current: &SignalMap, previous: Option<&SignalMap>) {
    let order = machine.dump_order();
    let table = machine.table();
    if order.is_empty() {
        return;
    }

    let values: Vec<String> = order.iter().map(|&id| vfmt(current.get(id))).collect();
    let signal_width = order
        .iter()
        .map(|&id| table.name(id).len())
        .max()
        .unwrap_or(0)
        .max(8);
    let source_width = order
        .iter()
        .map(|&id| machine.source_of(id).len())
        .max()
        .unwrap_or(0)
        .max(8);
    let value_width = values.iter().map(String::len).max().unwrap_or(0).max(4);

    let entries: Vec<(String, bool)> = order
        .iter()
        .zip(&values)
        .map(|(&id, value)| {
            let changed = previous.map_or(false, |p| p.get(id) != current.get(id));
            (
                format!(
                    "{:<signal_width$}  {:<source_width$}  {:<value_width$}",
                    table.name(id),
                    machine.source_of(id),
                    value
                ),
                changed,
            )
        })
        .collect();

    let col_spacer = "  |  ";
    let col_space = 5;
    let max_width = col_space + entries.iter().map(|(e, _)| e.len()).max().unwrap_or(0);
    let num_columns = ((terminal_width() + 2) / max_width).max(1);
    let num_rows = (entries.len() + num_columns - 1) / num_columns;

    let header = format!(
        "{:<signal_width$}  {:<source_width$}  {:<value_width$}",
        "Signal", "Source", "Val."
    );
    let bold = Style::new().bold();
    let header_row: Vec<String> = (0..num_columns)
        .map(|_| bold.paint(header.clone()).to_string())
        .collect();
    println!("{}", header_row.join(col_spacer));

    let dashes = format!(
        "{}  {}  {}",
        "-".repeat(signal_width),
        "-".repeat(source_width),
        "-".repeat(value_width)
    );
    let dash_row: Vec<&str> = (0..num_columns).map(|_| dashes.as_str()).collect();
    println!("{}", dash_row.join(col_spacer));

    let highlight = Colour::Blue.bold();
    for row in 0..num_rows {
        let mut cells = Vec::with_capacity(num_columns);
        for col in 0..num_columns {
            match entries.get(row + col * num_rows) {
                Some((entry, true)) => cells.push(highlight.paint(entry.clone()).to_string()),
                Some((entry, false)) => cells.push(entry.clone()),
                None => cells.push(String::new()),
            }
        }
        println!("{}", cells.join(col_spacer));
    }
    println!();
}

/// Words before/after the current location shown in each memory pane.
const W_BEFORE: usize = 15;
const W_AFTER: usize = 16;
const W_FULL: usize = W_BEFORE + W_AFTER + 1;

fn bold_if(text: String, yes: bool) -> String {
    if yes {
        Style::new().bold().paint(text).to_string()
    } else {
        text
    }
}

/// The programmer's view: ROM around PC, the most recently touched RAM
/// cells, and the register file next to its previous-cycle snapshot.
pub fn print_machine(machine: &Machine) -> Result<()> {
    let pc = machine.register_value("PC")? as usize;
    let a = machine.register_value("AREG")? as usize;
    let d = machine.register_value("DREG")?;
    let rom = machine.board("ROM")?.as_rom().context("no ROM state")?;
    let ram = machine.board("RAM")?.as_ram().context("no RAM state")?;
    let m = ram.data.get(a).copied().unwrap_or(0);

    // ROM window centered on PC, clamped to the program.
    let mut rom_lo = pc.saturating_sub(W_BEFORE);
    let rom_hi = (rom_lo + W_FULL).min(rom.code.len());
    rom_lo = rom_lo.max(rom_hi.saturating_sub(W_FULL));

    let mut rom_lines: Vec<String> = (rom_lo..rom_hi)
        .map(|addr| format!("{addr:5} {:016b} {}", rom.code[addr], rom.asm[addr]))
        .collect();

    // RAM pane: most recently written cells, in ascending address order.
    let mut recent: Vec<(u64, usize)> = ram
        .when
        .iter()
        .enumerate()
        .filter(|(_, &when)| when > 0)
        .map(|(addr, &when)| (when, addr))
        .collect();
    recent.sort_unstable_by(|x, y| y.cmp(x));
    recent.truncate(W_FULL);
    let mut recent: Vec<usize> = recent.into_iter().map(|(_, addr)| addr).collect();
    recent.sort_unstable();

    let blank = " ".repeat(rom.symbol_width);
    let mut ram_lines: Vec<(usize, String)> = recent
        .iter()
        .map(|&addr| {
            let symbol = rom
                .symbols
                .get(&(addr as u16))
                .cloned()
                .unwrap_or_else(|| blank.clone());
            (
                addr,
                format!(
                    "{addr:5} {symbol}{:6}{:7}",
                    ram.data[addr],
                    signed(ram.data[addr])
                ),
            )
        })
        .collect();

    let prev_pc = machine.prev_word("_PC")?;
    let prev_a = machine.prev_word("_A")?;
    let prev_m = machine.prev_word("_M")?;
    let prev_d = machine.prev_word("_D")?;
    let prev_reset = machine.board("PREV")?.mocked_get("_RESET")?.as_bit();

    let mut state_lines = vec![
        format!("PC  = {pc:5}"),
        format!("A   = {a:5}"),
        format!("M   = {:5} {} {:016b}", signed(m), vfmt(&Value::Word(m)), m),
        format!("D   = {:5} {} {:016b}", signed(d), vfmt(&Value::Word(d)), d),
        String::new(),
        format!("RST = {}", machine.reset_is_high()),
        String::new(),
        format!("_PC = {:5}", signed(prev_pc)),
        format!("_A  = {prev_a:5}"),
        format!(
            "_M  = {:5} {} {:016b}",
            signed(prev_m),
            vfmt(&Value::Word(prev_m)),
            prev_m
        ),
        format!(
            "_D  = {:5} {} {:016b}",
            signed(prev_d),
            vfmt(&Value::Word(prev_d)),
            prev_d
        ),
        String::new(),
        format!("_RST= {prev_reset}"),
    ];

    // Pad every pane to a common rectangle before styling; the escape
    // codes would throw the width math off otherwise.
    let rows = rom_lines.len().max(state_lines.len()).max(ram_lines.len());
    let rom_width = rom_lines.iter().map(String::len).max().unwrap_or(8);
    let ram_width = ram_lines.iter().map(|(_, l)| l.len()).max().unwrap_or(0);
    let state_width = state_lines.iter().map(String::len).max().unwrap_or(0);

    for line in &mut rom_lines {
        *line = format!("{line:<rom_width$}");
    }
    for (_, line) in &mut ram_lines {
        *line = format!("{line:<ram_width$}");
    }
    state_lines = (0..rows)
        .map(|i| {
            state_lines
                .get(i)
                .map(|l| format!("{l:<state_width$}"))
                .unwrap_or_else(|| " ".repeat(state_width))
        })
        .collect();

    state_lines[1] = bold_if(state_lines[1].clone(), a as u16 != prev_a);
    state_lines[2] = bold_if(state_lines[2].clone(), m != prev_m);
    state_lines[3] = bold_if(state_lines[3].clone(), d != prev_d);

    if pc >= rom_lo && pc < rom_hi {
        rom_lines[pc - rom_lo] = bold_if(rom_lines[pc - rom_lo].clone(), true);
    }
    let ram_lines: Vec<String> = ram_lines
        .into_iter()
        .map(|(addr, line)| bold_if(line, addr == a))
        .collect();

    println!(
        "+- ROM {}--+- RAM {}--+--{}--+",
        "-".repeat(rom_width.saturating_sub(4)),
        "-".repeat(ram_width.saturating_sub(4)),
        "-".repeat(state_width)
    );
    for row in 0..rows {
        let rom_cell = rom_lines
            .get(row)
            .cloned()
            .unwrap_or_else(|| " ".repeat(rom_width));
        let ram_cell = ram_lines
            .get(row)
            .cloned()
            .unwrap_or_else(|| " ".repeat(ram_width));
        let state_cell = &state_lines[row];
        println!("|  {rom_cell}  |  {ram_cell}  |  {state_cell}  |");
    }
    println!(
        "+------{}--+------{}--+--{}--+",
        "-".repeat(rom_width.saturating_sub(4)),
        "-".repeat(ram_width.saturating_sub(4)),
        "-".repeat(state_width)
    );
    println!();
    Ok(())
}
