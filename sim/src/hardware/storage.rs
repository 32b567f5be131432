//! Latching boards: registers, condition codes, RAM, ROM and the
//! mockup used for cycle snapshots.
//!
//! Everything that holds a value models a hold-coil relay: with CLR low
//! the stored bits keep themselves energized, so new data can only OR
//! in; raising CLR breaks the hold and the store wins outright.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use regex::Regex;

use super::{Board, Kind, Port};
use crate::signal::Value;

pub const RAM_SIZE: usize = 32768;

/// 16-bit register. Inputs are DATA, CLR, STO and a GATE that must be
/// high for CLR/STO to act at all.
#[derive(Debug)]
pub struct RegisterState {
    pub data: u16,
}

impl RegisterState {
    pub(super) fn update(&mut self, inputs: &[Port], outputs: &mut [Port]) {
        if inputs[3].value.as_bit() {
            let incoming = if inputs[2].value.as_bit() {
                inputs[0].value.as_word()
            } else {
                0
            };
            let held = if inputs[1].value.as_bit() {
                0
            } else {
                self.data
            };
            self.data = incoming | held;
        }
        outputs[0].value = Value::Word(self.data);
    }
}

/// Two-bit register for the ZR/NG flags; same latching law per bit.
#[derive(Debug)]
pub struct FlagState {
    pub zr: bool,
    pub ng: bool,
}

impl FlagState {
    pub(super) fn update(&mut self, inputs: &[Port], outputs: &mut [Port]) {
        if inputs[4].value.as_bit() {
            let sto = inputs[3].value.as_bit();
            let clr = inputs[2].value.as_bit();
            let zr_in = sto && inputs[0].value.as_bit();
            let ng_in = sto && inputs[1].value.as_bit();
            self.zr = zr_in || (!clr && self.zr);
            self.ng = ng_in || (!clr && self.ng);
        }
        outputs[0].value = Value::Bit(self.zr);
        outputs[1].value = Value::Bit(self.ng);
    }
}

/// System RAM. `when` records the write counter at each address so the
/// reporter can show the most recently touched cells.
#[derive(Debug)]
pub struct RamState {
    pub data: Vec<u16>,
    pub when: Vec<u64>,
    pub count: u64,
}

impl RamState {
    pub(super) fn update(&mut self, inputs: &[Port], outputs: &mut [Port]) -> Result<()> {
        let addr = inputs[0].value.as_word() as usize;
        if addr >= self.data.len() {
            bail!("RAM address [{addr}] is out of bounds");
        }
        // No write can happen unless the STOM enable is high.
        if inputs[4].value.as_bit() {
            let incoming = if inputs[3].value.as_bit() {
                inputs[1].value.as_word()
            } else {
                0
            };
            let held = if inputs[2].value.as_bit() {
                0
            } else {
                self.data[addr]
            };
            let cell = incoming | held;
            self.data[addr] = cell;
            self.count += 1;
            self.when[addr] = self.count;
            outputs[0].value = Value::Word(cell);
        } else {
            outputs[0].value = Value::Word(self.data[addr]);
        }
        Ok(())
    }
}

/// System ROM. Serves the machine word and the matching assembly line;
/// the symbol table exists purely to make execution traces readable.
#[derive(Debug)]
pub struct RomState {
    pub code: Vec<u16>,
    pub asm: Vec<String>,
    /// address -> display name, padded to `symbol_width`.
    pub symbols: BTreeMap<u16, String>,
    pub symbol_width: usize,
}

impl RomState {
    pub(super) fn update(&mut self, inputs: &[Port], outputs: &mut [Port]) -> Result<()> {
        let pc = inputs[0].value.as_word() as usize;
        if pc >= self.code.len() {
            bail!("ROM address [{pc}] is out of bounds");
        }
        outputs[0].value = Value::Word(self.code[pc]);
        outputs[1].value = Value::Text(self.asm[pc].clone());
        Ok(())
    }
}

/// Scan assembly for `@name` references and `(LABEL)` definitions,
/// following the HACK convention that fresh variables are allocated
/// from address 16 in first-seen order.
fn build_symbols(asm: &[String]) -> Result<(BTreeMap<u16, String>, usize)> {
    let mut symbols: BTreeMap<u16, String> = [
        (0u16, "R0/SP"),
        (1, "R1/LCL"),
        (2, "R2/ARG"),
        (3, "R3/THIS"),
        (4, "R4/THAT"),
        (5, "R5"),
        (6, "R6"),
        (7, "R7"),
        (8, "R8"),
        (9, "R9"),
        (10, "R10"),
        (11, "R11"),
        (12, "R12"),
        (13, "R13"),
        (14, "R14"),
        (15, "R15"),
        (16384, "SCREEN"),
        (24576, "KBD"),
    ]
    .into_iter()
    .map(|(addr, name)| (addr, name.to_string()))
    .collect();

    // The double names like R0/SP need a separate list of known symbols.
    let mut known: Vec<String> = [
        "R0", "SP", "R1", "LCL", "R2", "ARG", "R3", "THIS", "R4", "THAT", "R5", "R6", "R7", "R8",
        "R9", "R10", "R11", "R12", "R13", "R14", "R15", "SCREEN", "KBD",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    let reference = Regex::new(r"@([A-Za-z_.$:][0-9A-Za-z_.$:]*)").expect("reference pattern");
    let label = Regex::new(r"\(([A-Za-z_.$:][0-9A-Za-z_.$:]+)\)").expect("label pattern");

    // name -> resolved address, insertion order preserved
    let mut found: Vec<(String, Option<u16>)> = Vec::new();

    for (addr, line) in asm.iter().enumerate() {
        if let Some(cap) = reference.captures(line) {
            let name = &cap[1];
            if !found.iter().any(|(n, _)| n == name) {
                found.push((name.to_string(), None));
            }
        }
        if let Some(cap) = label.captures(line) {
            let symbol = &cap[1];
            match found.iter_mut().find(|(n, _)| n == symbol) {
                Some((_, slot @ None)) => *slot = Some(addr as u16),
                Some(_) => bail!("redefined symbol {symbol} in program @ {addr} : {line}"),
                None => found.push((symbol.to_string(), Some(addr as u16))),
            }
        }
    }

    // Whatever never resolved to a label or a known name is a variable.
    let mut next_addr = 16u16;
    for (name, value) in &found {
        if value.is_none() && !known.iter().any(|k| k == name) {
            symbols.insert(next_addr, name.clone());
            known.push(name.clone());
            next_addr += 1;
        }
    }

    let width = symbols.values().map(String::len).max().unwrap_or(0);
    for value in symbols.values_mut() {
        *value = format!("{value:<width$}");
    }
    Ok((symbols, width))
}

/// State-only mockup: every cell is reflected as an equally named
/// output. Used for the PREV cycle snapshot and test fixtures.
#[derive(Debug)]
pub struct MockedState {
    pub cells: Vec<Value>,
}

impl MockedState {
    pub(super) fn update(&mut self, outputs: &mut [Port]) {
        for (port, cell) in outputs.iter_mut().zip(&self.cells) {
            port.value = cell.clone();
        }
    }
}

impl Board {
    pub fn register(name: &str, inputs: [&str; 4]) -> Board {
        Board::assemble(
            name,
            inputs.iter().map(|n| Port::input(n)).collect(),
            vec![Port::word(name)],
            Kind::Register(RegisterState { data: 0 }),
        )
    }

    pub fn condition_codes(name: &str, inputs: [&str; 5], outputs: [&str; 2]) -> Board {
        Board::assemble(
            name,
            inputs.iter().map(|n| Port::input(n)).collect(),
            vec![Port::bit(outputs[0]), Port::bit(outputs[1])],
            Kind::ConditionCodes(FlagState {
                zr: false,
                ng: false,
            }),
        )
    }

    pub fn ram(name: &str, inputs: [&str; 5]) -> Board {
        Board::assemble(
            name,
            inputs.iter().map(|n| Port::input(n)).collect(),
            vec![Port::word(name)],
            Kind::Ram(RamState {
                data: vec![0; RAM_SIZE],
                when: vec![0; RAM_SIZE],
                count: 0,
            }),
        )
    }

    /// `asm` may be absent when only machine code was provided; the
    /// disassembly side-channel then carries empty lines.
    pub fn rom(
        name: &str,
        input: &str,
        outputs: [&str; 2],
        code: Vec<u16>,
        asm: Option<Vec<String>>,
    ) -> Result<Board> {
        let asm = asm.unwrap_or_else(|| vec![String::new(); code.len()]);
        anyhow::ensure!(
            asm.len() == code.len(),
            "ROM has {} words but {} assembly lines",
            code.len(),
            asm.len()
        );
        let (symbols, symbol_width) = build_symbols(&asm)?;
        Ok(Board::assemble(
            name,
            vec![Port::input(input)],
            vec![Port::word(outputs[0]), Port::text(outputs[1], "@0")],
            Kind::Rom(RomState {
                code,
                asm,
                symbols,
                symbol_width,
            }),
        ))
    }

    pub fn mocked(name: &str, cells: Vec<(&str, Value)>) -> Board {
        let outputs = cells
            .iter()
            .map(|(cell, value)| match value {
                Value::Bit(_) => Port::bit(cell),
                Value::Word(_) => Port::word(cell),
                Value::Text(_) => Port::text(cell, ""),
            })
            .collect();
        let cells = cells.into_iter().map(|(_, value)| value).collect();
        Board::assemble(name, vec![], outputs, Kind::Mocked(MockedState { cells }))
    }
}
