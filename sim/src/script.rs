//! Test-script interpreter: drives the machine from a tokenized `.tst`
//! script and diffs every `output` row against the comparison table.
//! The first disagreement is the answer; nothing is retried.

use ansi_term::Colour::{Green, Red};
use anyhow::{bail, ensure, Context, Result};
use regex::Regex;
use tracing::{info, warn};

use crate::framework::Machine;
use crate::report::TraceLevel;
use crate::signal::{signed, SignalMap, Value};

/// A variable a script may read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
enum VarRef {
    Pc,
    Ram(usize),
}

fn parse_var(reference: &str) -> Result<VarRef> {
    if reference == "pc" {
        return Ok(VarRef::Pc);
    }
    let pattern = Regex::new(r"^(.+?)\[(-?[0-9]+)\]$").expect("variable pattern");
    let caps = pattern
        .captures(reference)
        .with_context(|| format!("malformed or unknown variable {reference}"))?;
    match &caps[1] {
        "ram" => {
            let index: i64 = caps[2]
                .parse()
                .with_context(|| format!("malformed or unknown variable {reference}"))?;
            ensure!(index >= 0, "RAM[{index}] is out of range");
            Ok(VarRef::Ram(index as usize))
        }
        other => bail!("unknown variable {other}"),
    }
}

fn var_get(machine: &Machine, var: &VarRef) -> Result<u16> {
    match var {
        VarRef::Pc => machine.output_word("PC"),
        VarRef::Ram(addr) => machine.ram_read(*addr),
    }
}

fn var_set(machine: &mut Machine, var: &VarRef, value: i64) -> Result<()> {
    let value = (value & 0xFFFF) as u16;
    match var {
        VarRef::Pc => {
            machine.set_register("PC", value)?;
            info!("set: PC = {value}");
        }
        VarRef::Ram(addr) => {
            machine.ram_poke(*addr, value)?;
            info!("set: RAM[{addr}] = {value}");
        }
    }
    Ok(())
}

/// Execute a tokenized script to completion. Returns the bus as it
/// stands after the last command.
pub fn run_script(
    machine: &mut Machine,
    signals: SignalMap,
    script: &[String],
    results: Option<&[Vec<String>]>,
    trace: TraceLevel,
) -> Result<SignalMap> {
    let mut signals = signals;
    let mut script_pc = 0usize;
    let mut bound: Vec<VarRef> = Vec::new();
    let mut rows_emitted = 0usize;
    // (return address, remaining count) per open repeat
    let mut stack: Vec<(usize, u64)> = Vec::new();
    let mut instr_count: u64 = 1;

    while script_pc < script.len() {
        let line = &script[script_pc];
        let tokens: Vec<&str> = line.split_whitespace().collect();

        match tokens[0] {
            // Already implied by the files in the test folder.
            "load" | "output-file" | "compare-to" => warn!("ignored: {line}"),

            "output-list" => {
                let results = results.context("output-list without a comparison table")?;
                let names: Vec<String> = tokens[1..].iter().map(|t| t.to_string()).collect();
                ensure!(
                    results.first() == Some(&names),
                    "output-list {names:?} does not match results {:?}",
                    results.first()
                );
                bound = names.iter().map(|n| parse_var(n)).collect::<Result<_>>()?;
                info!("output list: {names:?}");
            }

            "set" => {
                ensure!(tokens.len() == 3, "malformed set command: {line}");
                let var = parse_var(tokens[1])?;
                let value: i64 = tokens[2]
                    .parse()
                    .with_context(|| format!("malformed set command: {line}"))?;
                var_set(machine, &var, value)?;
            }

            "repeat" => {
                ensure!(tokens.len() >= 2, "malformed repeat command: {line}");
                let count: u64 = tokens[1]
                    .parse()
                    .with_context(|| format!("malformed repeat command: {line}"))?;
                stack.push((script_pc, count));
                info!("repeat {count} times");
            }

            "}" => {
                ensure!(!stack.is_empty(), "empty repeat stack at }}");
                // A program spinning on its terminal self-jump will
                // never change state again; pop out of the loop no
                // matter how many iterations remain.
                if machine.halted() {
                    stack.pop();
                    warn!("program halt detected, exiting loop");
                } else {
                    let top = stack.last_mut().expect("stack checked non-empty");
                    if top.1 > 1 {
                        top.1 -= 1;
                        script_pc = top.0;
                    } else {
                        stack.pop();
                    }
                }
            }

            "ticktock" => {
                (signals, instr_count) = machine.cycle(signals, trace, instr_count)?;
            }

            "output" => {
                let results = results.context("output without a comparison table")?;
                let values: Vec<String> = bound
                    .iter()
                    .map(|var| var_get(machine, var).map(|v| signed(v).to_string()))
                    .collect::<Result<_>>()?;
                if rows_emitted + 1 >= results.len() {
                    println!("{}", Red.paint(format!("Output   : {values:?}")));
                    bail!("more outputs than test results");
                }
                let expected = &results[rows_emitted + 1];
                if &values != expected {
                    println!("{}", Red.paint(format!("Output   : {values:?}")));
                    println!("{}", Red.paint(format!("Expected : {expected:?}")));
                    bail!("output row {} does not match comparison file", rows_emitted + 1);
                }
                rows_emitted += 1;
                println!("{}", Green.paint(format!("Output correct: {values:?}")));
            }

            _ => bail!("unknown script command: {line}"),
        }
        script_pc += 1;
    }

    info!("script validated correctly");
    Ok(signals)
}

/// With no script, run cycle by cycle until the machine parks on its
/// terminal self-jump.
pub fn free_run(machine: &mut Machine, signals: SignalMap, trace: TraceLevel) -> Result<SignalMap> {
    machine.set_prev("_PC", Value::Word(0xFFFF))?;
    let mut signals = signals;
    let mut instr_count: u64 = 1;
    while !machine.halted() {
        (signals, instr_count) = machine.cycle(signals, trace, instr_count)?;
    }
    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines::five_phase;

    #[test]
    fn variable_references_parse() {
        assert_eq!(parse_var("pc").unwrap(), VarRef::Pc);
        assert_eq!(parse_var("ram[3]").unwrap(), VarRef::Ram(3));
        assert!(parse_var("ram[-1]").is_err());
        assert!(parse_var("rom[0]").is_err());
        assert!(parse_var("junk").is_err());
    }

    fn fresh_machine() -> (Machine, SignalMap) {
        // @10 / D=A plus padding so the PC never walks off the ROM.
        let code = vec![0x000A, 0xEC10, 0x0000, 0x0000];
        let (mut machine, signals) = five_phase(code, None, Some(11)).unwrap();
        let (signals, _) = machine
            .cycle(signals, TraceLevel::Off, 0)
            .unwrap();
        machine.drop_reset().unwrap();
        (machine, signals)
    }

    fn tokens(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn script_sets_repeats_and_outputs() {
        let (mut machine, signals) = fresh_machine();
        let script = tokens(&[
            "load x.hack",
            "output-list ram[7]",
            "set ram[7] -2",
            "repeat 2 {",
            "ticktock",
            "}",
            "output",
        ]);
        let results = vec![vec!["ram[7]".to_string()], vec!["-2".to_string()]];
        run_script(
            &mut machine,
            signals,
            &script,
            Some(&results),
            TraceLevel::Off,
        )
        .unwrap();
        assert_eq!(machine.register_value("PC").unwrap(), 2);
        assert_eq!(machine.register_value("DREG").unwrap(), 10);
        assert_eq!(machine.ram_when(7).unwrap(), 1);
    }

    #[test]
    fn output_mismatch_is_fatal() {
        let (mut machine, signals) = fresh_machine();
        let script = tokens(&["output-list ram[0]", "output"]);
        let results = vec![vec!["ram[0]".to_string()], vec!["5".to_string()]];
        let err = run_script(
            &mut machine,
            signals,
            &script,
            Some(&results),
            TraceLevel::Off,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("does not match"), "{err}");
    }

    #[test]
    fn output_beyond_table_is_fatal() {
        let (mut machine, signals) = fresh_machine();
        let script = tokens(&["output-list ram[0]", "output", "output"]);
        let results = vec![vec!["ram[0]".to_string()], vec!["0".to_string()]];
        let err = run_script(
            &mut machine,
            signals,
            &script,
            Some(&results),
            TraceLevel::Off,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("more outputs"), "{err}");
    }

    #[test]
    fn stray_close_brace_is_fatal() {
        let (mut machine, signals) = fresh_machine();
        let script = tokens(&["}"]);
        let err = run_script(&mut machine, signals, &script, None, TraceLevel::Off)
            .unwrap_err()
            .to_string();
        assert!(err.contains("empty repeat stack"), "{err}");
    }

    #[test]
    fn unknown_command_is_fatal() {
        let (mut machine, signals) = fresh_machine();
        let script = tokens(&["explode now"]);
        let err = run_script(&mut machine, signals, &script, None, TraceLevel::Off)
            .unwrap_err()
            .to_string();
        assert!(err.contains("unknown script command"), "{err}");
    }
}
