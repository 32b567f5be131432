//! Machine assembly and the settling engine. A machine is an ordered
//! collection of boards wired together by signal name; settling drives
//! the bus to a fixed point between clock edges.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{bail, ensure, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::hardware::{Board, Kind};
use crate::report::{self, TraceLevel};
use crate::signal::{SignalId, SignalMap, SignalTable, Value, FALSE, TRUE};

/// Rounds the settling loop may run before the design is declared
/// combinationally unstable.
const SETTLE_BOUND: usize = 10;

/// Outputs that are legitimately unconsumed and never draw a warning.
/// Snapshot cells of mockup boards are exempted separately.
const IGNORABLE: [&str; 5] = ["TRUE", "FALSE", "RESET", "~RESET", "ASM"];

/// Collects boards, interning every signal name as it goes. Duplicate
/// producers are rejected at [`MachineBuilder::add`]; dangling inputs
/// at [`MachineBuilder::build`].
pub struct MachineBuilder {
    name: &'static str,
    boards: Vec<Board>,
    table: SignalTable,
    producers: HashMap<SignalId, usize>,
    next_sequence: i32,
}

impl MachineBuilder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            boards: Vec::new(),
            table: SignalTable::new(),
            producers: HashMap::new(),
            next_sequence: 0,
        }
    }

    pub fn add(&mut self, mut board: Board) -> Result<()> {
        board.resolve(&mut self.table);
        if board.sequence.is_none() {
            board.sequence = Some(self.next_sequence);
            self.next_sequence += 1;
        }
        for port in board.outputs() {
            if port.id == TRUE || port.id == FALSE {
                bail!(
                    "output signal {} of [{}] shadows a constant rail",
                    port.name,
                    board.name
                );
            }
            if let Some(&other) = self.producers.get(&port.id) {
                bail!(
                    "output signal {} is being generated by both [{}] and [{}]",
                    port.name,
                    self.boards[other].name,
                    board.name
                );
            }
            self.producers.insert(port.id, self.boards.len());
        }
        self.boards.push(board);
        Ok(())
    }

    pub fn build(self, seed: Option<u64>) -> Result<Machine> {
        let Self {
            name,
            boards,
            table,
            producers,
            ..
        } = self;

        let mut consumed: HashSet<SignalId> = HashSet::new();
        for board in &boards {
            for port in board.inputs.iter().chain(board.power.iter()) {
                ensure!(
                    port.id == TRUE || port.id == FALSE || producers.contains_key(&port.id),
                    "component [{}] requires unknown signal [{}]",
                    board.name,
                    port.name
                );
                consumed.insert(port.id);
            }
        }

        for board in &boards {
            if board.is_mocked() {
                continue;
            }
            for port in &board.outputs {
                if !consumed.contains(&port.id) && !IGNORABLE.contains(&port.name.as_str()) {
                    warn!("unused output {} generated by {}", port.name, board.name);
                }
            }
        }

        // Fan-in counts, for sanity-checking a new wiring against the
        // board schematics.
        let mut usage: BTreeMap<&str, usize> = BTreeMap::new();
        for board in &boards {
            for port in &board.inputs {
                *usage.entry(port.name.as_str()).or_default() += 1;
            }
        }
        for (signal, count) in &usage {
            debug!("input usage: {signal} = {count}");
        }

        let by_name = boards
            .iter()
            .enumerate()
            .map(|(index, board)| (board.name.clone(), index))
            .collect();

        let clock = boards.iter().position(|b| matches!(b.kind, Kind::Clock(_)));
        let reset = boards.iter().position(|b| matches!(b.kind, Kind::Reset(_)));
        let ticks = boards.iter().find_map(|b| b.as_sequencer()).map(|s| s.ticks);

        // Diagnostic dump order: by declared sequence, rails last.
        let mut order: Vec<(i32, SignalId)> = table
            .ids()
            .map(|id| {
                let sequence = producers
                    .get(&id)
                    .map(|&b| boards[b].sequence())
                    .unwrap_or(9999);
                (sequence, id)
            })
            .collect();
        order.sort();

        let mut sources = vec![String::new(); table.len()];
        for (&id, &board) in &producers {
            sources[id.0 as usize] = boards[board].name.clone();
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Machine {
            name,
            boards,
            by_name,
            table,
            rng,
            clock,
            reset,
            ticks,
            dump_order: order.into_iter().map(|(_, id)| id).collect(),
            sources,
        })
    }
}

/// A wired machine: the named boards, the interned signal table and the
/// random source that scrambles settling order.
#[derive(Debug)]
pub struct Machine {
    name: &'static str,
    boards: Vec<Board>,
    by_name: HashMap<String, usize>,
    table: SignalTable,
    rng: StdRng,
    clock: Option<usize>,
    reset: Option<usize>,
    ticks: Option<usize>,
    dump_order: Vec<SignalId>,
    sources: Vec<String>,
}

impl Machine {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn table(&self) -> &SignalTable {
        &self.table
    }

    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    pub fn dump_order(&self) -> &[SignalId] {
        &self.dump_order
    }

    pub fn source_of(&self, id: SignalId) -> &str {
        &self.sources[id.0 as usize]
    }

    pub fn board(&self, name: &str) -> Result<&Board> {
        let index = self
            .by_name
            .get(name)
            .with_context(|| format!("machine has no component [{name}]"))?;
        Ok(&self.boards[*index])
    }

    pub fn board_mut(&mut self, name: &str) -> Result<&mut Board> {
        let index = self
            .by_name
            .get(name)
            .with_context(|| format!("machine has no component [{name}]"))?;
        Ok(&mut self.boards[*index])
    }

    /// Ticks per machine cycle, from the sequencer.
    pub fn ticks(&self) -> Result<usize> {
        self.ticks.context("machine has no sequencer")
    }

    pub fn sequencer_cycle(&self) -> usize {
        self.boards
            .iter()
            .find_map(|b| b.as_sequencer())
            .map(|s| s.cycle)
            .unwrap_or(0)
    }

    /// Gather the bus from every board's output ports, rails included.
    pub fn gather(&self) -> SignalMap {
        let mut map = SignalMap::new(&self.table);
        for board in &self.boards {
            for port in &board.outputs {
                map.set(port.id, port.value.clone());
            }
        }
        map
    }

    /// The bus as it stands before the first settle.
    pub fn initial_signals(&self) -> SignalMap {
        self.gather()
    }

    /// Update boards in random order until the bus stops changing.
    ///
    /// The shuffle is the point: real relays do not settle in a fixed
    /// order, and a wiring that only works for one order is broken
    /// hardware. A bus still changing after the round bound means a
    /// combinational oscillation.
    pub fn settle(&mut self, signals: SignalMap, trace: TraceLevel) -> Result<SignalMap> {
        let mut order: Vec<usize> = (0..self.boards.len()).collect();
        let initial = signals.clone();
        let mut current = signals;
        let mut previous: Option<SignalMap> = None;

        if trace == TraceLevel::Settle {
            println!("Settle(0): Cycle={}", self.sequencer_cycle());
            report::print_state(self, &current, None);
        }

        for round in 1..=SETTLE_BOUND {
            order.shuffle(&mut self.rng);
            for &index in &order {
                if let Err(err) = self.boards[index].update(&current) {
                    let name = self.boards[index].name.clone();
                    return Err(err.context(format!("while updating component [{name}]")));
                }
            }
            let next = self.gather();

            if trace == TraceLevel::Settle {
                let names: Vec<&str> =
                    order.iter().map(|&i| self.boards[i].name.as_str()).collect();
                println!(
                    "Settle({round}): Cycle={} - {}",
                    self.sequencer_cycle(),
                    names.join(", ")
                );
                report::print_state(self, &next, Some(&current));
            }

            if next == current {
                if trace >= TraceLevel::Clock {
                    println!("Settled: Cycle={}", self.sequencer_cycle());
                    report::print_state(self, &next, Some(&initial));
                }
                return Ok(next);
            }
            previous = Some(std::mem::replace(&mut current, next));
        }

        // Dump the last two maps so the oscillating signals stand out.
        report::print_state(self, &current, previous.as_ref());
        bail!("hardware failed to settle");
    }

    /// One tick: advance the master clock, then settle.
    pub fn tick(&mut self, signals: SignalMap, trace: TraceLevel) -> Result<SignalMap> {
        let clock = self.clock.context("machine has no clock")?;
        self.boards[clock].tick(&signals)?;
        self.settle(signals, trace)
    }

    /// One machine cycle: snapshot the programmer-visible state into
    /// PREV, then run a full ring of ticks.
    pub fn cycle(
        &mut self,
        signals: SignalMap,
        trace: TraceLevel,
        instr_count: u64,
    ) -> Result<(SignalMap, u64)> {
        if trace != TraceLevel::Off {
            report::print_cycle_banner(instr_count);
            report::print_machine(self)?;
        }

        let a = self.register_value("AREG")?;
        let d = self.register_value("DREG")?;
        let pc = self.register_value("PC")?;
        let m = self.register_value("INM")?;
        let reset = self.reset_is_high();
        let prev = self.board_mut("PREV")?;
        prev.mocked_set("_A", Value::Word(a))?;
        prev.mocked_set("_D", Value::Word(d))?;
        prev.mocked_set("_PC", Value::Word(pc))?;
        prev.mocked_set("_RESET", Value::Bit(reset))?;
        prev.mocked_set("_M", Value::Word(m))?;

        let ticks = self.ticks()?;
        let mut signals = signals;
        for _ in 0..ticks {
            signals = self.tick(signals, trace)?;
        }
        Ok((signals, instr_count + 1))
    }

    pub fn raise_reset(&mut self) -> Result<()> {
        let index = self.reset.context("machine has no reset button")?;
        self.boards[index].set_reset(true)
    }

    pub fn drop_reset(&mut self) -> Result<()> {
        let index = self.reset.context("machine has no reset button")?;
        self.boards[index].set_reset(false)
    }

    pub fn reset_is_high(&self) -> bool {
        self.reset
            .and_then(|index| self.boards[index].as_reset())
            .map(|state| state.on)
            .unwrap_or(false)
    }

    /// Latched value of a named register board.
    pub fn register_value(&self, name: &str) -> Result<u16> {
        let board = self.board(name)?;
        Ok(board
            .as_register()
            .with_context(|| format!("component [{name}] is not a register"))?
            .data)
    }

    pub fn set_register(&mut self, name: &str, value: u16) -> Result<()> {
        let board = self.board_mut(name)?;
        board
            .as_register_mut()
            .with_context(|| format!("component [{name}] is not a register"))?
            .data = value;
        Ok(())
    }

    /// Driven level of a board's first output, as seen on the bus.
    pub fn output_word(&self, name: &str) -> Result<u16> {
        Ok(self.board(name)?.output_value(0).as_word())
    }

    pub fn ram_read(&self, addr: usize) -> Result<u16> {
        let ram = self.board("RAM")?.as_ram().context("no RAM state")?;
        ensure!(addr < ram.data.len(), "RAM[{addr}] is out of range");
        Ok(ram.data[addr])
    }

    /// Direct store used by test scripts; marks the cell as visited.
    pub fn ram_poke(&mut self, addr: usize, value: u16) -> Result<()> {
        let ram = self
            .board_mut("RAM")?
            .as_ram_mut()
            .context("no RAM state")?;
        ensure!(addr < ram.data.len(), "RAM[{addr}] is out of range");
        ram.data[addr] = value;
        ram.when[addr] = 1;
        Ok(())
    }

    pub fn ram_when(&self, addr: usize) -> Result<u64> {
        let ram = self.board("RAM")?.as_ram().context("no RAM state")?;
        ensure!(addr < ram.when.len(), "RAM[{addr}] is out of range");
        Ok(ram.when[addr])
    }

    pub fn prev_word(&self, key: &str) -> Result<u16> {
        Ok(self.board("PREV")?.mocked_get(key)?.as_word())
    }

    pub fn set_prev(&mut self, key: &str, value: Value) -> Result<()> {
        self.board_mut("PREV")?.mocked_set(key, value)
    }

    /// The terminal self-jump: the instruction just executed left PC
    /// where it started.
    pub fn halted(&self) -> bool {
        match (self.register_value("PC"), self.prev_word("_PC")) {
            (Ok(pc), Ok(prev)) => pc == prev,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Board;
    use crate::signal::Value;

    #[test]
    fn duplicate_producer_is_rejected() {
        let mut builder = MachineBuilder::new("test");
        builder
            .add(Board::register("R", ["DATA", "CLR", "STO", "GATE"]))
            .unwrap();
        let err = builder
            .add(Board::incrementor("R", "DATA"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("generated by both"), "{err}");
    }

    #[test]
    fn dangling_input_is_rejected() {
        let mut builder = MachineBuilder::new("test");
        builder
            .add(Board::register("R", ["NOWHERE", "TRUE", "TRUE", "TRUE"]))
            .unwrap();
        let err = builder.build(Some(1)).unwrap_err().to_string();
        assert!(err.contains("unknown signal [NOWHERE]"), "{err}");
    }

    fn latch_rig() -> Machine {
        let mut builder = MachineBuilder::new("test");
        builder
            .add(Board::mocked(
                "DRIVE",
                vec![
                    ("DATA", Value::Word(0)),
                    ("CLR", Value::Bit(false)),
                    ("STO", Value::Bit(false)),
                    ("GATE", Value::Bit(false)),
                    ("POWER", Value::Bit(true)),
                ],
            ))
            .unwrap();
        builder
            .add(Board::register("R", ["DATA", "CLR", "STO", "GATE"]).powered_by(&["POWER"]))
            .unwrap();
        builder.build(Some(99)).unwrap()
    }

    fn drive(machine: &mut Machine, cells: &[(&str, Value)]) -> SignalMap {
        for (key, value) in cells {
            machine
                .board_mut("DRIVE")
                .unwrap()
                .mocked_set(key, value.clone())
                .unwrap();
        }
        let signals = machine.gather();
        machine.settle(signals, TraceLevel::Off).unwrap()
    }

    #[test]
    fn settle_reaches_a_fixed_point() {
        let mut machine = latch_rig();
        let settled = drive(&mut machine, &[]);
        let again = machine.settle(settled.clone(), TraceLevel::Off).unwrap();
        assert_eq!(settled, again);
    }

    #[test]
    fn register_latches_through_the_machine() {
        let mut machine = latch_rig();
        drive(
            &mut machine,
            &[
                ("DATA", Value::Word(0x0011)),
                ("CLR", Value::Bit(true)),
                ("STO", Value::Bit(true)),
                ("GATE", Value::Bit(true)),
            ],
        );
        assert_eq!(machine.register_value("R").unwrap(), 0x0011);

        // CLR low: stored bits hold, new bits OR in.
        drive(
            &mut machine,
            &[("DATA", Value::Word(0x0100)), ("CLR", Value::Bit(false))],
        );
        assert_eq!(machine.register_value("R").unwrap(), 0x0111);
    }

    #[test]
    fn power_loss_zeroes_outputs_and_state() {
        let mut machine = latch_rig();
        drive(
            &mut machine,
            &[
                ("DATA", Value::Word(0xABCD)),
                ("CLR", Value::Bit(true)),
                ("STO", Value::Bit(true)),
                ("GATE", Value::Bit(true)),
            ],
        );
        assert_eq!(machine.register_value("R").unwrap(), 0xABCD);

        let settled = drive(&mut machine, &[("POWER", Value::Bit(false))]);
        assert_eq!(machine.register_value("R").unwrap(), 0);
        let id = machine.table().lookup("R").unwrap();
        assert_eq!(settled.get(id), &Value::Word(0));
    }

    #[test]
    fn oscillation_aborts() {
        let mut builder = MachineBuilder::new("test");
        // An inverter chewing on its own output never settles.
        builder
            .add(Board::multiplexer("X", ["X", "FALSE", "TRUE"]))
            .unwrap();
        let mut machine = builder.build(Some(3)).unwrap();
        let signals = machine.initial_signals();
        let err = machine
            .settle(signals, TraceLevel::Off)
            .unwrap_err()
            .to_string();
        assert!(err.contains("failed to settle"), "{err}");
    }

    #[test]
    fn same_seed_same_story() {
        let mut first = latch_rig();
        let mut second = latch_rig();
        let a = first
            .settle(first.initial_signals(), TraceLevel::Off)
            .unwrap();
        let b = second
            .settle(second.initial_signals(), TraceLevel::Off)
            .unwrap();
        assert_eq!(a, b);
    }
}
