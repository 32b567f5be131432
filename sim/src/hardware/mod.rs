//! Component boards. Each board models one physical card in the relay
//! machine: it reads named input and power signals from the bus and
//! drives its own named outputs.

mod logic;
mod storage;
mod timing;

pub use logic::*;
pub use storage::*;
pub use timing::*;

use anyhow::{bail, ensure, Context, Result};

use crate::signal::{SignalId, SignalMap, Value, FALSE};

/// One named connection of a board. Input and power ports keep the last
/// sampled level so a diagnostic dump can show what the board saw;
/// output ports hold the driven level between settling rounds.
#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub(crate) id: SignalId,
    pub value: Value,
    /// Level this port falls to when the board loses power.
    pub(crate) zero: Value,
}

impl Port {
    pub(crate) fn input(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: FALSE,
            value: Value::Bit(false),
            zero: Value::Bit(false),
        }
    }

    pub(crate) fn bit(name: &str) -> Self {
        Self::input(name)
    }

    pub(crate) fn word(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: FALSE,
            value: Value::Word(0),
            zero: Value::Word(0),
        }
    }

    pub(crate) fn text(name: &str, off: &str) -> Self {
        Self {
            name: name.to_string(),
            id: FALSE,
            value: Value::Text(off.to_string()),
            zero: Value::Text(off.to_string()),
        }
    }
}

/// Per-variant behavior and state. The set of boards is closed: the two
/// supported wirings are built from exactly these.
#[derive(Debug)]
pub enum Kind {
    Reset(ResetState),
    Clock(ClockState),
    Sequencer(SequencerState),
    Matrix(MatrixState),
    Rom(RomState),
    Ram(RamState),
    Register(RegisterState),
    ConditionCodes(FlagState),
    Mocked(MockedState),
    Multiplexer,
    And,
    Or,
    Alu,
    Incrementor,
    Branch,
    Decoder,
}

impl Kind {
    fn update(&mut self, inputs: &[Port], outputs: &mut [Port]) -> Result<()> {
        match self {
            Kind::Reset(state) => state.update(outputs),
            Kind::Clock(state) => state.update(outputs),
            Kind::Sequencer(state) => state.update(inputs, outputs),
            Kind::Matrix(state) => state.update(inputs, outputs),
            Kind::Rom(state) => return state.update(inputs, outputs),
            Kind::Ram(state) => return state.update(inputs, outputs),
            Kind::Register(state) => state.update(inputs, outputs),
            Kind::ConditionCodes(state) => state.update(inputs, outputs),
            Kind::Mocked(state) => state.update(outputs),
            Kind::Multiplexer => logic::mux_update(inputs, outputs),
            Kind::And => logic::and_update(inputs, outputs),
            Kind::Or => logic::or_update(inputs, outputs),
            Kind::Alu => logic::alu_update(inputs, outputs),
            Kind::Incrementor => logic::incrementor_update(inputs, outputs),
            Kind::Branch => logic::branch_update(inputs, outputs),
            Kind::Decoder => logic::decoder_update(inputs, outputs),
        }
        Ok(())
    }

    /// Clear whatever state only exists while the board has power.
    fn drop_state(&mut self) {
        match self {
            Kind::Reset(state) => state.on = false,
            Kind::Clock(state) => {
                state.ticktock = false;
                state.time = 0;
            }
            Kind::Sequencer(state) => {
                state.cycle = 0;
                state.last_clock = false;
            }
            Kind::Register(state) => state.data = 0,
            Kind::ConditionCodes(state) => {
                state.zr = false;
                state.ng = false;
            }
            Kind::Ram(state) => state.data.fill(0),
            _ => {}
        }
    }
}

/// A named board with its port lists and variant state.
#[derive(Debug)]
pub struct Board {
    pub name: String,
    /// Diagnostic display order; assigned by the machine builder when
    /// the board does not pin one explicitly.
    pub(crate) sequence: Option<i32>,
    /// Reserved for bridging to a physical card over a bench jig.
    pub emulated: bool,
    pub(crate) inputs: Vec<Port>,
    pub(crate) outputs: Vec<Port>,
    pub(crate) power: Vec<Port>,
    pub(crate) kind: Kind,
}

impl Board {
    /// Power defaults to the TRUE rail: a board with no explicit power
    /// sources is always on.
    pub(crate) fn assemble(name: &str, inputs: Vec<Port>, outputs: Vec<Port>, kind: Kind) -> Self {
        Self {
            name: name.to_string(),
            sequence: None,
            emulated: true,
            inputs,
            outputs,
            power: vec![Port::input("TRUE")],
            kind,
        }
    }

    pub fn powered_by(mut self, names: &[&str]) -> Self {
        self.power = names.iter().map(|n| Port::input(n)).collect();
        self
    }

    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub(crate) fn resolve(&mut self, table: &mut crate::signal::SignalTable) {
        for port in self
            .inputs
            .iter_mut()
            .chain(self.power.iter_mut())
            .chain(self.outputs.iter_mut())
        {
            port.id = table.intern(&port.name);
        }
    }

    pub fn sequence(&self) -> i32 {
        self.sequence.unwrap_or(0)
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub fn output_value(&self, index: usize) -> &Value {
        &self.outputs[index].value
    }

    fn is_powered(&self) -> bool {
        self.power.is_empty() || self.power.iter().any(|p| p.value.as_bit())
    }

    fn power_down(&mut self) {
        for port in &mut self.outputs {
            port.value = port.zero.clone();
        }
        self.kind.drop_state();
    }

    /// Sample inputs and power from the bus, then drive the outputs.
    /// A board without power drops every output to its off level.
    pub fn update(&mut self, signals: &SignalMap) -> Result<()> {
        for port in self.inputs.iter_mut().chain(self.power.iter_mut()) {
            port.value = signals.get(port.id).clone();
        }
        if !self.is_powered() {
            self.power_down();
            return Ok(());
        }
        self.kind.update(&self.inputs, &mut self.outputs)
    }

    /// Advance the master clock. The new edge reaches the bus at the
    /// next settle; this only flips the stored phase.
    pub fn tick(&mut self, signals: &SignalMap) -> Result<u64> {
        ensure!(
            matches!(self.kind, Kind::Clock(_)),
            "component [{}] is not a clock",
            self.name
        );
        for port in self.power.iter_mut() {
            port.value = signals.get(port.id).clone();
        }
        if !self.is_powered() {
            self.power_down();
            return Ok(0);
        }
        let Kind::Clock(clock) = &mut self.kind else {
            unreachable!()
        };
        clock.ticktock = !clock.ticktock;
        clock.time += 1;
        Ok(clock.time)
    }

    /// Raise or drop the reset line. Takes effect on the output ports
    /// immediately, ahead of the next settle.
    pub fn set_reset(&mut self, on: bool) -> Result<()> {
        let Kind::Reset(state) = &mut self.kind else {
            bail!("component [{}] is not a reset button", self.name);
        };
        state.on = on;
        self.outputs[0].value = Value::Bit(on);
        self.outputs[1].value = Value::Bit(!on);
        if on {
            tracing::info!("RESET raised");
        } else {
            tracing::info!("RESET dropped");
        }
        Ok(())
    }

    pub fn as_register(&self) -> Option<&RegisterState> {
        match &self.kind {
            Kind::Register(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_register_mut(&mut self) -> Option<&mut RegisterState> {
        match &mut self.kind {
            Kind::Register(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_ram(&self) -> Option<&RamState> {
        match &self.kind {
            Kind::Ram(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_ram_mut(&mut self) -> Option<&mut RamState> {
        match &mut self.kind {
            Kind::Ram(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_rom(&self) -> Option<&RomState> {
        match &self.kind {
            Kind::Rom(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_sequencer(&self) -> Option<&SequencerState> {
        match &self.kind {
            Kind::Sequencer(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_reset(&self) -> Option<&ResetState> {
        match &self.kind {
            Kind::Reset(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_mocked(&self) -> bool {
        matches!(self.kind, Kind::Mocked(_))
    }

    /// Read one snapshot cell of a mockup board.
    pub fn mocked_get(&self, key: &str) -> Result<&Value> {
        let Kind::Mocked(state) = &self.kind else {
            bail!("component [{}] is not a mockup", self.name);
        };
        let index = self
            .outputs
            .iter()
            .position(|p| p.name == key)
            .with_context(|| format!("mockup [{}] has no cell [{key}]", self.name))?;
        Ok(&state.cells[index])
    }

    /// Overwrite one snapshot cell of a mockup board.
    pub fn mocked_set(&mut self, key: &str, value: Value) -> Result<()> {
        let index = self
            .outputs
            .iter()
            .position(|p| p.name == key)
            .with_context(|| format!("mockup [{}] has no cell [{key}]", self.name))?;
        let Kind::Mocked(state) = &mut self.kind else {
            bail!("component [{}] is not a mockup", self.name);
        };
        state.cells[index] = value;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::Board;
    use crate::signal::{SignalMap, SignalTable, Value};

    /// Resolve a lone board against a fresh table so unit tests can
    /// drive its inputs by name.
    pub(crate) fn bench(mut board: Board) -> (Board, SignalTable, SignalMap) {
        let mut table = SignalTable::new();
        board.resolve(&mut table);
        let map = SignalMap::new(&table);
        (board, table, map)
    }

    pub(crate) fn drive(map: &mut SignalMap, table: &SignalTable, name: &str, value: Value) {
        map.set(table.lookup(name).expect("signal not interned"), value);
    }

    pub(crate) fn out(board: &Board, name: &str) -> Value {
        board
            .outputs
            .iter()
            .find(|p| p.name == name)
            .expect("no such output")
            .value
            .clone()
    }
}
