//! Clocking boards: the reset button, the master clock, the phase
//! sequencer and the diode matrix that expands phases into control
//! lines.

use anyhow::{bail, Result};

use super::{Board, Kind, Port};
use crate::signal::Value;

/// Reset button. No inputs; flipped imperatively via
/// [`Board::set_reset`].
#[derive(Debug)]
pub struct ResetState {
    pub on: bool,
}

impl ResetState {
    pub(super) fn update(&mut self, outputs: &mut [Port]) {
        outputs[0].value = Value::Bit(self.on);
        outputs[1].value = Value::Bit(!self.on);
    }
}

/// Master clock. Alternates between high and low once per
/// [`Board::tick`]; `time` counts edges since power-on.
#[derive(Debug)]
pub struct ClockState {
    pub ticktock: bool,
    pub time: u64,
}

impl ClockState {
    pub(super) fn update(&mut self, outputs: &mut [Port]) {
        for port in outputs.iter_mut() {
            port.value = Value::Bit(self.ticktock);
        }
    }
}

/// Phase sequencer. Advances a 0..TICKS ring on every clock edge.
///
/// `Sx` rises at phase x and stays up through phase x+1; `SxA` is the
/// clean one-phase pulse. The two-phase overlap mirrors the hardware,
/// where adjacent control windows must not open a gap at the edge.
#[derive(Debug)]
pub struct SequencerState {
    pub ticks: usize,
    pub cycle: usize,
    pub last_clock: bool,
}

impl SequencerState {
    pub(super) fn update(&mut self, inputs: &[Port], outputs: &mut [Port]) {
        let clock = inputs[0].value.as_bit();
        let reset = inputs[1].value.as_bit();

        // Leave phase 0 only once RESET has dropped.
        if clock != self.last_clock {
            if self.cycle > 0 {
                self.cycle += 1;
                if self.cycle == self.ticks {
                    self.cycle = 0;
                }
            } else if !reset {
                self.cycle = 1;
            }
        }
        self.last_clock = clock;

        for port in outputs.iter_mut() {
            port.value = Value::Bit(false);
        }
        outputs[self.cycle].value = Value::Bit(true);
        outputs[self.ticks + self.cycle].value = Value::Bit(true);
        if self.cycle > 0 {
            outputs[self.cycle - 1].value = Value::Bit(true);
        }
    }
}

/// Sparse OR array: each output line is high iff any of its listed
/// phase inputs is high. In hardware this is a diode matrix.
#[derive(Debug)]
pub struct MatrixState {
    /// Input positions per output, resolved at construction.
    pub rows: Vec<Vec<usize>>,
}

impl MatrixState {
    pub(super) fn update(&mut self, inputs: &[Port], outputs: &mut [Port]) {
        for (port, row) in outputs.iter_mut().zip(&self.rows) {
            port.value = Value::Bit(row.iter().any(|&i| inputs[i].value.as_bit()));
        }
    }
}

impl Board {
    pub fn reset(name: &str, outputs: [&str; 2]) -> Board {
        Board::assemble(
            name,
            vec![],
            vec![Port::bit(outputs[0]), Port::bit(outputs[1])],
            Kind::Reset(ResetState { on: false }),
        )
    }

    pub fn clock(name: &str) -> Board {
        Board::assemble(
            name,
            vec![],
            vec![Port::bit(name)],
            Kind::Clock(ClockState {
                ticktock: false,
                time: 0,
            }),
        )
    }

    /// Output names are generated: `S0..S{ticks-1}` then the `A`
    /// variants in the same order.
    pub fn sequencer(name: &str, inputs: [&str; 2], ticks: usize) -> Board {
        let mut outputs: Vec<Port> = (0..ticks).map(|t| Port::bit(&format!("S{t}"))).collect();
        outputs.extend((0..ticks).map(|t| Port::bit(&format!("S{t}A"))));
        Board::assemble(
            name,
            vec![Port::input(inputs[0]), Port::input(inputs[1])],
            outputs,
            Kind::Sequencer(SequencerState {
                ticks,
                cycle: 0,
                last_clock: false,
            }),
        )
    }

    /// `rows` maps each output line to the phase inputs that drive it.
    pub fn matrix(name: &str, inputs: &[&str], rows: &[(&str, &[&str])]) -> Result<Board> {
        let input_ports: Vec<Port> = inputs.iter().map(|n| Port::input(n)).collect();
        let mut outputs = Vec::with_capacity(rows.len());
        let mut resolved = Vec::with_capacity(rows.len());
        for (line, sources) in rows {
            let mut positions = Vec::with_capacity(sources.len());
            for source in *sources {
                match inputs.iter().position(|n| n == source) {
                    Some(p) => positions.push(p),
                    None => bail!(
                        "matrix [{name}] line [{line}] references undeclared input [{source}]"
                    ),
                }
            }
            outputs.push(Port::bit(line));
            resolved.push(positions);
        }
        Ok(Board::assemble(
            name,
            input_ports,
            outputs,
            Kind::Matrix(MatrixState { rows: resolved }),
        ))
    }
}
