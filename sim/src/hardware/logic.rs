//! Combinational boards: multiplexers, gates, the ALU, the +1 adder,
//! the branch checker and the instruction decoder.

use super::{Board, Kind, Port};
use crate::signal::Value;

/// 2-to-1 select: output = A when CTRL is high, else B.
pub(super) fn mux_update(inputs: &[Port], outputs: &mut [Port]) {
    outputs[0].value = if inputs[0].value.as_bit() {
        inputs[1].value.clone()
    } else {
        inputs[2].value.clone()
    };
}

pub(super) fn and_update(inputs: &[Port], outputs: &mut [Port]) {
    outputs[0].value = Value::Bit(inputs.iter().all(|p| p.value.as_bit()));
}

pub(super) fn or_update(inputs: &[Port], outputs: &mut [Port]) {
    outputs[0].value = Value::Bit(inputs.iter().any(|p| p.value.as_bit()));
}

/// The HACK ALU: zero/negate each operand, add or AND, negate the
/// result, all under six control bits. Emits the value plus the ZR and
/// NG flags.
pub(super) fn alu_update(inputs: &[Port], outputs: &mut [Port]) {
    let mut x = inputs[0].value.as_word();
    let mut y = inputs[1].value.as_word();

    if inputs[2].value.as_bit() {
        x = 0;
    }
    if inputs[3].value.as_bit() {
        x = !x;
    }
    if inputs[4].value.as_bit() {
        y = 0;
    }
    if inputs[5].value.as_bit() {
        y = !y;
    }

    let mut out = if inputs[6].value.as_bit() {
        x.wrapping_add(y)
    } else {
        x & y
    };
    if inputs[7].value.as_bit() {
        out = !out;
    }

    outputs[0].value = Value::Word(out);
    outputs[1].value = Value::Bit(out == 0);
    outputs[2].value = Value::Bit(out & 0x8000 != 0);
}

/// +1 adder. The carry out of the top bit goes nowhere, so the count
/// rolls over at 0xFFFF.
pub(super) fn incrementor_update(inputs: &[Port], outputs: &mut [Port]) {
    outputs[0].value = Value::Word(inputs[0].value.as_word().wrapping_add(1));
}

/// Branch checker: combines the jump condition bits with the latched
/// flags.
pub(super) fn branch_update(inputs: &[Port], outputs: &mut [Port]) {
    let zr = inputs[0].value.as_bit();
    let ng = inputs[1].value.as_bit();
    let eq_branch = inputs[3].value.as_bit() && zr;
    let lt_branch = inputs[2].value.as_bit() && ng;
    let gt_branch = inputs[4].value.as_bit() && !(ng || zr);
    outputs[0].value = Value::Bit(eq_branch || lt_branch || gt_branch);
}

/// Instruction decoder. Control bits are only asserted for C
/// instructions, except STOA: an A instruction always writes the loaded
/// constant into AREG.
pub(super) fn decoder_update(inputs: &[Port], outputs: &mut [Port]) {
    let instr = inputs[0].value.as_word();
    let bit = |i: usize| (instr >> (15 - i)) & 1 != 0;
    let cinst = bit(0);

    let levels = [
        cinst,              // CINST
        bit(3) && cinst,    // A: A or M choice
        bit(4) && cinst,    // ZX, first of the 6 ALU control bits
        bit(5) && cinst,    // NX
        bit(6) && cinst,    // ZY
        bit(7) && cinst,    // NY
        bit(8) && cinst,    // F
        bit(9) && cinst,    // NO
        bit(10) || !cinst,  // STOA
        bit(11) && cinst,   // STOD
        bit(12) && cinst,   // STOM
        bit(13) && cinst,   // JLT
        bit(14) && cinst,   // JEQ
        bit(15) && cinst,   // JGT
    ];
    for (port, level) in outputs.iter_mut().zip(levels) {
        port.value = Value::Bit(level);
    }
}

impl Board {
    /// Inputs are CTRL, A, B.
    pub fn multiplexer(name: &str, inputs: [&str; 3]) -> Board {
        Board::assemble(
            name,
            inputs.iter().map(|n| Port::input(n)).collect(),
            vec![Port::word(name)],
            Kind::Multiplexer,
        )
    }

    pub fn and_gate(name: &str, inputs: &[&str]) -> Board {
        Board::assemble(
            name,
            inputs.iter().map(|n| Port::input(n)).collect(),
            vec![Port::bit(name)],
            Kind::And,
        )
    }

    pub fn or_gate(name: &str, inputs: &[&str]) -> Board {
        Board::assemble(
            name,
            inputs.iter().map(|n| Port::input(n)).collect(),
            vec![Port::bit(name)],
            Kind::Or,
        )
    }

    /// Inputs are X, Y, then ZX NX ZY NY F NO; outputs are the value
    /// and the ZR/NG flag lines.
    pub fn alu(name: &str, inputs: [&str; 8], outputs: [&str; 3]) -> Board {
        Board::assemble(
            name,
            inputs.iter().map(|n| Port::input(n)).collect(),
            vec![
                Port::word(outputs[0]),
                Port::bit(outputs[1]),
                Port::bit(outputs[2]),
            ],
            Kind::Alu,
        )
    }

    pub fn incrementor(name: &str, input: &str) -> Board {
        Board::assemble(
            name,
            vec![Port::input(input)],
            vec![Port::word(name)],
            Kind::Incrementor,
        )
    }

    /// Inputs are ZR, NG, JLT, JEQ, JGT.
    pub fn branch(name: &str, inputs: [&str; 5]) -> Board {
        Board::assemble(
            name,
            inputs.iter().map(|n| Port::input(n)).collect(),
            vec![Port::bit(name)],
            Kind::Branch,
        )
    }

    pub fn decoder(name: &str, input: &str) -> Board {
        let outputs = [
            "CINST", "A", "ZX", "NX", "ZY", "NY", "F", "NO", "STOA", "STOD", "STOM", "JLT", "JEQ",
            "JGT",
        ]
        .iter()
        .map(|n| Port::bit(n))
        .collect();
        Board::assemble(name, vec![Port::input(input)], outputs, Kind::Decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{bench, drive, out};
    use super::*;
    use crate::signal::{SignalMap, SignalTable};

    #[test]
    fn multiplexer_selects_on_ctrl() {
        let (mut board, table, mut map) = bench(Board::multiplexer("MUX", ["CTRL", "A", "B"]));
        drive(&mut map, &table, "A", Value::Word(11));
        drive(&mut map, &table, "B", Value::Word(22));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "MUX"), Value::Word(22));
        drive(&mut map, &table, "CTRL", Value::Bit(true));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "MUX"), Value::Word(11));
    }

    #[test]
    fn gates_reduce_all_inputs() {
        let (mut board, table, mut map) = bench(Board::and_gate("AND", &["A", "B", "C"]));
        drive(&mut map, &table, "A", Value::Bit(true));
        drive(&mut map, &table, "B", Value::Bit(true));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "AND"), Value::Bit(false));
        drive(&mut map, &table, "C", Value::Bit(true));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "AND"), Value::Bit(true));

        let (mut board, table, mut map) = bench(Board::or_gate("OR", &["A", "B"]));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "OR"), Value::Bit(false));
        drive(&mut map, &table, "B", Value::Bit(true));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "OR"), Value::Bit(true));
    }

    fn run_alu(
        board: &mut Board,
        table: &SignalTable,
        map: &mut SignalMap,
        x: u16,
        y: u16,
        ctrl: [bool; 6],
    ) -> (u16, bool, bool) {
        drive(map, table, "XREG", Value::Word(x));
        drive(map, table, "YREG", Value::Word(y));
        for (name, level) in ["ZX", "NX", "ZY", "NY", "F", "NO"].iter().zip(ctrl) {
            drive(map, table, name, Value::Bit(level));
        }
        board.update(map).unwrap();
        (
            out(board, "ALU").as_word(),
            out(board, "ZR").as_bit(),
            out(board, "NG").as_bit(),
        )
    }

    #[test]
    fn alu_computes_all_canonical_functions() {
        let (mut board, table, mut map) = bench(Board::alu(
            "ALU",
            ["XREG", "YREG", "ZX", "NX", "ZY", "NY", "F", "NO"],
            ["ALU", "ZR", "NG"],
        ));
        let d: u16 = 23;
        let a: u16 = 7;

        // (zx, nx, zy, ny, f, no) -> expected, for the 18 published
        // control combinations with x = D and y = A.
        let cases: [([bool; 6], u16); 18] = [
            ([true, false, true, false, true, false], 0), // 0
            ([true, true, true, true, true, true], 1),    // 1
            ([true, true, true, false, true, false], 0xFFFF), // -1
            ([false, false, true, true, false, false], d), // D
            ([true, true, false, false, false, false], a), // A
            ([false, false, true, true, false, true], !d), // !D
            ([true, true, false, false, false, true], !a), // !A
            ([false, false, true, true, true, true], d.wrapping_neg()), // -D
            ([true, true, false, false, true, true], a.wrapping_neg()), // -A
            ([false, true, true, true, true, true], d.wrapping_add(1)), // D+1
            ([true, true, false, true, true, true], a.wrapping_add(1)), // A+1
            ([false, false, true, true, true, false], d.wrapping_sub(1)), // D-1
            ([true, true, false, false, true, false], a.wrapping_sub(1)), // A-1
            ([false, false, false, false, true, false], d.wrapping_add(a)), // D+A
            ([false, true, false, false, true, true], d.wrapping_sub(a)), // D-A
            ([false, false, false, true, true, true], a.wrapping_sub(d)), // A-D
            ([false, false, false, false, false, false], d & a), // D&A
            ([false, true, false, true, false, true], d | a), // D|A
        ];

        for (ctrl, expected) in cases {
            let (value, zr, ng) = run_alu(&mut board, &table, &mut map, d, a, ctrl);
            assert_eq!(value, expected, "ctrl = {ctrl:?}");
            assert_eq!(zr, expected == 0, "ctrl = {ctrl:?}");
            assert_eq!(ng, expected & 0x8000 != 0, "ctrl = {ctrl:?}");
        }
    }

    #[test]
    fn alu_flags() {
        let (mut board, table, mut map) = bench(Board::alu(
            "ALU",
            ["XREG", "YREG", "ZX", "NX", "ZY", "NY", "F", "NO"],
            ["ALU", "ZR", "NG"],
        ));
        // D-A with D < A goes negative
        let minus = [false, true, false, false, true, true];
        let (value, zr, ng) = run_alu(&mut board, &table, &mut map, 3, 5, minus);
        assert_eq!(value, (-2i16) as u16);
        assert!(!zr);
        assert!(ng);
        // and zero when equal
        let (_, zr, ng) = run_alu(&mut board, &table, &mut map, 5, 5, minus);
        assert!(zr);
        assert!(!ng);
    }

    #[test]
    fn incrementor_rolls_over() {
        let (mut board, table, mut map) = bench(Board::incrementor("INCR", "PC"));
        drive(&mut map, &table, "PC", Value::Word(41));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "INCR"), Value::Word(42));
        drive(&mut map, &table, "PC", Value::Word(0xFFFF));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "INCR"), Value::Word(0));
    }

    #[test]
    fn branch_truth_table() {
        let (mut board, table, mut map) = bench(Board::branch(
            "BRANCH",
            ["ZR", "NG", "JLT", "JEQ", "JGT"],
        ));
        // (zr, ng, jlt, jeq, jgt) -> taken
        let cases = [
            (false, false, false, false, false, false),
            (true, false, false, true, false, true),   // JEQ on zero
            (true, false, true, false, false, false),  // JLT on zero
            (false, true, true, false, false, true),   // JLT on negative
            (false, true, false, false, true, false),  // JGT on negative
            (false, false, false, false, true, true),  // JGT on positive
            (true, false, false, false, true, false),  // JGT on zero
            (false, false, true, true, false, false),  // JLE on positive
            (true, false, true, true, true, true),     // JMP on zero
            (false, true, true, true, true, true),     // JMP on negative
            (false, false, true, true, true, true),    // JMP on positive
        ];
        for (zr, ng, jlt, jeq, jgt, taken) in cases {
            drive(&mut map, &table, "ZR", Value::Bit(zr));
            drive(&mut map, &table, "NG", Value::Bit(ng));
            drive(&mut map, &table, "JLT", Value::Bit(jlt));
            drive(&mut map, &table, "JEQ", Value::Bit(jeq));
            drive(&mut map, &table, "JGT", Value::Bit(jgt));
            board.update(&map).unwrap();
            assert_eq!(
                out(&board, "BRANCH"),
                Value::Bit(taken),
                "zr={zr} ng={ng} jlt={jlt} jeq={jeq} jgt={jgt}"
            );
        }
    }

    #[test]
    fn decoder_a_instruction_only_stores_a() {
        let (mut board, table, mut map) = bench(Board::decoder("DECODE", "INSTR"));
        drive(&mut map, &table, "INSTR", Value::Word(0b0000_0000_0000_1010));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "CINST"), Value::Bit(false));
        assert_eq!(out(&board, "STOA"), Value::Bit(true));
        for name in [
            "A", "ZX", "NX", "ZY", "NY", "F", "NO", "STOD", "STOM", "JLT", "JEQ", "JGT",
        ] {
            assert_eq!(out(&board, name), Value::Bit(false), "output {name}");
        }
    }

    #[test]
    fn decoder_c_instruction_field_map() {
        let (mut board, table, mut map) = bench(Board::decoder("DECODE", "INSTR"));
        // D=A : 1110110000010000
        drive(&mut map, &table, "INSTR", Value::Word(0b1110_1100_0001_0000));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "CINST"), Value::Bit(true));
        assert_eq!(out(&board, "A"), Value::Bit(false));
        assert_eq!(out(&board, "ZX"), Value::Bit(true));
        assert_eq!(out(&board, "NX"), Value::Bit(true));
        assert_eq!(out(&board, "ZY"), Value::Bit(false));
        assert_eq!(out(&board, "NY"), Value::Bit(false));
        assert_eq!(out(&board, "F"), Value::Bit(false));
        assert_eq!(out(&board, "NO"), Value::Bit(false));
        assert_eq!(out(&board, "STOA"), Value::Bit(false));
        assert_eq!(out(&board, "STOD"), Value::Bit(true));
        assert_eq!(out(&board, "STOM"), Value::Bit(false));

        // M=D+1;JGT with the a-bit set : 1111011111001001
        drive(&mut map, &table, "INSTR", Value::Word(0b1111_0111_1100_1001));
        board.update(&map).unwrap();
        assert_eq!(out(&board, "A"), Value::Bit(true));
        assert_eq!(out(&board, "STOM"), Value::Bit(true));
        assert_eq!(out(&board, "STOA"), Value::Bit(false));
        assert_eq!(out(&board, "JGT"), Value::Bit(true));
        assert_eq!(out(&board, "JLT"), Value::Bit(false));
    }
}
