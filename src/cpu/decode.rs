//! Instruction decoder for the Mano basic computer.
//!
//! Instruction format (16 bits):
//! - Bit 15: indirect flag (I)
//! - Bits 14-12: opcode
//! - Bits 11-0: address field, or micro-operation enable bits when the
//!   high nibble is 0x7
//!
//! Decoding is total: every 16-bit word maps to an [`Instruction`].

use crate::cpu::registers::{Address, Word};
use serde::{Serialize, Deserialize};
use std::fmt;

/// The indirect-addressing flag.
pub const INDIRECT_BIT: Word = 0x8000;

/// High nibble selecting a register-reference instruction.
pub const REGISTER_REF_NIBBLE: u8 = 0x7;

/// The twelve micro-operation enable bits of a register-reference word.
///
/// Any combination is legal. Enabled operations apply in the order of
/// [`MicroOps::ORDER`], most significant bit first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MicroOps(u16);

impl MicroOps {
    pub const CLA: MicroOps = MicroOps(0x800);
    pub const CLE: MicroOps = MicroOps(0x400);
    pub const CMA: MicroOps = MicroOps(0x200);
    pub const CME: MicroOps = MicroOps(0x100);
    pub const CIR: MicroOps = MicroOps(0x080);
    pub const CIL: MicroOps = MicroOps(0x040);
    pub const INC: MicroOps = MicroOps(0x020);
    pub const SPA: MicroOps = MicroOps(0x010);
    pub const SNA: MicroOps = MicroOps(0x008);
    pub const SZA: MicroOps = MicroOps(0x004);
    pub const SZE: MicroOps = MicroOps(0x002);
    pub const HLT: MicroOps = MicroOps(0x001);

    /// Application order.
    pub const ORDER: [(MicroOps, &'static str); 12] = [
        (Self::CLA, "CLA"),
        (Self::CLE, "CLE"),
        (Self::CMA, "CMA"),
        (Self::CME, "CME"),
        (Self::CIR, "CIR"),
        (Self::CIL, "CIL"),
        (Self::INC, "INC"),
        (Self::SPA, "SPA"),
        (Self::SNA, "SNA"),
        (Self::SZA, "SZA"),
        (Self::SZE, "SZE"),
        (Self::HLT, "HLT"),
    ];

    /// Create from the low 12 bits of a word.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & Address::MASK)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is enabled here.
    pub const fn contains(self, other: MicroOps) -> bool {
        self.0 & other.0 == other.0
    }

    /// Enabled operations in application order, as single-bit values.
    pub fn iter(self) -> impl Iterator<Item = MicroOps> {
        Self::ORDER
            .into_iter()
            .map(|(op, _)| op)
            .filter(move |op| self.contains(*op))
    }

    /// Mnemonic of a single-bit value.
    pub fn mnemonic(self) -> Option<&'static str> {
        Self::ORDER
            .iter()
            .find(|(op, _)| *op == self)
            .map(|(_, name)| *name)
    }
}

impl std::ops::BitOr for MicroOps {
    type Output = MicroOps;

    fn bitor(self, rhs: MicroOps) -> MicroOps {
        MicroOps(self.0 | rhs.0)
    }
}

impl fmt::Debug for MicroOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MicroOps({self})")
    }
}

impl fmt::Display for MicroOps {
    /// Space-separated mnemonics, or `NOP` when no bit is enabled.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NOP");
        }
        let names: Vec<&str> = self.iter().filter_map(MicroOps::mnemonic).collect();
        f.write_str(&names.join(" "))
    }
}

/// Memory-reference operations, indexed by the 3-bit opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryOp {
    /// AC := AC & M[AR]
    And,
    /// AC := AC + M[AR], E := carry
    Add,
    /// AC := M[AR]
    Lda,
    /// M[AR] := AC
    Sta,
    /// PC := AR
    Bun,
    /// M[AR] := PC, PC := AR + 1
    Bsa,
    /// M[AR] := M[AR] + 1, skip if the result is zero
    Isz,
}

impl MemoryOp {
    pub const ALL: [MemoryOp; 7] = [
        MemoryOp::And,
        MemoryOp::Add,
        MemoryOp::Lda,
        MemoryOp::Sta,
        MemoryOp::Bun,
        MemoryOp::Bsa,
        MemoryOp::Isz,
    ];

    /// Look up a 3-bit opcode. Opcode 7 is not a memory operation.
    pub const fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            0 => Some(MemoryOp::And),
            1 => Some(MemoryOp::Add),
            2 => Some(MemoryOp::Lda),
            3 => Some(MemoryOp::Sta),
            4 => Some(MemoryOp::Bun),
            5 => Some(MemoryOp::Bsa),
            6 => Some(MemoryOp::Isz),
            _ => None,
        }
    }

    pub const fn opcode(self) -> u8 {
        self as u8
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            MemoryOp::And => "AND",
            MemoryOp::Add => "ADD",
            MemoryOp::Lda => "LDA",
            MemoryOp::Sta => "STA",
            MemoryOp::Bun => "BUN",
            MemoryOp::Bsa => "BSA",
            MemoryOp::Isz => "ISZ",
        }
    }
}

/// Instruction category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    RegisterRef,
    MemoryRef,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::RegisterRef => "register-reference",
            Category::MemoryRef => "memory-reference",
        })
    }
}

/// Decoded instruction: the operation descriptor computed at T2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// One of the seven memory-reference operations.
    Memory {
        op: MemoryOp,
        addr: Address,
        /// Bit 15 was set. Only honored when indirect addressing is enabled.
        indirect: bool,
    },

    /// Register-reference word (high nibble 0x7).
    Register(MicroOps),

    /// High nibble 0xF: no table entry. Follows the memory-reference path,
    /// reads its operand, and commits nothing.
    Unassigned { addr: Address },
}

impl Instruction {
    pub const fn category(&self) -> Category {
        match self {
            Instruction::Register(_) => Category::RegisterRef,
            Instruction::Memory { .. } | Instruction::Unassigned { .. } => Category::MemoryRef,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Memory { op, addr, indirect: false } => write!(f, "{} {addr}", op.mnemonic()),
            Instruction::Memory { op, addr, indirect: true } => write!(f, "{} I {addr}", op.mnemonic()),
            Instruction::Register(ops) => write!(f, "{ops}"),
            Instruction::Unassigned { addr } => write!(f, "??? {addr}"),
        }
    }
}

/// Decode an instruction word.
pub fn decode(ir: Word) -> Instruction {
    let nibble = (ir >> 12) as u8;
    let low = ir & Address::MASK;

    if nibble == REGISTER_REF_NIBBLE {
        return Instruction::Register(MicroOps::from_bits(low));
    }

    match MemoryOp::from_opcode(nibble & 0x7) {
        Some(op) => Instruction::Memory {
            op,
            addr: Address::new(low),
            indirect: ir & INDIRECT_BIT != 0,
        },
        None => Instruction::Unassigned { addr: Address::new(low) },
    }
}

/// Encode an instruction back to a word.
pub fn encode(instr: &Instruction) -> Word {
    match instr {
        Instruction::Memory { op, addr, indirect } => {
            let i = if *indirect { INDIRECT_BIT } else { 0 };
            i | (Word::from(op.opcode()) << 12) | addr.value()
        }
        Instruction::Register(ops) => (Word::from(REGISTER_REF_NIBBLE) << 12) | ops.bits(),
        Instruction::Unassigned { addr } => 0xF000 | addr.value(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_memory_table() {
        for (nibble, op) in MemoryOp::ALL.into_iter().enumerate() {
            let word = ((nibble as Word) << 12) | 0x0123;
            assert_eq!(
                decode(word),
                Instruction::Memory { op, addr: Address::new(0x123), indirect: false }
            );
        }
    }

    #[test]
    fn test_decode_indirect_bit() {
        assert_eq!(
            decode(0x9005),
            Instruction::Memory { op: MemoryOp::Add, addr: Address::new(5), indirect: true }
        );
    }

    #[test]
    fn test_decode_register_combinations() {
        assert_eq!(decode(0x7001), Instruction::Register(MicroOps::HLT));
        assert_eq!(decode(0x7000), Instruction::Register(MicroOps::empty()));
        // Not one of the twelve canonical codes, still legal.
        let Instruction::Register(ops) = decode(0x7A01) else {
            panic!("expected register-reference");
        };
        assert!(ops.contains(MicroOps::CLA));
        assert!(ops.contains(MicroOps::CMA));
        assert!(ops.contains(MicroOps::HLT));
        assert_eq!(ops.to_string(), "CLA CMA HLT");
    }

    #[test]
    fn test_decode_unassigned() {
        assert_eq!(decode(0xF800), Instruction::Unassigned { addr: Address::new(0x800) });
        assert_eq!(decode(0xF800).category(), Category::MemoryRef);
    }

    #[test]
    fn test_micro_op_order() {
        let all = MicroOps::from_bits(0x0FFF);
        let names: Vec<_> = all.iter().filter_map(MicroOps::mnemonic).collect();
        assert_eq!(
            names,
            ["CLA", "CLE", "CMA", "CME", "CIR", "CIL", "INC", "SPA", "SNA", "SZA", "SZE", "HLT"]
        );
    }

    proptest! {
        #[test]
        fn decode_is_total_and_encode_inverts(word: u16) {
            prop_assert_eq!(encode(&decode(word)), word);
        }
    }
}
