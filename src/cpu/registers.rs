//! Mano basic computer registers.
//!
//! The machine has six architectural registers:
//! - PC: 12-bit program counter
//! - AR: 12-bit address register
//! - IR: 16-bit instruction register
//! - AC: 16-bit accumulator
//! - DR: 16-bit data register
//! - E: 1-bit carry/rotate flag

use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;

/// A 16-bit memory word. Every mutation wraps modulo 2^16.
pub type Word = u16;

/// A 12-bit address.
/// Range: 0x000 to 0xFFF
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Address(u16);

impl Address {
    /// Highest addressable cell.
    pub const MAX: u16 = 0x0FFF;
    /// Address bits within a word.
    pub const MASK: u16 = 0x0FFF;

    /// Create a zero address.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from the low 12 bits of a value; higher bits are discarded.
    #[inline]
    pub const fn new(value: u16) -> Self {
        Self(value & Self::MASK)
    }

    /// Create from a raw value, rejecting anything above [`Address::MAX`].
    pub fn checked(value: u32) -> Option<Self> {
        u16::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
    }

    /// The raw 12-bit value.
    #[inline]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Index into memory.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The following address, wrapping 0xFFF to 0x000.
    #[inline]
    pub const fn next(self) -> Self {
        Self::new(self.0.wrapping_add(1))
    }

}

/// Error returned when a raw value does not fit in 12 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("address {0:X} outside 000-FFF")]
pub struct AddressOutOfRange(pub u16);

impl TryFrom<u16> for Address {
    type Error = AddressOutOfRange;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(AddressOutOfRange(value))
        }
    }
}

impl From<Address> for u16 {
    fn from(addr: Address) -> u16 {
        addr.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:03X})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03X}", self.0)
    }
}

/// Names of the architectural registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    Pc,
    Ar,
    Ir,
    Ac,
    Dr,
    E,
}

impl Register {
    /// All registers in display order.
    pub const ALL: [Register; 6] = [
        Register::Pc,
        Register::Ar,
        Register::Ir,
        Register::Ac,
        Register::Dr,
        Register::E,
    ];

    /// Upper-case register name.
    pub const fn name(self) -> &'static str {
        match self {
            Register::Pc => "PC",
            Register::Ar => "AR",
            Register::Ir => "IR",
            Register::Ac => "AC",
            Register::Dr => "DR",
            Register::E => "E",
        }
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Error returned when parsing an unknown register name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown register: {0}")]
pub struct UnknownRegister(pub String);

impl FromStr for Register {
    type Err = UnknownRegister;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Register::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRegister(s.to_string()))
    }
}

/// A set of registers, used to report what a transition changed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChangedRegisters(u8);

impl ChangedRegisters {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Registers whose values differ between two snapshots.
    pub fn between(before: &Registers, after: &Registers) -> Self {
        Register::ALL
            .into_iter()
            .filter(|r| before.get(*r) != after.get(*r))
            .collect()
    }

    pub fn insert(&mut self, reg: Register) {
        self.0 |= reg.bit();
    }

    pub const fn contains(self, reg: Register) -> bool {
        self.0 & reg.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set union.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Members in display order.
    pub fn iter(self) -> impl Iterator<Item = Register> {
        Register::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<Register> for ChangedRegisters {
    fn from_iter<I: IntoIterator<Item = Register>>(iter: I) -> Self {
        let mut set = Self::empty();
        for reg in iter {
            set.insert(reg);
        }
        set
    }
}

impl fmt::Debug for ChangedRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for ChangedRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Register::name).collect();
        f.write_str(&names.join(", "))
    }
}

/// The register file.
///
/// `Registers` is `Copy`, so a value doubles as a snapshot handed to
/// observers after every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    /// PC: address of the next instruction
    pub pc: Address,

    /// AR: address currently being accessed
    pub ar: Address,

    /// IR: instruction being decoded/executed
    pub ir: Word,

    /// AC: accumulator
    pub ac: Word,

    /// DR: operand fetched from memory, pending an ALU commit
    pub dr: Word,

    /// E: carry out of ADD, shifted through by CIR/CIL
    pub e: bool,
}

impl Registers {
    /// Create a register file with all values zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Increment the program counter by 1.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> Address {
        let old = self.pc;
        self.pc = self.pc.next();
        old
    }

    /// E as a 0/1 word.
    #[inline]
    pub fn e_bit(&self) -> Word {
        Word::from(self.e)
    }

    /// Read a register by name, widened to 16 bits.
    pub fn get(&self, reg: Register) -> Word {
        match reg {
            Register::Pc => self.pc.value(),
            Register::Ar => self.ar.value(),
            Register::Ir => self.ir,
            Register::Ac => self.ac,
            Register::Dr => self.dr,
            Register::E => self.e_bit(),
        }
    }

    /// Format a register the way the front panel shows it:
    /// 3 hex digits for addresses, 4 for words, 0/1 for E.
    pub fn format(&self, reg: Register) -> String {
        match reg {
            Register::Pc | Register::Ar => format!("{:03X}", self.get(reg)),
            Register::Ir | Register::Ac | Register::Dr => format!("{:04X}", self.get(reg)),
            Register::E => self.e_bit().to_string(),
        }
    }
}
