//! Disassembler for Mano programs.
//!
//! Converts memory words back to readable assembly.

use super::Image;
use crate::cpu::{decode, Address, Word};

/// Disassemble a single word to text.
pub fn disassemble_word(word: Word) -> String {
    decode(word).to_string()
}

/// Disassemble every cell of an image.
pub fn disassemble(image: &Image) -> String {
    let mut output = String::new();
    output.push_str("; Mano Disassembly\n");
    output.push_str("; ----------------\n\n");

    for (addr, word) in image.iter() {
        output.push_str(&format_line(addr, word));
        output.push('\n');
    }

    output
}

fn format_line(addr: Address, word: Word) -> String {
    format!("{addr}: {word:04X}  {}", disassemble_word(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble_memory_ref() {
        assert_eq!(disassemble_word(0x2005), "LDA 005");
        assert_eq!(disassemble_word(0x6ABC), "ISZ ABC");
        assert_eq!(disassemble_word(0x9010), "ADD I 010");
    }

    #[test]
    fn test_disassemble_register_ref() {
        assert_eq!(disassemble_word(0x7001), "HLT");
        assert_eq!(disassemble_word(0x7800), "CLA");
        assert_eq!(disassemble_word(0x7C21), "CLA CLE INC HLT");
        assert_eq!(disassemble_word(0x7000), "NOP");
    }

    #[test]
    fn test_disassemble_unassigned() {
        assert_eq!(disassemble_word(0xF123), "??? 123");
    }

    #[test]
    fn test_disassemble_listing() {
        let listing = disassemble(&Image::from([(0, 0x2005), (1, 0x7001)]));
        assert!(listing.contains("000: 2005  LDA 005"));
        assert!(listing.contains("001: 7001  HLT"));
    }
}
