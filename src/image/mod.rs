//! Memory images: the address→word mappings that seed a machine.
//!
//! This module provides:
//! - [`Image`], a validated sparse memory image
//! - A line-oriented text format (`ADDRESS WORD`, both hex)
//! - A disassembler for words and whole images

pub mod disasm;
pub mod loader;

pub use disasm::{disassemble, disassemble_word};
pub use loader::{format_memory, load_image_file, parse_image, save_image, LoadedImage};

use crate::cpu::{Address, Word};
use std::collections::BTreeMap;
use thiserror::Error;

/// A sparse memory image.
///
/// Every entry is in range by construction; invalid entries are
/// rejected with an [`ImageError`] when the image is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    cells: BTreeMap<Address, Word>,
}

impl Image {
    /// Create an empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an image from raw entries, collecting the ones that were dropped.
    ///
    /// Later entries for the same address overwrite earlier ones.
    pub fn from_entries<I>(entries: I) -> (Self, Vec<ImageError>)
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let mut image = Self::new();
        let mut dropped = Vec::new();
        for (address, word) in entries {
            if let Err(e) = image.insert_raw(address, word) {
                dropped.push(e);
            }
        }
        (image, dropped)
    }

    /// Insert a raw entry, validating both halves.
    pub fn insert_raw(&mut self, address: u32, word: u32) -> Result<(), ImageError> {
        let addr = Address::checked(address)
            .ok_or(ImageError::InvalidAddress { line: None, address: u64::from(address) })?;
        let word = Word::try_from(word).map_err(|_| ImageError::MalformedWord {
            line: None,
            token: format!("{word:X}"),
        })?;
        self.cells.insert(addr, word);
        Ok(())
    }

    /// Look up a single address.
    pub fn get(&self, addr: Address) -> Option<Word> {
        self.cells.get(&addr).copied()
    }

    /// Entries in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (Address, Word)> + '_ {
        self.cells.iter().map(|(a, w)| (*a, *w))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(Address, Word)> for Image {
    fn from_iter<I: IntoIterator<Item = (Address, Word)>>(iter: I) -> Self {
        Self { cells: iter.into_iter().collect() }
    }
}

impl<const N: usize> From<[(u16, Word); N]> for Image {
    /// Convenience for literal programs; addresses are masked to 12 bits.
    fn from(entries: [(u16, Word); N]) -> Self {
        entries
            .into_iter()
            .map(|(a, w)| (Address::new(a), w))
            .collect()
    }
}

/// Errors raised while building or loading an image.
///
/// None of these are fatal: the offending entry or line is dropped and
/// the rest of the image still loads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("{}address {address:X} outside 000-FFF", line_prefix(.line))]
    InvalidAddress { line: Option<usize>, address: u64 },

    #[error("{}malformed word: {token:?}", line_prefix(.line))]
    MalformedWord { line: Option<usize>, token: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl ImageError {
    /// Attach a source line number.
    pub(crate) fn at_line(self, n: usize) -> Self {
        match self {
            ImageError::InvalidAddress { address, .. } => {
                ImageError::InvalidAddress { line: Some(n), address }
            }
            ImageError::MalformedWord { token, .. } => {
                ImageError::MalformedWord { line: Some(n), token }
            }
            other => other,
        }
    }
}

fn line_prefix(line: &Option<usize>) -> String {
    line.map(|n| format!("line {n}: ")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_entries_drops_invalid() {
        let (image, dropped) =
            Image::from_entries([(0, 0x2005), (0x1000, 0x7001), (5, 0x1_0000), (5, 0x1234)]);

        assert_eq!(image.len(), 2);
        assert_eq!(image.get(Address::new(5)), Some(0x1234));
        assert_eq!(dropped.len(), 2);
        assert!(matches!(dropped[0], ImageError::InvalidAddress { address: 0x1000, .. }));
        assert!(matches!(dropped[1], ImageError::MalformedWord { .. }));
    }

    #[test]
    fn test_later_entry_wins() {
        let (image, dropped) = Image::from_entries([(1, 0x1111), (1, 0x2222)]);
        assert!(dropped.is_empty());
        assert_eq!(image.get(Address::new(1)), Some(0x2222));
    }

    #[test]
    fn test_error_display() {
        let e = ImageError::InvalidAddress { line: Some(3), address: 0x1234 };
        assert_eq!(e.to_string(), "line 3: address 1234 outside 000-FFF");
        let e = ImageError::MalformedWord { line: None, token: "XYZ".into() };
        assert_eq!(e.to_string(), "malformed word: \"XYZ\"");
    }
}
