//! Main memory: 4096 sixteen-bit words addressed by 12-bit addresses.

use crate::cpu::registers::{Address, Word};
use crate::image::Image;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// The number of memory cells.
pub const MEMORY_SIZE: usize = 4096;

/// Main memory, zero-initialized.
///
/// Serialized as a flat array of exactly [`MEMORY_SIZE`] words.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Word>", into = "Vec<Word>")]
pub struct Memory {
    cells: Vec<Word>,
}

/// Error returned when a word vector is not a full memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("memory must hold {MEMORY_SIZE} words, got {0}")]
pub struct WrongMemorySize(pub usize);

impl TryFrom<Vec<Word>> for Memory {
    type Error = WrongMemorySize;

    fn try_from(cells: Vec<Word>) -> Result<Self, Self::Error> {
        if cells.len() == MEMORY_SIZE {
            Ok(Self { cells })
        } else {
            Err(WrongMemorySize(cells.len()))
        }
    }
}

impl From<Memory> for Vec<Word> {
    fn from(mem: Memory) -> Vec<Word> {
        mem.cells
    }
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read a cell. Every [`Address`] is in range, so this cannot fail.
    #[inline]
    pub fn read(&self, addr: Address) -> Word {
        self.cells[addr.index()]
    }

    #[inline]
    pub(crate) fn write(&mut self, addr: Address, value: Word) {
        self.cells[addr.index()] = value;
    }

    /// Clear all memory to zeros.
    pub(crate) fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Replace memory contents with an image. Cells the image does not
    /// mention are zeroed.
    pub(crate) fn load_image(&mut self, image: &Image) {
        self.clear();
        for (addr, word) in image.iter() {
            self.write(addr, word);
        }
    }

    /// Dump `count` cells starting at `start`, clamped at the top of memory.
    pub fn dump(&self, start: Address, count: usize) -> Vec<(Address, Word)> {
        let end = start.index().saturating_add(count).min(MEMORY_SIZE);
        (start.index()..end)
            .map(|i| (Address::new(i as u16), self.cells[i]))
            .collect()
    }

    /// Iterate over cells holding a non-zero word.
    pub fn non_zero(&self) -> impl Iterator<Item = (Address, Word)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, w)| **w != 0)
            .map(|(i, w)| (Address::new(i as u16), *w))
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("non_zero_cells", &self.non_zero().count())
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}
