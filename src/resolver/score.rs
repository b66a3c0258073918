//! Packed link scores
//!
//! A score is a single non-negative `i64` so the best candidate is a plain
//! `max`. Criteria occupy bits in priority order; the low 32 bits hold the
//! inverted definition number so earlier overloads compare higher.
//!
//! ```text
//! bit 40      legal match (always set for a resolved link)
//! bit 39      exact text, not a plural/possessive interpretation
//! bit 38      same file as the link
//! bit 37      candidate's class is the link's enclosing scope
//! bit 36      same language
//! bits 0..32  u32::MAX - symbol_definition_number
//! ```

use crate::schema::UNRESOLVED_SCORE;

const LEGAL: i64 = 1 << 40;
const EXACT: i64 = 1 << 39;
const SAME_FILE: i64 = 1 << 38;
const SAME_CLASS: i64 = 1 << 37;
const SAME_LANGUAGE: i64 = 1 << 36;
const DEFINITION_MASK: i64 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub exact: bool,
    pub same_file: bool,
    pub same_class: bool,
    pub same_language: bool,
    pub definition_number: u32,
}

impl Score {
    pub fn to_i64(&self) -> i64 {
        let mut packed = LEGAL;
        if self.exact {
            packed |= EXACT;
        }
        if self.same_file {
            packed |= SAME_FILE;
        }
        if self.same_class {
            packed |= SAME_CLASS;
        }
        if self.same_language {
            packed |= SAME_LANGUAGE;
        }
        packed | i64::from(u32::MAX - self.definition_number)
    }

    /// Unpack a stored score. `None` for the unresolved sentinel.
    pub fn decode(packed: i64) -> Option<Self> {
        if packed == UNRESOLVED_SCORE || packed & LEGAL == 0 {
            return None;
        }
        Some(Self {
            exact: packed & EXACT != 0,
            same_file: packed & SAME_FILE != 0,
            same_class: packed & SAME_CLASS != 0,
            same_language: packed & SAME_LANGUAGE != 0,
            definition_number: u32::MAX - (packed & DEFINITION_MASK) as u32,
        })
    }
}
