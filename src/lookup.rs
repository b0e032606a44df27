//! Offset-binary sample lookup tables.
//!
//! Packed payload bytes decode to amplitudes through a 256-entry table per
//! `(bit depth, real/complex)` key, built lazily on first use and shared
//! read-only for the rest of the process. The key set is small and fixed:
//! 1, 2, 4 and 8-bit real, 1, 2 and 4-bit complex.

use std::sync::OnceLock;

use crate::header::RealOrComplex;
use crate::{Error, Result};

/// Calibrated 2-bit high-state magnitude (Mark5A convention).
const M5A_2BIT_HIGH: f32 = 3.3359;
/// Empirical 1-sigma normalization for 4-bit quantization.
const FOUR_BIT_1_SIGMA: f32 = 2.95;
/// 1-sigma normalization for 8-bit quantization.
const EIGHT_BIT_1_SIGMA: f32 = 3.3;

fn level2(key: u8) -> f32 {
    if key == 0 {
        -1.0
    } else {
        1.0
    }
}

fn level4(key: u8) -> f32 {
    [-M5A_2BIT_HIGH, -1.0, 1.0, M5A_2BIT_HIGH][(key & 0b11) as usize]
}

fn level16(key: u8) -> f32 {
    (f32::from(key & 0b1111) - 8.0) / FOUR_BIT_1_SIGMA
}

fn level256(key: u8) -> f32 {
    (f32::from(key) - 128.0) / EIGHT_BIT_1_SIGMA
}

fn decode_field(bits: u8, key: u8) -> f32 {
    match bits {
        1 => level2(key & 0b1),
        2 => level4(key),
        4 => level16(key),
        _ => level256(key),
    }
}

/// Decode table for one `(bits_per_sample, real/complex)` key.
///
/// Each of the 256 rows holds the float values decoded from one byte:
/// `8 / bits` real amplitudes, or `8 / (2 * bits)` complex values stored
/// as interleaved re/im pairs. Either way a row is `8 / bits` floats.
#[derive(Debug)]
pub struct LookupTable {
    bits: u8,
    kind: RealOrComplex,
    rows: Vec<Vec<f32>>,
}

impl LookupTable {
    fn build(bits: u8, kind: RealOrComplex) -> Self {
        let mut rows = Vec::with_capacity(256);
        for byte in 0..=255u8 {
            rows.push(match kind {
                RealOrComplex::Real => {
                    let segments = 8 / usize::from(bits);
                    (0..segments)
                        .map(|j| decode_field(bits, byte >> (usize::from(bits) * j)))
                        .collect()
                }
                RealOrComplex::Complex => {
                    let field = usize::from(bits);
                    let segments = 8 / (2 * field);
                    let mut row = Vec::with_capacity(2 * segments);
                    for j in 0..segments {
                        // low bits are the real part, the imaginary part
                        // sits immediately above it
                        let re = byte >> (2 * field * j);
                        let im = byte >> (2 * field * j + field);
                        row.push(decode_field(bits, re));
                        row.push(decode_field(bits, im));
                    }
                    row
                }
            });
        }
        LookupTable { bits, kind, rows }
    }

    #[must_use]
    pub fn bits_per_sample(&self) -> u8 {
        self.bits
    }

    #[must_use]
    pub fn kind(&self) -> RealOrComplex {
        self.kind
    }

    /// Floats decoded from one payload byte. Complex samples occupy two
    /// consecutive floats.
    #[must_use]
    pub fn row(&self, byte: u8) -> &[f32] {
        &self.rows[byte as usize]
    }

    /// Samples (not floats) decoded from one byte.
    #[must_use]
    pub fn samples_per_byte(&self) -> usize {
        match self.kind {
            RealOrComplex::Real => 8 / usize::from(self.bits),
            RealOrComplex::Complex => 8 / (2 * usize::from(self.bits)),
        }
    }

    /// Floats written per sample: 1 for real data, 2 for complex.
    #[must_use]
    pub fn floats_per_sample(&self) -> usize {
        match self.kind {
            RealOrComplex::Real => 1,
            RealOrComplex::Complex => 2,
        }
    }
}

static REAL_TABLES: [OnceLock<LookupTable>; 4] = [
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
];
static COMPLEX_TABLES: [OnceLock<LookupTable>; 3] =
    [OnceLock::new(), OnceLock::new(), OnceLock::new()];

/// Fetch (building on first use) the process-wide table for a key.
///
/// # Errors
/// [`Error::UnsupportedEncoding`] for any key outside the fixed set.
pub fn get_table(bits: u8, kind: RealOrComplex) -> Result<&'static LookupTable> {
    let slot = match (kind, bits) {
        (RealOrComplex::Real, 1) => &REAL_TABLES[0],
        (RealOrComplex::Real, 2) => &REAL_TABLES[1],
        (RealOrComplex::Real, 4) => &REAL_TABLES[2],
        (RealOrComplex::Real, 8) => &REAL_TABLES[3],
        (RealOrComplex::Complex, 1) => &COMPLEX_TABLES[0],
        (RealOrComplex::Complex, 2) => &COMPLEX_TABLES[1],
        (RealOrComplex::Complex, 4) => &COMPLEX_TABLES[2],
        _ => return Err(Error::UnsupportedEncoding { bits, kind }),
    };
    Ok(slot.get_or_init(|| LookupTable::build(bits, kind)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_bit_real_extremes() {
        let t = get_table(1, RealOrComplex::Real).unwrap();
        assert_eq!(t.samples_per_byte(), 8);
        assert_eq!(t.row(0b0000_0000), &[-1.0f32; 8]);
        assert_eq!(t.row(0b1111_1111), &[1.0f32; 8]);
        // alternating pattern: bit 0 decodes first
        assert_eq!(
            t.row(0b1010_1010),
            &[-1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0]
        );
    }

    #[test]
    fn two_bit_real_levels() {
        let t = get_table(2, RealOrComplex::Real).unwrap();
        assert_eq!(t.samples_per_byte(), 4);
        // fields 00, 01, 10, 11 from low bits up
        assert_eq!(
            t.row(0b11_10_01_00),
            &[-M5A_2BIT_HIGH, -1.0, 1.0, M5A_2BIT_HIGH]
        );
    }

    #[test]
    fn four_bit_real_is_linear() {
        let t = get_table(4, RealOrComplex::Real).unwrap();
        assert_eq!(t.samples_per_byte(), 2);
        let row = t.row(0x38); // low field 8, high field 3
        assert!((row[0] - 0.0).abs() < 1e-6);
        assert!((row[1] - (3.0 - 8.0) / FOUR_BIT_1_SIGMA).abs() < 1e-6);
    }

    #[test]
    fn eight_bit_real_is_linear() {
        let t = get_table(8, RealOrComplex::Real).unwrap();
        assert_eq!(t.samples_per_byte(), 1);
        assert!((t.row(128)[0] - 0.0).abs() < 1e-6);
        assert!((t.row(0)[0] + 128.0 / EIGHT_BIT_1_SIGMA).abs() < 1e-6);
    }

    #[test]
    fn one_bit_complex_pairs() {
        let t = get_table(1, RealOrComplex::Complex).unwrap();
        assert_eq!(t.samples_per_byte(), 4);
        assert_eq!(t.floats_per_sample(), 2);
        // byte 0b01: re = bit0 = 1, im = bit1 = 0 for the first sample
        let row = t.row(0b01);
        assert_eq!(&row[..2], &[1.0, -1.0]);
        assert_eq!(&row[2..], &[-1.0, -1.0, -1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn four_bit_complex_one_sample_per_byte() {
        let t = get_table(4, RealOrComplex::Complex).unwrap();
        assert_eq!(t.samples_per_byte(), 1);
        let row = t.row(0x28); // re field 8, im field 2
        assert!((row[0] - 0.0).abs() < 1e-6);
        assert!((row[1] - (2.0 - 8.0) / FOUR_BIT_1_SIGMA).abs() < 1e-6);
    }

    #[test]
    fn unsupported_keys_are_errors() {
        assert!(matches!(
            get_table(3, RealOrComplex::Real),
            Err(Error::UnsupportedEncoding { bits: 3, .. })
        ));
        assert!(matches!(
            get_table(8, RealOrComplex::Complex),
            Err(Error::UnsupportedEncoding { bits: 8, .. })
        ));
    }

    #[test]
    fn tables_are_cached() {
        let a = get_table(2, RealOrComplex::Real).unwrap() as *const LookupTable;
        let b = get_table(2, RealOrComplex::Real).unwrap() as *const LookupTable;
        assert_eq!(a, b);
    }
}
