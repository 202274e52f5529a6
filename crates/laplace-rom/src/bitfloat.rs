//! Fixed-width floating point representation of a uniform random sample
//!
//! Register layout, MSB first, total width `m`:
//!
//! ```text
//! [symm:1][part:1][exponent:m-2-mant_bw][mantissa:mant_bw]
//! ```
//!
//! `symm` selects the half of the symmetric ICDF, `part` splits the encoded
//! half into the growing and diminishing octave regions.

use crate::{low_mask, LaplaceRomError, Result, MAX_WORD_BITS};
use serde::{Deserialize, Serialize};

/// Decoded uniform sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitFloat {
    symm: bool,
    part: bool,
    exponent: u64,
    mantissa: u64,
    /// Total width in bits (`Bx`)
    m: u32,
    /// Mantissa width in bits
    mant_bw: u32,
}

impl BitFloat {
    /// Create a new value, checking every field against its bit budget
    pub fn new(
        symm: bool,
        part: bool,
        exponent: u64,
        mantissa: u64,
        m: u32,
        mant_bw: u32,
    ) -> Result<Self> {
        if m > MAX_WORD_BITS || m < mant_bw + 3 {
            return Err(LaplaceRomError::Configuration(format!(
                "BitFloat width {} cannot hold 2 flag bits, a mantissa of {} bits and an exponent",
                m, mant_bw
            )));
        }
        let exp_bw = m - 2 - mant_bw;
        if exponent > low_mask(exp_bw) {
            return Err(LaplaceRomError::FieldOverflow {
                field: "exponent",
                value: exponent,
                bits: exp_bw,
            });
        }
        if mantissa > low_mask(mant_bw) {
            return Err(LaplaceRomError::FieldOverflow {
                field: "mantissa",
                value: mantissa,
                bits: mant_bw,
            });
        }
        Ok(BitFloat {
            symm,
            part,
            exponent,
            mantissa,
            m,
            mant_bw,
        })
    }

    /// Fields already masked to their widths by the decoder
    pub(crate) fn from_fields(
        symm: bool,
        part: bool,
        exponent: u64,
        mantissa: u64,
        m: u32,
        mant_bw: u32,
    ) -> Self {
        debug_assert!(exponent <= low_mask(m - 2 - mant_bw));
        debug_assert!(mantissa <= low_mask(mant_bw));
        BitFloat {
            symm,
            part,
            exponent,
            mantissa,
            m,
            mant_bw,
        }
    }

    /// Split an `m` bit register into its fields
    ///
    /// Bits above `m` are ignored.
    pub fn from_bits(bits: u64, m: u32, mant_bw: u32) -> Result<Self> {
        // Validate widths before shifting
        BitFloat::new(false, false, 0, 0, m, mant_bw)?;
        let exp_bw = m - 2 - mant_bw;
        let symm = (bits >> (m - 1)) & 1 == 1;
        let part = (bits >> (m - 2)) & 1 == 1;
        let exponent = (bits >> mant_bw) & low_mask(exp_bw);
        let mantissa = bits & low_mask(mant_bw);
        BitFloat::new(symm, part, exponent, mantissa, m, mant_bw)
    }

    /// Pack into the `m` bit register layout
    pub fn to_bits(&self) -> u64 {
        let mut bits = (self.exponent << self.mant_bw) + self.mantissa;
        bits |= (self.part as u64) << (self.m - 2);
        bits |= (self.symm as u64) << (self.m - 1);
        bits
    }

    pub fn symm(&self) -> bool {
        self.symm
    }

    pub fn part(&self) -> bool {
        self.part
    }

    pub fn exponent(&self) -> u64 {
        self.exponent
    }

    pub fn mantissa(&self) -> u64 {
        self.mantissa
    }

    /// Total width in bits
    pub fn width(&self) -> u32 {
        self.m
    }

    pub fn mant_bw(&self) -> u32 {
        self.mant_bw
    }

    /// Exponent field width in bits
    pub fn exp_bw(&self) -> u32 {
        self.m - 2 - self.mant_bw
    }
}

impl std::fmt::Display for BitFloat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}_{:0ew$b}_{:0mw$b}",
            self.symm as u8,
            self.part as u8,
            self.exponent,
            self.mantissa,
            ew = self.exp_bw() as usize,
            mw = self.mant_bw as usize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_bits_layout() {
        // m = 8, mant_bw = 3 -> exp_bw = 3
        let bf = BitFloat::new(true, false, 0b101, 0b011, 8, 3).unwrap();
        assert_eq!(bf.to_bits(), 0b1_0_101_011);

        let bf = BitFloat::new(false, true, 0b001, 0b111, 8, 3).unwrap();
        assert_eq!(bf.to_bits(), 0b0_1_001_111);
    }

    #[test]
    fn test_from_bits_splits_fields() {
        let bf = BitFloat::from_bits(0b11_010_110, 8, 3).unwrap();
        assert!(bf.symm());
        assert!(bf.part());
        assert_eq!(bf.exponent(), 0b010);
        assert_eq!(bf.mantissa(), 0b110);
        assert_eq!(bf.exp_bw(), 3);
    }

    #[test]
    fn test_field_overflow_rejected() {
        let err = BitFloat::new(false, false, 8, 0, 8, 3).unwrap_err();
        assert!(matches!(err, LaplaceRomError::FieldOverflow { field: "exponent", .. }));

        let err = BitFloat::new(false, false, 0, 8, 8, 3).unwrap_err();
        assert!(matches!(err, LaplaceRomError::FieldOverflow { field: "mantissa", .. }));
    }

    #[test]
    fn test_width_without_exponent_rejected() {
        assert!(BitFloat::new(false, false, 0, 0, 5, 3).is_err());
        assert!(BitFloat::new(false, false, 0, 0, 65, 3).is_err());
    }

    #[test]
    fn test_display() {
        let bf = BitFloat::new(false, true, 0b001, 0b010, 8, 3).unwrap();
        assert_eq!(bf.to_string(), "01_001_010");
    }
}

/// Property-based tests using proptest
#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Packing then splitting returns the same fields
        #[test]
        fn bits_roundtrip(
            m in 4u32..=64,
            mant_seed in any::<u32>(),
            symm in any::<bool>(),
            part in any::<bool>(),
            exp_seed in any::<u64>(),
            mant_value_seed in any::<u64>(),
        ) {
            let mant_bw = mant_seed % (m - 2);
            let exp_bw = m - 2 - mant_bw;
            let exponent = exp_seed & low_mask(exp_bw);
            let mantissa = mant_value_seed & low_mask(mant_bw);

            let bf = BitFloat::new(symm, part, exponent, mantissa, m, mant_bw).unwrap();
            let back = BitFloat::from_bits(bf.to_bits(), m, mant_bw).unwrap();
            prop_assert_eq!(back, bf);
        }
    }
}
