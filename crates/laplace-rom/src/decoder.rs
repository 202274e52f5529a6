//! Conversion of uniform bit vectors into the [`BitFloat`] representation
//!
//! The exponent is the number of leading zeros in the exponent field. When
//! the field is all zeros, fresh entropy is drawn and its leading zeros are
//! added to the running total, which extends the dynamic range beyond a
//! single draw. The total is clamped to the largest exponent of the octave
//! region (growing or diminishing) selected by the part bit.

use crate::bitfloat::BitFloat;
use crate::config::RngConfig;
use crate::low_mask;
use crate::urng::UniformSource;
use tracing::debug;

/// Count leading zeros of `val` within a `num_bits` wide field
///
/// Evaluated as a shift register: on each of `num_bits` steps the position
/// counts when `val - (val >> 1)` is zero, then `val` is shifted right.
/// `count_leading_zeros(0, n) == n` and `count_leading_zeros(1 << (n - 1), n) == 0`.
pub fn count_leading_zeros(val: u64, num_bits: u32) -> u64 {
    let mut local_val = val;
    let mut count = 0;
    for _ in 0..num_bits {
        if local_val - (local_val >> 1) == 0 {
            count += 1;
        }
        local_val >>= 1;
    }
    count
}

/// Decodes uniform source output into floating point fields
#[derive(Debug, Clone)]
pub struct FloatDecoder<S> {
    config: RngConfig,
    source: S,
}

impl<S: UniformSource> FloatDecoder<S> {
    pub fn new(config: RngConfig, source: S) -> Self {
        FloatDecoder { config, source }
    }

    pub fn config(&self) -> &RngConfig {
        &self.config
    }

    /// Draw a fresh `Bx` bit sample and decode it
    pub fn sample(&mut self) -> BitFloat {
        let raw = self.urng();
        self.decode(raw)
    }

    /// Decode an injected `Bx` bit value; bits above `Bx` are ignored
    ///
    /// May draw further samples from the source when the exponent field is
    /// all zeros.
    pub fn decode(&mut self, raw: u64) -> BitFloat {
        let bx = self.config.bx();
        let rn = raw & low_mask(bx);

        let symm = rn >> (bx - 1);
        // Top two bits minus symm: with symm set, part is set whatever the
        // second bit holds.
        let part = (rn >> (bx - 2)) - symm != 0;

        let max_exp = if part {
            self.config.diminishing_oct() as u64 - 1
        } else {
            self.config.growing_oct() as u64 - 1
        };

        let exp_bw = self.config.exp_bw();
        let mut exponent_part = self.exponent_field(rn);
        let mantissa = self.mantissa_field(rn);

        let mut leading_zeros = count_leading_zeros(exponent_part, exp_bw);
        while exponent_part == 0 && leading_zeros < max_exp {
            let extra = self.urng();
            exponent_part = self.exponent_field(extra);
            leading_zeros += count_leading_zeros(exponent_part, exp_bw);
            debug!(leading_zeros, max_exp, "exponent saturated, drew more entropy");
        }
        let exponent = leading_zeros.min(max_exp);

        BitFloat::from_fields(symm != 0, part, exponent, mantissa, bx, self.config.mant_bw())
    }

    /// Exponent bits of a raw bit vector
    pub fn exponent_field(&self, rbv: u64) -> u64 {
        (rbv >> self.config.mant_bw()) & low_mask(self.config.exp_bw())
    }

    /// Mantissa bits of a raw bit vector
    pub fn mantissa_field(&self, rbv: u64) -> u64 {
        rbv & low_mask(self.config.mant_bw())
    }

    /// Release the uniform source
    pub fn into_source(self) -> S {
        self.source
    }

    fn urng(&mut self) -> u64 {
        self.source.next_bits(self.config.bx())
    }
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptest_tests {
    use super::*;
    use crate::urng::ChaChaSource;
    use proptest::prelude::*;

    proptest! {
        /// Leading zero count is the field width minus the bit length
        #[test]
        fn clz_matches_bit_length(n in 1u32..=64, seed in any::<u64>()) {
            let val = seed & low_mask(n);
            let bit_length = 64 - val.leading_zeros() as u64;
            prop_assert_eq!(count_leading_zeros(val, n), n as u64 - bit_length);
        }

        /// Decoded exponent never exceeds the region maximum
        #[test]
        fn exponent_bounded(raw in any::<u64>(), seed in any::<u64>()) {
            let config = RngConfig::new(12, 16, 2, 4, 40, 5).unwrap();
            let mut decoder = FloatDecoder::new(config, ChaChaSource::seeded(seed));
            let bf = decoder.decode(raw);
            let max_exp = if bf.part() { 4 } else { 39 };
            prop_assert!(bf.exponent() <= max_exp);
        }
    }
}
