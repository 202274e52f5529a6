//! Laplace sampler: uniform source, decoder and ICDF table composed
//!
//! A decoded sample addresses the table as
//!
//! ```text
//! section    = (part ? growing_oct : 0) + exponent
//! subsection = mantissa >> (mant_bw - k)
//! mant_lsbs  = mantissa & (2^(mant_bw - k - 1) - 1)
//! ```
//!
//! The table returns the magnitude; the symmetry bit picks the half of the
//! distribution (clear: lower half, negative values).

use crate::bitfloat::BitFloat;
use crate::config::RngConfig;
use crate::decoder::FloatDecoder;
use crate::low_mask;
use crate::table::IcdfTable;
use crate::urng::UniformSource;
use crate::{LaplaceRomError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Table coordinates of a decoded sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAddress {
    pub section: usize,
    pub subsection: usize,
    pub mant_lsbs: u64,
}

impl TableAddress {
    pub fn of(config: &RngConfig, bf: &BitFloat) -> Self {
        let offset = if bf.part() {
            config.growing_oct() as usize
        } else {
            0
        };
        let remaining = config.remaining_mant_bits();
        TableAddress {
            section: offset + bf.exponent() as usize,
            subsection: (bf.mantissa() >> remaining) as usize,
            // one bit narrower than the bits below the subsection address
            mant_lsbs: bf.mantissa() & low_mask(remaining - 1),
        }
    }
}

/// Laplace(0, 1) generator modelled on the hardware pipeline
#[derive(Debug, Clone)]
pub struct LaplaceRng<S> {
    decoder: FloatDecoder<S>,
    table: Arc<IcdfTable>,
}

impl<S: UniformSource> LaplaceRng<S> {
    /// Build the table for `config` and attach `source`
    pub fn new(config: RngConfig, source: S) -> Result<Self> {
        let table = IcdfTable::build(&config)?;
        Ok(LaplaceRng {
            decoder: FloatDecoder::new(config, source),
            table: Arc::new(table),
        })
    }

    /// Share an already built table
    pub fn with_table(config: RngConfig, table: Arc<IcdfTable>, source: S) -> Result<Self> {
        if table.len() != config.table_len()
            || table.part_offset() != config.growing_oct() as usize
            || table.remaining_mant_bits() != config.remaining_mant_bits()
        {
            return Err(LaplaceRomError::Configuration(
                "ICDF table was built for a different configuration".to_string(),
            ));
        }
        Ok(LaplaceRng {
            decoder: FloatDecoder::new(config, source),
            table,
        })
    }

    pub fn config(&self) -> &RngConfig {
        self.decoder.config()
    }

    pub fn table(&self) -> &Arc<IcdfTable> {
        &self.table
    }

    /// Decode an injected raw value
    pub fn decode(&mut self, raw: u64) -> BitFloat {
        self.decoder.decode(raw)
    }

    /// Interpolated ICDF magnitude for a decoded sample, in table units
    pub fn lookup(&self, bf: &BitFloat) -> Result<f64> {
        let address = TableAddress::of(self.decoder.config(), bf);
        self.table
            .interpolate(address.section, address.subsection, address.mant_lsbs)
    }

    /// Signed sample in table units (`2^-scale_exp` per unit)
    pub fn sample_fixed(&mut self) -> Result<f64> {
        let bf = self.decoder.sample();
        let magnitude = self.lookup(&bf)?;
        Ok(if bf.symm() { magnitude } else { -magnitude })
    }

    /// Sample from Laplace(0, 1)
    pub fn sample(&mut self) -> Result<f64> {
        let fixed = self.sample_fixed()?;
        Ok(self.table.to_real(fixed))
    }

    /// Sample from Laplace(0, scale)
    pub fn sample_scaled(&mut self, scale: f64) -> Result<f64> {
        Ok(self.sample()? * scale)
    }
}
