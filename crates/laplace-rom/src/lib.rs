//! Laplace ROM - Hardware-Efficient Laplace Noise Generation
//!
//! Software model of a Laplace-distributed random number generator intended
//! for an FPGA implementation, plus the per-sensor privacy budget layer that
//! gates access to noised sensor readings.
//!
//! # Pipeline
//!
//! ```text
//! UniformSource -> FloatDecoder -> BitFloat -> IcdfTable -> Laplace sample
//! ```
//!
//! - A uniform source produces `Bx` random bits.
//! - The decoder splits them into a symmetry bit, a part bit, an exponent
//!   (by leading-zero counting, drawing more entropy when the exponent
//!   saturates) and a mantissa.
//! - The table is a piecewise-linear approximation of the Laplace inverse
//!   CDF, addressed by (section, subsection) and linearly interpolated with
//!   the low mantissa bits.
//!
//! # Example
//!
//! ```rust
//! use laplace_rom::{ChaChaSource, IcdfTable, LaplaceRng, RngConfig};
//!
//! let config = RngConfig::new(8, 16, 2, 3, 4, 3).unwrap();
//! let table = IcdfTable::build(&config).unwrap();
//! assert_eq!(table.len(), (4 + 3) * 4);
//!
//! let mut rng = LaplaceRng::new(config, ChaChaSource::seeded(7)).unwrap();
//! let noise = rng.sample().unwrap();
//! assert!(noise.is_finite());
//! ```

pub mod bitfloat;
pub mod config;
pub mod decoder;
pub mod icdf;
pub mod rng;
pub mod sensor;
pub mod table;
pub mod urng;
pub mod verilog;

// Re-export commonly used types for convenience
pub use bitfloat::BitFloat;
pub use config::{PrivacyFile, RngConfig, RngSection, UrngSection};
pub use decoder::{count_leading_zeros, FloatDecoder};
pub use rng::{LaplaceRng, TableAddress};
pub use sensor::{
    BudgetManager, FixedCostPolicy, PrivacyPolicy, ReadBitfield, RomNoisePolicy, Sensor,
    SensorBudget, SensorId, SensorSpec, SignalSource, UniformSignal,
};
pub use table::{IcdfTable, TableSummary};
pub use urng::{ChaChaSource, ReplaySource, UniformSource};

use std::path::PathBuf;
use thiserror::Error;

/// Default number of growing octaves
pub const DEFAULT_GROWING_OCT: u32 = 54;

/// Default number of diminishing octaves
pub const DEFAULT_DIMINISHING_OCT: u32 = 4;

/// Widest supported uniform source / table word
pub const MAX_WORD_BITS: u32 = 64;

/// Errors that can occur while configuring or running the generator
#[derive(Debug, Error)]
pub enum LaplaceRomError {
    /// Configuration rejected at construction time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Scale computation is undefined for this configuration
    #[error("Arithmetic degeneracy: {0}")]
    ArithmeticDegeneracy(String),

    /// A field value does not fit in its bit budget
    #[error("Field '{field}' value {value} does not fit in {bits} bits")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        bits: u32,
    },

    /// Table address outside the ROM
    #[error("Address (section {section}, subsection {subsection}) outside table of {len} entries")]
    AddressOutOfRange {
        section: usize,
        subsection: usize,
        len: usize,
    },

    /// No sensor registered under this id
    #[error("Unknown sensor id {0}")]
    UnknownSensor(usize),

    /// Filesystem failure
    #[error("IO error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed configuration file
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl LaplaceRomError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LaplaceRomError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, LaplaceRomError>;

/// Mask with the low `bits` bits set
#[inline]
pub(crate) fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
