//! Generator configuration
//!
//! [`RngConfig`] is the validated, immutable parameter set every other
//! component is built from. [`PrivacyFile`] is its on-disk form, with the
//! uniform source and the Laplace generator under separate headings:
//!
//! ```toml
//! [urng]
//! bx = 8
//!
//! [rng]
//! by = 16
//! k = 2
//! mant_bw = 3
//! growing_oct = 4
//! diminishing_oct = 3
//! ```

use crate::icdf::{exp2i, laplace_inv_cdf};
use crate::{LaplaceRomError, Result, DEFAULT_DIMINISHING_OCT, DEFAULT_GROWING_OCT, MAX_WORD_BITS};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest subsection exponent (subsection addresses are 32 bits wide)
pub const MAX_K: u32 = 32;

/// Largest ROM, in entries per coefficient table
pub const MAX_TABLE_LEN: usize = 1 << 24;

/// Raw generator parameters, before validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngParams {
    /// Number of random bits produced by the uniform source
    pub bx: u32,
    /// Number of bits in the Laplace output
    pub by: u32,
    /// Each octave is divided into 2^k subsections
    pub k: u32,
    /// Width of the mantissa field
    pub mant_bw: u32,
    /// Number of growing octaves
    pub growing_oct: u32,
    /// Number of diminishing octaves
    pub diminishing_oct: u32,
}

/// Validated generator configuration with cached derived constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RngParams", into = "RngParams")]
pub struct RngConfig {
    params: RngParams,
    exp_bw: u32,
    min_x: f64,
    max_x: f64,
    quantisation_step: f64,
}

impl RngConfig {
    /// Create a configuration, rejecting parameter sets the hardware layout
    /// cannot represent
    pub fn new(
        bx: u32,
        by: u32,
        k: u32,
        mant_bw: u32,
        growing_oct: u32,
        diminishing_oct: u32,
    ) -> Result<Self> {
        Self::from_params(RngParams {
            bx,
            by,
            k,
            mant_bw,
            growing_oct,
            diminishing_oct,
        })
    }

    /// Create a configuration with the default octave split (54 growing, 4 diminishing)
    pub fn with_default_octaves(bx: u32, by: u32, k: u32, mant_bw: u32) -> Result<Self> {
        Self::new(bx, by, k, mant_bw, DEFAULT_GROWING_OCT, DEFAULT_DIMINISHING_OCT)
    }

    /// Validate raw parameters and compute the derived constants
    pub fn from_params(params: RngParams) -> Result<Self> {
        let RngParams {
            bx,
            by,
            k,
            mant_bw,
            growing_oct,
            diminishing_oct,
        } = params;

        if bx > MAX_WORD_BITS {
            return Err(LaplaceRomError::Configuration(format!(
                "Bx = {} exceeds the {} bit uniform source limit",
                bx, MAX_WORD_BITS
            )));
        }
        let exp_bw = match bx.checked_sub(2).and_then(|v| v.checked_sub(mant_bw)) {
            Some(v) if v >= 1 => v,
            _ => {
                return Err(LaplaceRomError::Configuration(
                    "Bx - 2 - mant_bw must be > 0".to_string(),
                ))
            }
        };
        if by == 0 || by > MAX_WORD_BITS {
            return Err(LaplaceRomError::Configuration(format!(
                "By = {} must be in 1..={} to store table entries",
                by, MAX_WORD_BITS
            )));
        }
        if k > MAX_K {
            return Err(LaplaceRomError::Configuration(format!(
                "k = {} too large to address subsections in {} bits",
                k, MAX_K
            )));
        }
        if mant_bw <= k {
            return Err(LaplaceRomError::Configuration(format!(
                "mant_bw ({}) must be greater than k ({})",
                mant_bw, k
            )));
        }
        let address_space = 1u64 << exp_bw;
        if growing_oct as u64 > address_space {
            return Err(LaplaceRomError::Configuration(
                "Number of growing octaves cannot exceed address space (2^exp_bw)".to_string(),
            ));
        }
        if diminishing_oct as u64 > address_space {
            return Err(LaplaceRomError::Configuration(
                "Number of diminishing octaves cannot exceed address space (2^exp_bw)".to_string(),
            ));
        }
        if growing_oct == 0 || diminishing_oct == 0 {
            return Err(LaplaceRomError::Configuration(
                "Octave counts must be at least 1".to_string(),
            ));
        }
        let table_len = (growing_oct as usize)
            .checked_add(diminishing_oct as usize)
            .zip(1usize.checked_shl(k))
            .and_then(|(sections, subsections)| sections.checked_mul(subsections));
        match table_len {
            Some(len) if len <= MAX_TABLE_LEN => {}
            _ => {
                return Err(LaplaceRomError::Configuration(format!(
                    "(growing_oct + diminishing_oct) * 2^k exceeds the {} entry ROM limit",
                    MAX_TABLE_LEN
                )))
            }
        }

        let min_x = exp2i(-(growing_oct as i64 + 3));
        let max_x = 0.5 - exp2i(-(diminishing_oct as i64 + 3));
        let quantisation_step =
            (laplace_inv_cdf(max_x, 0.0, 1.0) - laplace_inv_cdf(min_x, 0.0, 1.0)) / exp2i(by as i64);

        Ok(RngConfig {
            params,
            exp_bw,
            min_x,
            max_x,
            quantisation_step,
        })
    }

    pub fn params(&self) -> RngParams {
        self.params
    }

    pub fn bx(&self) -> u32 {
        self.params.bx
    }

    pub fn by(&self) -> u32 {
        self.params.by
    }

    pub fn k(&self) -> u32 {
        self.params.k
    }

    pub fn mant_bw(&self) -> u32 {
        self.params.mant_bw
    }

    pub fn growing_oct(&self) -> u32 {
        self.params.growing_oct
    }

    pub fn diminishing_oct(&self) -> u32 {
        self.params.diminishing_oct
    }

    /// Width of the exponent field: `Bx - 2 - mant_bw`
    pub fn exp_bw(&self) -> u32 {
        self.exp_bw
    }

    /// Mantissa bits below the subsection address: `mant_bw - k`
    pub fn remaining_mant_bits(&self) -> u32 {
        self.params.mant_bw - self.params.k
    }

    /// Number of table sections (growing + diminishing octaves)
    pub fn num_sections(&self) -> usize {
        self.params.growing_oct as usize + self.params.diminishing_oct as usize
    }

    /// Number of subsections per section (2^k)
    pub fn num_subsections(&self) -> usize {
        1usize << self.params.k
    }

    /// Total number of table entries
    pub fn table_len(&self) -> usize {
        self.num_sections() * self.num_subsections()
    }

    /// Smallest ICDF input covered by the growing octaves
    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    /// Largest ICDF input covered by the diminishing octaves
    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    /// Output step of a `By` bit quantisation of the covered ICDF range
    pub fn quantisation_step(&self) -> f64 {
        self.quantisation_step
    }
}

impl TryFrom<RngParams> for RngConfig {
    type Error = LaplaceRomError;

    fn try_from(params: RngParams) -> Result<Self> {
        RngConfig::from_params(params)
    }
}

impl From<RngConfig> for RngParams {
    fn from(config: RngConfig) -> Self {
        config.params
    }
}

/// Uniform source heading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UrngSection {
    pub bx: u32,
}

/// Laplace generator heading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RngSection {
    pub by: u32,
    pub k: u32,
    pub mant_bw: u32,
    #[serde(default = "default_growing_oct")]
    pub growing_oct: u32,
    #[serde(default = "default_diminishing_oct")]
    pub diminishing_oct: u32,
}

fn default_growing_oct() -> u32 {
    DEFAULT_GROWING_OCT
}

fn default_diminishing_oct() -> u32 {
    DEFAULT_DIMINISHING_OCT
}

/// Privacy configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivacyFile {
    pub urng: UrngSection,
    pub rng: RngSection,
}

impl PrivacyFile {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| LaplaceRomError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate into a generator configuration
    pub fn into_config(self) -> Result<RngConfig> {
        RngConfig::new(
            self.urng.bx,
            self.rng.by,
            self.rng.k,
            self.rng.mant_bw,
            self.rng.growing_oct,
            self.rng.diminishing_oct,
        )
    }

    /// Example file contents
    pub fn example() -> &'static str {
        r#"# laplace-rom privacy configuration

[urng]
# Number of bits produced by the uniform random source
bx = 64

[rng]
# Number of bits in the Laplace output
by = 16
# Each octave is divided into 2^k subsections
k = 2
# Width of the mantissa field (must be greater than k)
mant_bw = 3
# Octaves on each side of the growing/diminishing split
growing_oct = 54
diminishing_oct = 4
"#
    }
}

impl From<&RngConfig> for PrivacyFile {
    fn from(config: &RngConfig) -> Self {
        PrivacyFile {
            urng: UrngSection { bx: config.bx() },
            rng: RngSection {
                by: config.by(),
                k: config.k(),
                mant_bw: config.mant_bw(),
                growing_oct: config.growing_oct(),
                diminishing_oct: config.diminishing_oct(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = RngConfig::new(8, 16, 2, 3, 4, 3).unwrap();
        assert_eq!(config.exp_bw(), 3);
        assert_eq!(config.remaining_mant_bits(), 1);
        assert_eq!(config.num_sections(), 7);
        assert_eq!(config.num_subsections(), 4);
        assert_eq!(config.table_len(), 28);
    }

    #[test]
    fn test_exp_bw_must_be_positive() {
        // 8 - 2 - 6 = 0
        let err = RngConfig::new(8, 16, 2, 6, 1, 1).unwrap_err();
        assert!(matches!(err, LaplaceRomError::Configuration(_)));
        // underflow
        assert!(RngConfig::new(4, 16, 2, 6, 1, 1).is_err());
    }

    #[test]
    fn test_octaves_bounded_by_address_space() {
        // exp_bw = 3 -> at most 8 octaves each side
        assert!(RngConfig::new(8, 16, 2, 3, 8, 8).is_ok());
        assert!(RngConfig::new(8, 16, 2, 3, 9, 3).is_err());
        assert!(RngConfig::new(8, 16, 2, 3, 4, 9).is_err());
    }

    #[test]
    fn test_rejects_degenerate_widths() {
        assert!(RngConfig::new(8, 0, 2, 3, 4, 3).is_err());
        assert!(RngConfig::new(8, 65, 2, 3, 4, 3).is_err());
        assert!(RngConfig::new(65, 16, 2, 3, 4, 3).is_err());
        // mant_bw must exceed k
        assert!(RngConfig::new(8, 16, 3, 3, 4, 3).is_err());
        assert!(RngConfig::new(8, 16, 2, 3, 0, 3).is_err());
        assert!(RngConfig::new(8, 16, 2, 3, 4, 0).is_err());
    }

    #[test]
    fn test_rejects_oversized_table() {
        // exp_bw = 29 admits 2^29 octaves, but 2^29 * 2^32 entries cannot be stored
        let err = RngConfig::new(64, 16, 32, 33, 1 << 29, 4).unwrap_err();
        assert!(matches!(err, LaplaceRomError::Configuration(_)));
        assert!(RngConfig::new(64, 16, 20, 24, 20, 4).is_err());

        // exactly at the limit
        let config = RngConfig::new(64, 16, 22, 24, 2, 2).unwrap();
        assert_eq!(config.table_len(), MAX_TABLE_LEN);
    }

    #[test]
    fn test_derived_constants() {
        let config = RngConfig::new(8, 16, 2, 3, 4, 3).unwrap();
        assert_eq!(config.min_x(), 1.0 / 128.0);
        assert_eq!(config.max_x(), 0.5 - 1.0 / 64.0);

        let expected = (laplace_inv_cdf(config.max_x(), 0.0, 1.0)
            - laplace_inv_cdf(config.min_x(), 0.0, 1.0))
            / 65536.0;
        assert!((config.quantisation_step() - expected).abs() < 1e-15);
        assert!(config.quantisation_step() > 0.0);
    }

    #[test]
    fn test_default_octaves() {
        let config = RngConfig::with_default_octaves(64, 16, 2, 3).unwrap();
        assert_eq!(config.growing_oct(), 54);
        assert_eq!(config.diminishing_oct(), 4);
    }

    #[test]
    fn test_parse_privacy_file() {
        let file = PrivacyFile::from_toml_str(
            "[urng]\nbx = 8\n[rng]\nby = 16\nk = 2\nmant_bw = 3\ngrowing_oct = 4\ndiminishing_oct = 3\n",
        )
        .unwrap();
        let config = file.into_config().unwrap();
        assert_eq!(config, RngConfig::new(8, 16, 2, 3, 4, 3).unwrap());
    }

    #[test]
    fn test_privacy_file_defaults_octaves() {
        let file =
            PrivacyFile::from_toml_str("[urng]\nbx = 64\n[rng]\nby = 16\nk = 2\nmant_bw = 3\n")
                .unwrap();
        assert_eq!(file.rng.growing_oct, 54);
        assert_eq!(file.rng.diminishing_oct, 4);
    }

    #[test]
    fn test_privacy_file_rejects_unknown_heading() {
        let err = PrivacyFile::from_toml_str(
            "[urng]\nbx = 8\n[rng]\nby = 16\nk = 2\nmant_bw = 3\n[extra]\nfoo = 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, LaplaceRomError::ConfigParse(_)));
    }

    #[test]
    fn test_example_is_valid() {
        let config = PrivacyFile::from_toml_str(PrivacyFile::example())
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.bx(), 64);
    }

    #[test]
    fn test_serde_validates() {
        let config = RngConfig::new(8, 16, 2, 3, 4, 3).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: RngConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let bad = r#"{"bx":8,"by":16,"k":2,"mant_bw":6,"growing_oct":1,"diminishing_oct":1}"#;
        assert!(serde_json::from_str::<RngConfig>(bad).is_err());
    }
}
