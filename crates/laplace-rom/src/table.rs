//! Piecewise-linear Laplace ICDF lookup table (simulated ROM)
//!
//! The encoded half of the ICDF domain `(0, 0.5)` is split into octaves.
//! Growing octaves (`part = false`) halve in width towards zero, diminishing
//! octaves (`part = true`) halve in width towards 0.5. Each octave is a
//! section of `2^k` subsections, addressed as `section * 2^k + subsection`.
//!
//! ```text
//! section:   0        1      ...  g-1 | g        ...      g+d-1
//! domain:  [1/8,1/4] [1/16,1/8] ... [0,.] | [1/4,3/8] ... [., 1/2]
//! ```
//!
//! `c0` holds the quantised ICDF magnitude at each subsection boundary and
//! `c1` the per-step slope used to interpolate with the low mantissa bits:
//! `y = c0[addr] + c1[addr] * mant_lsbs`.

use crate::config::RngConfig;
use crate::icdf::{exp2i, icdf_abs_quantised, laplace_inv_cdf};
use crate::{LaplaceRomError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Placement of one section within the ICDF domain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OctaveGeometry {
    /// Diminishing region
    pub part: bool,
    /// Width of the whole section
    pub width: f64,
    /// Upper bound for growing sections, lower bound for diminishing ones
    pub bound: f64,
}

impl OctaveGeometry {
    /// Geometry of `section` for the given octave split
    ///
    /// The section closest to zero has the same width as its neighbour,
    /// and so does the final section next to 0.5.
    pub fn of(section: usize, growing_oct: usize, num_sections: usize) -> Self {
        if section + 1 == growing_oct {
            let width = exp2i(-(section as i64 + 2));
            OctaveGeometry {
                part: false,
                width,
                bound: width,
            }
        } else if section + 1 == num_sections {
            let exp = (section - growing_oct) as i64;
            let width = exp2i(-(exp + 2));
            OctaveGeometry {
                part: true,
                width,
                bound: 0.5 - width,
            }
        } else if section >= growing_oct {
            let exp = (section - growing_oct) as i64;
            OctaveGeometry {
                part: true,
                width: exp2i(-(exp + 3)),
                bound: 0.5 - exp2i(-(exp + 2)),
            }
        } else {
            let exp = section as i64;
            OctaveGeometry {
                part: false,
                width: exp2i(-(exp + 3)),
                bound: exp2i(-(exp + 2)),
            }
        }
    }

    /// ICDF input sampled for `subsection`
    ///
    /// Diminishing sections step up from the lower bound, growing sections
    /// step down from the upper bound.
    pub fn x_coord(&self, subsection: usize, num_subsections: usize) -> f64 {
        let subsection_width = self.width / num_subsections as f64;
        if self.part {
            self.bound + (subsection + 1) as f64 * subsection_width
        } else {
            self.bound - subsection as f64 * subsection_width
        }
    }
}

/// Table statistics for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSummary {
    pub length: usize,
    pub num_sections: usize,
    pub num_subsections: usize,
    pub scale_exp: i32,
    pub max_out: u64,
    /// Output value of one least significant bit
    pub output_lsb: f64,
}

/// Read-only ICDF lookup table built from one [`RngConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct IcdfTable {
    k: u32,
    growing_oct: usize,
    num_sections: usize,
    remaining_mant_bits: u32,
    scale_exp: i32,
    max_out: u64,
    c0: Vec<u64>,
    c1: Vec<f64>,
}

impl IcdfTable {
    /// Compute both coefficient tables
    ///
    /// Deterministic in `config`. Fails when the fixed-point scale cannot be
    /// derived.
    pub fn build(config: &RngConfig) -> Result<Self> {
        let num_sect = config.num_sections();
        let num_subsect = config.num_subsections();
        let growing_oct = config.growing_oct() as usize;
        let remaining_mant_bits = config.remaining_mant_bits();
        let length = num_sect * num_subsect;

        // Smallest division within the smallest subsection for part = false
        let mut min_x_coord = exp2i(-(growing_oct as i64 + 1)); // Octave width
        min_x_coord /= num_subsect as f64; // Subsection width
        min_x_coord /= exp2i(remaining_mant_bits as i64); // Mantissa division width

        let max_abs = 0.0 - laplace_inv_cdf(min_x_coord, 0.0, 1.0);
        if !max_abs.is_finite() || max_abs <= 0.0 {
            return Err(LaplaceRomError::ArithmeticDegeneracy(format!(
                "largest ICDF magnitude {} at x = {:e} has no finite log2",
                max_abs, min_x_coord
            )));
        }
        let scale_exp = config.by() as f64 - 1.0 - max_abs.log2().ceil();
        if scale_exp < i32::MIN as f64 || scale_exp > i32::MAX as f64 {
            return Err(LaplaceRomError::ArithmeticDegeneracy(format!(
                "scale_exp {} is too large to store in i32",
                scale_exp
            )));
        }
        let scale_exp = scale_exp as i32;
        let max_out = icdf_abs_quantised(min_x_coord, scale_exp);
        debug!(scale_exp, max_out, length, "building ICDF table");

        let mut c0 = vec![0u64; length];
        for section in 0..num_sect {
            let octave = OctaveGeometry::of(section, growing_oct, num_sect);
            for subsection in 0..num_subsect {
                let x_coord = octave.x_coord(subsection, num_subsect);
                c0[section * num_subsect + subsection] = icdf_abs_quantised(x_coord, scale_exp);
            }
        }

        let step = exp2i(remaining_mant_bits as i64);
        let diff = |a: u64, b: u64| (a as i128 - b as i128) as f64;
        let asymptote = growing_oct * num_subsect - 1;
        let first_part = growing_oct * num_subsect;
        let c1 = (0..length)
            .map(|i| {
                if i == asymptote {
                    // Subsection containing the zero asymptote
                    (diff(max_out, c0[i]) / (step - 1.0)).round_ties_even()
                } else if i == first_part {
                    // First subsection in the part = true region
                    diff(c0[0], c0[i]) / step
                } else if i < first_part {
                    diff(c0[i + 1], c0[i]) / step
                } else {
                    diff(c0[i - 1], c0[i]) / step
                }
            })
            .collect();

        info!(length, scale_exp, "ICDF table built");
        Ok(IcdfTable {
            k: config.k(),
            growing_oct,
            num_sections: num_sect,
            remaining_mant_bits,
            scale_exp,
            max_out,
            c0,
            c1,
        })
    }

    /// Number of entries in each coefficient table
    pub fn len(&self) -> usize {
        self.c0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.c0.is_empty()
    }

    /// Flat address of `(section, subsection)`
    pub fn addr(&self, section: usize, subsection: usize) -> usize {
        (section << self.k) + subsection
    }

    /// Address if it lies within the table
    pub fn checked_addr(&self, section: usize, subsection: usize) -> Option<usize> {
        if section >= self.num_sections || subsection >= self.num_subsections() {
            return None;
        }
        Some(self.addr(section, subsection))
    }

    /// Base value at `(section, subsection)`
    pub fn c0_at(&self, section: usize, subsection: usize) -> Result<u64> {
        let addr = self.lookup_addr(section, subsection)?;
        Ok(self.c0[addr])
    }

    /// Slope at `(section, subsection)`
    pub fn c1_at(&self, section: usize, subsection: usize) -> Result<f64> {
        let addr = self.lookup_addr(section, subsection)?;
        Ok(self.c1[addr])
    }

    /// `c0[addr] + c1[addr] * mant_lsbs`
    pub fn interpolate(&self, section: usize, subsection: usize, mant_lsbs: u64) -> Result<f64> {
        let addr = self.lookup_addr(section, subsection)?;
        Ok(self.c0[addr] as f64 + self.c1[addr] * mant_lsbs as f64)
    }

    pub fn c0(&self) -> &[u64] {
        &self.c0
    }

    pub fn c1(&self) -> &[f64] {
        &self.c1
    }

    /// Slopes as ROM words, floored to integers
    pub fn c1_words(&self) -> Vec<u64> {
        self.c1.iter().map(|&v| v.max(0.0).floor() as u64).collect()
    }

    /// Quantisation exponent: one output LSB is `2^-scale_exp`
    pub fn scale_exp(&self) -> i32 {
        self.scale_exp
    }

    /// Quantised ICDF magnitude at the finest point next to zero
    pub fn max_out(&self) -> u64 {
        self.max_out
    }

    /// First section of the diminishing region
    pub fn part_offset(&self) -> usize {
        self.growing_oct
    }

    pub fn num_sections(&self) -> usize {
        self.num_sections
    }

    pub fn num_subsections(&self) -> usize {
        1usize << self.k
    }

    /// Mantissa bits below the subsection address
    pub fn remaining_mant_bits(&self) -> u32 {
        self.remaining_mant_bits
    }

    /// Convert a table output to a real value
    pub fn to_real(&self, fixed: f64) -> f64 {
        fixed * exp2i(-(self.scale_exp as i64))
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            length: self.len(),
            num_sections: self.num_sections,
            num_subsections: self.num_subsections(),
            scale_exp: self.scale_exp,
            max_out: self.max_out,
            output_lsb: exp2i(-(self.scale_exp as i64)),
        }
    }

    /// Write `c0.hex` and `c1.hex` into `dir`
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        let c0_path = dir.join("c0.hex");
        let c1_path = dir.join("c1.hex");
        save_rom(&c0_path, &self.c0)?;
        save_rom(&c1_path, &self.c1_words())?;
        Ok((c0_path, c1_path))
    }

    fn lookup_addr(&self, section: usize, subsection: usize) -> Result<usize> {
        self.checked_addr(section, subsection)
            .ok_or(LaplaceRomError::AddressOutOfRange {
                section,
                subsection,
                len: self.len(),
            })
    }
}

/// Save ROM words to `path` in hex form, one per line
pub fn save_rom(path: impl AsRef<Path>, words: &[u64]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| LaplaceRomError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for word in words {
        writeln!(writer, "{:x}", word).map_err(|e| LaplaceRomError::io(path, e))?;
    }
    writer.flush().map_err(|e| LaplaceRomError::io(path, e))?;
    info!("Generated file {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_table() -> IcdfTable {
        let config = RngConfig::new(8, 16, 2, 3, 4, 3).unwrap();
        IcdfTable::build(&config).unwrap()
    }

    #[test]
    fn test_default_octaves_build() {
        // min_x_coord = 2^-58, |ICDF| = 57 ln 2
        let config = RngConfig::with_default_octaves(64, 16, 2, 3).unwrap();
        let table = IcdfTable::build(&config).unwrap();
        assert_eq!(table.len(), 58 * 4);
        assert_eq!(table.scale_exp(), 9);
        assert_eq!(table.max_out(), 20229);
        assert!(table.c0().iter().all(|&v| v <= table.max_out()));
    }

    #[test]
    fn test_table_length() {
        for (bx, by, k, mant_bw, g, d) in [
            (8, 16, 2, 3, 4, 3),
            (8, 12, 1, 3, 3, 2),
            (16, 24, 3, 6, 54, 4),
            (64, 16, 2, 3, 54, 4),
            (10, 8, 0, 2, 1, 1),
        ] {
            let config = RngConfig::new(bx, by, k, mant_bw, g, d).unwrap();
            let table = IcdfTable::build(&config).unwrap();
            assert_eq!(table.len(), (g + d) as usize * (1 << k));
            assert_eq!(table.c0().len(), table.c1().len());
        }
    }

    #[test]
    fn test_scenario_c0_values() {
        let table = scenario_table();
        assert_eq!(table.scale_exp(), 12);
        assert_eq!(table.max_out(), 19874);
        assert_eq!(
            table.c0(),
            &[
                2839, 3386, 4017, 4764, 5678, 6225, 6857, 7603, 8517, 9064, 9696, 10443, 11357,
                12535, 14196, 17035, 2357, 1925, 1535, 1178, 1011, 850, 696, 547, 403, 264, 130, 0
            ]
        );
    }

    #[test]
    fn test_scenario_c1_values() {
        let table = scenario_table();
        let expected = [
            273.5, 315.5, 373.5, 457.0, 273.5, 316.0, 373.0, 457.0, 273.5, 316.0, 373.5, 457.0,
            589.0, 830.5, 1419.5, 2839.0, 241.0, 216.0, 195.0, 178.5, 83.5, 80.5, 77.0, 74.5,
            72.0, 69.5, 67.0, 65.0,
        ];
        assert_eq!(table.c1(), &expected);
    }

    #[test]
    fn test_asymptote_slope_is_rounded() {
        // mant_bw - k = 2: (1065 - 710) / 3 = 118.33 -> 118
        let config = RngConfig::new(8, 12, 1, 3, 3, 2).unwrap();
        let table = IcdfTable::build(&config).unwrap();
        assert_eq!(table.max_out(), 1065);
        assert_eq!(table.c0()[5], 710);
        assert_eq!(table.c1()[5], 118.0);
        // other slopes keep their fraction
        assert_eq!(table.c1()[3], 25.75);
        assert_eq!(table.c1()[6], 14.25);
    }

    #[test]
    fn test_monotonic_by_region() {
        let config = RngConfig::new(16, 24, 3, 6, 20, 4).unwrap();
        let table = IcdfTable::build(&config).unwrap();
        let split = table.part_offset() * table.num_subsections();
        let (growing, diminishing) = table.c0().split_at(split);

        assert!(growing.windows(2).all(|w| w[0] <= w[1]));
        assert!(diminishing.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(*diminishing.last().unwrap(), 0);
        assert!(table.c1().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_geometry_boundary_sections() {
        // g = 4, d = 3
        let closest_to_zero = OctaveGeometry::of(3, 4, 7);
        assert!(!closest_to_zero.part);
        assert_eq!(closest_to_zero.width, 1.0 / 32.0);
        assert_eq!(closest_to_zero.bound, 1.0 / 32.0);

        let last = OctaveGeometry::of(6, 4, 7);
        assert!(last.part);
        assert_eq!(last.width, 1.0 / 16.0);
        assert_eq!(last.bound, 0.5 - 1.0 / 16.0);
        assert_eq!(last.x_coord(3, 4), 0.5);

        let first = OctaveGeometry::of(0, 4, 7);
        assert_eq!(first.width, 1.0 / 8.0);
        assert_eq!(first.bound, 0.25);
        assert_eq!(first.x_coord(1, 4), 0.25 - 1.0 / 32.0);

        let first_part = OctaveGeometry::of(4, 4, 7);
        assert!(first_part.part);
        assert_eq!(first_part.width, 1.0 / 8.0);
        assert_eq!(first_part.bound, 0.25);
    }

    #[test]
    fn test_sections_tile_domain() {
        let g = 5;
        let n = 9;
        for section in 0..n - 1 {
            let a = OctaveGeometry::of(section, g, n);
            let b = OctaveGeometry::of(section + 1, g, n);
            if section + 1 < g {
                // growing: lower edge of a is upper edge of b
                assert_eq!(a.bound - a.width, b.bound);
            } else if section >= g {
                assert_eq!(a.bound + a.width, b.bound);
            }
        }
    }

    #[test]
    fn test_interpolate() {
        let table = scenario_table();
        assert_eq!(table.addr(2, 3), 11);
        assert_eq!(table.interpolate(2, 3, 0).unwrap(), 10443.0);
        assert_eq!(table.interpolate(2, 3, 2).unwrap(), 10443.0 + 2.0 * 457.0);
        assert_eq!(table.c0_at(4, 0).unwrap(), 2357);
        assert_eq!(table.c1_at(4, 0).unwrap(), 241.0);
    }

    #[test]
    fn test_interpolate_out_of_range() {
        let table = scenario_table();
        assert!(matches!(
            table.interpolate(7, 0, 0),
            Err(LaplaceRomError::AddressOutOfRange { len: 28, .. })
        ));
        assert!(table.interpolate(0, 4, 0).is_err());
        assert_eq!(table.checked_addr(6, 3), Some(27));
    }

    #[test]
    fn test_degenerate_scale_rejected() {
        // 2^-(1060+1+2+20) underflows past the smallest subnormal
        let config = RngConfig::new(64, 16, 2, 22, 1060, 4).unwrap();
        assert!(matches!(
            IcdfTable::build(&config),
            Err(LaplaceRomError::ArithmeticDegeneracy(_))
        ));
    }

    #[test]
    fn test_c1_words_floor() {
        let table = scenario_table();
        let words = table.c1_words();
        assert_eq!(words[0], 273);
        assert_eq!(words[15], 2839);
        assert_eq!(words[27], 65);
    }

    #[test]
    fn test_to_real() {
        let table = scenario_table();
        assert_eq!(table.to_real(4096.0), 1.0);
        assert_eq!(table.summary().output_lsb, 1.0 / 4096.0);
    }

    #[test]
    fn test_save_rom_hex_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.hex");
        save_rom(&path, &[0, 10, 255, 4096]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0\na\nff\n1000\n");
    }

    #[test]
    fn test_save_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = scenario_table();
        let (c0_path, c1_path) = table.save(dir.path()).unwrap();
        let c0 = std::fs::read_to_string(c0_path).unwrap();
        let c1 = std::fs::read_to_string(c1_path).unwrap();
        assert_eq!(c0.lines().count(), 28);
        assert_eq!(c0.lines().next(), Some("b17"));
        assert_eq!(c1.lines().nth(15), Some("b17"));
    }
}
