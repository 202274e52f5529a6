//! Verilog header generation
//!
//! Headers are produced from templates: every `#` in a template is replaced
//! by a block of `` `define `` lines carrying the generator parameters.
//! Built-in templates are used unless a template directory provides
//! `templ_rng.vh` or `templ_urng.vh`.

use crate::config::RngConfig;
use crate::{LaplaceRomError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Placeholder replaced by the define block
pub const FLAG: char = '#';

pub const RNG_TEMPLATE_FILE: &str = "templ_rng.vh";
pub const URNG_TEMPLATE_FILE: &str = "templ_urng.vh";
pub const RNG_HEADER_FILE: &str = "rng.vh";
pub const URNG_HEADER_FILE: &str = "urng.vh";

const DEFAULT_RNG_TEMPLATE: &str = "\
// Laplace RNG parameters (generated)
`ifndef RNG_VH
`define RNG_VH

`include \"urng.vh\"

#

`endif
";

const DEFAULT_URNG_TEMPLATE: &str = "\
// Uniform RNG parameters (generated)
`ifndef URNG_VH
`define URNG_VH

#
`endif
";

/// Copy `template`, replacing every [`FLAG`] with `data`
pub fn fill_template(template: &str, data: &str) -> String {
    template.replace(FLAG, data)
}

/// Define block of the Laplace RNG header
pub fn rng_defines(config: &RngConfig) -> String {
    format!(
        "`define RNG_BY {}\n\
         `define RNG_K {}\n\
         `define RNG_MANT_BW {}\n\
         `define RNG_EXP_BW `URNG_BX - `RNG_MANT_BW - 2\n\
         `define RNG_GROWING_OCT {}\n\
         `define RNG_DIMINISHING_OCT {}",
        config.by(),
        config.k(),
        config.mant_bw(),
        config.growing_oct(),
        config.diminishing_oct()
    )
}

/// Define block of the uniform RNG header
pub fn urng_defines(config: &RngConfig) -> String {
    format!("`define URNG_BX {}\n", config.bx())
}

/// Header templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTemplates {
    pub rng: String,
    pub urng: String,
}

impl Default for HeaderTemplates {
    fn default() -> Self {
        HeaderTemplates {
            rng: DEFAULT_RNG_TEMPLATE.to_string(),
            urng: DEFAULT_URNG_TEMPLATE.to_string(),
        }
    }
}

impl HeaderTemplates {
    /// Load templates from `dir`, keeping the built-in one for any file
    /// the directory lacks
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LaplaceRomError::Configuration(format!(
                "Template directory {:?} does not exist",
                dir
            )));
        }
        let mut templates = HeaderTemplates::default();
        if let Some(rng) = read_optional(&dir.join(RNG_TEMPLATE_FILE))? {
            templates.rng = rng;
        }
        if let Some(urng) = read_optional(&dir.join(URNG_TEMPLATE_FILE))? {
            templates.urng = urng;
        }
        Ok(templates)
    }

    pub fn render_rng(&self, config: &RngConfig) -> String {
        fill_template(&self.rng, &rng_defines(config))
    }

    pub fn render_urng(&self, config: &RngConfig) -> String {
        fill_template(&self.urng, &urng_defines(config))
    }

    /// Write `urng.vh` and `rng.vh` into `out_dir`
    pub fn write_headers(
        &self,
        config: &RngConfig,
        out_dir: impl AsRef<Path>,
    ) -> Result<(PathBuf, PathBuf)> {
        let out_dir = out_dir.as_ref();
        let urng_path = out_dir.join(URNG_HEADER_FILE);
        let rng_path = out_dir.join(RNG_HEADER_FILE);
        gen_file(&urng_path, &self.render_urng(config))?;
        gen_file(&rng_path, &self.render_rng(config))?;
        Ok((rng_path, urng_path))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!("Using template {:?}", path);
    fs::read_to_string(path)
        .map(Some)
        .map_err(|e| LaplaceRomError::io(path, e))
}

fn gen_file(dest: &Path, contents: &str) -> Result<()> {
    fs::write(dest, contents).map_err(|e| LaplaceRomError::io(dest, e))?;
    info!("Generated file {:?}", dest);
    Ok(())
}
