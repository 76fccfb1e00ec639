//! Lab configuration.
//!
//! Built once at process start and shared read-only through [`crate::fsl::Fsl`].

use std::path::{Path, PathBuf};

use anyhow::Context;
use common::file_format::ConfigFormat;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::command::Tool;

/// How matrix inversion and concatenation are computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearBackend {
    /// Shell out to `convert_xfm`.
    #[default]
    ConvertXfm,
    /// Compute in-process from the `.mat` text.
    Native,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interp {
    #[default]
    Trilinear,
    NearestNeighbour,
    Spline,
    Sinc,
}

impl Interp {
    pub fn flirt_name(&self) -> &'static str {
        match self {
            Interp::Trilinear => "trilinear",
            Interp::NearestNeighbour => "nearestneighbour",
            Interp::Spline => "spline",
            Interp::Sinc => "sinc",
        }
    }

    pub fn applywarp_name(&self) -> &'static str {
        match self {
            Interp::Trilinear => "trilinear",
            Interp::NearestNeighbour => "nn",
            Interp::Spline => "spline",
            Interp::Sinc => "sinc",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// FSL installation root; binaries are looked up in `<fsl_dir>/bin`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fsl_dir: Option<PathBuf>,
    /// Explicit binary folder, overrides `fsl_dir`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_dir: Option<PathBuf>,
    pub viewer: String,
    pub linear_backend: LinearBackend,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            fsl_dir: None,
            bin_dir: None,
            viewer: "fsleyes".to_string(),
            linear_backend: LinearBackend::default(),
        }
    }
}

impl ToolConfig {
    /// Reads `FSLDIR` once; later changes to the environment are ignored.
    pub fn from_env() -> Self {
        ToolConfig {
            fsl_dir: std::env::var_os("FSLDIR").map(PathBuf::from),
            ..Default::default()
        }
    }

    fn bin_path(&self) -> Option<PathBuf> {
        self.bin_dir
            .clone()
            .or_else(|| self.fsl_dir.as_ref().map(|dir| dir.join("bin")))
    }

    /// Full path of a toolkit binary, or its bare name to be found on `PATH`.
    pub fn binary(&self, tool: Tool) -> PathBuf {
        self.program(tool.as_ref())
    }

    pub fn viewer_binary(&self) -> PathBuf {
        self.program(&self.viewer)
    }

    fn program(&self, name: &str) -> PathBuf {
        match self.bin_path() {
            Some(bin) => bin.join(name),
            None => PathBuf::from(name),
        }
    }

    /// `$FSLDIR/data/standard`, where the MNI templates live.
    pub fn standard_dir(&self) -> Option<PathBuf> {
        self.fsl_dir
            .as_ref()
            .map(|dir| dir.join("data").join("standard"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationParams {
    pub flirt_hr2std: Vec<String>,
    pub flirt_func2hr: Vec<String>,
    pub flirt_dti2hr: Vec<String>,
    pub flirt_t22hr: Vec<String>,
    pub flirt_dti2t2: Vec<String>,
    pub fnirt_config_std: String,
    pub fnirt_config_std4: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fnirt_config_dti2t2: Option<String>,
    /// Seed fnirt with the whole-head affine instead of the brain one.
    pub usehead_nl: bool,
    pub interp: Interp,
}

fn params(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

impl Default for RegistrationParams {
    fn default() -> Self {
        RegistrationParams {
            flirt_hr2std: params(&["-dof", "12", "-cost", "corratio"]),
            flirt_func2hr: params(&["-dof", "7"]),
            flirt_dti2hr: params(&["-dof", "6"]),
            flirt_t22hr: params(&["-dof", "6"]),
            flirt_dti2t2: params(&["-dof", "6"]),
            fnirt_config_std: "T1_2_MNI152_2mm".to_string(),
            fnirt_config_std4: "T1_2_MNI152_2mm".to_string(),
            fnirt_config_dti2t2: None,
            usehead_nl: false,
            interp: Interp::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub tools: ToolConfig,
    pub registration: RegistrationParams,
}

impl LabConfig {
    pub fn from_env() -> Self {
        LabConfig {
            tools: ToolConfig::from_env(),
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let format = ConfigFormat::from_path(path)?;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_str_with(&text, format)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_str_with(text: &str, format: ConfigFormat) -> anyhow::Result<Self> {
        let config = match format {
            ConfigFormat::Yaml => serde_yml::from_str(text)?,
            ConfigFormat::Json => serde_json::from_str(text)?,
        };
        Ok(config)
    }

    pub fn to_yaml(&self) -> String {
        serde_yml::to_string(self).expect("Failed to serialize lab config to YAML")
    }
}
