//! Segmenter settings and command-line construction.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::QuantError;

/// How the Python environment hosting Cellpose is laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnvKind {
    /// A conda environment; its own interpreter is invoked directly.
    Conda,
    /// A Python venv activated through `activate.bat` (Windows only).
    Venv,
}

impl fmt::Display for EnvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvKind::Conda => write!(f, "conda"),
            EnvKind::Venv => write!(f, "venv"),
        }
    }
}

/// Cellpose release line the environment runs. Flag names changed between
/// releases, so the command line depends on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(try_from = "RawVersion")]
pub enum CellposeVersion {
    #[serde(rename = "0.6")]
    #[value(name = "0.6")]
    V0_6,
    #[serde(rename = "0.7")]
    #[value(name = "0.7")]
    V0_7,
    #[serde(rename = "1.0")]
    #[value(name = "1.0")]
    V1_0,
    #[serde(rename = "2.0")]
    #[value(name = "2.0")]
    V2_0,
}

impl CellposeVersion {
    /// Flag carrying the cell probability threshold.
    pub fn threshold_flag(self) -> &'static str {
        match self {
            CellposeVersion::V0_7 | CellposeVersion::V1_0 => "--mask_threshold",
            CellposeVersion::V0_6 | CellposeVersion::V2_0 => "--cellprob_threshold",
        }
    }

    /// Whether `--stitch_threshold`, `--omni` and `--cluster` exist.
    pub fn has_stitching(self) -> bool {
        self != CellposeVersion::V0_6
    }

    /// Whether `--resample` is passed through. 1.0 and later resample by default.
    pub fn has_resample_flag(self) -> bool {
        matches!(self, CellposeVersion::V0_6 | CellposeVersion::V0_7)
    }
}

impl fmt::Display for CellposeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CellposeVersion::V0_6 => "0.6",
            CellposeVersion::V0_7 => "0.7",
            CellposeVersion::V1_0 => "1.0",
            CellposeVersion::V2_0 => "2.0",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for CellposeVersion {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0.6" => Ok(CellposeVersion::V0_6),
            "0.7" => Ok(CellposeVersion::V0_7),
            "1.0" | "1" => Ok(CellposeVersion::V1_0),
            "2.0" | "2" => Ok(CellposeVersion::V2_0),
            other => Err(QuantError::Configuration(format!(
                "unsupported Cellpose version '{}' (supported: 0.6, 0.7, 1.0, 2.0)",
                other
            ))),
        }
    }
}

/// YAML reads `version: 2.0` as a number and `version: "2.0"` as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Text(String),
    Number(f64),
}

impl TryFrom<RawVersion> for CellposeVersion {
    type Error = QuantError;

    fn try_from(raw: RawVersion) -> Result<Self, Self::Error> {
        match raw {
            RawVersion::Text(text) => text.parse(),
            RawVersion::Number(n) => format!("{:.1}", n).parse(),
        }
    }
}

/// Parameters of one Cellpose run. Every field has a default, so a YAML
/// file only needs the values it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentationConfig {
    /// Pretrained model name or path.
    pub model: String,
    /// Expected object diameter in pixels (of the image handed to Cellpose).
    pub diameter: f64,
    /// Channel to segment (0 = grayscale, 1 = red, 2 = green, 3 = blue).
    pub channel: u32,
    /// Optional nuclear channel.
    pub channel2: Option<u32>,
    pub flow_threshold: f64,
    pub cellprob_threshold: f64,
    /// Masks overlapping by at least this IoU across planes are merged.
    /// Ignored by 0.6.
    pub stitch_threshold: Option<f64>,
    pub version: CellposeVersion,
    /// Omnipose model variants. Ignored by 0.6.
    pub omni: bool,
    /// DBSCAN mask reconstruction. Ignored by 0.6.
    pub cluster: bool,
    pub use_gpu: bool,
    pub fast_mode: bool,
    pub resample: bool,
    pub verbose: bool,
    pub env_kind: EnvKind,
    pub env_path: PathBuf,
    /// Kill the segmenter after this many seconds. No limit when unset.
    pub timeout_secs: Option<u64>,
    /// Where per-invocation scratch directories are created. Defaults to
    /// `roiquant/` below the system temporary directory.
    pub scratch_root: Option<PathBuf>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model: "cyto".to_string(),
            diameter: 25.0,
            channel: 1,
            channel2: None,
            flow_threshold: 0.4,
            cellprob_threshold: 0.0,
            stitch_threshold: None,
            version: CellposeVersion::V2_0,
            omni: false,
            cluster: false,
            use_gpu: true,
            fast_mode: false,
            resample: false,
            verbose: false,
            env_kind: EnvKind::Conda,
            env_path: default_env_path(),
            timeout_secs: None,
            scratch_root: None,
        }
    }
}

fn default_env_path() -> PathBuf {
    if cfg!(windows) {
        let home = std::env::var_os("USERPROFILE").unwrap_or_default();
        PathBuf::from(home).join("miniconda3").join("envs").join("CellPose")
    } else {
        PathBuf::from("/opt/miniconda3/envs/cellpose")
    }
}

impl SegmentationConfig {
    /// Checks the settings for the current host.
    ///
    /// # Errors
    /// Returns [`QuantError::Configuration`] for out-of-range values and for
    /// a venv environment on a non-Windows host.
    pub fn validate(self) -> Result<ValidatedSegmentationConfig, QuantError> {
        self.validate_on(cfg!(windows))
    }

    pub(crate) fn validate_on(self, windows_host: bool) -> Result<ValidatedSegmentationConfig, QuantError> {
        if self.model.trim().is_empty() {
            return Err(QuantError::Configuration("segmentation model is empty".into()));
        }
        if !(self.diameter.is_finite() && self.diameter > 0.0) {
            return Err(QuantError::Configuration(format!(
                "segmentation diameter must be positive, got {}",
                self.diameter
            )));
        }
        if !self.flow_threshold.is_finite() || !self.cellprob_threshold.is_finite() {
            return Err(QuantError::Configuration(
                "segmentation thresholds must be finite".into(),
            ));
        }
        if let Some(stitch) = self.stitch_threshold {
            if !(stitch.is_finite() && stitch >= 0.0) {
                return Err(QuantError::Configuration(format!(
                    "stitch threshold must be a non-negative number, got {}",
                    stitch
                )));
            }
        }
        if self.timeout_secs == Some(0) {
            return Err(QuantError::Configuration(
                "segmentation timeout must be at least one second".into(),
            ));
        }
        if self.env_path.as_os_str().is_empty() {
            return Err(QuantError::Configuration(
                "segmentation environment path is empty".into(),
            ));
        }
        if self.env_kind == EnvKind::Venv && !windows_host {
            return Err(QuantError::Configuration(
                "venv environments are only supported on Windows; use a conda environment".into(),
            ));
        }

        Ok(ValidatedSegmentationConfig {
            config: self,
            windows_host,
        })
    }
}

/// Settings that passed [`SegmentationConfig::validate`]. Read-only.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedSegmentationConfig {
    config: SegmentationConfig,
    windows_host: bool,
}

impl ValidatedSegmentationConfig {
    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Directory scratch directories are created under.
    pub fn scratch_root(&self) -> PathBuf {
        self.config
            .scratch_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("roiquant"))
    }

    /// Interpreter that will be started for a conda environment.
    pub fn interpreter(&self) -> PathBuf {
        let env = &self.config.env_path;
        if self.windows_host {
            env.join("python.exe")
        } else {
            env.join("bin").join("python")
        }
    }

    /// The file that must exist for the environment to be usable: the
    /// interpreter for conda, the activation script for venv.
    pub fn entry_point(&self) -> PathBuf {
        match self.config.env_kind {
            EnvKind::Conda => self.interpreter(),
            EnvKind::Venv => self.activation_script(),
        }
    }

    fn activation_script(&self) -> PathBuf {
        self.config.env_path.join("Scripts").join("activate.bat")
    }

    /// Cellpose arguments for a run over `dir`.
    pub fn cellpose_args(&self, dir: &Path) -> Vec<OsString> {
        let c = &self.config;
        let mut args: Vec<OsString> = vec![
            "--dir".into(),
            dir.as_os_str().to_os_string(),
            "--pretrained_model".into(),
            c.model.clone().into(),
            "--chan".into(),
            c.channel.to_string().into(),
        ];
        if let Some(chan2) = c.channel2 {
            args.push("--chan2".into());
            args.push(chan2.to_string().into());
        }
        args.push("--diameter".into());
        args.push(c.diameter.to_string().into());
        args.push("--flow_threshold".into());
        args.push(c.flow_threshold.to_string().into());
        args.push(c.version.threshold_flag().into());
        args.push(c.cellprob_threshold.to_string().into());

        if c.version.has_stitching() {
            if let Some(stitch) = c.stitch_threshold {
                args.push("--stitch_threshold".into());
                args.push(stitch.to_string().into());
            }
            for (enabled, flag) in [(c.omni, "--omni"), (c.cluster, "--cluster")] {
                if enabled {
                    args.push(flag.into());
                }
            }
        }

        for (enabled, flag) in [
            (c.use_gpu, "--use_gpu"),
            (c.fast_mode, "--fast_mode"),
            (c.resample && c.version.has_resample_flag(), "--resample"),
            (c.verbose, "--verbose"),
        ] {
            if enabled {
                args.push(flag.into());
            }
        }
        args.push("--save_tif".into());
        args.push("--no_npy".into());
        args
    }

    /// The full command line for a run over `dir`.
    pub fn command(&self, dir: &Path) -> CommandLine {
        let cellpose = self.cellpose_args(dir);
        match self.config.env_kind {
            EnvKind::Conda => {
                let mut args: Vec<OsString> = vec!["-m".into(), "cellpose".into()];
                args.extend(cellpose);
                CommandLine {
                    program: self.interpreter().into_os_string(),
                    args,
                }
            }
            EnvKind::Venv => {
                let activate = self.activation_script();
                let mut args: Vec<OsString> = vec![
                    "/C".into(),
                    "call".into(),
                    activate.into_os_string(),
                    "&&".into(),
                    "python".into(),
                    "-Xutf8".into(),
                    "-m".into(),
                    "cellpose".into(),
                ];
                args.extend(cellpose);
                CommandLine {
                    program: "cmd.exe".into(),
                    args,
                }
            }
        }
    }
}

/// A program and its arguments, kept apart so no shell re-parses them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl CommandLine {
    /// Name used in logs and errors.
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl fmt::Display for CommandLine {
    /// Renders the command for humans, quoting arguments with spaces.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quote = |s: &std::ffi::OsStr| {
            let s = s.to_string_lossy();
            if s.contains(' ') {
                format!("\"{}\"", s)
            } else {
                s.into_owned()
            }
        };
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_default_args() {
        let validated = SegmentationConfig::default().validate_on(false).unwrap();
        let args = strings(&validated.cellpose_args(Path::new("/tmp/cellpose-x")));
        assert_eq!(
            args,
            vec![
                "--dir",
                "/tmp/cellpose-x",
                "--pretrained_model",
                "cyto",
                "--chan",
                "1",
                "--diameter",
                "25",
                "--flow_threshold",
                "0.4",
                "--cellprob_threshold",
                "0",
                "--use_gpu",
                "--save_tif",
                "--no_npy",
            ]
        );
    }

    #[test]
    fn test_optional_flags_and_second_channel() {
        let config = SegmentationConfig {
            version: CellposeVersion::V0_7,
            channel2: Some(3),
            use_gpu: false,
            fast_mode: true,
            resample: true,
            verbose: true,
            ..Default::default()
        };
        let args = strings(&config.validate_on(false).unwrap().cellpose_args(Path::new("d")));
        let chan2 = args.iter().position(|a| a == "--chan2").unwrap();
        assert_eq!(args[chan2 + 1], "3");
        assert!(!args.contains(&"--use_gpu".to_string()));
        assert!(!args.contains(&"--do_3D".to_string()));
        let tail: Vec<&str> = args[args.len() - 5..].iter().map(String::as_str).collect();
        assert_eq!(tail, vec!["--fast_mode", "--resample", "--verbose", "--save_tif", "--no_npy"]);
    }

    fn args_for(config: SegmentationConfig) -> Vec<String> {
        strings(&config.validate_on(false).unwrap().cellpose_args(Path::new("d")))
    }

    fn all_options(version: CellposeVersion) -> SegmentationConfig {
        SegmentationConfig {
            version,
            cellprob_threshold: -1.5,
            stitch_threshold: Some(0.25),
            omni: true,
            cluster: true,
            resample: true,
            ..Default::default()
        }
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        let at = args.iter().position(|a| a == flag)?;
        args.get(at + 1).cloned()
    }

    #[test]
    fn test_version_0_6_uses_cellprob_and_skips_stitching() {
        let args = args_for(all_options(CellposeVersion::V0_6));
        assert_eq!(value_after(&args, "--cellprob_threshold").as_deref(), Some("-1.5"));
        assert!(!args.contains(&"--mask_threshold".to_string()));
        for flag in ["--stitch_threshold", "--omni", "--cluster"] {
            assert!(!args.contains(&flag.to_string()), "{} leaked", flag);
        }
        assert!(args.contains(&"--resample".to_string()));
    }

    #[test]
    fn test_version_0_7_uses_mask_threshold_and_keeps_resample() {
        let args = args_for(all_options(CellposeVersion::V0_7));
        assert_eq!(value_after(&args, "--mask_threshold").as_deref(), Some("-1.5"));
        assert!(!args.contains(&"--cellprob_threshold".to_string()));
        assert_eq!(value_after(&args, "--stitch_threshold").as_deref(), Some("0.25"));
        assert!(args.contains(&"--omni".to_string()));
        assert!(args.contains(&"--cluster".to_string()));
        assert!(args.contains(&"--resample".to_string()));
    }

    #[test]
    fn test_version_1_0_uses_mask_threshold_without_resample() {
        let args = args_for(all_options(CellposeVersion::V1_0));
        assert_eq!(value_after(&args, "--mask_threshold").as_deref(), Some("-1.5"));
        assert_eq!(value_after(&args, "--stitch_threshold").as_deref(), Some("0.25"));
        assert!(!args.contains(&"--resample".to_string()));
    }

    #[test]
    fn test_version_2_0_uses_cellprob_without_resample() {
        let args = args_for(all_options(CellposeVersion::V2_0));
        assert_eq!(value_after(&args, "--cellprob_threshold").as_deref(), Some("-1.5"));
        assert!(!args.contains(&"--mask_threshold".to_string()));
        assert_eq!(value_after(&args, "--stitch_threshold").as_deref(), Some("0.25"));
        assert!(args.contains(&"--omni".to_string()));
        assert!(args.contains(&"--cluster".to_string()));
        assert!(!args.contains(&"--resample".to_string()));
        assert!(!args.contains(&"--do_3D".to_string()));
    }

    #[test]
    fn test_version_parses_from_yaml_numbers_and_strings() {
        let config: SegmentationConfig = serde_yaml::from_str("version: 0.7\n").unwrap();
        assert_eq!(config.version, CellposeVersion::V0_7);
        let config: SegmentationConfig = serde_yaml::from_str("version: \"1.0\"\n").unwrap();
        assert_eq!(config.version, CellposeVersion::V1_0);
        let config: SegmentationConfig = serde_yaml::from_str("version: 2\n").unwrap();
        assert_eq!(config.version, CellposeVersion::V2_0);
        assert!(serde_yaml::from_str::<SegmentationConfig>("version: 3.0\n").is_err());
        assert_eq!(CellposeVersion::V1_0.to_string(), "1.0");
    }

    #[test]
    fn test_conda_command_uses_env_interpreter() {
        let config = SegmentationConfig {
            env_path: PathBuf::from("/envs/cp"),
            ..Default::default()
        };
        let command = config.validate_on(false).unwrap().command(Path::new("scratch"));
        assert_eq!(PathBuf::from(&command.program), PathBuf::from("/envs/cp/bin/python"));
        assert_eq!(strings(&command.args[..2]), vec!["-m", "cellpose"]);
    }

    #[test]
    fn test_venv_command_on_windows() {
        let config = SegmentationConfig {
            env_kind: EnvKind::Venv,
            env_path: PathBuf::from("venv"),
            ..Default::default()
        };
        let command = config.validate_on(true).unwrap().command(Path::new("scratch"));
        assert_eq!(command.program, OsString::from("cmd.exe"));
        let args = strings(&command.args);
        assert_eq!(args[0], "/C");
        assert_eq!(args[1], "call");
        assert!(args[2].ends_with("activate.bat"));
        assert_eq!(&args[3..8], &["&&", "python", "-Xutf8", "-m", "cellpose"]);
    }

    #[test]
    fn test_venv_rejected_off_windows() {
        let config = SegmentationConfig {
            env_kind: EnvKind::Venv,
            ..Default::default()
        };
        assert!(matches!(
            config.validate_on(false),
            Err(QuantError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        for config in [
            SegmentationConfig {
                diameter: 0.0,
                ..Default::default()
            },
            SegmentationConfig {
                model: " ".into(),
                ..Default::default()
            },
            SegmentationConfig {
                flow_threshold: f64::NAN,
                ..Default::default()
            },
            SegmentationConfig {
                timeout_secs: Some(0),
                ..Default::default()
            },
            SegmentationConfig {
                stitch_threshold: Some(-0.5),
                ..Default::default()
            },
        ] {
            assert!(config.validate_on(false).is_err());
        }
    }

    #[test]
    fn test_display_quotes_spaces() {
        let command = CommandLine {
            program: "/my envs/python".into(),
            args: vec!["-m".into(), "cellpose".into()],
        };
        assert_eq!(command.to_string(), "\"/my envs/python\" -m cellpose");
    }

    #[test]
    fn test_yaml_fields_are_optional() {
        let config: SegmentationConfig =
            serde_yaml::from_str("model: nuclei\nenv_kind: conda\ntimeout_secs: 600\n").unwrap();
        assert_eq!(config.model, "nuclei");
        assert_eq!(config.diameter, 25.0);
        assert_eq!(config.timeout_secs, Some(600));
    }
}
