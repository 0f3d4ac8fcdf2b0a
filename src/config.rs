// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the provisioning manifest to simplify the process of
//! serialization and deserialization.
//!
//! # General Layout
//!
//! A manifest is a TOML document that carries everything that is data rather
//! than logic: package identifiers, download URLs, file locations, and the
//! literal contents of generated files. Rigup ships a built-in manifest for
//! the Windows workstation layout it was first written for. Any other layout
//! is expressed by handing rigup a different manifest.
//!
//! All path-valued fields go through shell expansion when the manifest is
//! parsed, so `~` and `$VAR` can be used freely.

use crate::{package::{CommandPackageManager, PackageSpec}, patch::json::TerminalDefaults};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info};

const BUILTIN_MANIFEST: &str = include_str!("../manifest.toml");

/// Provisioning manifest layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// General run settings.
    #[serde(default)]
    pub settings: Settings,

    /// Package manager front-end used to install packages.
    pub package_manager: CommandPackageManager,

    /// Ordered listing of packages to install.
    #[serde(default, rename = "package", skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageSpec>,

    /// PATH segments that must be present after provisioning.
    #[serde(default)]
    pub path: PathSettings,

    /// Font archive to fetch and register.
    pub font: Option<FontSettings>,

    /// Editor configuration repository to clone.
    pub editor: Option<EditorSettings>,

    /// Terminal settings file to patch.
    pub terminal: Option<TerminalSettings>,

    /// Alias lines to keep in shell profiles.
    #[serde(default, rename = "profile", skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<ProfileAlias>,

    /// Files written verbatim on every run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generated: Vec<GeneratedFile>,
}

impl Manifest {
    /// Parse manifest embedded into the binary.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Deserialize`] if the embedded manifest is
    ///   malformed.
    /// - Return [`ConfigError::ShellExpansion`] if a path cannot be expanded.
    pub fn builtin() -> Result<Self> {
        BUILTIN_MANIFEST.parse()
    }

    /// Load manifest from target file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is malformed.
    /// - Return [`ConfigError::ShellExpansion`] if a path cannot be expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load manifest {:?}", path.display());
        read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Resolve manifest to use for a run.
    ///
    /// An explicit path always wins. Otherwise the user's manifest at the
    /// default location is used when it exists, falling back to the built-in
    /// manifest.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if the selected manifest cannot be loaded.
    pub fn resolve(explicit: Option<&Path>, default: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match default {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                info!("no user manifest found, using built-in manifest");
                Self::builtin()
            }
        }
    }

    fn expand_paths(&mut self) -> Result<()> {
        if let Some(scratch) = &self.settings.scratch_dir {
            self.settings.scratch_dir = Some(expand_path(scratch)?);
        }

        for segment in &mut self.path.segments {
            *segment = expand(segment)?;
        }

        if let Some(editor) = &mut self.editor {
            editor.target = expand_path(&editor.target)?;
        }

        if let Some(terminal) = &mut self.terminal {
            for candidate in &mut terminal.candidates {
                *candidate = expand_path(candidate)?;
            }
        }

        for profile in &mut self.profiles {
            profile.path = expand_path(&profile.path)?;
        }

        for generated in &mut self.generated {
            generated.path = expand_path(&generated.path)?;
        }

        Ok(())
    }
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut manifest: Manifest = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on all path fields.
        manifest.expand_paths()?;

        Ok(manifest)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// General run settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Abort unless running with administrator or root privileges.
    pub require_elevation: bool,

    /// Exit with non-zero status if any recoverable step failed.
    pub strict: bool,

    /// Upper bound on any single network request.
    pub network_timeout_secs: u64,

    /// Directory to place scratch downloads in instead of the system
    /// temporary directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            require_elevation: true,
            strict: false,
            network_timeout_secs: 300,
            scratch_dir: None,
        }
    }
}

/// PATH segments to keep present.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PathSettings {
    /// Segments appended when absent, in declared order.
    #[serde(default)]
    pub segments: Vec<String>,
}

/// Font archive settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct FontSettings {
    /// Location of the zip archive, remote or local.
    pub url: String,

    /// File name pattern selecting fonts inside the archive.
    #[serde(default = "default_font_pattern")]
    pub pattern: String,

    /// Font face name used by the terminal.
    pub face: String,
}

fn default_font_pattern() -> String {
    "*.ttf".into()
}

/// Editor configuration settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct EditorSettings {
    /// Remote repository holding the configuration.
    pub url: String,

    /// Directory the editor reads its configuration from.
    pub target: PathBuf,
}

/// Terminal settings file patch.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TerminalSettings {
    /// Candidate locations of the settings file, first existing one wins.
    pub candidates: Vec<PathBuf>,

    /// Value for `profiles.defaults.font.face`.
    pub font_face: String,

    /// Value for `profiles.defaults.padding`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<String>,

    /// Value for `profiles.defaults.scrollbarState`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrollbar_state: Option<String>,
}

impl TerminalSettings {
    /// Default profile values to enforce.
    pub fn defaults(&self) -> TerminalDefaults {
        TerminalDefaults {
            font_face: self.font_face.clone(),
            padding: self.padding.clone(),
            scrollbar_state: self.scrollbar_state.clone(),
        }
    }
}

/// Line to keep in a shell profile.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ProfileAlias {
    /// Shell profile to patch.
    pub path: PathBuf,

    /// Alias definition line.
    pub line: String,

    /// Tool that must be on PATH for the alias to make sense.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
}

/// File written verbatim.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GeneratedFile {
    /// Destination of the file.
    pub path: PathBuf,

    /// Literal file contents.
    pub contents: String,
}

fn expand(value: &str) -> Result<String> {
    Ok(shellexpand::full(value)
        .map_err(ConfigError::ShellExpansion)?
        .into_owned())
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    expand(path.to_string_lossy().as_ref()).map(PathBuf::from)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read manifest file.
    #[error("failed to read manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
