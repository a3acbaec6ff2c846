// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for configuration files that mfscm uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! # Job Definitions
//!
//! Every job owns a __job definition__ file that selects one source control
//! flavor through the `type` key of its `[scm]` table: `pds`, `endevor`,
//! `ispw`, or `ispwc`. Each flavor only carries the fields it needs.
//!
//! Job definitions written before host connections became a shared registry
//! carry the connection inline through top-level `host_port` and
//! `code_page` keys. Those keys are still read so that [`migrate`] can lift
//! them into the registry, but they are never written back out.
//!
//! [`migrate`]: crate::migrate

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Global settings layout.
///
/// Holds the install location of the downloader CLI for each build node
/// operating system.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GlobalSettings {
    /// Downloader CLI install locations.
    #[serde(default)]
    pub cli: CliLocations,
}

impl GlobalSettings {
    /// Downloader CLI install location for target node operating system.
    ///
    /// Returns [`None`] if no location is configured or the configured one is
    /// blank.
    pub fn cli_location(&self, os: NodeOs) -> Option<&Path> {
        let location = match os {
            NodeOs::Unix => self.cli.linux.as_ref(),
            NodeOs::Windows => self.cli.windows.as_ref(),
        };

        location
            .filter(|path| !path.as_os_str().is_empty())
            .map(PathBuf::as_path)
    }
}

impl FromStr for GlobalSettings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: GlobalSettings =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on CLI install locations.
        settings.cli.linux = settings.cli.linux.map(expand_path).transpose()?;
        settings.cli.windows = settings.cli.windows.map(expand_path).transpose()?;

        Ok(settings)
    }
}

impl Display for GlobalSettings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Downloader CLI install location per build node operating system.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct CliLocations {
    /// Install location on Linux and other Unix-like nodes.
    pub linux: Option<PathBuf>,

    /// Install location on Windows nodes.
    pub windows: Option<PathBuf>,
}

/// Operating system family of the node a checkout runs on.
///
/// The node can differ from the machine that holds the store, so script
/// names and path separators are always chosen by node, never by host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeOs {
    Unix,
    Windows,
}

impl NodeOs {
    /// Operating system of the current process.
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    /// Check if node runs POSIX shell scripts.
    pub fn is_unix(&self) -> bool {
        matches!(self, Self::Unix)
    }

    /// File separator used by node.
    pub fn file_separator(&self) -> char {
        match self {
            Self::Unix => '/',
            Self::Windows => '\\',
        }
    }

    /// Name of downloader CLI script for node.
    pub fn cli_script(&self) -> &'static str {
        match self {
            Self::Unix => "SCMDownloaderCLI.sh",
            Self::Windows => "SCMDownloaderCLI.bat",
        }
    }
}

impl FromStr for NodeOs {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data.to_ascii_lowercase().as_str() {
            "unix" | "linux" => Ok(Self::Unix),
            "windows" => Ok(Self::Windows),
            other => Err(ConfigError::UnknownNodeOs(other.into())),
        }
    }
}

/// Job definition layout.
///
/// A job definition pairs the source control configuration of a job with
/// the legacy inline connection fields that older definitions carried.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct JobDefinition {
    /// Legacy inline `host:port` pair.
    #[serde(default, alias = "hostPort", skip_serializing)]
    pub host_port: Option<String>,

    /// Legacy inline code page.
    #[serde(default, alias = "codePage", skip_serializing)]
    pub code_page: Option<String>,

    /// Source control configuration.
    pub scm: ScmConfig,

    /// Set once legacy connection fields were lifted into the registry.
    #[serde(skip)]
    pub migrated: bool,
}

impl JobDefinition {
    /// Construct new job definition without legacy fields.
    pub fn new(scm: ScmConfig) -> Self {
        Self {
            host_port: None,
            code_page: None,
            scm,
            migrated: false,
        }
    }
}

impl FromStr for JobDefinition {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut definition: JobDefinition =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Trim every string field, and expand the target folder.
        definition.host_port = trim_opt(definition.host_port);
        definition.code_page = trim_opt(definition.code_page);
        definition.scm.trim();
        let target_folder = definition.scm.target_folder().to_string();
        if !target_folder.is_empty() {
            *definition.scm.target_folder_mut() = shellexpand::full(&target_folder)
                .map_err(ConfigError::ShellExpansion)?
                .into_owned();
        }

        Ok(definition)
    }
}

impl Display for JobDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Source control configuration of a job.
///
/// One variant per flavor the downloader CLI understands.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScmConfig {
    /// Partitioned dataset members.
    Pds(DatasetConfig),

    /// Endevor elements.
    Endevor(DatasetConfig),

    /// ISPW repository components.
    Ispw(IspwConfig),

    /// ISPW container components.
    #[serde(rename = "ispwc")]
    IspwContainer(IspwContainerConfig),
}

impl ScmConfig {
    /// Tag passed to the downloader CLI through `-scm`.
    pub fn scm_type(&self) -> &'static str {
        match self {
            Self::Pds(_) => "pds",
            Self::Endevor(_) => "endevor",
            Self::Ispw(_) => "ispw",
            Self::IspwContainer(_) => "ispwc",
        }
    }

    /// Unique identifier of the host connection in use.
    pub fn connection_id(&self) -> &str {
        match self {
            Self::Pds(config) | Self::Endevor(config) => &config.connection_id,
            Self::Ispw(config) => &config.connection_id,
            Self::IspwContainer(config) => &config.connection_id,
        }
    }

    /// Mutable access to the host connection identifier.
    pub fn connection_id_mut(&mut self) -> &mut String {
        match self {
            Self::Pds(config) | Self::Endevor(config) => &mut config.connection_id,
            Self::Ispw(config) => &mut config.connection_id,
            Self::IspwContainer(config) => &mut config.connection_id,
        }
    }

    /// Unique identifier of the login credentials in use.
    pub fn credentials_id(&self) -> &str {
        match self {
            Self::Pds(config) | Self::Endevor(config) => &config.credentials_id,
            Self::Ispw(config) => &config.credentials_id,
            Self::IspwContainer(config) => &config.credentials_id,
        }
    }

    /// Source download location override, empty when unset.
    pub fn target_folder(&self) -> &str {
        match self {
            Self::Pds(config) | Self::Endevor(config) => &config.target_folder,
            Self::Ispw(config) => &config.target_folder,
            Self::IspwContainer(config) => &config.target_folder,
        }
    }

    fn target_folder_mut(&mut self) -> &mut String {
        match self {
            Self::Pds(config) | Self::Endevor(config) => &mut config.target_folder,
            Self::Ispw(config) => &mut config.target_folder,
            Self::IspwContainer(config) => &mut config.target_folder,
        }
    }

    fn trim(&mut self) {
        match self {
            Self::Pds(config) | Self::Endevor(config) => {
                trim_all([
                    &mut config.connection_id,
                    &mut config.credentials_id,
                    &mut config.filter_pattern,
                    &mut config.file_extension,
                    &mut config.target_folder,
                ]);
            }
            Self::Ispw(config) => {
                trim_all([
                    &mut config.connection_id,
                    &mut config.credentials_id,
                    &mut config.server_config,
                    &mut config.server_stream,
                    &mut config.server_application,
                    &mut config.server_sub_application,
                    &mut config.server_level,
                    &mut config.component_type,
                    &mut config.folder_name,
                    &mut config.target_folder,
                ]);
            }
            Self::IspwContainer(config) => {
                trim_all([
                    &mut config.connection_id,
                    &mut config.credentials_id,
                    &mut config.server_config,
                    &mut config.container_name,
                    &mut config.server_level,
                    &mut config.component_type,
                    &mut config.target_folder,
                ]);
            }
        }
    }
}

/// Dataset based configuration shared by PDS and Endevor jobs.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Unique identifier of the host connection.
    pub connection_id: String,

    /// Unique identifier of the login credentials.
    pub credentials_id: String,

    /// Whitespace or comma separated dataset filters.
    pub filter_pattern: String,

    /// File extension given to downloaded members.
    pub file_extension: String,

    /// Source download location.
    pub target_folder: String,
}

/// ISPW repository configuration.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IspwConfig {
    pub connection_id: String,
    pub credentials_id: String,

    /// Runtime configuration of the ISPW server.
    pub server_config: String,
    pub server_stream: String,
    pub server_application: String,
    pub server_sub_application: String,
    pub server_level: String,
    pub level_option: Option<LevelOption>,

    /// Only download components of this type when set.
    pub component_type: String,

    /// Only download components in this folder when set.
    pub folder_name: String,

    pub download_all: bool,
    pub download_includes: bool,
    pub categorize_on_component_type: bool,
    pub target_folder: String,
}

impl IspwConfig {
    /// Filter by component type?
    pub fn filter_files(&self) -> bool {
        !self.component_type.is_empty()
    }

    /// Filter by folder name?
    pub fn filter_folders(&self) -> bool {
        !self.folder_name.is_empty()
    }
}

/// ISPW container configuration.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IspwContainerConfig {
    pub connection_id: String,
    pub credentials_id: String,
    pub server_config: String,
    pub container_name: String,
    pub container_type: Option<ContainerType>,
    pub server_level: String,
    pub component_type: String,
    pub download_all: bool,
    pub categorize_on_component_type: bool,
    pub target_folder: String,
}

/// Which levels of an ISPW application to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum LevelOption {
    /// Selected level only.
    #[serde(rename = "0")]
    SelectedLevelOnly,

    /// Selected level and all levels above it.
    #[serde(rename = "1")]
    SelectedLevelAndAbove,
}

impl LevelOption {
    /// Value passed to the downloader CLI.
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::SelectedLevelOnly => "0",
            Self::SelectedLevelAndAbove => "1",
        }
    }
}

impl Display for LevelOption {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_arg())
    }
}

/// Kind of ISPW container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ContainerType {
    #[serde(rename = "0")]
    Assignment,

    #[serde(rename = "1")]
    Release,

    #[serde(rename = "2")]
    Set,
}

impl ContainerType {
    /// Value passed to the downloader CLI.
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Assignment => "0",
            Self::Release => "1",
            Self::Set => "2",
        }
    }
}

impl Display for ContainerType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_arg())
    }
}

fn trim_opt(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn trim_all<const N: usize>(fields: [&mut String; N]) {
    for field in fields {
        let trimmed = field.trim();
        if trimmed.len() != field.len() {
            *field = trimmed.to_string();
        }
    }
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Node operating system name is not recognized.
    #[error("unknown node operating system {0:?}, expected \"unix\" or \"windows\"")]
    UnknownNodeOs(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
