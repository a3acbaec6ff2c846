// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source checkout through the downloader CLI.
//!
//! A checkout runs in two stages. First, the job definition is validated
//! against the global settings, the connection registry, and the credential
//! store. Every value that passes validation is echoed into the build log
//! as `Label = value`. Second, the downloader CLI is launched on the build
//! node with the assembled argument list, and its exit code decides the
//! outcome of the checkout.
//!
//! Nothing is launched unless validation passes in full, including the
//! version check of the installed CLI.

pub mod args;
pub mod download;
pub mod version;

use crate::{
    config::{GlobalSettings, JobDefinition, ScmConfig},
    credentials::{Credential, CredentialStore, FileCredentials},
    registry::{ConnectionRegistry, HostConnection},
    scm::{
        args::resolve_path,
        download::{
            build_arguments, cli_script_path, ArgumentContext, LaunchRequest, Launcher,
            LocalLauncher,
        },
        version::{
            CliVersion, VersionError, MINIMUM_CLI_VERSION, MINIMUM_PROTOCOL_VERSION, VERSION_FILE,
        },
    },
};

use std::{
    fs::remove_dir_all,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Prefix of the scratch directory the CLI gets through `-data`.
pub const DATA_DIR_PREFIX: &str = "TopazCliWkspc";

/// Everything validation resolved for a job.
#[derive(Debug, Clone)]
pub struct Validated {
    pub connection: HostConnection,
    pub credential: Credential,
    pub cli_location: PathBuf,
    pub cli_version: CliVersion,
}

/// Checkout runner.
///
/// Borrows the global settings, registry, and credential store of a store,
/// and owns the [`Launcher`] of the build node to run the CLI on.
#[derive(Debug)]
pub struct Checkout<'a, L = LocalLauncher, C = FileCredentials>
where
    L: Launcher,
    C: CredentialStore,
{
    settings: &'a GlobalSettings,
    registry: &'a ConnectionRegistry,
    credentials: &'a C,
    launcher: L,
    envs: Vec<(String, String)>,
}

impl<'a, L, C> Checkout<'a, L, C>
where
    L: Launcher,
    C: CredentialStore,
{
    /// Construct new checkout runner.
    pub fn new(
        settings: &'a GlobalSettings,
        registry: &'a ConnectionRegistry,
        credentials: &'a C,
        launcher: L,
    ) -> Self {
        Self {
            settings,
            registry,
            credentials,
            launcher,
            envs: Vec::new(),
        }
    }

    /// Add variable to the build environment the CLI runs with.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Launcher of the build node.
    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Validate source control configuration of a job.
    ///
    /// Checks run in the order the flavor dictates, and stop at the first
    /// failure. Every passing check is echoed into `log`.
    ///
    /// # Errors
    ///
    /// - Return [`CheckoutError::MissingParameter`] if a required value is
    ///   missing, or the host connection and credentials cannot be resolved.
    /// - Return [`CheckoutError::InvalidTargetFolder`] if target folder is
    ///   not a usable path.
    /// - Return [`CheckoutError::CliVersionUnreadable`],
    ///   [`CheckoutError::IncompatibleCli`], or
    ///   [`CheckoutError::ProtocolUnsupported`] if the installed CLI cannot
    ///   handle the checkout.
    /// - Return [`CheckoutError::BuildLog`] if build log cannot be written to.
    #[instrument(skip(self, scm, log), fields(scm = scm.scm_type()), level = "debug")]
    pub fn validate(&self, scm: &ScmConfig, log: &mut dyn Write) -> Result<Validated> {
        let (connection, credential) = match scm {
            ScmConfig::Pds(config) | ScmConfig::Endevor(config) => {
                let connection = self.resolve_connection(scm, log)?;
                let credential = self.resolve_credential(scm, log)?;
                require(log, "Filter pattern", &config.filter_pattern)?;
                require(log, "File extension", &config.file_extension)?;
                (connection, credential)
            }
            ScmConfig::Ispw(config) => {
                let credential = self.resolve_credential(scm, log)?;
                let connection = self.resolve_connection(scm, log)?;
                echo_present(log, "Runtime configuration", &config.server_config)?;
                require(log, "Stream", &config.server_stream)?;
                require(log, "Application", &config.server_application)?;
                require(log, "Level", &config.server_level)?;
                let level_option = config
                    .level_option
                    .ok_or(CheckoutError::MissingParameter("Level option"))?;
                echo(log, "Level option", level_option)?;
                if config.filter_folders() {
                    require(log, "Folder name", &config.folder_name)?;
                }
                if config.filter_files() {
                    require(log, "Component type", &config.component_type)?;
                }
                (connection, credential)
            }
            ScmConfig::IspwContainer(config) => {
                let credential = self.resolve_credential(scm, log)?;
                let connection = self.resolve_connection(scm, log)?;
                echo_present(log, "Runtime configuration", &config.server_config)?;
                require(log, "Container name", &config.container_name)?;
                let container_type = config
                    .container_type
                    .ok_or(CheckoutError::MissingParameter("Container type"))?;
                echo(log, "Container type", container_type)?;
                (connection, credential)
            }
        };

        validate_target_folder(log, scm.target_folder())?;

        let os = self.launcher.node_os();
        let cli_location = self
            .settings
            .cli_location(os)
            .ok_or(CheckoutError::MissingParameter("CLI location"))?
            .to_path_buf();
        echo(log, "CLI location", cli_location.display())?;

        let cli_version = self.check_cli_version(&cli_location, &connection)?;

        Ok(Validated {
            connection,
            credential,
            cli_location,
            cli_version,
        })
    }

    /// Check out sources of a job into target workspace.
    ///
    /// Returns `true` once the CLI exits cleanly.
    ///
    /// # Errors
    ///
    /// - Return any validation error of [`Checkout::validate`].
    /// - Return [`CheckoutError::Workspace`] if workspace cannot be created.
    /// - Return [`CheckoutError::Launch`] if CLI cannot be launched or
    ///   waited on.
    /// - Return [`CheckoutError::ExitCode`] if CLI exits with non-zero code.
    #[instrument(skip(self, job, workspace, log), fields(scm = job.scm.scm_type()))]
    pub fn run(&self, job: &JobDefinition, workspace: &Path, log: &mut dyn Write) -> Result<bool> {
        let validated = self.validate(&job.scm, log)?;

        let os = self.launcher.node_os();
        let script = cli_script_path(&validated.cli_location, os);
        let target_folder = match job.scm.target_folder() {
            "" => workspace.to_path_buf(),
            target_folder => resolve_path(target_folder, workspace),
        };
        let data_dir = workspace.join(format!("{DATA_DIR_PREFIX}{}", Uuid::new_v4()));
        debug!("CLI data directory: {:?}", data_dir.display());

        let args = build_arguments(&ArgumentContext {
            script: &script,
            os,
            connection: &validated.connection,
            credential: &validated.credential,
            scm: &job.scm,
            target_folder: &target_folder,
            data_dir: &data_dir,
        });

        mkdirp::mkdirp(workspace).map_err(|err| CheckoutError::Workspace {
            source: err,
            path: workspace.to_path_buf(),
        })?;

        let mut envs = vec![("WORKSPACE".to_string(), workspace.display().to_string())];
        envs.extend(self.envs.iter().cloned());
        let request = LaunchRequest {
            args,
            working_dir: workspace.to_path_buf(),
            envs,
        };

        writeln!(log, "$ {}", request.args)?;
        let code = self
            .launcher
            .launch(&request, log)
            .map_err(CheckoutError::Launch)?;

        let script = os.cli_script();
        if code != 0 {
            return Err(CheckoutError::ExitCode { script, code });
        }
        writeln!(log, "Call {script} exited with value = {code}")?;
        info!("checkout of {} sources finished", job.scm.scm_type());

        if data_dir.exists() {
            if let Err(err) = remove_dir_all(&data_dir) {
                warn!("failed to remove CLI data directory {:?}: {err}", data_dir.display());
            }
        }

        Ok(true)
    }

    fn resolve_connection(&self, scm: &ScmConfig, log: &mut dyn Write) -> Result<HostConnection> {
        let connection = self
            .registry
            .lookup_by_id(scm.connection_id())
            .ok_or(CheckoutError::MissingParameter("Host connection"))?;
        echo(log, "Host connection", format!("{}:{}", connection.host(), connection.port()))?;
        Ok(connection)
    }

    fn resolve_credential(&self, scm: &ScmConfig, log: &mut dyn Write) -> Result<Credential> {
        let credential = self
            .credentials
            .lookup(scm.credentials_id())
            .ok_or(CheckoutError::MissingParameter("Login credentials"))?;
        echo(log, "Username", credential.username().unwrap_or_default())?;
        Ok(credential)
    }

    fn check_cli_version(
        &self,
        cli_location: &Path,
        connection: &HostConnection,
    ) -> Result<CliVersion> {
        let text = self.launcher.cli_version(cli_location).map_err(|err| {
            CheckoutError::CliVersionUnreadable {
                source: err,
                path: cli_location.join(VERSION_FILE),
            }
        })?;
        let found: CliVersion = text.parse()?;

        if !found.at_least(&MINIMUM_CLI_VERSION.parse()?) {
            return Err(CheckoutError::IncompatibleCli {
                found: found.to_string(),
                required: MINIMUM_CLI_VERSION,
            });
        }

        if connection.effective_protocol().is_some()
            && !found.at_least(&MINIMUM_PROTOCOL_VERSION.parse()?)
        {
            return Err(CheckoutError::ProtocolUnsupported {
                found: found.to_string(),
                required: MINIMUM_PROTOCOL_VERSION,
            });
        }

        debug!("CLI version {found} is compatible");
        Ok(found)
    }
}

fn echo(log: &mut dyn Write, label: &str, value: impl std::fmt::Display) -> Result<()> {
    writeln!(log, "{label} = {value}").map_err(CheckoutError::BuildLog)
}

fn echo_present(log: &mut dyn Write, label: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }

    echo(log, label, value)
}

fn require(log: &mut dyn Write, label: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CheckoutError::MissingParameter(label));
    }

    echo(log, label, value)
}

fn validate_target_folder(log: &mut dyn Write, target_folder: &str) -> Result<()> {
    if target_folder.is_empty() {
        return Ok(());
    }

    echo(log, "Source download location", target_folder)?;
    if target_folder.contains('\0') {
        return Err(CheckoutError::InvalidTargetFolder(
            target_folder.replace('\0', "\\0"),
        ));
    }

    Ok(())
}

/// Checkout error types.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    /// Required configuration value is missing or unresolvable.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// Target folder is not a usable path.
    #[error("invalid source download location: {0:?}")]
    InvalidTargetFolder(String),

    /// Version file of installed CLI cannot be read.
    #[error("failed to read CLI version from {:?}", path.display())]
    CliVersionUnreadable {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Version of installed CLI is malformed.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Installed CLI is too old for downloader arguments.
    #[error("CLI version {found} is not compatible, {required} or newer is required")]
    IncompatibleCli {
        found: String,
        required: &'static str,
    },

    /// Installed CLI is too old for host connections with a protocol.
    #[error("CLI version {found} does not support protocols, {required} or newer is required")]
    ProtocolUnsupported {
        found: String,
        required: &'static str,
    },

    /// Workspace cannot be created.
    #[error("failed to create workspace at {:?}", path.display())]
    Workspace {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// CLI cannot be launched or waited on.
    #[error("failed to launch downloader CLI")]
    Launch(#[source] std::io::Error),

    /// CLI exited with non-zero code.
    #[error("Call {script} exited with value = {code}")]
    ExitCode { script: &'static str, code: i32 },

    /// Build log cannot be written to.
    #[error("failed to write build log")]
    BuildLog(#[from] std::io::Error),
}

/// Friendly result alias :3
type Result<T, E = CheckoutError> = std::result::Result<T, E>;
