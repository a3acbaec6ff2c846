// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Downloader CLI invocation.
//!
//! Utilities to assemble the full downloader CLI command line for each
//! source control flavor, and to run it on a build node. Running the CLI is
//! hidden behind the [`Launcher`] trait, so the node a checkout targets can
//! be swapped out without touching argument assembly.

use crate::{
    config::{NodeOs, ScmConfig},
    credentials::Credential,
    registry::HostConnection,
    scm::{
        args::{convert_filter_pattern, escape_for_script, ArgumentList},
        version::VERSION_FILE,
    },
};

use std::{
    ffi::OsString,
    fs::read_to_string,
    io::{BufRead, BufReader, Error as IoError, Read, Result as IoResult, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::mpsc::{self, Sender},
    thread,
};
use tracing::{debug, instrument, warn};

/// Everything needed to launch the downloader CLI once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Script path followed by its arguments.
    pub args: ArgumentList,

    /// Directory the CLI runs in.
    pub working_dir: PathBuf,

    /// Build environment added on top of the inherited environment.
    pub envs: Vec<(String, String)>,
}

/// Build node that can run the downloader CLI.
pub trait Launcher {
    /// Operating system of the node.
    fn node_os(&self) -> NodeOs;

    /// Read raw version text of the CLI installed at target location.
    fn cli_version(&self, cli_location: &Path) -> IoResult<String>;

    /// Run the CLI, stream its standard output and standard error into the
    /// build log line by line, and block until it exits.
    ///
    /// If the build log cannot be written to, the CLI is killed and reaped
    /// before the error is returned.
    ///
    /// Returns the exit code of the CLI.
    fn launch(&self, request: &LaunchRequest, log: &mut dyn Write) -> IoResult<i32>;
}

/// Launcher for the machine the current process runs on.
#[derive(Debug, Clone, Copy)]
pub struct LocalLauncher {
    os: NodeOs,
}

impl LocalLauncher {
    /// Construct new local launcher.
    pub fn new() -> Self {
        Self {
            os: NodeOs::current(),
        }
    }

    /// Construct local launcher that treats the node as target operating
    /// system.
    pub fn with_os(os: NodeOs) -> Self {
        Self { os }
    }
}

impl Default for LocalLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for LocalLauncher {
    fn node_os(&self) -> NodeOs {
        self.os
    }

    fn cli_version(&self, cli_location: &Path) -> IoResult<String> {
        read_to_string(cli_location.join(VERSION_FILE))
    }

    #[instrument(skip(self, request, log), level = "debug")]
    fn launch(&self, request: &LaunchRequest, log: &mut dyn Write) -> IoResult<i32> {
        let mut args = request.args.to_os_args().into_iter();
        let program = args
            .next()
            .ok_or_else(|| IoError::other("no downloader CLI script to launch"))?;
        debug!("launch {:?} in {:?}", program, request.working_dir.display());

        let mut command = Command::new(&program);
        add_script_args(&mut command, args, self.os);
        let mut child = command
            .current_dir(&request.working_dir)
            .envs(request.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // INVARIANT: Drain both pipes fully before waiting, or a chatty CLI blocks on a full pipe.
        let (sender, receiver) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            let sender = sender.clone();
            thread::spawn(move || forward_lines(stdout, sender));
        }
        if let Some(stderr) = child.stderr.take() {
            let sender = sender.clone();
            thread::spawn(move || forward_lines(stderr, sender));
        }
        drop(sender);

        let streamed = receiver.iter().try_for_each(|line| {
            let line = line?;
            let text = String::from_utf8_lossy(&line);
            writeln!(log, "{}", text.trim_end_matches(['\r', '\n']))
        });
        if let Err(err) = streamed {
            // INVARIANT: The CLI never outlives a failed launch.
            if let Err(kill_err) = child.kill() {
                warn!("failed to kill {:?}: {kill_err}", program);
            }
            child.wait()?;
            return Err(err);
        }

        let status = child.wait()?;
        status.code().ok_or_else(|| {
            IoError::other(format!("{:?} was terminated by a signal", program))
        })
    }
}

/// Send every line of a CLI output pipe to the build log writer.
fn forward_lines(pipe: impl Read, sender: Sender<IoResult<Vec<u8>>>) {
    let mut reader = BufReader::new(pipe);
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if sender.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = sender.send(Err(err));
                break;
            }
        }
    }
}

/// Add already escaped arguments to a CLI command.
///
/// Batch file arguments are escaped by [`escape_for_script`], so they must
/// reach the command line verbatim instead of being quoted a second time.
#[cfg(windows)]
fn add_script_args(command: &mut Command, args: impl Iterator<Item = OsString>, os: NodeOs) {
    use std::os::windows::process::CommandExt;

    if os.is_unix() {
        command.args(args);
    } else {
        for arg in args {
            command.raw_arg(arg);
        }
    }
}

#[cfg(not(windows))]
fn add_script_args(command: &mut Command, args: impl Iterator<Item = OsString>, _: NodeOs) {
    command.args(args);
}

/// Inputs to downloader CLI argument assembly.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentContext<'a> {
    /// Full path to the CLI script on the node.
    pub script: &'a str,

    /// Operating system of the node.
    pub os: NodeOs,

    pub connection: &'a HostConnection,
    pub credential: &'a Credential,
    pub scm: &'a ScmConfig,

    /// Resolved source download location.
    pub target_folder: &'a Path,

    /// Scratch directory handed to the CLI through `-data`.
    pub data_dir: &'a Path,
}

/// Assemble full downloader CLI command line.
///
/// Connection and login arguments come first, followed by the arguments
/// specific to the source control flavor. Optional arguments with no value
/// are left out entirely.
pub fn build_arguments(ctx: &ArgumentContext<'_>) -> ArgumentList {
    let is_shell = ctx.os.is_unix();
    let esc = |value: &str| escape_for_script(Some(value), is_shell).unwrap_or_default();
    let esc_opt = |value: &str| (!value.is_empty()).then(|| esc(value));
    let connection = ctx.connection;
    let credential = ctx.credential;

    let mut args = ArgumentList::new();
    args.add(ctx.script)
        .add_pair("-host", esc(connection.host()))
        .add_pair("-port", esc(connection.port()))
        .add_opt_pair("-id", credential.username().and_then(esc_opt))
        .add_opt_pair("-cert", credential.certificate().and_then(|cert| esc_opt(cert.expose())))
        .add("-pass")
        .add_masked(esc(credential.password().expose()))
        .add_pair("-code", esc(&connection.code_page))
        .add_pair("-timeout", esc(&connection.timeout))
        .add_opt_pair("-protocol", connection.effective_protocol().and_then(esc_opt))
        .add_pair("-scm", ctx.scm.scm_type())
        .add_pair("-targetFolder", esc(&ctx.target_folder.to_string_lossy()))
        .add_pair("-data", esc(&ctx.data_dir.to_string_lossy()));

    match ctx.scm {
        ScmConfig::Pds(config) | ScmConfig::Endevor(config) => {
            let filter = convert_filter_pattern(Some(&config.filter_pattern)).unwrap_or_default();
            args.add_pair("-filter", esc(&filter))
                .add_pair("-ext", esc(&config.file_extension));
        }
        ScmConfig::Ispw(config) => {
            args.add_opt_pair("-ispwServerConfig", esc_opt(&config.server_config))
                .add_pair("-ispwServerStream", esc(&config.server_stream))
                .add_pair("-ispwServerApp", esc(&config.server_application))
                .add_opt_pair(
                    "-ispwServerSubAppl",
                    esc_opt(&config.server_sub_application),
                )
                .add_pair("-ispwServerLevel", esc(&config.server_level))
                .add_pair(
                    "-ispwLevelOption",
                    esc(config.level_option.map_or("", |option| option.as_arg())),
                )
                .add_pair("-ispwFilterFiles", config.filter_files().to_string())
                .add_pair("-ispwFilterFolders", config.filter_folders().to_string())
                .add_opt_pair("-ispwFolderName", esc_opt(&config.folder_name))
                .add_opt_pair("-ispwComponentType", esc_opt(&config.component_type))
                .add_pair("-ispwDownloadAll", config.download_all.to_string())
                .add_pair("-ispwDownloadIncl", config.download_includes.to_string());
            if config.categorize_on_component_type {
                args.add("-cpCategorizeOnComponentType");
            }
        }
        ScmConfig::IspwContainer(config) => {
            args.add_opt_pair("-ispwServerConfig", esc_opt(&config.server_config))
                .add_pair("-ispwContainerName", esc(&config.container_name))
                .add_pair(
                    "-ispwContainerType",
                    esc(config.container_type.map_or("", |kind| kind.as_arg())),
                )
                .add_opt_pair("-ispwServerLevel", esc_opt(&config.server_level))
                .add_opt_pair("-ispwComponentType", esc_opt(&config.component_type))
                .add_pair("-ispwDownloadAll", config.download_all.to_string());
            if config.categorize_on_component_type {
                args.add("-cpCategorizeOnComponentType");
            }
        }
    }

    args
}

/// Full path of the CLI script inside a CLI install location.
///
/// Joined with the separator of the node, not of the current process.
pub fn cli_script_path(cli_location: &Path, os: NodeOs) -> String {
    let separator = os.file_separator();
    let location = cli_location.to_string_lossy();
    let location = location.trim_end_matches(['/', '\\']);
    format!("{location}{separator}{}", os.cli_script())
}
