// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use mainframe_scm::{
    config::NodeOs,
    path::{default_store_dir, default_workspace_dir},
    registry::HostConnection,
    scm::download::LocalLauncher,
    store::Store,
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::{io::stdout, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "mfscm [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to store instead of the default one.
    #[arg(short, long, global = true, value_name = "path")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let store = Store::open(match self.store {
            Some(path) => path,
            None => default_store_dir()?,
        })?;

        match self.command {
            Command::Checkout(opts) => run_checkout(&store, opts),
            Command::Migrate => run_migrate(&store),
            Command::Connection(ConnectionCommand::Add(opts)) => run_connection_add(&store, opts),
            Command::Connection(ConnectionCommand::List) => run_connection_list(&store),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Check out sources of a job into a workspace.
    #[command(override_usage = "mfscm checkout [options] <job_name>")]
    Checkout(CheckoutOptions),

    /// Move legacy connection fields of every job into the connection registry.
    #[command(override_usage = "mfscm migrate")]
    Migrate,

    /// Manage host connections.
    #[command(subcommand)]
    Connection(ConnectionCommand),
}

#[derive(Debug, Clone, Subcommand)]
enum ConnectionCommand {
    /// Add new host connection.
    #[command(
        override_usage = "mfscm connection add [options] --host-port <host:port> --code-page <code_page>"
    )]
    Add(ConnectionAddOptions),

    /// List host connections.
    #[command(override_usage = "mfscm connection list")]
    List,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CheckoutOptions {
    /// Name of job to check out.
    #[arg(required = true, value_name = "job_name")]
    pub job_name: String,

    /// Workspace to check out into instead of the current directory.
    #[arg(short, long, value_name = "path")]
    pub workspace: Option<PathBuf>,

    /// Operating system of the build node.
    #[arg(short, long, value_name = "unix|windows")]
    pub node_os: Option<NodeOs>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConnectionAddOptions {
    /// Host and port of connection.
    #[arg(long, value_name = "host:port")]
    pub host_port: String,

    /// Code page to talk to host in.
    #[arg(long, value_name = "code_page")]
    pub code_page: String,

    /// Brief description of connection.
    #[arg(short, long, value_name = "summary")]
    pub description: Option<String>,

    /// Communication protocol of connection.
    #[arg(short, long, value_name = "protocol")]
    pub protocol: Option<String>,

    /// Read/write timeout in minutes.
    #[arg(short, long, value_name = "minutes")]
    pub timeout: Option<String>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_checkout(store: &Store, opts: CheckoutOptions) -> Result<()> {
    let job = store.load_job(&opts.job_name)?;
    if job.migrated {
        store.save_job(&opts.job_name, &job)?;
    }

    let workspace = match opts.workspace {
        Some(path) => path,
        None => default_workspace_dir()?,
    };
    let launcher = match opts.node_os {
        Some(os) => LocalLauncher::with_os(os),
        None => LocalLauncher::new(),
    };

    let mut log = stdout().lock();
    store
        .checkout(launcher)
        .with_env("JOB_NAME", &opts.job_name)
        .run(&job, &workspace, &mut log)?;
    info!("checked out {} into {:?}", opts.job_name, workspace.display());

    Ok(())
}

fn run_migrate(store: &Store) -> Result<()> {
    let report = store.migrate_all()?;
    if !report.failed.is_empty() {
        bail!("failed to upgrade jobs: {}", report.failed.join(", "));
    }

    Ok(())
}

fn run_connection_add(store: &Store, opts: ConnectionAddOptions) -> Result<()> {
    let description = match opts.description {
        Some(description) => description,
        None => format!("{} {}", opts.host_port, opts.code_page),
    };
    let mut connection = HostConnection::new(description, opts.host_port, opts.code_page);
    if let Some(protocol) = opts.protocol {
        connection = connection.with_protocol(protocol);
    }
    if let Some(timeout) = opts.timeout {
        connection = connection.with_timeout(timeout);
    }

    let connection_id = connection.connection_id.clone();
    store.registry().add(connection)?;
    println!("{connection_id}");

    Ok(())
}

fn run_connection_list(store: &Store) -> Result<()> {
    for connection in store.registry().connections() {
        println!(
            "{}  {}  {}  {}",
            connection.connection_id,
            connection.host_port,
            connection.code_page,
            connection.description
        );
    }

    Ok(())
}
