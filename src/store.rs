// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Store management.
//!
//! Mfscm keeps everything a checkout needs in one place called the
//! __store__. The store holds the global settings, the shared connection
//! registry, the credentials, and one job definition per job.
//!
//! # Store Layout
//!
//! The store can generally be placed anywhere on the user's file system.
//! However, the default location is `$XDG_DATA_HOME/mfscm-store`:
//!
//! ```text
//! mfscm-store/
//! ├── settings.toml
//! ├── connections.toml
//! ├── credentials.toml
//! └── jobs/
//!     ├── payroll.toml
//!     └── billing.toml
//! ```
//!
//! The name of a job is the file stem of its job definition, so
//! `jobs/payroll.toml` holds the job named "payroll". Only the top-level of
//! the jobs directory is evaluated.
//!
//! Every job definition that gets loaded passes through [`migrate`] first,
//! so callers only ever see job definitions that refer to the connection
//! registry.

use crate::{
    config::{ConfigError, GlobalSettings, JobDefinition},
    credentials::{CredentialsError, FileCredentials},
    migrate::{migrate, resave_migrated, MigrateError, MigrationReport},
    registry::{ConnectionRegistry, RegistryError},
    scm::{download::Launcher, Checkout},
};

use std::{
    fs::{read_dir, read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Global settings file name.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Connection registry file name.
pub const CONNECTIONS_FILE: &str = "connections.toml";

/// Credentials file name.
pub const CREDENTIALS_FILE: &str = "credentials.toml";

/// Job definition directory name.
pub const JOBS_DIR: &str = "jobs";

/// Store of global settings, host connections, credentials, and jobs.
#[derive(Debug)]
pub struct Store {
    store_path: PathBuf,
    settings: GlobalSettings,
    registry: ConnectionRegistry,
    credentials: FileCredentials,
}

impl Store {
    /// Open store at target path.
    ///
    /// Creates the store directory and its jobs directory if they do not
    /// exist. Missing settings, registry, or credentials files yield their
    /// defaults.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::MakeDir`] if store cannot be created.
    /// - Return [`StoreError::ReadFile`] or [`StoreError::Settings`] if
    ///   global settings cannot be loaded.
    /// - Return [`StoreError::Registry`] if registry cannot be loaded.
    /// - Return [`StoreError::Credentials`] if credentials cannot be loaded.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store_path = path.into();
        debug!("open store: {:?}", store_path.display());

        let jobs_dir = store_path.join(JOBS_DIR);
        mkdirp::mkdirp(&jobs_dir).map_err(|err| StoreError::MakeDir {
            source: err,
            path: jobs_dir,
        })?;

        let settings_path = store_path.join(SETTINGS_FILE);
        let settings = match read_to_string(&settings_path) {
            Ok(content) => content.parse::<GlobalSettings>()?,
            Err(err) if err.kind() == ErrorKind::NotFound => GlobalSettings::default(),
            Err(err) => {
                return Err(StoreError::ReadFile {
                    source: err,
                    path: settings_path,
                })
            }
        };

        let registry = ConnectionRegistry::open(store_path.join(CONNECTIONS_FILE))?;
        let credentials = FileCredentials::open(store_path.join(CREDENTIALS_FILE))?;

        Ok(Self {
            store_path,
            settings,
            registry,
            credentials,
        })
    }

    /// Absolute path to store.
    pub fn path(&self) -> &Path {
        &self.store_path
    }

    /// Global settings of store.
    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    /// Shared connection registry of store.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Credentials of store.
    pub fn credentials(&self) -> &FileCredentials {
        &self.credentials
    }

    /// Path to job definition of target job.
    pub fn job_path(&self, name: impl AsRef<str>) -> PathBuf {
        self.store_path
            .join(JOBS_DIR)
            .join(format!("{}.toml", name.as_ref()))
    }

    /// Load and migrate job definition of target job.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::JobNotFound`] if job does not exist.
    /// - Return [`StoreError::ReadFile`] if job definition cannot be read.
    /// - Return [`StoreError::ParseJob`] if job definition is malformed.
    /// - Return [`StoreError::Migrate`] if legacy connection fields cannot
    ///   be migrated.
    #[instrument(skip(self, name), level = "debug")]
    pub fn load_job(&self, name: impl AsRef<str>) -> Result<JobDefinition> {
        let name = name.as_ref();
        let path = self.job_path(name);
        let content = match read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::JobNotFound(name.to_string()))
            }
            Err(err) => return Err(StoreError::ReadFile { source: err, path }),
        };

        let job = content
            .parse::<JobDefinition>()
            .map_err(|err| StoreError::ParseJob { source: err, path })?;

        Ok(migrate(job, &self.registry)?)
    }

    /// Load and migrate every job of store, sorted by job name.
    ///
    /// Job definitions that cannot be read or parsed are logged and skipped.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::ReadDir`] if jobs directory cannot be listed.
    /// - Return [`StoreError::Migrate`] if legacy connection fields cannot
    ///   be migrated.
    #[instrument(skip(self), level = "debug")]
    pub fn load_all_jobs(&self) -> Result<Vec<(String, JobDefinition)>> {
        let jobs_dir = self.store_path.join(JOBS_DIR);
        let entries = read_dir(&jobs_dir).map_err(|err| StoreError::ReadDir {
            source: err,
            path: jobs_dir.clone(),
        })?;

        let mut names = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
            .filter_map(|path| match path.file_stem()?.to_str() {
                Some(stem) => Some(stem.to_string()),
                None => {
                    warn!("skip job file {:?}: name is not valid UTF-8", path.display());
                    None
                }
            })
            .collect::<Vec<_>>();
        names.sort();

        let mut jobs = Vec::with_capacity(names.len());
        for name in names {
            match self.load_job(&name) {
                Ok(job) => jobs.push((name, job)),
                Err(
                    err @ (StoreError::ParseJob { .. }
                    | StoreError::ReadFile { .. }
                    | StoreError::JobNotFound(_)),
                ) => {
                    warn!("skip job {name}: {err}");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(jobs)
    }

    /// Save job definition of target job.
    ///
    /// Legacy connection fields are never written.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Settings`] if job definition cannot be
    ///   serialized.
    /// - Return [`StoreError::WriteFile`] if job definition cannot be
    ///   written.
    #[instrument(skip(self, name, job), level = "debug")]
    pub fn save_job(&self, name: impl AsRef<str>, job: &JobDefinition) -> Result<()> {
        let path = self.job_path(name);
        let content = toml::ser::to_string_pretty(job).map_err(ConfigError::Serialize)?;
        debug!("save job definition: {:?}", path.display());
        write(&path, content).map_err(|err| StoreError::WriteFile { source: err, path })
    }

    /// Migrate every job of store, and save the ones that were migrated.
    ///
    /// A job that fails to save does not stop the rest from being saved. The
    /// returned report lists which jobs were saved, and which failed.
    ///
    /// # Errors
    ///
    /// - Return any error of [`Store::load_all_jobs`].
    pub fn migrate_all(&self) -> Result<MigrationReport> {
        let jobs = self.load_all_jobs()?;
        let report = resave_migrated(
            jobs.iter().map(|(name, job)| (name.as_str(), job)),
            |name, job| self.save_job(name, job),
        );
        info!(
            "{} job(s) migrated, {} failed",
            report.saved.len(),
            report.failed.len()
        );

        Ok(report)
    }

    /// Construct checkout runner for the jobs of store on target node.
    pub fn checkout<L: Launcher>(&self, launcher: L) -> Checkout<'_, L> {
        Checkout::new(&self.settings, &self.registry, &self.credentials, launcher)
    }
}

/// Store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store directory cannot be created.
    #[error("failed to create store directory at {:?}", path.display())]
    MakeDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Store file cannot be read from.
    #[error("failed to read {:?}", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Store file cannot be written to.
    #[error("failed to write {:?}", path.display())]
    WriteFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Jobs directory cannot be listed.
    #[error("failed to list jobs at {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Job does not exist in store.
    #[error("job {0:?} not found in store")]
    JobNotFound(String),

    /// Job definition is malformed.
    #[error("malformed job definition at {:?}", path.display())]
    ParseJob {
        #[source]
        source: ConfigError,
        path: PathBuf,
    },

    /// Global settings are malformed, or configuration cannot be
    /// serialized.
    #[error(transparent)]
    Settings(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error(transparent)]
    Migrate(#[from] MigrateError),
}

/// Friendly result alias :3
type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ScmConfig, registry::HostConnection};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{fs::create_dir_all, path::Path};

    fn write_job(store: &Path, name: &str, content: &str) -> anyhow::Result<()> {
        create_dir_all(store.join(JOBS_DIR))?;
        write(store.join(JOBS_DIR).join(format!("{name}.toml")), content)?;
        Ok(())
    }

    #[sealed_test]
    fn open_empty_store() -> anyhow::Result<()> {
        let store = Store::open("store")?;

        assert!(Path::new("store/jobs").is_dir());
        assert_eq!(store.settings(), &GlobalSettings::default());
        assert!(store.registry().connections().is_empty());
        assert!(store.load_all_jobs()?.is_empty());

        Ok(())
    }

    #[sealed_test(env = [("CLI_HOME", "/opt/cli")])]
    fn open_store_with_settings() -> anyhow::Result<()> {
        create_dir_all("store")?;
        write(
            "store/settings.toml",
            indoc! {r#"
                [cli]
                linux = "$CLI_HOME"
                windows = 'C:\TopazCLI'
            "#},
        )?;

        let store = Store::open("store")?;
        assert_eq!(
            store.settings().cli.linux.as_deref(),
            Some(Path::new("/opt/cli"))
        );

        Ok(())
    }

    #[sealed_test]
    fn load_job_migrates_legacy_fields() -> anyhow::Result<()> {
        write_job(
            Path::new("store"),
            "payroll",
            indoc! {r#"
                hostPort = "cw01:30947"
                codePage = "1047"

                [scm]
                type = "pds"
                credentials_id = "67890"
                filter_pattern = "XDEVREG.XPED.COBOL"
                file_extension = "cbl"
            "#},
        )?;

        let store = Store::open("store")?;
        let job = store.load_job("payroll")?;
        assert!(job.migrated);

        let connection = store
            .registry()
            .lookup_by_host_and_code_page("cw01:30947", "1047")
            .expect("connection was migrated");
        assert_eq!(job.scm.connection_id(), connection.connection_id);

        // Registry reached the disk.
        let reopened = Store::open("store")?;
        assert_eq!(reopened.registry().connections(), vec![connection]);

        Ok(())
    }

    #[sealed_test]
    fn load_missing_job() -> anyhow::Result<()> {
        let store = Store::open("store")?;
        assert!(matches!(
            store.load_job("missing"),
            Err(StoreError::JobNotFound(name)) if name == "missing"
        ));

        Ok(())
    }

    #[sealed_test]
    fn load_all_jobs_skips_malformed() -> anyhow::Result<()> {
        let store_path = Path::new("store");
        write_job(
            store_path,
            "billing",
            indoc! {r#"
                [scm]
                type = "endevor"
                connection_id = "12345"
            "#},
        )?;
        write_job(store_path, "broken", "[scm]\ntype = \"cvs\"\n")?;
        write(store_path.join(JOBS_DIR).join("notes.txt"), "not a job")?;

        let store = Store::open(store_path)?;
        let jobs = store.load_all_jobs()?;
        let names = jobs.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["billing"]);

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn load_all_jobs_skips_non_utf8_names() -> anyhow::Result<()> {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let store_path = Path::new("store");
        write_job(
            store_path,
            "billing",
            indoc! {r#"
                [scm]
                type = "endevor"
                connection_id = "12345"
            "#},
        )?;
        write(
            store_path.join(JOBS_DIR).join(OsStr::from_bytes(b"bad\xff.toml")),
            "[scm]\ntype = \"pds\"\n",
        )?;

        let store = Store::open(store_path)?;
        let jobs = store.load_all_jobs()?;
        let names = jobs.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["billing"]);

        Ok(())
    }

    #[sealed_test]
    fn migrate_all_resaves_migrated_jobs() -> anyhow::Result<()> {
        let store_path = Path::new("store");
        write_job(
            store_path,
            "payroll",
            indoc! {r#"
                host_port = "cw01:30947"
                code_page = "1047"

                [scm]
                type = "pds"
                credentials_id = "67890"
            "#},
        )?;
        write_job(
            store_path,
            "current",
            indoc! {r#"
                [scm]
                type = "pds"
                connection_id = "12345"
            "#},
        )?;

        let store = Store::open(store_path)?;
        let report = store.migrate_all()?;
        assert_eq!(report.saved, vec!["payroll".to_string()]);
        assert!(report.failed.is_empty());

        let content = read_to_string(store.job_path("payroll"))?;
        assert!(!content.contains("host_port"));
        assert!(!content.contains("code_page"));

        let job = store.load_job("payroll")?;
        assert!(!job.migrated);
        let ScmConfig::Pds(config) = &job.scm else {
            panic!("expected pds job");
        };
        assert_eq!(config.credentials_id, "67890");
        assert_eq!(store.registry().connections().len(), 1);

        Ok(())
    }

    #[sealed_test]
    fn save_then_load_job() -> anyhow::Result<()> {
        let store = Store::open("store")?;
        let connection = HostConnection::new("test", "cw01:30947", "1047");
        let connection_id = connection.connection_id.clone();
        store.registry().add(connection)?;

        let mut job = JobDefinition::new(ScmConfig::Pds(Default::default()));
        *job.scm.connection_id_mut() = connection_id;
        store.save_job("payroll", &job)?;

        assert_eq!(store.load_job("payroll")?, job);

        Ok(())
    }
}
