// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Legacy job definition migration.
//!
//! Before host connections lived in a shared registry, every job carried its
//! own `host_port` and `code_page` fields. Migration lifts those fields into
//! the [`ConnectionRegistry`], and points the job at the resulting host
//! connection instead.
//!
//! Migration is an explicit stage of loading a job definition. The store
//! runs [`migrate`] on every job it loads, and [`resave_migrated`] once all
//! jobs are loaded so that the new connection identifiers reach the disk.

use crate::{config::JobDefinition, registry::ConnectionRegistry};

use std::error::Error as StdError;
use tracing::{error, info, instrument, warn};

/// Migrate legacy connection fields of a job definition.
///
/// Only runs when _both_ legacy fields are present. The registry resolves
/// the pair to an existing host connection when one matches, otherwise adds
/// a new one. The job then refers to that host connection, drops its legacy
/// fields, and is flagged as migrated.
///
/// A job holding only one of the two legacy fields is left untouched with a
/// warning, as there is no way to tell which host connection it meant.
///
/// # Errors
///
/// - Return [`MigrateError::Registry`] if registry cannot persist a new
///   host connection.
#[instrument(skip(job, registry), level = "debug")]
pub fn migrate(mut job: JobDefinition, registry: &ConnectionRegistry) -> Result<JobDefinition> {
    match (job.host_port.as_deref(), job.code_page.as_deref()) {
        (Some(host_port), Some(code_page)) => {
            let connection_id = registry.resolve_or_add(host_port, code_page)?;
            info!("migrate legacy connection {host_port} {code_page} to {connection_id}");
            *job.scm.connection_id_mut() = connection_id;
            job.host_port = None;
            job.code_page = None;
            job.migrated = true;
        }
        (Some(_), None) | (None, Some(_)) => {
            warn!("job has incomplete legacy connection fields, skipping migration");
        }
        (None, None) => {}
    }

    Ok(job)
}

/// Outcome of re-saving migrated jobs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Jobs whose migrated definition was saved.
    pub saved: Vec<String>,

    /// Jobs whose migrated definition could not be saved.
    pub failed: Vec<String>,
}

/// Save every migrated job through the given saver.
///
/// Failing to save one job is logged, and does not stop the remaining jobs
/// from being saved.
pub fn resave_migrated<'a, S, E>(
    jobs: impl IntoIterator<Item = (&'a str, &'a JobDefinition)>,
    mut save: S,
) -> MigrationReport
where
    S: FnMut(&str, &JobDefinition) -> std::result::Result<(), E>,
    E: StdError,
{
    let mut report = MigrationReport::default();
    for (name, job) in jobs.into_iter().filter(|(_, job)| job.migrated) {
        match save(name, job) {
            Ok(()) => {
                info!("job {name} has been migrated");
                report.saved.push(name.to_string());
            }
            Err(err) => {
                error!("failed to upgrade job {name}: {err}");
                report.failed.push(name.to_string());
            }
        }
    }

    report
}

/// Migration error types.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Registry could not record migrated host connection.
    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),
}

/// Friendly result alias :3
type Result<T, E = MigrateError> = std::result::Result<T, E>;
