// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host connection registry.
//!
//! All jobs reach the mainframe through __host connections__ kept in one
//! shared registry. A host connection names a `host:port` pair, the code page
//! to talk in, an optional protocol, and a timeout. Jobs only ever refer to a
//! host connection through its generated connection identifier.
//!
//! # Registry Layout
//!
//! The registry is stored in `connections.toml` at the top-level of the
//! store, one `[[connection]]` table per host connection, in the order the
//! connections were added.
//!
//! # Locking
//!
//! One mutex guards the whole registry. Lookups hold it only long enough to
//! clone the matching entry. [`ConnectionRegistry::resolve_or_add`] holds it
//! across lookup, insertion, and persistence so that concurrent migrations of
//! jobs sharing the same legacy connection cannot race into duplicates.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Mutex, MutexGuard},
};
use tracing::{debug, info, instrument};

/// Timeout given to host connections that do not specify one.
pub const DEFAULT_TIMEOUT: &str = "0";

/// A single host connection.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct HostConnection {
    /// Generated unique identifier.
    pub connection_id: String,

    /// Brief description shown to users.
    #[serde(default)]
    pub description: String,

    /// Host and port formatted as `host:port`.
    pub host_port: String,

    /// Code page used to talk to the host.
    pub code_page: String,

    /// Communication protocol, absent or "None" for plain connections.
    #[serde(default)]
    pub protocol: Option<String>,

    /// Read/write timeout in minutes understood by the downloader CLI.
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl HostConnection {
    /// Construct new host connection with a fresh connection identifier.
    pub fn new(
        description: impl Into<String>,
        host_port: impl Into<String>,
        code_page: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            host_port: host_port.into(),
            code_page: code_page.into(),
            protocol: None,
            timeout: DEFAULT_TIMEOUT.into(),
        }
    }

    /// Set communication protocol.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Host part of `host:port`.
    pub fn host(&self) -> &str {
        self.host_port
            .split_once(':')
            .map_or(self.host_port.as_str(), |(host, _)| host)
    }

    /// Port part of `host:port`, empty if no port was given.
    pub fn port(&self) -> &str {
        self.host_port
            .split_once(':')
            .map_or("", |(_, port)| port)
    }

    /// Protocol to pass to the downloader CLI, if any.
    ///
    /// Blank protocols, and the literal "none" in any letter case, mean the
    /// connection does not use a protocol at all.
    pub fn effective_protocol(&self) -> Option<&str> {
        self.protocol
            .as_deref()
            .map(str::trim)
            .filter(|protocol| !protocol.is_empty() && !protocol.eq_ignore_ascii_case("none"))
    }
}

fn default_timeout() -> String {
    DEFAULT_TIMEOUT.into()
}

/// Registry file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RegistryDefinition {
    /// Host connections in insertion order.
    #[serde(default, rename = "connection")]
    pub connections: Vec<HostConnection>,
}

impl FromStr for RegistryDefinition {
    type Err = RegistryError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(RegistryError::Deserialize)
    }
}

impl Display for RegistryDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(|_| FmtError)?
                .as_str(),
        )
    }
}

/// Shared registry of host connections.
///
/// Optionally backed by a file that every insertion is persisted to.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<Vec<HostConnection>>,
    backing_file: Option<PathBuf>,
}

impl ConnectionRegistry {
    /// Construct new registry that lives in memory only.
    pub fn in_memory(connections: impl IntoIterator<Item = HostConnection>) -> Self {
        Self {
            connections: Mutex::new(connections.into_iter().collect()),
            backing_file: None,
        }
    }

    /// Open registry backed by target file.
    ///
    /// A missing file is treated as an empty registry. The file will be
    /// created on first insertion.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::ReadFile`] if registry file cannot be read.
    /// - Return [`RegistryError::Deserialize`] if registry file is malformed.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        debug!("open connection registry: {:?}", path.display());

        let definition = match read_to_string(&path) {
            Ok(content) => content.parse::<RegistryDefinition>()?,
            Err(err) if err.kind() == ErrorKind::NotFound => RegistryDefinition::default(),
            Err(err) => {
                return Err(RegistryError::ReadFile {
                    source: err,
                    path,
                })
            }
        };

        Ok(Self {
            connections: Mutex::new(definition.connections),
            backing_file: Some(path),
        })
    }

    /// Find host connection by connection identifier.
    pub fn lookup_by_id(&self, connection_id: impl AsRef<str>) -> Option<HostConnection> {
        self.lock()
            .iter()
            .find(|connection| connection.connection_id == connection_id.as_ref())
            .cloned()
    }

    /// Find host connection by `host:port` pair and code page.
    pub fn lookup_by_host_and_code_page(
        &self,
        host_port: impl AsRef<str>,
        code_page: impl AsRef<str>,
    ) -> Option<HostConnection> {
        find_by_host_and_code_page(&self.lock(), host_port.as_ref(), code_page.as_ref()).cloned()
    }

    /// Add host connection, and persist registry.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::WriteFile`] if registry cannot be persisted.
    pub fn add(&self, connection: HostConnection) -> Result<()> {
        let mut connections = self.lock();
        info!(
            "add host connection {} [{}]",
            connection.connection_id, connection.host_port
        );
        connections.push(connection);
        self.persist_or_rollback(&mut connections)
    }

    /// Resolve connection identifier for `host:port` pair and code page.
    ///
    /// Reuses the host connection that already matches, otherwise creates one
    /// described as "<host_port> <code_page>" and adds it. The lock is held
    /// throughout, so two callers racing on the same pair always resolve to
    /// the same identifier.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::WriteFile`] if registry cannot be persisted.
    #[instrument(skip(self), level = "debug")]
    pub fn resolve_or_add(&self, host_port: &str, code_page: &str) -> Result<String> {
        let mut connections = self.lock();
        if let Some(existing) = find_by_host_and_code_page(&connections, host_port, code_page) {
            // Happens when a job was migrated, reverted, and is now migrated again.
            debug!("reuse host connection {}", existing.connection_id);
            return Ok(existing.connection_id.clone());
        }

        let description = format!("{host_port} {code_page}");
        let connection = HostConnection::new(description, host_port, code_page);
        let connection_id = connection.connection_id.clone();
        info!("add host connection {connection_id} [{host_port}]");
        connections.push(connection);
        self.persist_or_rollback(&mut connections)?;

        Ok(connection_id)
    }

    /// Snapshot of all host connections in insertion order.
    pub fn connections(&self) -> Vec<HostConnection> {
        self.lock().clone()
    }

    /// Path to the file backing the registry, if any.
    pub fn backing_file(&self) -> Option<&Path> {
        self.backing_file.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HostConnection>> {
        // INVARIANT: A panic while holding the lock cannot leave a half-written entry.
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist_or_rollback(&self, connections: &mut Vec<HostConnection>) -> Result<()> {
        // INVARIANT: Memory never holds a connection that failed to reach the disk.
        self.persist(connections).inspect_err(|_| {
            connections.pop();
        })
    }

    fn persist(&self, connections: &[HostConnection]) -> Result<()> {
        let Some(path) = &self.backing_file else {
            return Ok(());
        };

        let definition = RegistryDefinition {
            connections: connections.to_vec(),
        };
        write(path, definition.to_string()).map_err(|err| RegistryError::WriteFile {
            source: err,
            path: path.clone(),
        })
    }
}

fn find_by_host_and_code_page<'a>(
    connections: &'a [HostConnection],
    host_port: &str,
    code_page: &str,
) -> Option<&'a HostConnection> {
    connections
        .iter()
        .find(|connection| connection.host_port == host_port && connection.code_page == code_page)
}

/// Connection registry error types.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Registry file cannot be parsed.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Registry file cannot be read from.
    #[error("failed to read connection registry at {:?}", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Registry file cannot be written to.
    #[error("failed to write connection registry at {:?}", path.display())]
    WriteFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = RegistryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{sync::Arc, thread};

    #[test]
    fn host_and_port_split() {
        let connection = HostConnection::new("test", "cw01:30947", "1047");
        assert_eq!(connection.host(), "cw01");
        assert_eq!(connection.port(), "30947");

        let connection = HostConnection::new("test", "cw01", "1047");
        assert_eq!(connection.host(), "cw01");
        assert_eq!(connection.port(), "");
    }

    #[test]
    fn none_protocol_is_ignored() {
        let connection = HostConnection::new("test", "cw01:30947", "1047");
        assert_eq!(connection.effective_protocol(), None);
        assert_eq!(connection.clone().with_protocol("None").effective_protocol(), None);
        assert_eq!(connection.clone().with_protocol("  ").effective_protocol(), None);
        assert_eq!(
            connection.with_protocol("TLSv1.2").effective_protocol(),
            Some("TLSv1.2")
        );
    }

    #[test]
    fn lookup_misses_are_not_errors() {
        let registry = ConnectionRegistry::default();
        assert_eq!(registry.lookup_by_id("12345"), None);
        assert_eq!(registry.lookup_by_host_and_code_page("cw01:30947", "1047"), None);
    }

    #[test]
    fn resolve_or_add_deduplicates() -> anyhow::Result<()> {
        let registry = ConnectionRegistry::default();

        let first = registry.resolve_or_add("cw01:30947", "1047")?;
        let second = registry.resolve_or_add("cw01:30947", "1047")?;
        let other = registry.resolve_or_add("cw01:30947", "500")?;

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(registry.connections().len(), 2);

        let connection = registry.lookup_by_id(&first).expect("connection was added");
        assert_eq!(connection.description, "cw01:30947 1047");
        assert_eq!(connection.protocol, None);
        assert_eq!(connection.timeout, DEFAULT_TIMEOUT);

        Ok(())
    }

    #[test]
    fn resolve_or_add_reuses_manual_connection() -> anyhow::Result<()> {
        let manual = HostConnection::new("production", "cw01:30947", "1047");
        let registry = ConnectionRegistry::in_memory([manual.clone()]);

        let resolved = registry.resolve_or_add("cw01:30947", "1047")?;
        assert_eq!(resolved, manual.connection_id);
        assert_eq!(registry.connections(), vec![manual]);

        Ok(())
    }

    #[test]
    fn concurrent_resolution_creates_one_entry() {
        let registry = Arc::new(ConnectionRegistry::default());
        let handles = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.resolve_or_add("cw01:30947", "1047"))
            })
            .collect::<Vec<_>>();

        let ids = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect::<Vec<_>>();

        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(registry.connections().len(), 1);
    }

    #[sealed_test]
    fn add_persists_in_insertion_order() -> anyhow::Result<()> {
        let registry = ConnectionRegistry::open("connections.toml")?;
        let first = HostConnection::new("first", "cw01:30947", "1047");
        let second = HostConnection::new("second", "cw02:30947", "1140").with_protocol("TLSv1.2");
        registry.add(first.clone())?;
        registry.add(second.clone())?;

        let reopened = ConnectionRegistry::open("connections.toml")?;
        assert_eq!(reopened.connections(), vec![first.clone(), second]);
        assert_eq!(reopened.lookup_by_id(&first.connection_id), Some(first));

        Ok(())
    }

    #[sealed_test]
    fn failed_persist_leaves_registry_untouched() -> anyhow::Result<()> {
        let registry = ConnectionRegistry::open("missing/connections.toml")?;

        let result = registry.resolve_or_add("cw01:30947", "1047");
        assert!(matches!(result, Err(RegistryError::WriteFile { .. })));
        assert!(registry.connections().is_empty());

        // Retrying must not hand out an identifier that never reached the disk.
        let result = registry.resolve_or_add("cw01:30947", "1047");
        assert!(matches!(result, Err(RegistryError::WriteFile { .. })));
        assert_eq!(registry.lookup_by_host_and_code_page("cw01:30947", "1047"), None);

        let result = registry.add(HostConnection::new("manual", "cw02:30947", "1047"));
        assert!(matches!(result, Err(RegistryError::WriteFile { .. })));
        assert!(registry.connections().is_empty());

        Ok(())
    }
}
