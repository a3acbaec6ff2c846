// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Login credentials lookup.
//!
//! Jobs never carry secrets themselves. They name login credentials through
//! a credentials identifier, which is resolved against a
//! [`CredentialStore`] at checkout time.

use crate::scm::args::MASK;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::PathBuf,
    str::FromStr,
};
use tracing::debug;

/// Secret value that never shows up in logs.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose plain text of secret.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Secret {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(MASK)
    }
}

impl Display for Secret {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(MASK)
    }
}

/// Login credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
    /// Plain username and password.
    UsernamePassword {
        id: String,
        username: String,
        password: Secret,
    },

    /// Client certificate, with the password that unlocks it.
    Certificate {
        id: String,
        #[serde(default)]
        username: Option<String>,
        certificate: Secret,
        password: Secret,
    },
}

impl Credential {
    /// Unique identifier of credentials.
    pub fn id(&self) -> &str {
        match self {
            Self::UsernamePassword { id, .. } | Self::Certificate { id, .. } => id,
        }
    }

    /// User the credentials log in as, if known.
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::UsernamePassword { username, .. } => Some(username),
            Self::Certificate { username, .. } => username.as_deref(),
        }
    }

    /// Password of credentials.
    pub fn password(&self) -> &Secret {
        match self {
            Self::UsernamePassword { password, .. } | Self::Certificate { password, .. } => {
                password
            }
        }
    }

    /// Encoded certificate, if credentials are certificate based.
    pub fn certificate(&self) -> Option<&Secret> {
        match self {
            Self::UsernamePassword { .. } => None,
            Self::Certificate { certificate, .. } => Some(certificate),
        }
    }
}

/// Resolve login credentials by identifier.
pub trait CredentialStore {
    /// Look up credentials, returning [`None`] if the identifier is unknown.
    fn lookup(&self, credentials_id: &str) -> Option<Credential>;
}

/// Credentials file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct CredentialsDefinition {
    #[serde(default, rename = "credential")]
    pub credentials: Vec<Credential>,
}

impl FromStr for CredentialsDefinition {
    type Err = CredentialsError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(CredentialsError::Deserialize)
    }
}

/// Credential store loaded from `credentials.toml`.
#[derive(Debug, Default, Clone)]
pub struct FileCredentials {
    credentials: Vec<Credential>,
}

impl FileCredentials {
    /// Construct credential store from a listing of credentials.
    pub fn new(credentials: impl IntoIterator<Item = Credential>) -> Self {
        Self {
            credentials: credentials.into_iter().collect(),
        }
    }

    /// Load credential store from target file.
    ///
    /// A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// - Return [`CredentialsError::ReadFile`] if file cannot be read.
    /// - Return [`CredentialsError::Deserialize`] if file is malformed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        debug!("open credentials: {:?}", path.display());

        match read_to_string(&path) {
            Ok(content) => Ok(Self::new(content.parse::<CredentialsDefinition>()?.credentials)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(CredentialsError::ReadFile { source: err, path }),
        }
    }
}

impl CredentialStore for FileCredentials {
    fn lookup(&self, credentials_id: &str) -> Option<Credential> {
        self.credentials
            .iter()
            .find(|credential| credential.id() == credentials_id)
            .cloned()
    }
}

/// Credentials error types.
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    /// Credentials file cannot be parsed.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Credentials file cannot be read from.
    #[error("failed to read credentials at {:?}", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = CredentialsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserialize_credentials() -> anyhow::Result<()> {
        let result: CredentialsDefinition = r#"
            [[credential]]
            kind = "username_password"
            id = "67890"
            username = "xdevreg"
            password = "hunter2"

            [[credential]]
            kind = "certificate"
            id = "cert"
            certificate = "MIIB"
            password = "unlock"
        "#
        .parse()?;

        let store = FileCredentials::new(result.credentials);
        let login = store.lookup("67890").expect("credentials exist");
        assert_eq!(login.username(), Some("xdevreg"));
        assert_eq!(login.password().expose(), "hunter2");
        assert_eq!(login.certificate(), None);

        let cert = store.lookup("cert").expect("credentials exist");
        assert_eq!(cert.username(), None);
        assert_eq!(cert.certificate().map(Secret::expose), Some("MIIB"));
        assert_eq!(store.lookup("missing"), None);

        Ok(())
    }

    #[test]
    fn secrets_stay_hidden() {
        let credential = Credential::UsernamePassword {
            id: "67890".into(),
            username: "xdevreg".into(),
            password: Secret::new("hunter2"),
        };

        let debug = format!("{credential:?}");
        assert!(!debug.contains("hunter2"));
        assert_eq!(format!("{:?}", credential.password()), MASK);
        assert_eq!(credential.password().to_string(), MASK);
    }
}
