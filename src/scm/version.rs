// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Downloader CLI version checks.
//!
//! Every CLI install records its version in a `version.txt` file at the
//! top-level of its install directory, e.g., "20.04.01". Versions compare
//! component by component as numbers, so "20.04.01" equals "20.4.1".

use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Name of the file holding the CLI version.
pub const VERSION_FILE: &str = "version.txt";

/// Oldest CLI the downloader arguments are compatible with.
pub const MINIMUM_CLI_VERSION: &str = "18.2.3";

/// Oldest CLI that understands the `-protocol` argument.
pub const MINIMUM_PROTOCOL_VERSION: &str = "20.1.1";

/// Dotted numeric CLI version.
#[derive(Debug, Clone, Eq)]
pub struct CliVersion {
    text: String,
    parts: Vec<u32>,
}

impl CliVersion {
    /// Check if version is at least `minimum`.
    pub fn at_least(&self, minimum: &CliVersion) -> bool {
        self >= minimum
    }
}

impl FromStr for CliVersion {
    type Err = VersionError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let text = data.trim();
        let parts = text
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VersionError::Malformed(text.to_string()))?;

        Ok(Self {
            text: text.to_string(),
            parts,
        })
    }
}

impl PartialEq for CliVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for CliVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CliVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // INVARIANT: Missing trailing components count as zero.
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|idx| {
                let lhs = self.parts.get(idx).copied().unwrap_or(0);
                let rhs = other.parts.get(idx).copied().unwrap_or(0);
                lhs.cmp(&rhs)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl Display for CliVersion {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.text)
    }
}

/// Version parsing error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// Version text is not a dotted list of numbers.
    #[error("malformed CLI version {0:?}")]
    Malformed(String),
}
