// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for the store and for build
//! workspaces that the downloader CLI writes into.

use std::path::PathBuf;

/// Determine default absolute path to the store directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/mfscm-store` as the default
/// absolute path for the store. Does not check if the path returned actually
/// exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if data directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_store_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("mfscm-store"))
        .ok_or(NoWayHome)
}

/// Determine default build workspace.
///
/// Falls back to the current working directory when the caller does not
/// name a workspace explicitly.
///
/// # Errors
///
/// - Return I/O error if the current directory cannot be determined.
pub fn default_workspace_dir() -> std::io::Result<PathBuf> {
    std::env::current_dir()
}

/// No way to determine user's data directory.
///
/// # See Also
///
/// - [`dirs::data_dir`](https://docs.rs/dirs/latest/dirs/fn.data_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's data directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
