// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Check out mainframe sources into a build workspace.
//!
//! Mfscm downloads PDS members, Endevor elements, and ISPW components by
//! handing a fully assembled command line to the downloader CLI installed on
//! a build node. Host connections are shared between jobs through one
//! connection registry, and login credentials are looked up by identifier so
//! that job definitions never carry secrets.
//!
//! The [`store`] module ties everything together, while [`scm`] validates
//! jobs and runs the CLI.

pub mod config;
pub mod credentials;
pub mod migrate;
pub mod path;
pub mod registry;
pub mod scm;
pub mod store;
