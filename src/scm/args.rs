// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Downloader CLI argument construction.
//!
//! The downloader CLI is always handed a flat list of discrete arguments.
//! On Windows nodes that list passes through a batch file first, where
//! embedded double quotes and spaces would otherwise split or merge
//! arguments. Values bound for a batch file are therefore quoted, while
//! values bound for a POSIX shell script are passed through as is.

use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Replacement text shown for masked arguments.
pub const MASK: &str = "********";

/// Convert multi-line filter pattern into comma-delimited listing.
///
/// Every run of whitespace becomes a single comma, and leading or trailing
/// whitespace is dropped. Commas already present are kept as is.
pub fn convert_filter_pattern(filter_pattern: Option<&str>) -> Option<String> {
    filter_pattern.map(|pattern| pattern.split_whitespace().collect::<Vec<_>>().join(","))
}

/// Escape value for the downloader CLI script of a node.
///
/// Batch file targets get every double quote doubled, and the whole value
/// wrapped in double quotes. Shell targets receive the value untouched.
pub fn escape_for_script(value: Option<&str>, is_shell: bool) -> Option<String> {
    value.map(|value| {
        if is_shell {
            value.to_string()
        } else {
            format!("\"{}\"", value.replace('"', "\"\""))
        }
    })
}

/// Resolve source download location against a workspace.
///
/// Absolute locations are kept, relative ones are joined onto the
/// workspace.
pub fn resolve_path(target_folder: impl AsRef<Path>, workspace: impl AsRef<Path>) -> PathBuf {
    let target_folder = target_folder.as_ref();
    if target_folder.is_absolute() {
        target_folder.to_path_buf()
    } else {
        workspace.as_ref().join(target_folder)
    }
}

/// Ordered argument list with support for masked values.
///
/// # Invariant
///
/// - Masked values never show up through [`Display`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArgumentList {
    args: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Argument {
    value: String,
    masked: bool,
}

impl ArgumentList {
    /// Construct new empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single argument.
    pub fn add(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(Argument {
            value: value.into(),
            masked: false,
        });
        self
    }

    /// Append a single argument that must never be displayed.
    pub fn add_masked(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(Argument {
            value: value.into(),
            masked: true,
        });
        self
    }

    /// Append flag followed by its value.
    pub fn add_pair(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.add(flag).add(value)
    }

    /// Append flag followed by its value, unless the value is missing or
    /// empty.
    pub fn add_opt_pair(&mut self, flag: &str, value: Option<impl Into<String>>) -> &mut Self {
        match value.map(Into::into) {
            Some(value) if !value.is_empty() => self.add_pair(flag, value),
            _ => self,
        }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Check if argument list is empty.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Plain argument values, masked ones included.
    pub fn values(&self) -> Vec<&str> {
        self.args.iter().map(|arg| arg.value.as_str()).collect()
    }

    /// Plain argument values as [`OsString`] for process creation.
    pub fn to_os_args(&self) -> Vec<OsString> {
        self.args.iter().map(|arg| OsString::from(&arg.value)).collect()
    }
}

impl Display for ArgumentList {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let shown = self
            .args
            .iter()
            .map(|arg| if arg.masked { MASK } else { arg.value.as_str() })
            .collect::<Vec<_>>();

        fmt.write_str(&shown.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case(" ", ""; "single space")]
    #[test_case("\n", ""; "single newline")]
    #[test_case("\n\n\n", ""; "only newlines")]
    #[test_case("\t\t\t", ""; "only tabs")]
    #[test_case("  \t \n \t\t\n", ""; "only mixed whitespace")]
    #[test_case("a.b.c d.e.f", "a.b.c,d.e.f"; "space separated")]
    #[test_case(" a.b.c   d.e.f ", "a.b.c,d.e.f"; "padded spaces")]
    #[test_case("a.b.c\nd.e.f\n", "a.b.c,d.e.f"; "trailing newline")]
    #[test_case("\n\na.b.c\n\n\nd.e.f\n\n\n\n", "a.b.c,d.e.f"; "newline runs")]
    #[test_case("\t\ta.b.c\t\t\td.e.f\t\t\t\t", "a.b.c,d.e.f"; "tab runs")]
    #[test_case("a.b.c\td.e.f\ng.h.i", "a.b.c,d.e.f,g.h.i"; "mixed separators")]
    #[test_case(
        " \t\na.b.c\n \t d.e.f g.h.i,j.k.l\n\t   ",
        "a.b.c,d.e.f,g.h.i,j.k.l";
        "mixed separators with commas"
    )]
    #[test_case("a.b.c,d.e.f", "a.b.c,d.e.f"; "already comma delimited")]
    #[test]
    fn convert_filter_pattern_cases(input: &str, expect: &str) {
        pretty_assertions::assert_eq!(convert_filter_pattern(Some(input)).as_deref(), Some(expect));
    }

    #[test]
    fn convert_filter_pattern_keeps_none() {
        assert_eq!(convert_filter_pattern(None), None);
    }

    #[test_case("cw01", "\"cw01\""; "plain value")]
    #[test_case("", "\"\""; "empty value")]
    #[test_case("pass word", "\"pass word\""; "embedded space")]
    #[test_case("say \"hi\"", "\"say \"\"hi\"\"\""; "embedded quotes")]
    #[test]
    fn escape_for_batch_file(input: &str, expect: &str) {
        pretty_assertions::assert_eq!(escape_for_script(Some(input), false).as_deref(), Some(expect));
    }

    #[test]
    fn escape_for_shell_is_untouched() {
        assert_eq!(
            escape_for_script(Some("say \"hi\""), true).as_deref(),
            Some("say \"hi\"")
        );
        assert_eq!(escape_for_script(None, true), None);
        assert_eq!(escape_for_script(None, false), None);
    }

    #[test]
    fn resolve_relative_and_absolute_paths() {
        let workspace = std::env::temp_dir().join("workspace");
        assert_eq!(
            resolve_path("../sources", &workspace),
            workspace.join("../sources")
        );

        let absolute = std::env::temp_dir().join("sources");
        assert_eq!(resolve_path(&absolute, &workspace), absolute);
    }

    #[test]
    fn argument_list_masks_and_skips() {
        let mut args = ArgumentList::new();
        args.add("SCMDownloaderCLI.sh")
            .add_pair("-host", "cw01")
            .add_opt_pair("-id", None::<String>)
            .add_opt_pair("-cert", Some(""))
            .add("-pass")
            .add_masked("hunter2")
            .add_opt_pair("-protocol", Some("TLSv1.2"));

        assert_eq!(
            args.to_string(),
            "SCMDownloaderCLI.sh -host cw01 -pass ******** -protocol TLSv1.2"
        );
        assert_eq!(
            args.values(),
            vec![
                "SCMDownloaderCLI.sh",
                "-host",
                "cw01",
                "-pass",
                "hunter2",
                "-protocol",
                "TLSv1.2"
            ]
        );
        assert_eq!(args.len(), 7);
    }
}
