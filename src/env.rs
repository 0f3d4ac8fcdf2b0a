// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Environment view and persistence.
//!
//! Tools installed during a run should be usable later in that same run
//! without spawning a fresh login shell. Rather than mutating the ambient
//! process environment, rigup carries an explicit [`EnvironmentView`] that is
//! handed to every step that spawns a process. Persisting a change for future
//! sessions is a separate operation performed through a
//! [`PersistedEnvironment`].
//!
//! # PATH Segments
//!
//! A PATH segment is either [`PathState::Absent`] or [`PathState::Present`].
//! Appending an absent segment moves it to present; appending a present
//! segment does nothing. Segments are compared whole, after trailing
//! separators are trimmed, and case-insensitively on Windows. Substring
//! matches never count as presence.

use crate::{
    patch::{lines::LineDocument, ConfigEdit, ExistencePolicy, PatchError},
    syscall::{self, SyscallError},
};

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info, instrument};

/// Name of the PATH variable in the user-scope environment.
pub const PATH_VAR: &str = if cfg!(windows) { "Path" } else { "PATH" };

/// Platform PATH separator.
pub const PATH_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Presence of a segment in a PATH value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Absent,
    Present,
}

/// Explicit view of the environment handed to spawned processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentView {
    segments: Vec<String>,
    separator: char,
    ignore_case: bool,
}

impl EnvironmentView {
    /// Construct new view from a raw PATH value.
    pub fn new(path: impl AsRef<str>, separator: char, ignore_case: bool) -> Self {
        Self {
            segments: split(path.as_ref(), separator),
            separator,
            ignore_case,
        }
    }

    /// Snapshot the PATH of the current process.
    pub fn from_process() -> Self {
        let path = std::env::var_os("PATH")
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(path, PATH_SEPARATOR, cfg!(windows))
    }

    /// Render PATH value.
    pub fn path_value(&self) -> String {
        self.segments.join(&self.separator.to_string())
    }

    /// Check state of a segment in this view.
    pub fn path_state(&self, segment: &str) -> PathState {
        state_of(&self.segments, segment, self.ignore_case)
    }

    /// Append segment if absent.
    ///
    /// Returns the state the segment was in _before_ the call.
    pub fn append_segment(&mut self, segment: &str) -> PathState {
        let state = self.path_state(segment);
        if state == PathState::Absent {
            self.segments.push(segment.to_string());
        }

        state
    }

    /// Absorb segments of another PATH value that this view lacks.
    ///
    /// Segments that still contain unexpanded variable references are
    /// ignored.
    pub fn absorb(&mut self, value: &str) -> usize {
        let mut added = 0;
        for segment in split(value, self.separator) {
            if segment.contains('$') || segment.contains('%') {
                continue;
            }

            if self.append_segment(&segment) == PathState::Absent {
                added += 1;
            }
        }

        added
    }

    /// Locate executable on the PATH of this view.
    pub fn which(&self, name: impl AsRef<OsStr>) -> Option<PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(name, Some(self.path_value()), cwd).ok()
    }

    /// Hand this view to a child process.
    pub fn apply(&self, command: &mut Command) {
        command.env("PATH", self.path_value());
    }
}

/// State transition performed on PATH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTransition {
    /// Segment state in the persisted user-scope variable before the call.
    pub persisted: PathState,

    /// Segment state in the environment view before the call.
    pub view: PathState,
}

impl PathTransition {
    /// Check if nothing needed to change.
    pub fn is_noop(&self) -> bool {
        self.persisted == PathState::Present && self.view == PathState::Present
    }
}

/// Ensure PATH segment is present both persistently and in the current view.
///
/// The persisted value is only written back when the segment was absent.
///
/// # Errors
///
/// - Return [`EnvError`] if the persisted variable cannot be read or
///   written.
#[instrument(skip(view, persisted), level = "debug")]
pub fn ensure_path_segment(
    view: &mut EnvironmentView,
    persisted: &impl PersistedEnvironment,
    segment: &str,
) -> Result<PathTransition> {
    let current = match persisted.read(PATH_VAR)? {
        Some(value) => value,
        None => persisted.fallback(PATH_VAR),
    };

    let mut segments = split(&current, view.separator);
    let persisted_state = state_of(&segments, segment, view.ignore_case);
    if persisted_state == PathState::Absent {
        segments.push(segment.to_string());
        let value = segments.join(&view.separator.to_string());
        info!("persist {segment:?} to user {PATH_VAR}");
        persisted.write(PATH_VAR, &value)?;
    }

    let view_state = view.append_segment(segment);
    debug!("segment {segment:?} was {view_state:?} in current view");

    Ok(PathTransition {
        persisted: persisted_state,
        view: view_state,
    })
}

/// Layer of indirection for the persisted user-scope environment.
pub trait PersistedEnvironment {
    /// Read variable, returning [`None`] if it is not set.
    fn read(&self, name: &str) -> Result<Option<String>>;

    /// Overwrite variable.
    fn write(&self, name: &str, value: &str) -> Result<()>;

    /// Value to start from when the variable is not set yet.
    fn fallback(&self, _name: &str) -> String {
        String::new()
    }

    /// Read variable from the machine scope, returning [`None`] if it is not
    /// set or the platform has no such scope.
    ///
    /// Machine-wide installers extend this scope instead of the user's. It
    /// is only ever read.
    fn read_machine(&self, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// User-scope environment stored in the Windows registry.
///
/// Goes through PowerShell's `[Environment]` API so that the change is
/// broadcast to running applications.
#[derive(Debug, Default, Clone)]
pub struct WindowsUserEnvironment;

impl WindowsUserEnvironment {
    fn get_variable(&self, name: &str, scope: &str) -> Result<Option<String>> {
        let script = format!(
            "[Environment]::GetEnvironmentVariable({}, {})",
            quote_powershell(name),
            quote_powershell(scope)
        );
        let output = syscall::run(
            "powershell",
            ["-NoProfile", "-NonInteractive", "-Command", script.as_str()],
            &EnvironmentView::from_process(),
        )?;
        let value = output.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }
}

impl PersistedEnvironment for WindowsUserEnvironment {
    fn read(&self, name: &str) -> Result<Option<String>> {
        self.get_variable(name, "User")
    }

    fn read_machine(&self, name: &str) -> Result<Option<String>> {
        self.get_variable(name, "Machine")
    }

    fn write(&self, name: &str, value: &str) -> Result<()> {
        let script = format!(
            "[Environment]::SetEnvironmentVariable({}, {}, 'User')",
            quote_powershell(name),
            quote_powershell(value)
        );
        syscall::run(
            "powershell",
            ["-NoProfile", "-NonInteractive", "-Command", script.as_str()],
            &EnvironmentView::from_process(),
        )?;
        Ok(())
    }
}

fn quote_powershell(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// User-scope environment stored as `KEY=value` lines in a file.
///
/// Matches the `environment.d` format read by the systemd user manager,
/// where `$PATH` refers to the inherited value.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    /// Construct new environment file handle.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the environment file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistedEnvironment for EnvFile {
    fn read(&self, name: &str) -> Result<Option<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(EnvError::Read {
                    source: err,
                    path: self.path.clone(),
                })
            }
        };

        Ok(LineDocument::from(content.as_str())
            .get_key(name)
            .map(ToString::to_string))
    }

    fn write(&self, name: &str, value: &str) -> Result<()> {
        let edit = ConfigEdit::new(
            &self.path,
            ExistencePolicy::CreateIfMissing,
            |doc: LineDocument| Ok(doc.set_key(name, value)),
        );
        edit.apply()?;
        Ok(())
    }

    fn fallback(&self, name: &str) -> String {
        format!("${name}")
    }
}

/// Persisted environment of the host platform.
#[derive(Debug, Clone)]
pub enum SystemEnvironment {
    Registry(WindowsUserEnvironment),
    File(EnvFile),
}

impl SystemEnvironment {
    /// Select persisted environment for the host platform.
    ///
    /// # Errors
    ///
    /// - Return [`EnvError::Path`] if the environment file location cannot
    ///   be determined.
    pub fn detect() -> Result<Self> {
        if cfg!(windows) {
            return Ok(Self::Registry(WindowsUserEnvironment));
        }

        Ok(Self::File(EnvFile::new(crate::path::default_environment_file()?)))
    }
}

impl PersistedEnvironment for SystemEnvironment {
    fn read(&self, name: &str) -> Result<Option<String>> {
        match self {
            Self::Registry(env) => env.read(name),
            Self::File(env) => env.read(name),
        }
    }

    fn write(&self, name: &str, value: &str) -> Result<()> {
        match self {
            Self::Registry(env) => env.write(name, value),
            Self::File(env) => env.write(name, value),
        }
    }

    fn fallback(&self, name: &str) -> String {
        match self {
            Self::Registry(env) => env.fallback(name),
            Self::File(env) => env.fallback(name),
        }
    }

    fn read_machine(&self, name: &str) -> Result<Option<String>> {
        match self {
            Self::Registry(env) => env.read_machine(name),
            Self::File(env) => env.read_machine(name),
        }
    }
}

fn split(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn normalize(segment: &str, ignore_case: bool) -> String {
    let trimmed = segment.trim();
    let trimmed = match trimmed.trim_end_matches(['/', '\\']) {
        // INVARIANT: Keep filesystem root intact.
        "" => trimmed,
        rest => rest,
    };

    if ignore_case {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

fn state_of(segments: &[String], segment: &str, ignore_case: bool) -> PathState {
    let target = normalize(segment, ignore_case);
    if segments
        .iter()
        .any(|existing| normalize(existing, ignore_case) == target)
    {
        PathState::Present
    } else {
        PathState::Absent
    }
}

/// Environment error types.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// Environment file cannot be read.
    #[error("failed to read environment file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Environment file cannot be patched.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Registry access through PowerShell failed.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Location of the environment file is unknown.
    #[error(transparent)]
    Path(#[from] crate::path::NoWayHome),
}

/// Friendly result alias :3
pub type Result<T, E = EnvError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;
    use std::{cell::RefCell, collections::HashMap};

    #[derive(Debug, Default)]
    struct MemoryEnvironment {
        vars: RefCell<HashMap<String, String>>,
        writes: RefCell<usize>,
    }

    impl PersistedEnvironment for MemoryEnvironment {
        fn read(&self, name: &str) -> Result<Option<String>> {
            Ok(self.vars.borrow().get(name).cloned())
        }

        fn write(&self, name: &str, value: &str) -> Result<()> {
            *self.writes.borrow_mut() += 1;
            self.vars.borrow_mut().insert(name.into(), value.into());
            Ok(())
        }
    }

    #[test_case("/usr/bin:/opt/tool/bin", "/opt/tool/bin", false, PathState::Present; "exact match")]
    #[test_case("/usr/bin:/opt/tool/bin/", "/opt/tool/bin", false, PathState::Present; "trailing separator")]
    #[test_case("/usr/bin:/opt/tool/binaries", "/opt/tool/bin", false, PathState::Absent; "substring is not presence")]
    #[test_case("/usr/bin", "/USR/BIN", false, PathState::Absent; "case sensitive")]
    #[test_case(r"C:\Windows;C:\Program Files\LLVM\bin\", r"c:\program files\llvm\bin", true, PathState::Present; "case insensitive")]
    #[test]
    fn segment_state(path: &str, segment: &str, ignore_case: bool, expect: PathState) {
        let separator = if ignore_case { ';' } else { ':' };
        let view = EnvironmentView::new(path, separator, ignore_case);
        pretty_assertions::assert_eq!(view.path_state(segment), expect);
    }

    #[test]
    fn append_absent_segment_once() {
        let mut view = EnvironmentView::new("/usr/bin:/bin", ':', false);

        assert_eq!(view.append_segment("/opt/tool/bin"), PathState::Absent);
        assert_eq!(view.append_segment("/opt/tool/bin"), PathState::Present);
        assert_eq!(view.path_value(), "/usr/bin:/bin:/opt/tool/bin");
    }

    #[test]
    fn ensure_segment_updates_view_and_persisted() -> anyhow::Result<()> {
        let persisted = MemoryEnvironment::default();
        persisted
            .vars
            .borrow_mut()
            .insert(PATH_VAR.into(), "/usr/bin".into());
        let mut view = EnvironmentView::new("/usr/bin:/bin", ':', false);

        let first = ensure_path_segment(&mut view, &persisted, "/opt/tool/bin")?;
        assert_eq!(
            first,
            PathTransition {
                persisted: PathState::Absent,
                view: PathState::Absent,
            }
        );
        assert_eq!(view.path_value(), "/usr/bin:/bin:/opt/tool/bin");
        assert_eq!(
            persisted.read(PATH_VAR)?,
            Some("/usr/bin:/opt/tool/bin".to_string())
        );

        let second = ensure_path_segment(&mut view, &persisted, "/opt/tool/bin")?;
        assert!(second.is_noop());
        assert_eq!(*persisted.writes.borrow(), 1);
        assert_eq!(view.path_value(), "/usr/bin:/bin:/opt/tool/bin");

        Ok(())
    }

    #[test]
    fn env_file_keeps_inherited_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = EnvFile::new(dir.path().join("environment.d").join("60-rigup.conf"));
        let mut view = EnvironmentView::new("/usr/bin", ':', false);

        ensure_path_segment(&mut view, &file, "/opt/tool/bin")?;
        ensure_path_segment(&mut view, &file, "/opt/other/bin")?;
        ensure_path_segment(&mut view, &file, "/opt/tool/bin")?;

        let content = std::fs::read_to_string(file.path())?;
        assert_eq!(content, "PATH=$PATH:/opt/tool/bin:/opt/other/bin\n");

        Ok(())
    }

    #[test]
    fn absorb_skips_unexpanded_segments() {
        let mut view = EnvironmentView::new("/usr/bin", ':', false);

        let added = view.absorb("$PATH:/usr/bin:/opt/tool/bin");
        assert_eq!(added, 1);
        assert_eq!(view.path_value(), "/usr/bin:/opt/tool/bin");
    }

    #[test]
    fn quote_powershell_escapes_single_quotes() {
        assert_eq!(quote_powershell("it's"), "'it''s'");
    }
}
