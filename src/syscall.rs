// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process invocation.
//!
//! Every tool rigup drives (package manager, elevation probes, font cache
//! refresh, PowerShell) is called through here, so that each child process
//! sees the PATH of the current [`EnvironmentView`] rather than whatever the
//! parent process inherited at startup.

use crate::env::EnvironmentView;

use std::{
    ffi::{OsStr, OsString},
    process::Command,
};
use tracing::debug;

/// Run external command to completion and capture its output.
///
/// The program is resolved against the PATH of the environment view first.
/// Captured stdout and stderr are joined together and returned with trailing
/// newlines chomped.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if the process cannot be started.
/// - Return [`SyscallError::Failed`] if the process exits unsuccessfully.
pub fn run(
    program: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    env: &EnvironmentView,
) -> Result<String> {
    let program = program.as_ref();
    let resolved: OsString = env
        .which(program)
        .map(|path| path.into_os_string())
        .unwrap_or_else(|| program.to_os_string());
    let args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect::<Vec<_>>();

    debug!("run {:?} {:?}", resolved, args);
    let mut command = Command::new(&resolved);
    command.args(&args);
    env.apply(&mut command);

    let output = command.output().map_err(|err| SyscallError::Spawn {
        source: err,
        program: program.to_string_lossy().into_owned(),
    })?;

    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();
    message.push_str(stdout.trim_end());
    if !stderr.trim().is_empty() {
        if !message.is_empty() {
            message.push('\n');
        }
        message.push_str(stderr.trim_end());
    }

    if !output.status.success() {
        return Err(SyscallError::Failed {
            program: program.to_string_lossy().into_owned(),
            code: output.status.code(),
            message,
        });
    }

    Ok(message)
}

/// External process error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Process could not be started at all.
    #[error("failed to start {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: String,
    },

    /// Process ran, but reported failure.
    #[error("command {program:?} failed with status {}: {message}", code.map_or("signal".to_string(), |c| c.to_string()))]
    Failed {
        program: String,
        code: Option<i32>,
        message: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn view() -> EnvironmentView {
        EnvironmentView::from_process()
    }

    #[test]
    fn captures_and_chomps_output() -> anyhow::Result<()> {
        let result = run("sh", ["-c", "echo hello; echo oops >&2"], &view())?;
        assert_eq!(result, "hello\noops");

        Ok(())
    }

    #[test]
    fn reports_exit_status() {
        let result = run("sh", ["-c", "echo broken >&2; exit 3"], &view());
        match result {
            Err(SyscallError::Failed { code, message, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(message, "broken");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let result = run("rigup-definitely-not-a-real-program", ["x"], &view());
        assert!(matches!(result, Err(SyscallError::Spawn { .. })));
    }
}
