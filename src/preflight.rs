// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Preflight checks.
//!
//! Nothing is attempted unless the run has the privileges it needs and the
//! package-manager front-end can be found. Both failures are fatal: elevation
//! cannot be self-granted, and every later stage leans on the package
//! manager.

use crate::{env::EnvironmentView, syscall};

use tracing::{error, info, instrument};

/// Layer of indirection for privilege detection.
pub trait PrivilegeProbe {
    /// Check if current process runs with administrator or root rights.
    fn is_elevated(&self) -> bool;
}

/// Privilege detection of the host platform.
///
/// On Windows `net session` only succeeds in an elevated shell. Elsewhere the
/// effective user id reported by `id -u` must be zero.
#[derive(Debug, Default, Clone)]
pub struct SystemPrivilegeProbe;

impl PrivilegeProbe for SystemPrivilegeProbe {
    fn is_elevated(&self) -> bool {
        let env = EnvironmentView::from_process();
        if cfg!(windows) {
            return syscall::run("net", ["session"], &env).is_ok();
        }

        syscall::run("id", ["-u"], &env)
            .map(|uid| uid.trim() == "0")
            .unwrap_or(false)
    }
}

/// Check if current process is elevated.
pub fn check_privileges(probe: &impl PrivilegeProbe) -> bool {
    probe.is_elevated()
}

/// Check if a tool can be found on the PATH of the environment view.
pub fn check_tool_available(name: &str, env: &EnvironmentView) -> bool {
    env.which(name).is_some()
}

/// Gate for the whole provisioning run.
#[derive(Debug, Clone)]
pub struct Preflight<'a> {
    require_elevation: bool,
    front_end: &'a str,
}

impl<'a> Preflight<'a> {
    /// Construct new preflight gate.
    pub fn new(require_elevation: bool, front_end: &'a str) -> Self {
        Self {
            require_elevation,
            front_end,
        }
    }

    /// Run every check, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// - Return [`PreflightError::NotElevated`] if elevation is required but
    ///   missing.
    /// - Return [`PreflightError::MissingFrontEnd`] if the package-manager
    ///   front-end is not on PATH.
    #[instrument(skip(self, probe, env), level = "debug")]
    pub fn run(&self, probe: &impl PrivilegeProbe, env: &EnvironmentView) -> Result<()> {
        if self.require_elevation && !check_privileges(probe) {
            error!("rigup needs administrator rights, re-run it from an elevated shell");
            return Err(PreflightError::NotElevated);
        }

        if !check_tool_available(self.front_end, env) {
            error!(
                "package manager {:?} not found on PATH, install it before running rigup",
                self.front_end
            );
            return Err(PreflightError::MissingFrontEnd {
                program: self.front_end.to_string(),
            });
        }

        info!("preflight passed");
        Ok(())
    }
}

/// Fatal preflight failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreflightError {
    /// Process lacks required privileges.
    #[error("administrator privileges are required")]
    NotElevated,

    /// Package-manager front-end cannot be found.
    #[error("package manager front-end {program:?} is not available")]
    MissingFrontEnd { program: String },
}

/// Friendly result alias :3
pub type Result<T, E = PreflightError> = std::result::Result<T, E>;
