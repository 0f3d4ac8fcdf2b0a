// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package installation.
//!
//! Packages are installed through an external package-manager front-end,
//! one entry at a time, in manifest order. Each entry is checked first and
//! only installed when absent. Entries are independent of one another: a
//! package that fails to install (renamed upstream, removed from the catalog,
//! network hiccup) is recorded as [`InstallOutcome::Failed`] and the loop
//! moves on.

use crate::{
    env::EnvironmentView,
    syscall::{self, SyscallError},
};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{info, instrument, warn};

/// Package to install.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PackageSpec {
    /// Identifier understood by the package manager.
    pub id: String,

    /// Human readable name used in logs.
    pub name: String,
}

impl PackageSpec {
    /// Construct new package spec.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl Display for PackageSpec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} ({})", self.name, self.id)
    }
}

/// Outcome of installing one package.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum InstallOutcome {
    /// Package was installed by this run.
    Success,

    /// Package was already installed.
    AlreadyPresent,

    /// Package could not be checked or installed.
    Failed(String),
}

impl InstallOutcome {
    /// Check if outcome is a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl Display for InstallOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Success => fmt.write_str("installed"),
            Self::AlreadyPresent => fmt.write_str("already present"),
            Self::Failed(reason) => write!(fmt, "failed: {reason}"),
        }
    }
}

/// Result of installing one package.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct InstallResult {
    pub spec: PackageSpec,
    pub outcome: InstallOutcome,
}

/// Layer of indirection for package-manager access.
pub trait PackageManager {
    /// Name of the front-end program that must be available.
    fn front_end(&self) -> &str;

    /// Check if package is already installed.
    fn is_installed(&self, spec: &PackageSpec, env: &EnvironmentView) -> Result<bool>;

    /// Install package, accepting any agreements non-interactively.
    fn install(&self, spec: &PackageSpec, env: &EnvironmentView) -> Result<()>;
}

/// Package manager driven by command templates.
///
/// Both argument lists may contain the `{id}` placeholder, which is replaced
/// by the package identifier. The query command must exit successfully if and
/// only if the package is installed. The install command must never wait on
/// an interactive prompt, so agreement flags belong in the template.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct CommandPackageManager {
    /// Front-end program, e.g., `winget`.
    pub program: String,

    /// Arguments of the presence query.
    pub query: Vec<String>,

    /// Arguments of the install command.
    pub install: Vec<String>,
}

impl CommandPackageManager {
    fn render(template: &[String], spec: &PackageSpec) -> Vec<String> {
        template
            .iter()
            .map(|arg| arg.replace("{id}", &spec.id))
            .collect()
    }
}

impl PackageManager for CommandPackageManager {
    fn front_end(&self) -> &str {
        &self.program
    }

    fn is_installed(&self, spec: &PackageSpec, env: &EnvironmentView) -> Result<bool> {
        match syscall::run(&self.program, Self::render(&self.query, spec), env) {
            Ok(_) => Ok(true),
            Err(SyscallError::Failed { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn install(&self, spec: &PackageSpec, env: &EnvironmentView) -> Result<()> {
        syscall::run(&self.program, Self::render(&self.install, spec), env)?;
        Ok(())
    }
}

/// Check-then-install a single package.
///
/// Never fails; every error is folded into [`InstallOutcome::Failed`].
#[instrument(skip(manager, env), fields(package = %spec.id), level = "debug")]
pub fn install_package(
    manager: &impl PackageManager,
    spec: &PackageSpec,
    env: &EnvironmentView,
) -> InstallResult {
    let outcome = match manager.is_installed(spec, env) {
        Ok(true) => InstallOutcome::AlreadyPresent,
        Ok(false) => {
            info!("install {spec}");
            match manager.install(spec, env) {
                Ok(()) => InstallOutcome::Success,
                Err(err) => InstallOutcome::Failed(err.to_string()),
            }
        }
        Err(err) => InstallOutcome::Failed(err.to_string()),
    };

    match &outcome {
        InstallOutcome::Failed(reason) => warn!("{spec}: {reason}"),
        other => info!("{spec}: {other}"),
    }

    InstallResult {
        spec: spec.clone(),
        outcome,
    }
}

/// Install every package in declared order.
///
/// Each entry is attempted regardless of how earlier entries fared.
#[instrument(skip_all, level = "debug")]
pub fn install_all<'a>(
    manager: &impl PackageManager,
    specs: impl IntoIterator<Item = &'a PackageSpec>,
    env: &EnvironmentView,
) -> Vec<InstallResult> {
    specs
        .into_iter()
        .map(|spec| install_package(manager, spec, env))
        .collect()
}

/// Package manager error types.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// Front-end invocation failed.
    #[error(transparent)]
    Syscall(#[from] SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = PackageError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, collections::HashSet};

    #[derive(Debug, Default)]
    struct FakeManager {
        installed: HashSet<String>,
        broken: HashSet<String>,
        attempts: RefCell<Vec<String>>,
    }

    impl PackageManager for FakeManager {
        fn front_end(&self) -> &str {
            "fake"
        }

        fn is_installed(&self, spec: &PackageSpec, _env: &EnvironmentView) -> Result<bool> {
            Ok(self.installed.contains(&spec.id))
        }

        fn install(&self, spec: &PackageSpec, _env: &EnvironmentView) -> Result<()> {
            self.attempts.borrow_mut().push(spec.id.clone());
            if self.broken.contains(&spec.id) {
                return Err(PackageError::Syscall(SyscallError::Failed {
                    program: "fake".into(),
                    code: Some(1),
                    message: format!("no package found matching {}", spec.id),
                }));
            }

            Ok(())
        }
    }

    fn specs(count: usize) -> Vec<PackageSpec> {
        (1..=count)
            .map(|n| PackageSpec::new(format!("pkg.{n}"), format!("Package {n}")))
            .collect()
    }

    #[test]
    fn failure_does_not_stop_other_entries() {
        let manager = FakeManager {
            installed: HashSet::from(["pkg.5".to_string()]),
            broken: HashSet::from(["pkg.3".to_string()]),
            ..FakeManager::default()
        };
        let env = EnvironmentView::new("", ':', false);
        let specs = specs(6);

        let results = install_all(&manager, &specs, &env);

        let outcomes = results.iter().map(|r| r.outcome.clone()).collect::<Vec<_>>();
        assert_eq!(
            outcomes,
            vec![
                InstallOutcome::Success,
                InstallOutcome::Success,
                InstallOutcome::Failed(
                    "command \"fake\" failed with status 1: no package found matching pkg.3".into()
                ),
                InstallOutcome::Success,
                InstallOutcome::AlreadyPresent,
                InstallOutcome::Success,
            ]
        );
        assert_eq!(
            *manager.attempts.borrow(),
            vec!["pkg.1", "pkg.2", "pkg.3", "pkg.4", "pkg.6"]
        );
        assert_eq!(results[2].spec, specs[2]);
    }

    #[test]
    fn placeholder_is_rendered() {
        let template = vec!["install".to_string(), "--id".into(), "{id}".into(), "--source={id}-src".into()];
        let result = CommandPackageManager::render(&template, &PackageSpec::new("Git.Git", "Git"));
        assert_eq!(result, vec!["install", "--id", "Git.Git", "--source=Git.Git-src"]);
    }

    #[cfg(unix)]
    mod command {
        use super::*;
        use pretty_assertions::assert_eq;

        fn manager(query: &str, install: &str) -> CommandPackageManager {
            CommandPackageManager {
                program: "sh".into(),
                query: vec!["-c".into(), query.into(), "sh".into(), "{id}".into()],
                install: vec!["-c".into(), install.into(), "sh".into(), "{id}".into()],
            }
        }

        #[test]
        fn present_package_is_not_reinstalled() {
            let manager = manager("exit 0", "exit 9");
            let result = install_package(&manager, &PackageSpec::new("a", "A"), &EnvironmentView::from_process());
            assert_eq!(result.outcome, InstallOutcome::AlreadyPresent);
        }

        #[test]
        fn absent_package_is_installed() {
            let manager = manager("exit 1", "test \"$1\" = a");
            let result = install_package(&manager, &PackageSpec::new("a", "A"), &EnvironmentView::from_process());
            assert_eq!(result.outcome, InstallOutcome::Success);
        }

        #[test]
        fn install_failure_carries_output() {
            let manager = manager("exit 1", "echo \"no package $1\" >&2; exit 2");
            let result = install_package(&manager, &PackageSpec::new("a", "A"), &EnvironmentView::from_process());
            match result.outcome {
                InstallOutcome::Failed(reason) => assert!(reason.contains("no package a")),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }
}
