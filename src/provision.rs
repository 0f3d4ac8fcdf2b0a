// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provisioning run orchestration.
//!
//! A run moves through four stages in fixed order:
//!
//! 1. __Preflight__, which gates everything else.
//! 2. __Packages__, installed one by one through the package manager.
//! 3. __Resources__, the font archive and the editor configuration.
//! 4. __Patches__, i.e., PATH, terminal settings, shell profiles, and
//!    generated files.
//!
//! Only preflight failures stop a run. Everything after it is best effort:
//! each step's failure is logged, recorded in the [`Report`], and the run
//! moves on to the next independent unit of work.

use crate::{
    config::Manifest,
    env::{ensure_path_segment, EnvironmentView, PersistedEnvironment, SystemEnvironment, PATH_VAR},
    package::{install_all, CommandPackageManager, InstallOutcome, InstallResult, PackageManager},
    patch::{
        json::JsonDocument, lines::LineDocument, patch, write_generated, ConfigEdit,
        ExistencePolicy, PatchOutcome,
    },
    preflight::{check_tool_available, Preflight, PreflightError, PrivilegeProbe},
    resource::{
        editor,
        font::{FontInstaller, FontRegistry, SystemFontRegistry},
        ResourceTask,
    },
};

use indicatif::ProgressBar;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};
use tracing::{info, instrument, warn};

/// Stage a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resources,
    Patches,
}

impl Display for Stage {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Resources => fmt.write_str("resources"),
            Self::Patches => fmt.write_str("patches"),
        }
    }
}

/// Outcome of a single resource or patch step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Step changed something.
    Applied(String),

    /// Nothing needed to change.
    Unchanged,

    /// Step did not apply to this machine.
    Skipped(String),

    /// Step failed.
    Failed(String),
}

/// Record of a single resource or patch step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub stage: Stage,
    pub subject: String,
    pub status: StepStatus,
}

/// Per-step outcomes of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub packages: Vec<InstallResult>,
    pub steps: Vec<StepRecord>,
}

impl Report {
    /// Record outcome of a resource or patch step, logging it on the way.
    pub fn record(&mut self, stage: Stage, subject: impl Into<String>, status: StepStatus) {
        let subject = subject.into();
        match &status {
            StepStatus::Applied(detail) => info!("{stage}: {subject}: {detail}"),
            StepStatus::Unchanged => info!("{stage}: {subject}: up to date"),
            StepStatus::Skipped(reason) => warn!("{stage}: {subject}: skipped, {reason}"),
            StepStatus::Failed(reason) => warn!("{stage}: {subject}: {reason}"),
        }

        self.steps.push(StepRecord {
            stage,
            subject,
            status,
        });
    }

    /// Listing of failed steps as subject and reason pairs.
    pub fn failures(&self) -> Vec<(String, String)> {
        let packages = self.packages.iter().filter_map(|result| match &result.outcome {
            InstallOutcome::Failed(reason) => {
                Some((result.spec.to_string(), reason.clone()))
            }
            _ => None,
        });
        let steps = self.steps.iter().filter_map(|step| match &step.status {
            StepStatus::Failed(reason) => Some((step.subject.clone(), reason.clone())),
            _ => None,
        });

        packages.chain(steps).collect()
    }

    /// Check if any recoverable step failed.
    pub fn has_failures(&self) -> bool {
        !self.failures().is_empty()
    }

    /// Log summary of the run.
    pub fn log_summary(&self) {
        let failures = self.failures();
        if failures.is_empty() {
            info!("provisioning finished without failures");
            return;
        }

        warn!("provisioning finished with {} failure(s):", failures.len());
        for (subject, reason) in failures {
            warn!("  {subject}: {reason}");
        }
    }
}

/// Provisioning run.
#[derive(Debug)]
pub struct Provisioner<M = CommandPackageManager, R = SystemFontRegistry, P = SystemEnvironment>
where
    M: PackageManager,
    R: FontRegistry,
    P: PersistedEnvironment,
{
    manifest: Manifest,
    manager: M,
    fonts: R,
    persisted: P,
    env: EnvironmentView,
}

impl Provisioner {
    /// Construct provisioner wired to the host platform.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError`] if platform locations cannot be
    ///   determined.
    pub fn for_host(manifest: Manifest) -> Result<Self> {
        let manager = manifest.package_manager.clone();
        let fonts = SystemFontRegistry::detect()?;
        let persisted = SystemEnvironment::detect()?;

        Ok(Self::new(manifest, manager, fonts, persisted, EnvironmentView::from_process()))
    }
}

impl<M, R, P> Provisioner<M, R, P>
where
    M: PackageManager,
    R: FontRegistry,
    P: PersistedEnvironment,
{
    /// Construct new provisioner.
    pub fn new(manifest: Manifest, manager: M, fonts: R, persisted: P, env: EnvironmentView) -> Self {
        Self {
            manifest,
            manager,
            fonts,
            persisted,
            env,
        }
    }

    /// Manifest driving the run.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Current environment view.
    pub fn env(&self) -> &EnvironmentView {
        &self.env
    }

    /// Run every stage in order.
    ///
    /// # Errors
    ///
    /// - Return [`PreflightError`] if preflight fails. No other stage runs
    ///   in that case.
    pub async fn run(&mut self, probe: &impl PrivilegeProbe) -> Result<Report, PreflightError> {
        self.preflight(probe)?;

        let mut report = Report::default();
        self.install_packages(&mut report);
        self.fetch_resources(&mut report).await;
        self.patch_configs(&mut report);

        Ok(report)
    }

    /// Check privileges and package-manager availability.
    ///
    /// # Errors
    ///
    /// - Return [`PreflightError`] if any check fails.
    pub fn preflight(&self, probe: &impl PrivilegeProbe) -> Result<(), PreflightError> {
        Preflight::new(self.manifest.settings.require_elevation, self.manager.front_end())
            .run(probe, &self.env)
    }

    /// Install every manifest package.
    ///
    /// Afterwards the environment view picks up PATH segments the package
    /// manager persisted, so freshly installed tools can be found later in
    /// the same run.
    #[instrument(skip_all, level = "debug")]
    pub fn install_packages(&mut self, report: &mut Report) {
        info!("installing {} package(s)", self.manifest.packages.len());
        report
            .packages
            .extend(install_all(&self.manager, &self.manifest.packages, &self.env));
        self.refresh_view();
    }

    /// Absorb persisted PATH of both user and machine scope into the view.
    pub fn refresh_view(&mut self) {
        let scopes = [
            ("user", self.persisted.read(PATH_VAR)),
            ("machine", self.persisted.read_machine(PATH_VAR)),
        ];

        for (scope, value) in scopes {
            match value {
                Ok(Some(value)) => {
                    let added = self.env.absorb(&value);
                    if added > 0 {
                        info!("picked up {added} new PATH segment(s) from {scope} scope");
                    }
                }
                Ok(None) => {}
                Err(err) => warn!("cannot read {scope} {PATH_VAR}: {err}"),
            }
        }
    }

    /// Fetch and install the font archive and editor configuration.
    #[instrument(skip_all, level = "debug")]
    pub async fn fetch_resources(&self, report: &mut Report) {
        if let Some(font) = &self.manifest.font {
            let subject = format!("font {}", font.face);
            let scratch_root = self
                .manifest
                .settings
                .scratch_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir);
            let task = ResourceTask::archive(&font.url, scratch_root);
            let timeout = Duration::from_secs(self.manifest.settings.network_timeout_secs);

            let status = match FontInstaller::new(&self.fonts, &font.pattern, timeout) {
                Ok(installer) => match installer.install(&task, &ProgressBar::new_spinner()).await {
                    Ok(font_report) if font_report.registered == 0 && font_report.failed == 0 => {
                        StepStatus::Unchanged
                    }
                    Ok(font_report) => StepStatus::Applied(format!(
                        "{} registered, {} unchanged, {} failed",
                        font_report.registered, font_report.unchanged, font_report.failed
                    )),
                    Err(err) => StepStatus::Failed(error_chain(&err)),
                },
                Err(err) => StepStatus::Failed(error_chain(&err)),
            };
            report.record(Stage::Resources, subject, status);
        }

        if let Some(settings) = &self.manifest.editor {
            let subject = format!("editor config {}", settings.target.display());
            let task = ResourceTask::git_repo(&settings.url, &settings.target);
            let status = match editor::install(&task, ProgressBar::new(0)) {
                Ok(editor::EditorReport {
                    backup: Some(backup),
                    ..
                }) => StepStatus::Applied(format!(
                    "cloned, previous config kept at {}",
                    backup.display()
                )),
                Ok(_) => StepStatus::Applied("cloned".into()),
                Err(err) => StepStatus::Failed(error_chain(&err)),
            };
            report.record(Stage::Resources, subject, status);
        }
    }

    /// Apply every configuration edit.
    #[instrument(skip_all, level = "debug")]
    pub fn patch_configs(&mut self, report: &mut Report) {
        self.patch_path(report);
        self.patch_terminal(report);
        self.patch_profiles(report);
        self.write_generated(report);
    }

    fn patch_path(&mut self, report: &mut Report) {
        let segments = self.manifest.path.segments.clone();
        for segment in segments {
            let subject = format!("{PATH_VAR} segment {segment}");
            let status = match ensure_path_segment(&mut self.env, &self.persisted, &segment) {
                Ok(transition) if transition.is_noop() => StepStatus::Unchanged,
                Ok(_) => StepStatus::Applied("appended".into()),
                Err(err) => StepStatus::Failed(error_chain(&err)),
            };
            report.record(Stage::Patches, subject, status);
        }
    }

    fn patch_terminal(&self, report: &mut Report) {
        let Some(terminal) = &self.manifest.terminal else {
            return;
        };

        let Some(path) = terminal.candidates.iter().find(|path| path.is_file()) else {
            report.record(
                Stage::Patches,
                "terminal settings",
                StepStatus::Skipped("no settings file at any candidate path".into()),
            );
            return;
        };

        let defaults = terminal.defaults();
        let edit = ConfigEdit::new(path, ExistencePolicy::FailIfMissing, |doc: JsonDocument| {
            defaults.apply(doc)
        });
        report.record(
            Stage::Patches,
            format!("terminal settings {}", path.display()),
            patch_status(edit.apply()),
        );
    }

    fn patch_profiles(&self, report: &mut Report) {
        for profile in &self.manifest.profiles {
            let subject = format!("profile {}", profile.path.display());
            if let Some(tool) = &profile.requires {
                if !check_tool_available(tool, &self.env) {
                    report.record(
                        Stage::Patches,
                        subject,
                        StepStatus::Skipped(format!("{tool:?} not found on PATH")),
                    );
                    continue;
                }
            }

            let outcome = patch(
                &profile.path,
                ExistencePolicy::CreateIfMissing,
                |doc: LineDocument| Ok(doc.ensure_line(&profile.line)),
            );
            report.record(Stage::Patches, subject, patch_status(outcome));
        }
    }

    fn write_generated(&self, report: &mut Report) {
        for generated in &self.manifest.generated {
            let subject = format!("generated {}", generated.path.display());
            let status = match write_generated(&generated.path, &generated.contents) {
                Ok(()) => StepStatus::Applied("written".into()),
                Err(err) => StepStatus::Failed(error_chain(&err)),
            };
            report.record(Stage::Patches, subject, status);
        }
    }
}

fn patch_status(result: crate::patch::Result<PatchOutcome>) -> StepStatus {
    match result {
        Ok(PatchOutcome::Created) => StepStatus::Applied("created".into()),
        Ok(PatchOutcome::Updated) => StepStatus::Applied("updated".into()),
        Ok(PatchOutcome::Unchanged) => StepStatus::Unchanged,
        Err(err) => StepStatus::Failed(error_chain(&err)),
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

/// Provisioner construction error types.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Font registry cannot be set up.
    #[error(transparent)]
    Font(#[from] crate::resource::font::FontError),

    /// Persisted environment cannot be set up.
    #[error(transparent)]
    Env(#[from] crate::env::EnvError),
}

/// Friendly result alias :3
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
