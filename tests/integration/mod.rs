// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{font_archive, RepoFixture};

use rigup::{
    config::Manifest,
    env::{EnvFile, EnvironmentView, PersistedEnvironment, PATH_VAR},
    provision::{Provisioner, Report, StepStatus},
    resource::{
        editor,
        font::{FontError, FontInstaller, FontRegistry, Registration},
        ResourceTask,
    },
};

use anyhow::Result;
use indicatif::ProgressBar;
use pretty_assertions::assert_eq;
use std::{
    cell::RefCell,
    fs::{read_dir, read_to_string, write},
    path::Path,
    time::Duration,
};

#[derive(Debug, Default)]
struct RecordingRegistry {
    fonts: RefCell<Vec<String>>,
}

impl FontRegistry for RecordingRegistry {
    fn register(&self, font: &Path) -> rigup::resource::font::Result<Registration> {
        let name = font
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.fonts.borrow_mut().push(name);
        Ok(Registration::Registered)
    }
}

fn is_backup_of(name: &str, target: &str) -> bool {
    name.strip_prefix(target)
        .and_then(|rest| rest.strip_prefix("_backup_"))
        .is_some_and(|stamp| stamp.len() == 14 && stamp.chars().all(|c| c.is_ascii_digit()))
}

#[test]
fn editor_config_backs_up_existing_target() -> Result<()> {
    let root = tempfile::tempdir()?;
    let fixture = RepoFixture::new(root.path().join("kickstart"))?;
    fixture.stage_and_commit("init.lua", "vim.g.mapleader = ' '\n")?;
    fixture.stage_and_commit("lua/custom/plugins/init.lua", "return {}\n")?;

    let config_root = root.path().join("config");
    let target = config_root.join("nvim");
    std::fs::create_dir_all(&target)?;
    write(target.join("init.lua"), "-- my old config\n")?;

    let task = ResourceTask::git_repo(fixture.url(), &target);
    let report = editor::install(&task, ProgressBar::hidden())?;

    let backups = read_dir(&config_root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| is_backup_of(name, "nvim"))
        .collect::<Vec<_>>();
    assert_eq!(backups.len(), 1);
    assert_eq!(report.backup, Some(config_root.join(&backups[0])));
    assert_eq!(
        read_to_string(config_root.join(&backups[0]).join("init.lua"))?,
        "-- my old config\n"
    );

    assert_eq!(read_to_string(target.join("init.lua"))?, "vim.g.mapleader = ' '\n");
    assert!(target.join("lua").join("custom").join("plugins").join("init.lua").exists());
    assert!(!target.join(".git").exists());

    Ok(())
}

#[test]
fn editor_config_without_existing_target_skips_backup() -> Result<()> {
    let root = tempfile::tempdir()?;
    let fixture = RepoFixture::new(root.path().join("kickstart"))?;
    fixture.stage_and_commit("init.lua", "-- kickstart\n")?;

    let target = root.path().join("config").join("nvim");
    let task = ResourceTask::git_repo(fixture.url(), &target);
    let report = editor::install(&task, ProgressBar::hidden())?;

    assert_eq!(report.backup, None);
    assert_eq!(read_dir(root.path().join("config"))?.count(), 1);
    assert!(!target.join(".git").exists());

    Ok(())
}

#[tokio::test]
async fn font_install_cleans_scratch_after_success() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = font_archive(
        root.path().join("JetBrainsMono.zip"),
        &[
            "JetBrainsMonoNerdFont-Regular.ttf",
            "JetBrainsMonoNerdFont-Bold.TTF",
            "README.md",
            "OFL.txt",
        ],
    )?;
    let scratch_root = root.path().join("scratch");

    let registry = RecordingRegistry::default();
    let installer = FontInstaller::new(&registry, "*.ttf", Duration::from_secs(5))?;
    let task = ResourceTask::archive(archive.to_string_lossy(), &scratch_root);
    let report = installer.install(&task, &ProgressBar::hidden()).await?;

    assert_eq!(report.registered, 2);
    assert_eq!(
        *registry.fonts.borrow(),
        vec![
            "JetBrainsMonoNerdFont-Bold.TTF",
            "JetBrainsMonoNerdFont-Regular.ttf"
        ]
    );
    assert_eq!(read_dir(&scratch_root)?.count(), 0);

    Ok(())
}

#[tokio::test]
async fn font_install_cleans_scratch_after_failure() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = root.path().join("corrupt.zip");
    write(&archive, "this is not a zip archive")?;
    let scratch_root = root.path().join("scratch");

    let registry = RecordingRegistry::default();
    let installer = FontInstaller::new(&registry, "*.ttf", Duration::from_secs(5))?;
    let task = ResourceTask::archive(archive.to_string_lossy(), &scratch_root);
    let result = installer.install(&task, &ProgressBar::hidden()).await;

    assert!(matches!(result, Err(FontError::Zip(_))));
    assert!(registry.fonts.borrow().is_empty());
    assert_eq!(read_dir(&scratch_root)?.count(), 0);

    Ok(())
}

#[tokio::test]
async fn font_archive_without_fonts_is_rejected() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = font_archive(root.path().join("empty.zip"), &["README.md"])?;
    let scratch_root = root.path().join("scratch");

    let registry = RecordingRegistry::default();
    let installer = FontInstaller::new(&registry, "*.ttf", Duration::from_secs(5))?;
    let task = ResourceTask::archive(archive.to_string_lossy(), &scratch_root);
    let result = installer.install(&task, &ProgressBar::hidden()).await;

    assert!(matches!(result, Err(FontError::NoMatches { .. })));
    assert_eq!(read_dir(&scratch_root)?.count(), 0);

    Ok(())
}

#[cfg(unix)]
#[test]
fn patch_stage_persists_path_to_environment_file() -> Result<()> {
    let root = tempfile::tempdir()?;
    let env_file = root.path().join("environment.d").join("60-rigup.conf");
    let manifest: Manifest = indoc::formatdoc! {r#"
        [package_manager]
        program = "true"
        query = []
        install = []

        [path]
        segments = ["/opt/llvm/bin"]

        [[profile]]
        path = "{profile}"
        line = "alias vim=nvim"

        [[generated]]
        path = "{generated}"
        contents = "gui:\n  theme: dark\n"
    "#,
        profile = root.path().join("profile").display(),
        generated = root.path().join("lazygit").join("config.yml").display(),
    }
    .parse()?;
    let manager = manifest.package_manager.clone();

    let mut provisioner = Provisioner::new(
        manifest,
        manager,
        RecordingRegistry::default(),
        EnvFile::new(&env_file),
        EnvironmentView::new("/usr/bin:/bin", ':', false),
    );

    let mut first = Report::default();
    provisioner.patch_configs(&mut first);
    let mut second = Report::default();
    provisioner.patch_configs(&mut second);

    assert_eq!(read_to_string(&env_file)?, "PATH=$PATH:/opt/llvm/bin\n");
    assert_eq!(
        EnvFile::new(&env_file).read(PATH_VAR)?,
        Some("$PATH:/opt/llvm/bin".into())
    );
    assert_eq!(provisioner.env().path_value(), "/usr/bin:/bin:/opt/llvm/bin");
    assert_eq!(read_to_string(root.path().join("profile"))?, "alias vim=nvim\n");
    assert_eq!(
        read_to_string(root.path().join("lazygit").join("config.yml"))?,
        "gui:\n  theme: dark\n"
    );

    let statuses = second
        .steps
        .iter()
        .map(|step| step.status.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Unchanged,
            StepStatus::Unchanged,
            StepStatus::Applied("written".into()),
        ]
    );

    Ok(())
}

#[test]
fn builtin_manifest_queries_by_exact_id() -> Result<()> {
    let manifest = Manifest::builtin()?;
    assert_eq!(manifest.package_manager.program, "winget");
    assert_eq!(
        manifest.package_manager.query,
        vec!["list", "--exact", "--id", "{id}"]
    );

    Ok(())
}
