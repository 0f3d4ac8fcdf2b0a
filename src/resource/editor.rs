// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Editor configuration installation.
//!
//! The editor configuration is cloned from a remote repository and then cut
//! loose from it: the `.git` directory is removed so the result becomes the
//! user's own mutable configuration rather than a linked checkout.
//!
//! # Backup Before Clobber
//!
//! An existing configuration directory is never deleted. It is renamed to
//! `<name>_backup_<YYYYMMDDHHmmss>` first. Should the clone fail, the partial
//! clone is removed and the backup is moved back into place.

use crate::resource::{ResourceKind, ResourceTask};

use auth_git2::{GitAuthenticator, Prompter};
use chrono::{DateTime, Local};
use git2::{build::RepoBuilder, Config, FetchOptions, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    fs::{read_dir, remove_dir_all, rename},
    path::{Path, PathBuf},
    time,
};
use tracing::{debug, info, instrument, warn};

/// Timestamp layout of backup directory names.
pub const BACKUP_TIMESTAMP: &str = "%Y%m%d%H%M%S";

/// Result of an editor configuration install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorReport {
    /// Location of the fresh configuration.
    pub target: PathBuf,

    /// Location the previous configuration was moved to.
    pub backup: Option<PathBuf>,
}

/// Determine backup path for existing configuration directory.
pub fn backup_path(target: &Path, now: DateTime<Local>) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".into());
    let backup = format!("{name}_backup_{}", now.format(BACKUP_TIMESTAMP));
    target.with_file_name(backup)
}

/// Back up, clone, and detach editor configuration.
///
/// # Errors
///
/// - Return [`EditorError::NotARepository`] if the task is not a repository
///   task.
/// - Return [`EditorError::BackupExists`] if the backup path is taken.
/// - Return [`EditorError::Git2`] if the clone fails. The previous
///   configuration is restored in that case.
/// - Return [`EditorError::Io`] if directories cannot be moved or removed.
#[instrument(skip(bar), level = "debug")]
pub fn install(task: &ResourceTask, bar: ProgressBar) -> Result<EditorReport> {
    if task.kind != ResourceKind::GitRepo {
        return Err(EditorError::NotARepository {
            url: task.source_url.clone(),
        });
    }

    let target = task.destination.as_path();
    let backup = if target.exists() {
        let backup = backup_path(target, Local::now());
        if backup.exists() {
            return Err(EditorError::BackupExists { path: backup });
        }

        info!("back up {:?} to {:?}", target.display(), backup.display());
        rename(target, &backup).map_err(|err| io_error(err, target))?;
        Some(backup)
    } else {
        None
    };

    let repository = match clone_repository(&task.source_url, target, bar) {
        Ok(repository) => repository,
        Err(err) => {
            restore(target, backup.as_deref());
            return Err(err);
        }
    };

    // INVARIANT: Release repository handles before removing its gitdir.
    drop(repository);
    strip_vcs_metadata(target)?;

    Ok(EditorReport {
        target: target.to_path_buf(),
        backup,
    })
}

/// Clone remote repository into target path.
///
/// The progress of the clone is displayed through a progress bar. If any
/// credentials are required, the user is prompted for them with the
/// progress bar suspended.
///
/// # Errors
///
/// - Return [`EditorError::Git2`] if libgit2 operations fail.
/// - Return [`EditorError::IndicatifStyleTemplate`] if the progress bar
///   cannot be styled.
pub fn clone_repository(url: &str, path: &Path, bar: ProgressBar) -> Result<Repository> {
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.set_message(url.to_string());
    bar.enable_steady_tick(time::Duration::from_millis(100));

    let prompter = IndicatifPrompter::new(bar);
    let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
    let config = Config::open_default()?;

    let mut throttle = time::Instant::now();
    let mut rc = RemoteCallbacks::new();
    rc.credentials(authenticator.credentials(&config));
    rc.transfer_progress(|progress| {
        let stats = progress.to_owned();
        let bar_size = stats.total_objects() as u64;
        let bar_pos = stats.received_objects() as u64;
        if throttle.elapsed() > time::Duration::from_millis(10) {
            throttle = time::Instant::now();
            prompter.bar.set_length(bar_size);
            prompter.bar.set_position(bar_pos);
        }
        true
    });

    let mut fo = FetchOptions::new();
    fo.remote_callbacks(rc);
    info!("clone {url} into {:?}", path.display());
    let repository = RepoBuilder::new().fetch_options(fo).clone(url, path);
    prompter.bar.finish_and_clear();

    Ok(repository?)
}

/// Remove version-control metadata of a checkout.
///
/// Git marks object files read-only, which stops removal on Windows, so
/// permissions are relaxed and the removal is retried once.
///
/// # Errors
///
/// - Return [`EditorError::Io`] if the metadata directory cannot be removed.
pub fn strip_vcs_metadata(checkout: &Path) -> Result<()> {
    let gitdir = checkout.join(".git");
    if !gitdir.exists() {
        return Ok(());
    }

    debug!("remove {:?}", gitdir.display());
    if remove_dir_all(&gitdir).is_err() {
        make_writable(&gitdir)?;
        remove_dir_all(&gitdir).map_err(|err| io_error(err, &gitdir))?;
    }

    Ok(())
}

fn make_writable(path: &Path) -> Result<()> {
    let metadata = path.symlink_metadata().map_err(|err| io_error(err, path))?;
    let mut permissions = metadata.permissions();
    if permissions.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        std::fs::set_permissions(path, permissions).map_err(|err| io_error(err, path))?;
    }

    if metadata.is_dir() {
        for entry in read_dir(path).map_err(|err| io_error(err, path))? {
            let entry = entry.map_err(|err| io_error(err, path))?;
            make_writable(&entry.path())?;
        }
    }

    Ok(())
}

fn restore(target: &Path, backup: Option<&Path>) {
    if target.exists() {
        if let Err(err) = remove_dir_all(target) {
            warn!("failed to remove partial clone {:?}: {err}", target.display());
            return;
        }
    }

    if let Some(backup) = backup {
        match rename(backup, target) {
            Ok(()) => info!("restored {:?}", target.display()),
            Err(err) => warn!(
                "failed to restore {:?} from {:?}: {err}",
                target.display(),
                backup.display()
            ),
        }
    }
}

fn io_error(source: std::io::Error, path: &Path) -> EditorError {
    EditorError::Io {
        source,
        path: path.to_path_buf(),
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Editor configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// Task is not a repository task.
    #[error("{url} is not a repository resource")]
    NotARepository { url: String },

    /// Backup destination is already taken.
    #[error("backup destination {:?} already exists", path.display())]
    BackupExists { path: PathBuf },

    /// Directory operation failed.
    #[error("I/O failure at {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = EditorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn backup_name_uses_fourteen_digit_timestamp() {
        let now = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .unwrap();
        let result = backup_path(Path::new("/home/blah/.config/nvim"), now);
        assert_eq!(
            result,
            PathBuf::from("/home/blah/.config/nvim_backup_20240309070501")
        );
    }

    #[test]
    fn strip_vcs_metadata_keeps_tracked_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join(".git").join("objects"))?;
        std::fs::write(dir.path().join(".git").join("objects").join("pack"), b"x")?;
        std::fs::write(dir.path().join("init.lua"), b"vim.o.number = true")?;

        strip_vcs_metadata(dir.path())?;

        assert!(!dir.path().join(".git").exists());
        assert!(dir.path().join("init.lua").exists());

        Ok(())
    }

    #[test]
    fn failed_clone_restores_backup() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("nvim");
        std::fs::create_dir_all(&target)?;
        std::fs::write(target.join("init.lua"), b"-- mine")?;

        let missing = dir.path().join("no-such-repo");
        let task = ResourceTask::git_repo(missing.to_string_lossy(), &target);
        let result = install(&task, ProgressBar::hidden());

        assert!(matches!(result, Err(EditorError::Git2(_))));
        assert_eq!(std::fs::read(target.join("init.lua"))?, b"-- mine");
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);

        Ok(())
    }
}
