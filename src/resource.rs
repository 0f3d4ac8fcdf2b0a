// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resources that live outside the package manager.
//!
//! Some things rigup installs are not in any package catalog: a font archive
//! and an editor configuration repository. Both follow the same shape: fetch
//! into a local artifact, install from it, and clean up after. Temporary
//! artifacts always live inside a [`Scratch`] directory, which is removed on
//! every exit path so a failed run never leaves half-fetched state behind for
//! the next run to trip over.

pub mod editor;
pub mod font;

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// Kind of resource to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Compressed archive to download and expand.
    Archive,

    /// Version-control repository to clone.
    GitRepo,
}

/// Resource to fetch and install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTask {
    /// Where to fetch the resource from.
    pub source_url: String,

    /// Where the fetched resource is placed. Scratch root for archives, final
    /// location for repositories.
    pub destination: PathBuf,

    /// Kind of resource.
    pub kind: ResourceKind,
}

impl ResourceTask {
    /// Construct new archive task.
    pub fn archive(source_url: impl Into<String>, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            destination: scratch_root.into(),
            kind: ResourceKind::Archive,
        }
    }

    /// Construct new repository task.
    pub fn git_repo(source_url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            destination: destination.into(),
            kind: ResourceKind::GitRepo,
        }
    }
}

/// Scoped scratch directory.
///
/// Removed when dropped. Use [`Scratch::close`] to observe removal errors.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Create new scratch directory inside target root.
    ///
    /// # Errors
    ///
    /// - Return [`FetchError::Io`] if the directory cannot be created.
    pub fn new_in(root: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let root = root.as_ref();
        mkdirp::mkdirp(root).map_err(|err| FetchError::Io {
            source: err,
            path: root.to_path_buf(),
        })?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(root)
            .map_err(|err| FetchError::Io {
                source: err,
                path: root.to_path_buf(),
            })?;
        debug!("created scratch directory {:?}", dir.path().display());

        Ok(Self { dir })
    }

    /// Path to the scratch directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove scratch directory now.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!("failed to remove scratch directory {:?}: {err}", path.display());
        }
    }
}

/// Fetch file from a remote or local location.
///
/// HTTP(S) locations are downloaded with the given timeout. Anything else is
/// treated as a local path, with an optional `file://` prefix, which allows
/// provisioning from an offline mirror.
///
/// # Errors
///
/// - Return [`FetchError::Http`] if the download fails or times out.
/// - Return [`FetchError::Io`] if the file cannot be copied or written.
#[instrument(skip(bar), level = "debug")]
pub async fn fetch_file(source: &str, destination: &Path, timeout: Duration, bar: &ProgressBar) -> Result<()> {
    if !(source.starts_with("http://") || source.starts_with("https://")) {
        let local = local_path(source);
        info!("copy {:?}", local.display());
        tokio::fs::copy(&local, destination)
            .await
            .map_err(|err| FetchError::Io { source: err, path: local })?;
        return Ok(());
    }

    let style = ProgressStyle::with_template("{elapsed_precise:.green}  {spinner}  {msg}")?;
    bar.set_style(style);
    bar.set_message(format!("download {source}"));
    bar.enable_steady_tick(Duration::from_millis(100));

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()?;
    let bytes = client
        .get(source)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    bar.finish_and_clear();

    if bytes.is_empty() {
        return Err(FetchError::Empty {
            url: source.to_string(),
        });
    }

    tokio::fs::write(destination, &bytes)
        .await
        .map_err(|err| FetchError::Io {
            source: err,
            path: destination.to_path_buf(),
        })?;
    info!("downloaded {} bytes from {source}", bytes.len());

    Ok(())
}

/// Turn a local source or `file://` URL into a path.
///
/// A `file:///C:/...` URL carries the drive letter after the leading slash,
/// which must go for Windows to accept the path.
fn local_path(source: &str) -> PathBuf {
    let Some(path) = source.strip_prefix("file://") else {
        return PathBuf::from(source);
    };

    let mut chars = path.chars();
    let drive = chars.next() == Some('/')
        && chars.next().is_some_and(|ch| ch.is_ascii_alphabetic())
        && chars.next() == Some(':');
    if drive {
        PathBuf::from(&path[1..])
    } else {
        PathBuf::from(path)
    }
}

/// Fetch error types.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Local file operation failed.
    #[error("I/O failure at {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Download failed.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Download returned no data.
    #[error("download from {url} returned no data")]
    Empty { url: String },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = FetchError> = std::result::Result<T, E>;
