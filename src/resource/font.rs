// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Font archive installation.
//!
//! A font archive is fetched into a scratch directory, expanded there, and
//! every file matching the configured pattern is handed to a
//! [`FontRegistry`]. The scratch directory goes away afterwards no matter
//! how many fonts registered. Registration of individual files is allowed to
//! fail: a font that did not register is logged and counted, never fatal,
//! since running rigup again simply retries it.

use crate::{
    env::EnvironmentView,
    resource::{fetch_file, FetchError, ResourceKind, ResourceTask, Scratch},
    syscall::{self, SyscallError},
};

use glob::{MatchOptions, Pattern};
use indicatif::ProgressBar;
use std::{
    ffi::OsStr,
    fs::{copy, metadata, File},
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, instrument, warn};

const FONTS_KEY: &str = r"HKCU\Software\Microsoft\Windows NT\CurrentVersion\Fonts";

/// Result of registering one font file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Font was registered by this call.
    Registered,

    /// Identical font was already registered.
    AlreadyRegistered,
}

/// Layer of indirection for the operating system's font service.
pub trait FontRegistry {
    /// Register a single font file.
    fn register(&self, font: &Path) -> Result<Registration>;

    /// Let the font service pick up newly registered fonts.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// Fonts registered by copying into a per-user font directory.
///
/// Font configuration caches are refreshed through `fc-cache` when it is
/// available.
#[derive(Debug, Clone)]
pub struct UserFontDirectory {
    dir: PathBuf,
}

impl UserFontDirectory {
    /// Construct new font directory registry.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory fonts are copied into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FontRegistry for UserFontDirectory {
    fn register(&self, font: &Path) -> Result<Registration> {
        install_copy(font, &self.dir).map(|(_, registration)| registration)
    }

    fn refresh(&self) -> Result<()> {
        let env = EnvironmentView::from_process();
        if env.which("fc-cache").is_none() {
            debug!("fc-cache not available, skipping font cache refresh");
            return Ok(());
        }

        syscall::run("fc-cache", [OsStr::new("-f"), self.dir.as_os_str()], &env)?;
        Ok(())
    }
}

/// Fonts registered for the current user on Windows.
///
/// Files are copied into the per-user font directory and recorded under the
/// user's `Fonts` registry key.
#[derive(Debug, Clone)]
pub struct WindowsFontRegistry {
    dir: PathBuf,
}

impl WindowsFontRegistry {
    /// Construct new Windows font registry.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FontRegistry for WindowsFontRegistry {
    fn register(&self, font: &Path) -> Result<Registration> {
        let (installed, registration) = install_copy(font, &self.dir)?;
        if registration == Registration::AlreadyRegistered {
            return Ok(registration);
        }

        let stem = installed
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let value_name = format!("{stem} (TrueType)");
        let data = installed.to_string_lossy().into_owned();
        syscall::run(
            "reg",
            [
                "add",
                FONTS_KEY,
                "/v",
                value_name.as_str(),
                "/t",
                "REG_SZ",
                "/d",
                data.as_str(),
                "/f",
            ],
            &EnvironmentView::from_process(),
        )?;

        Ok(Registration::Registered)
    }
}

/// Font registry of the host platform.
#[derive(Debug, Clone)]
pub enum SystemFontRegistry {
    Directory(UserFontDirectory),
    Windows(WindowsFontRegistry),
}

impl SystemFontRegistry {
    /// Select font registry for the host platform.
    ///
    /// # Errors
    ///
    /// - Return [`FontError::Path`] if the per-user font directory cannot be
    ///   determined.
    pub fn detect() -> Result<Self> {
        let dir = crate::path::user_font_dir()?;
        if cfg!(windows) {
            return Ok(Self::Windows(WindowsFontRegistry::new(dir)));
        }

        Ok(Self::Directory(UserFontDirectory::new(dir)))
    }
}

impl FontRegistry for SystemFontRegistry {
    fn register(&self, font: &Path) -> Result<Registration> {
        match self {
            Self::Directory(registry) => registry.register(font),
            Self::Windows(registry) => registry.register(font),
        }
    }

    fn refresh(&self) -> Result<()> {
        match self {
            Self::Directory(registry) => registry.refresh(),
            Self::Windows(registry) => registry.refresh(),
        }
    }
}

/// Summary of a font installation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FontReport {
    /// Fonts registered by this run.
    pub registered: usize,

    /// Fonts that were already registered.
    pub unchanged: usize,

    /// Fonts that failed to register.
    pub failed: usize,
}

/// Font archive installer.
#[derive(Debug)]
pub struct FontInstaller<'a, R>
where
    R: FontRegistry,
{
    registry: &'a R,
    pattern: Pattern,
    timeout: Duration,
}

impl<'a, R> FontInstaller<'a, R>
where
    R: FontRegistry,
{
    /// Construct new font installer.
    ///
    /// # Errors
    ///
    /// - Return [`FontError::Pattern`] if the file name pattern is invalid.
    pub fn new(registry: &'a R, pattern: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            registry,
            pattern: Pattern::new(pattern)?,
            timeout,
        })
    }

    /// Fetch, expand, and register fonts of an archive task.
    ///
    /// # Errors
    ///
    /// - Return [`FontError::Fetch`] if the archive cannot be fetched.
    /// - Return [`FontError::Zip`] if the archive cannot be expanded.
    /// - Return [`FontError::NoMatches`] if no file matches the pattern.
    #[instrument(skip(self, bar), fields(url = %task.source_url), level = "debug")]
    pub async fn install(&self, task: &ResourceTask, bar: &ProgressBar) -> Result<FontReport> {
        if task.kind != ResourceKind::Archive {
            return Err(FontError::NotAnArchive {
                url: task.source_url.clone(),
            });
        }

        let scratch = Scratch::new_in(&task.destination, "rigup-font-")?;
        let archive = scratch.path().join("fonts.zip");
        fetch_file(&task.source_url, &archive, self.timeout, bar).await?;

        let expanded = scratch.path().join("expanded");
        expand_archive(&archive, &expanded)?;

        let fonts = self.find_fonts(&expanded)?;
        if fonts.is_empty() {
            return Err(FontError::NoMatches {
                pattern: self.pattern.as_str().to_string(),
            });
        }

        let mut report = FontReport::default();
        for font in &fonts {
            match self.registry.register(font) {
                Ok(Registration::Registered) => report.registered += 1,
                Ok(Registration::AlreadyRegistered) => report.unchanged += 1,
                Err(err) => {
                    warn!("failed to register {:?}: {err}", font.display());
                    report.failed += 1;
                }
            }
        }

        if let Err(err) = self.registry.refresh() {
            warn!("failed to refresh font cache: {err}");
        }

        scratch.close();
        info!(
            "fonts: {} registered, {} unchanged, {} failed",
            report.registered, report.unchanged, report.failed
        );

        Ok(report)
    }

    fn find_fonts(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        let walk = format!("{}/**/*", Pattern::escape(&dir.to_string_lossy()));

        let mut fonts = glob::glob_with(&walk, options)?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!("skipping unreadable entry: {err}");
                    None
                }
            })
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .is_some_and(|name| self.pattern.matches_with(&name.to_string_lossy(), options))
            })
            .collect::<Vec<_>>();
        fonts.sort();

        Ok(fonts)
    }
}

fn expand_archive(archive: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|err| FetchError::Io {
        source: err,
        path: archive.to_path_buf(),
    })?;
    let mut zip = zip::ZipArchive::new(file)?;
    debug!("expand {} entries into {:?}", zip.len(), destination.display());
    zip.extract(destination)?;

    Ok(())
}

fn install_copy(font: &Path, dir: &Path) -> Result<(PathBuf, Registration)> {
    let name = font.file_name().ok_or_else(|| FontError::NotAFile {
        path: font.to_path_buf(),
    })?;
    let target = dir.join(name);

    let source_len = metadata(font).map_err(|err| io_error(err, font))?.len();
    if metadata(&target).is_ok_and(|existing| existing.len() == source_len) {
        debug!("{:?} already installed", target.display());
        return Ok((target, Registration::AlreadyRegistered));
    }

    mkdirp::mkdirp(dir).map_err(|err| io_error(err, dir))?;
    copy(font, &target).map_err(|err| io_error(err, &target))?;
    debug!("installed {:?}", target.display());

    Ok((target, Registration::Registered))
}

fn io_error(source: std::io::Error, path: &Path) -> FontError {
    FontError::Fetch(FetchError::Io {
        source,
        path: path.to_path_buf(),
    })
}

/// Font installation error types.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    /// Archive could not be fetched, or local I/O failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Archive could not be expanded.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// File name pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Task is not an archive task.
    #[error("{url} is not an archive resource")]
    NotAnArchive { url: String },

    /// Archive holds no matching font.
    #[error("archive holds no file matching {pattern:?}")]
    NoMatches { pattern: String },

    /// Font path has no file name.
    #[error("{:?} is not a font file", path.display())]
    NotAFile { path: PathBuf },

    /// Font service command failed.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Per-user font directory is unknown.
    #[error(transparent)]
    Path(#[from] crate::path::NoWayHome),
}

/// Friendly result alias :3
pub type Result<T, E = FontError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn copy_is_skipped_when_identical() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let font = dir.path().join("Mono-Regular.ttf");
        std::fs::write(&font, b"glyphs")?;
        let registry = UserFontDirectory::new(dir.path().join("fonts"));

        assert_eq!(registry.register(&font)?, Registration::Registered);
        assert_eq!(registry.register(&font)?, Registration::AlreadyRegistered);
        assert_eq!(std::fs::read(registry.dir().join("Mono-Regular.ttf"))?, b"glyphs");

        Ok(())
    }

    #[test]
    fn find_fonts_matches_recursively_ignoring_case() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("static").join("bold"))?;
        std::fs::write(dir.path().join("Mono-Regular.ttf"), b"a")?;
        std::fs::write(dir.path().join("static").join("bold").join("Mono-Bold.TTF"), b"b")?;
        std::fs::write(dir.path().join("README.md"), b"c")?;

        let registry = UserFontDirectory::new(dir.path().join("unused"));
        let installer = FontInstaller::new(&registry, "*.ttf", Duration::from_secs(1))?;
        let result = installer
            .find_fonts(dir.path())?
            .into_iter()
            .map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();

        assert_eq!(
            result,
            vec![Some("Mono-Regular.ttf".to_string()), Some("Mono-Bold.TTF".to_string())]
        );

        Ok(())
    }
}
