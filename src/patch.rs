// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Idempotent edits of external files.
//!
//! Rigup never owns the files it edits. Terminal settings, shell profiles,
//! and environment files all belong to the user or to other applications, so
//! every edit is a read-modify-write cycle that only touches what it must.
//!
//! # Edit Cycle
//!
//! 1. Read the target file. If it is missing, either start from an empty
//!    document or fail, depending on the [`ExistencePolicy`].
//! 2. Parse the content into a [`Document`].
//! 3. Run the mutation, a pure function from document to document.
//! 4. Compare the result with the parsed original. Only write when they
//!    differ.
//!
//! Applying the same [`ConfigEdit`] twice is therefore a no-op the second
//! time, and files that need no change are never rewritten.

pub mod json;
pub mod lines;

use std::{
    fs::{read_to_string, write},
    marker::PhantomData,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Parsed form of a file's content.
pub trait Document: Clone + PartialEq + Sized {
    /// Parse raw file content.
    ///
    /// Empty content must parse into the empty document.
    fn parse(content: &str) -> Result<Self, DocumentError>;

    /// Render document back into file content.
    fn render(&self) -> String;
}

/// What to do when the target file does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistencePolicy {
    /// Start from an empty document and create the file.
    CreateIfMissing,

    /// Treat the missing file as an error.
    FailIfMissing,
}

/// Result of applying an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// File did not exist and was created.
    Created,

    /// File existed and was rewritten.
    Updated,

    /// File already had the desired content.
    Unchanged,
}

/// Targeted edit of one external file.
pub struct ConfigEdit<D, F>
where
    D: Document,
    F: Fn(D) -> Result<D, DocumentError>,
{
    path: PathBuf,
    policy: ExistencePolicy,
    mutation: F,
    document: PhantomData<D>,
}

impl<D, F> ConfigEdit<D, F>
where
    D: Document,
    F: Fn(D) -> Result<D, DocumentError>,
{
    /// Construct new edit.
    pub fn new(path: impl Into<PathBuf>, policy: ExistencePolicy, mutation: F) -> Self {
        Self {
            path: path.into(),
            policy,
            mutation,
            document: PhantomData,
        }
    }

    /// Target file of the edit.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply edit to target file.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Missing`] if the file is absent under
    ///   [`ExistencePolicy::FailIfMissing`].
    /// - Return [`PatchError::Read`] or [`PatchError::Write`] on I/O
    ///   failure.
    /// - Return [`PatchError::Document`] if the content cannot be parsed or
    ///   has a shape the mutation cannot handle.
    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    pub fn apply(&self) -> Result<PatchOutcome> {
        let existing = match read_to_string(&self.path) {
            Ok(content) => Some(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(PatchError::Read {
                    source: err,
                    path: self.path.clone(),
                })
            }
        };

        let (content, created) = match (existing, self.policy) {
            (Some(content), _) => (content, false),
            (None, ExistencePolicy::CreateIfMissing) => (String::new(), true),
            (None, ExistencePolicy::FailIfMissing) => {
                return Err(PatchError::Missing {
                    path: self.path.clone(),
                })
            }
        };

        let before = D::parse(&content).map_err(|err| self.document_error(err))?;
        let after = (self.mutation)(before.clone()).map_err(|err| self.document_error(err))?;

        if !created && after == before {
            debug!("{:?} already up to date", self.path.display());
            return Ok(PatchOutcome::Unchanged);
        }

        if created {
            create_parent(&self.path)?;
        }

        write(&self.path, after.render()).map_err(|err| PatchError::Write {
            source: err,
            path: self.path.clone(),
        })?;

        if created {
            info!("created {:?}", self.path.display());
            Ok(PatchOutcome::Created)
        } else {
            info!("updated {:?}", self.path.display());
            Ok(PatchOutcome::Updated)
        }
    }

    fn document_error(&self, source: DocumentError) -> PatchError {
        PatchError::Document {
            source,
            path: self.path.clone(),
        }
    }
}

/// Apply one-off edit to file.
///
/// # Errors
///
/// - Return [`PatchError`] under the same conditions as
///   [`ConfigEdit::apply`].
pub fn patch<D, F>(path: impl Into<PathBuf>, policy: ExistencePolicy, mutation: F) -> Result<PatchOutcome>
where
    D: Document,
    F: Fn(D) -> Result<D, DocumentError>,
{
    ConfigEdit::new(path, policy, mutation).apply()
}

/// Overwrite file with literal content, creating parent directories.
///
/// Unlike [`ConfigEdit`], the previous content is never consulted.
///
/// # Errors
///
/// - Return [`PatchError::Write`] if the file or its parents cannot be
///   written.
pub fn write_generated(path: impl AsRef<Path>, contents: impl AsRef<str>) -> Result<()> {
    let path = path.as_ref();
    create_parent(path)?;
    write(path, contents.as_ref()).map_err(|err| PatchError::Write {
        source: err,
        path: path.to_path_buf(),
    })?;
    info!("wrote {:?}", path.display());

    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent).map_err(|err| PatchError::Write {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    Ok(())
}

/// Document parsing and mutation error types.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Content is not valid JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Content parsed, but does not have the expected shape.
    #[error("unexpected document shape: {0}")]
    Shape(String),
}

/// Patch error types.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Target file does not exist.
    #[error("{:?} does not exist", path.display())]
    Missing { path: PathBuf },

    /// Target file cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Target file cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Target file cannot be parsed or mutated.
    #[error("cannot patch {:?}", path.display())]
    Document {
        #[source]
        source: DocumentError,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PatchError> = std::result::Result<T, E>;
