// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::path::PathBuf;

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to the user's manifest file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/rigup/manifest.toml` as the
/// default absolute path. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_manifest_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("rigup").join("manifest.toml"))
        .ok_or(NoWayHome)
}

/// Determine path to the user-scope environment file on non-Windows hosts.
///
/// Uses `$XDG_CONFIG_HOME/environment.d/60-rigup.conf`, which is read by the
/// systemd user manager at login.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
pub fn default_environment_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("environment.d").join("60-rigup.conf"))
        .ok_or(NoWayHome)
}

/// Determine directory that holds per-user fonts.
///
/// Windows has no entry in [`dirs::font_dir`], so the per-user font
/// directory under local application data is used there.
///
/// # Errors
///
/// - Return [`NoWayHome`] if the directory cannot be determined.
pub fn user_font_dir() -> Result<PathBuf> {
    if cfg!(windows) {
        return dirs::data_local_dir()
            .map(|path| path.join("Microsoft").join("Windows").join("Fonts"))
            .ok_or(NoWayHome);
    }

    dirs::font_dir().ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
