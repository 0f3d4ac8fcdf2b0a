// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Idempotent workstation provisioning.
//!
//! Rigup takes a fresh machine to a known developer setup by running four
//! stages in order: preflight checks, package installation, resource fetching,
//! and configuration patching. Every stage can be re-run safely; work that is
//! already done is detected and left alone.

pub mod config;
pub mod env;
pub mod package;
pub mod patch;
pub mod path;
pub mod preflight;
pub mod provision;
pub mod resource;
pub mod syscall;

pub use config::Manifest;
pub use provision::{Provisioner, Report};
