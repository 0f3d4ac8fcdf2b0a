// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use rigup::{
    path::default_manifest_path,
    preflight::SystemPrivilegeProbe,
    Manifest, Provisioner, Report,
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code of runs with failed steps under strict mode.
const EXIT_STEP_FAILURES: i32 = 2;

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "rigup [options] <rigup-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<i32> {
        match self.command {
            Command::Run(opts) => run_all(opts).await,
            Command::Packages(opts) => run_packages(opts),
            Command::Resources(opts) => run_resources(opts).await,
            Command::Patch(opts) => run_patch(opts),
            Command::Check(opts) => run_check(opts),
            Command::Manifest => run_manifest(),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run every provisioning stage in order.
    #[command(override_usage = "rigup run [options]")]
    Run(RunOptions),

    /// Run preflight checks and install packages.
    #[command(override_usage = "rigup packages [options]")]
    Packages(RunOptions),

    /// Fetch and install font archive and editor configuration.
    #[command(override_usage = "rigup resources [options]")]
    Resources(RunOptions),

    /// Patch PATH, terminal settings, shell profiles, and generated files.
    #[command(override_usage = "rigup patch [options]")]
    Patch(RunOptions),

    /// Run preflight checks only.
    #[command(override_usage = "rigup check [options]")]
    Check(RunOptions),

    /// Print built-in manifest.
    #[command(override_usage = "rigup manifest")]
    Manifest,
}

#[derive(Args, Clone, Debug)]
struct RunOptions {
    /// Manifest to provision from instead of the default one.
    #[arg(short, long, value_name = "path")]
    pub manifest: Option<PathBuf>,

    /// Exit with failure status if any step failed.
    #[arg(short, long)]
    pub strict: bool,
}

impl RunOptions {
    fn provisioner(&self) -> Result<Provisioner> {
        let default = default_manifest_path().ok();
        let manifest = Manifest::resolve(self.manifest.as_deref(), default.as_deref())?;
        Ok(Provisioner::for_host(manifest)?)
    }

    fn finish(&self, provisioner: &Provisioner, report: &Report) -> i32 {
        report.log_summary();
        let strict = self.strict || provisioner.manifest().settings.strict;
        if strict && report.has_failures() {
            warn!("strict mode: exiting with failure status");
            return EXIT_STEP_FAILURES;
        }

        0
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run().await {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    Cli::parse().run().await
}

async fn run_all(opts: RunOptions) -> Result<i32> {
    let mut provisioner = opts.provisioner()?;
    let report = provisioner.run(&SystemPrivilegeProbe).await?;
    Ok(opts.finish(&provisioner, &report))
}

fn run_packages(opts: RunOptions) -> Result<i32> {
    let mut provisioner = opts.provisioner()?;
    provisioner.preflight(&SystemPrivilegeProbe)?;

    let mut report = Report::default();
    provisioner.install_packages(&mut report);
    Ok(opts.finish(&provisioner, &report))
}

async fn run_resources(opts: RunOptions) -> Result<i32> {
    let provisioner = opts.provisioner()?;

    let mut report = Report::default();
    provisioner.fetch_resources(&mut report).await;
    Ok(opts.finish(&provisioner, &report))
}

fn run_patch(opts: RunOptions) -> Result<i32> {
    let mut provisioner = opts.provisioner()?;
    provisioner.refresh_view();

    let mut report = Report::default();
    provisioner.patch_configs(&mut report);
    Ok(opts.finish(&provisioner, &report))
}

fn run_check(opts: RunOptions) -> Result<i32> {
    let provisioner = opts.provisioner()?;
    provisioner.preflight(&SystemPrivilegeProbe)?;
    Ok(0)
}

fn run_manifest() -> Result<i32> {
    println!("{}", Manifest::builtin()?);
    Ok(0)
}
