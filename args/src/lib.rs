// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line of orbitd

pub use clap::Parser;
use clap::Subcommand;
use reconciler::{ReconcilerParams, ReconcilerParamsBuilder};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Plan the Backplane and bring the platform in line with it
    Init,
    /// Reconcile every Sector manifest, then remove orphaned Sector objects
    Apply,
    /// Tear a Sector down and release its allocations
    Delete { sector: String },
    /// Show the actions that would bring a Sector in line with its manifest
    Plan { sector: String },
    /// Show the routes, NAT rules and DNS records of a Sector
    Render { sector: String },
    /// Show the status of every Sector
    Status,
    /// Give an instance an address in a subnet of a Sector
    AssignAddress {
        sector: String,
        subnet: String,
        vmid: u32,
    },
    /// Give back the address of an instance
    ReleaseAddress {
        sector: String,
        subnet: String,
        vmid: u32,
    },
}

#[derive(Parser)]
#[command(name = "orbitd")]
#[command(version = "0.1")]
#[command(about = "Provisions isolated tenant networks on a virtualization cluster", long_about = None)]
pub struct CmdArgs {
    #[command(subcommand)]
    command: Command,

    #[arg(
        long,
        value_name = "DIR",
        default_value = "/var/lib/orbit",
        help = "Directory holding allocations, status records and the local platform snapshot"
    )]
    state_dir: PathBuf,

    #[arg(
        long,
        value_name = "DIR",
        default_value = "/etc/orbit",
        help = "Directory holding cluster.yaml and one manifest per Sector under sectors/"
    )]
    manifests: PathBuf,

    #[arg(
        long,
        value_name = "MS",
        default_value_t = 10_000,
        help = "Deadline of each platform call, in milliseconds"
    )]
    deadline_ms: u64,

    #[arg(
        long,
        value_name = "N",
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..=100),
        help = "Attempts per platform call, first one included, in [1..100]"
    )]
    attempts: u32,

    #[arg(
        long,
        value_name = "MS",
        default_value_t = 200,
        help = "Delay before the first retry, in milliseconds. Doubles on every retry"
    )]
    backoff_ms: u64,

    #[arg(
        long,
        value_name = "MS",
        default_value_t = 5_000,
        help = "Upper bound of the delay between retries, in milliseconds"
    )]
    max_backoff_ms: u64,

    #[arg(
        long,
        value_name = "N",
        default_value_t = 4,
        value_parser = clap::value_parser!(u16).range(1..=64),
        help = "Number of Sectors reconciled concurrently in [1..64]"
    )]
    parallelism: u16,

    #[arg(
        long,
        default_value_t = false,
        help = "Show configurable log targets and exit"
    )]
    show_log_targets: bool,

    #[arg(
        long,
        value_name = "log configuration",
        help = "Log config string as comma-separated sequence of tag=level, with level one in [off,error,warn,info,debug,trace].
Passing default=level sets the default log-level.
Passing all=level allows setting the log-level of all targets to level.
E.g. default=error,all=info,ipam=debug will set the default target to error, and all the registered targets to info, but enable debug for ipam"
    )]
    log: Option<String>,
}

impl CmdArgs {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn show_log_targets(&self) -> bool {
        self.show_log_targets
    }
    pub fn log(&self) -> Option<&String> {
        self.log.as_ref()
    }

    pub fn state_dir(&self) -> &PathBuf {
        &self.state_dir
    }
    pub fn ipam_dir(&self) -> PathBuf {
        self.state_dir.join("ipam")
    }
    pub fn status_dir(&self) -> PathBuf {
        self.state_dir.join("status")
    }
    pub fn platform_snapshot(&self) -> PathBuf {
        self.state_dir.join("platform.yaml")
    }

    pub fn cluster_manifest(&self) -> PathBuf {
        self.manifests.join("cluster.yaml")
    }
    pub fn sector_manifests(&self) -> PathBuf {
        self.manifests.join("sectors")
    }

    /// Run-time parameters of the reconciler
    pub fn reconciler_params(&self) -> Result<ReconcilerParams, String> {
        let params = ReconcilerParamsBuilder::default()
            .deadline(Duration::from_millis(self.deadline_ms))
            .attempts(self.attempts)
            .backoff(Duration::from_millis(self.backoff_ms))
            .max_backoff(Duration::from_millis(self.max_backoff_ms))
            .parallelism(usize::from(self.parallelism))
            .build()
            .map_err(|e| e.to_string())?;
        if params.deadline.is_zero() {
            return Err("The deadline of platform calls must not be zero".to_owned());
        }
        if params.backoff > params.max_backoff {
            return Err(format!(
                "Backoff ({:?}) exceeds its upper bound ({:?})",
                params.backoff, params.max_backoff
            ));
        }
        debug!("{params}");
        Ok(params)
    }
}
