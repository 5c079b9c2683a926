// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]

mod manifests;

use args::{CmdArgs, Command, Parser};
use color_eyre::eyre::{Result, WrapErr, eyre};
use ipam::{FileStore, Ipam};
use planner::{BackplaneDesiredState, Planner};
use platform::{Resource, ResourceKey, SimPlatform};
use reconciler::{FileStatusStore, Reconciler};
use std::sync::Arc;
use tracectl::{get_trace_ctl, trace_target};
use tracing::{error, info, level_filters::LevelFilter};

trace_target!("orbitd", LevelFilter::INFO, &["orbit"]);

fn open(args: &CmdArgs) -> Result<Reconciler<SimPlatform>> {
    let params = args.reconciler_params().map_err(|e| eyre!(e))?;
    let allocations = FileStore::open(args.ipam_dir()).wrap_err("Cannot open allocation store")?;
    let status = FileStatusStore::open(args.status_dir()).wrap_err("Cannot open status store")?;
    let platform =
        SimPlatform::open(args.platform_snapshot()).wrap_err("Cannot open platform snapshot")?;
    let planner = Planner::new(Arc::new(Ipam::new(Arc::new(allocations))));
    Ok(Reconciler::new(platform, planner, Arc::new(status), params))
}

async fn init(args: &CmdArgs, reconciler: &Reconciler<SimPlatform>) -> Result<BackplaneDesiredState> {
    let cluster = manifests::load_cluster(&args.cluster_manifest())?;
    let backplane = reconciler.init(&cluster).await?;
    info!(
        "Backplane of {} is up: {} ({} nodes, mtu {})",
        cluster.name,
        backplane.cluster.backplane.cidr,
        backplane.cluster.nodes.len(),
        backplane.cluster.backplane.mtu
    );
    Ok(backplane)
}

/// Plan the Backplane without touching the platform.
fn plan_backplane(args: &CmdArgs, reconciler: &Reconciler<SimPlatform>) -> Result<BackplaneDesiredState> {
    let cluster = manifests::load_cluster(&args.cluster_manifest())?;
    Ok(reconciler.planner().plan_backplane(&cluster)?)
}

async fn apply(args: &CmdArgs, reconciler: &Reconciler<SimPlatform>) -> Result<()> {
    let backplane = init(args, reconciler).await?;
    let sectors = manifests::load_sectors(&args.sector_manifests())?;
    let report = reconciler.apply_all(&sectors, &backplane).await?;
    for (name, result) in &report.sectors {
        match result {
            Ok(status) => println!("{status}"),
            Err(e) => println!("{name:<16} failed: {e}"),
        }
    }
    for key in &report.orphans {
        println!("removed orphan {key}");
    }
    match report.failures() {
        0 => Ok(()),
        n => Err(eyre!("{n} of {} sectors failed", report.sectors.len())),
    }
}

async fn plan(args: &CmdArgs, reconciler: &Reconciler<SimPlatform>, name: &str) -> Result<()> {
    let backplane = plan_backplane(args, reconciler)?;
    let manifest = manifests::find_sector(&args.sector_manifests(), name)?;
    let (plan, actions) = reconciler.preview_sector(&manifest, &backplane).await?;
    println!(
        "sector {name} ({}), {} actions",
        plan.sector.platform_id(),
        actions.len()
    );
    for (n, action) in actions.iter().enumerate() {
        println!("{:>3}. {action}", n + 1);
    }
    Ok(())
}

fn render(args: &CmdArgs, reconciler: &Reconciler<SimPlatform>, name: &str) -> Result<()> {
    let backplane = plan_backplane(args, reconciler)?;
    let manifest = manifests::find_sector(&args.sector_manifests(), name)?;
    let plan = reconciler.planner().plan_sector(&manifest, &backplane)?;
    let gateway = ResourceKey::GatewayConfig(plan.sector.gateway.hostname.clone());
    if let Some(Resource::GatewayConfig(config)) = plan.resources.get(&gateway) {
        println!("{}", config.routes);
        println!("{}", config.nat);
    }
    if let Some(dns) = &plan.sector.dns
        && let Some(Resource::Dns(zone)) = plan
            .resources
            .get(&ResourceKey::Dns(dns.hostname.clone()))
    {
        print!("{}", zone.records);
    }
    Ok(())
}

fn status(reconciler: &Reconciler<SimPlatform>) -> Result<()> {
    for status in reconciler.statuses()? {
        println!("{status}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = CmdArgs::parse();
    let tctl = get_trace_ctl();
    if let Some(log) = args.log() {
        tctl.setup_from_string(log)
            .wrap_err("Invalid log configuration")?;
    }
    if args.show_log_targets() {
        println!("{}", tctl.dump());
        return Ok(());
    }

    let reconciler = open(&args)?;
    let result = match args.command() {
        Command::Init => init(&args, &reconciler).await.map(|_| ()),
        Command::Apply => apply(&args, &reconciler).await,
        Command::Delete { sector } => reconciler
            .delete_sector(sector)
            .await
            .map(|status| println!("{status}"))
            .map_err(Into::into),
        Command::Plan { sector } => plan(&args, &reconciler, sector).await,
        Command::Render { sector } => render(&args, &reconciler, sector),
        Command::Status => status(&reconciler),
        Command::AssignAddress {
            sector,
            subnet,
            vmid,
        } => reconciler
            .planner()
            .assign_instance_address(sector, subnet, *vmid)
            .map(|address| println!("{address}"))
            .map_err(Into::into),
        Command::ReleaseAddress {
            sector,
            subnet,
            vmid,
        } => reconciler
            .planner()
            .release_instance_address(sector, subnet, *vmid)
            .map_err(Into::into),
    };
    if let Err(e) = &result {
        error!("{e}");
    }
    result
}
