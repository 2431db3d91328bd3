//! `zal prov`: reconcile Zabbix with the configured rule files.

use anyhow::{Context as AnyhowContext, Result, bail};
use provisioner::targets::PrometheusTargets;
use provisioner::{HostConfig, Provisioner, SynthesisOptions};
use std::path::PathBuf;
use std::time::Duration;

use crate::Context;
use crate::cli::ProvArgs;
use crate::config;
use crate::differ;
use crate::ui;

pub fn run(ctx: &Context, args: ProvArgs) -> Result<()> {
    let path = config_path(&args)?;
    let hosts = config::load_hosts(&path)?;

    if !ctx.quiet {
        ui::header(if args.dry_run {
            "Zabbix Plan"
        } else {
            "Provisioning Zabbix"
        });
        ui::kv("Config", &path.display().to_string());
        ui::kv("Zabbix", &args.url);
        ui::kv("Templates", &template_names(&hosts));
        if args.prometheus_url.trim().is_empty() {
            ui::dim("No Prometheus URL, hosts are not discovered");
        } else {
            ui::kv("Prometheus", &args.prometheus_url);
        }
    }

    let timeout = Duration::from_secs(args.timeout);
    let provisioner = build(hosts, &args, timeout);
    let desired = provisioner.desired().map_err(report)?;

    let (Some(user), Some(password)) = (args.user.as_deref(), args.password.as_deref()) else {
        bail!("Zabbix credentials are required (--user/--password or ZABBIX_USER/ZABBIX_PASSWORD)");
    };
    let client = zabbix::Client::connect(&args.url, user, password, timeout)
        .with_context(|| format!("Could not log in to {}", args.url))?;
    log::info!("Logged in to {}", args.url);

    if args.dry_run {
        if !ctx.quiet {
            ui::warn("Dry run - no changes will be made");
        }
        let plan = provisioner.plan_desired(desired, &client).map_err(report)?;
        differ::display_plan(&plan);
        return Ok(());
    }

    let summary = provisioner.apply(desired, &client).map_err(report)?;
    if !ctx.quiet {
        differ::display_summary(&summary);
        println!();
        if summary.is_converged() {
            ui::success("Zabbix already matches the rule files");
        } else {
            ui::success(&format!("Applied {} changes", summary.total_changes()));
        }
    }
    Ok(())
}

fn build(hosts: Vec<HostConfig>, args: &ProvArgs, timeout: Duration) -> Provisioner {
    let prometheus_url = Some(args.prometheus_url.trim().to_string()).filter(|u| !u.is_empty());
    let options = SynthesisOptions {
        key_prefix: args.key_prefix.clone(),
        prometheus_url: prometheus_url.clone(),
        firing: args.firing.into(),
    };

    let provisioner = Provisioner::new(hosts, options);
    match prometheus_url {
        Some(url) => provisioner.with_targets(PrometheusTargets::new(&url, timeout)),
        None => provisioner,
    }
}

fn template_names(hosts: &[HostConfig]) -> String {
    hosts
        .iter()
        .map(|h| h.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Point out partial application before handing the error to `main`.
fn report(err: provisioner::Error) -> anyhow::Error {
    let category = err.category();
    if category.may_be_partial() {
        ui::error(&format!(
            "{}: changes before the failure were applied; rerun to converge",
            category.description()
        ));
    }
    anyhow::Error::new(err)
}

/// Explicit `--config-path`, else the default location.
fn config_path(args: &ProvArgs) -> Result<PathBuf> {
    match &args.config_path {
        Some(path) => Ok(path.clone()),
        None => config::default_config_path(),
    }
}
