use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use converge::{Actions, Plan, RetryPolicy, RunResult, SystemProbe, ValidationError};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::Context;
use crate::cli::ProvisionArgs;
use crate::engine::{self, DisplayOptions, ProgressObserver};
use crate::orchestrator::{self, Orchestrator, PostAction};
use crate::profile::NodeProfile;
use crate::state::{self, FileSink, RecordStore};
use crate::system::Host;
use crate::{privilege, progress, signals, ui};

/// Backoff factor between retry attempts
const BACKOFF_FACTOR: f64 = 2.0;

pub fn run(ctx: &Context, state_dir: Option<&Path>, args: ProvisionArgs) -> Result<i32> {
    let profile = super::load_profile(&args.profile)?;
    let plan = orchestrator::build_plan(&profile)?;
    let store = super::record_store(state_dir)?;
    let host = Host::detect(profile.init_system);

    if args.dry_run {
        return dry_run(ctx, &profile, &plan, &store, &host, &args);
    }

    privilege::require_root("provision")?;
    check_reboot_gate(&profile, &args, console::user_attended())?;
    if !host.packages().is_available() {
        ui::warn("apt is not available; package and repository steps will fail");
    }

    signals::install();
    let result = execute(
        ctx,
        &profile,
        store,
        &host,
        host.actions(),
        &args,
        signals::cancel_flag(),
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        engine::print_summary(&result);
    }

    for action in orchestrator::post_actions(&profile, &result, args.allow_reboot) {
        match action {
            PostAction::Reboot => reboot(&host, &result, args.yes)?,
        }
    }

    Ok(result.exit_code())
}

/// Probe every step and show what a run would change
fn dry_run(
    ctx: &Context,
    profile: &NodeProfile,
    plan: &Plan,
    store: &RecordStore,
    probe: &dyn SystemProbe,
    args: &ProvisionArgs,
) -> Result<i32> {
    let plan_hash = profile.content_hash()?;
    let records = state::starting_records(store.load()?, &plan_hash, args.resume)?;

    let spinner = if ctx.quiet || args.json {
        progress::hidden()
    } else {
        progress::spinner("Probing machine state...")
    };
    let preview = converge::preview(plan, probe, args.resume.then_some(&records))?;
    spinner.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        engine::display_preview(plan, &preview);
        println!();
        ui::info("Dry run - no changes made");
    }
    Ok(0)
}

/// Run the plan, persisting records to `store` after every transition
fn execute(
    ctx: &Context,
    profile: &NodeProfile,
    store: RecordStore,
    probe: &dyn SystemProbe,
    actions: Actions<'_>,
    args: &ProvisionArgs,
    cancel: &AtomicBool,
) -> Result<RunResult> {
    let plan_hash = profile.content_hash()?;
    let mut records = state::starting_records(store.load()?, &plan_hash, args.resume)?;
    let mut sink = FileSink::new(store, &profile.role);
    let hidden = ctx.quiet || args.json;

    if !hidden {
        ui::header(&format!(
            "Provisioning {} ({})",
            profile.advertised_address, profile.role
        ));
        ui::kv("Endpoint", &profile.cluster_endpoint);
        println!();
    }

    let policy = RetryPolicy::new(
        args.max_attempts,
        Duration::from_secs(args.retry_delay_secs),
        BACKOFF_FACTOR,
    );
    let mut observer = ProgressObserver::new(
        orchestrator::build_plan(profile)?.len(),
        DisplayOptions {
            verbose: ctx.verbose > 0,
            hidden,
        },
    );

    let result = Orchestrator::new(probe, actions)
        .with_retry_policy(policy)
        .with_cancel_flag(cancel)
        .run(profile, &mut records, &mut sink, &mut observer)
        .context("Provisioning aborted")?;
    observer.finish();
    Ok(result)
}

/// Unattended runs must pre-approve the reboot with --yes
fn check_reboot_gate(
    profile: &NodeProfile,
    args: &ProvisionArgs,
    user_attended: bool,
) -> Result<(), ValidationError> {
    if profile.reboot_after && args.allow_reboot && !args.yes && !user_attended {
        return Err(ValidationError::Other(
            "--allow-reboot needs --yes when not attached to a terminal".to_string(),
        ));
    }
    Ok(())
}

fn reboot(host: &Host, result: &RunResult, yes: bool) -> Result<()> {
    println!();
    println!(
        "  {} {} steps changed; the profile asks for a reboot",
        "→".cyan(),
        result.mutations()
    );

    if !yes && !engine::confirm("Reboot now?", false)? {
        ui::info("Skipped reboot");
        return Ok(());
    }

    host.services()
        .reboot()
        .map_err(|e| anyhow::anyhow!("Reboot failed: {e}"))
}
