use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::Context;
use crate::cli::StatusArgs;
use crate::engine;
use crate::{orchestrator, roles};
use crate::state::{self, RecordFile};
use crate::system::Host;
use crate::{progress, ui};

pub fn run(ctx: &Context, state_dir: Option<&Path>, args: StatusArgs) -> Result<i32> {
    let profile = super::load_profile(&args.profile)?;
    let plan = orchestrator::build_plan(&profile)?;
    let plan_hash = profile.content_hash()?;
    let store = super::record_store(state_dir)?;
    let recorded = store.load()?;
    let host = Host::detect(profile.init_system);

    let spinner = if ctx.quiet || args.json {
        progress::hidden()
    } else {
        progress::spinner("Probing machine state...")
    };
    let preview = converge::preview(&plan, &host, None)?;
    spinner.finish_and_clear();

    if args.json {
        let status = serde_json::json!({
            "plan_hash": plan_hash,
            "preview": preview,
            "recorded": recorded,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(0);
    }

    ui::header(&format!("Node Status: {}", profile.role));
    if let Some(role) = roles::find(&profile.role) {
        ui::kv("Role", role.description);
    }
    ui::kv("Advertised address", &profile.advertised_address);
    ui::kv("Endpoint", &profile.cluster_endpoint);
    ui::kv("Init system", &profile.init_system.to_string());
    if !host.packages().is_available() {
        ui::kv("apt", &"not available".yellow().to_string());
    }

    engine::display_preview(&plan, &preview);

    ui::section("Last Run");
    ui::kv("Records", &store.path().display().to_string());
    match &recorded {
        Some(file) => show_recorded(file, &plan_hash),
        None => ui::dim("No recorded run"),
    }

    println!();
    Ok(0)
}

fn show_recorded(file: &RecordFile, plan_hash: &str) {
    ui::kv(
        "Updated",
        &file.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );

    let profile_state = if file.plan_hash() == plan_hash {
        "matches this profile".green().to_string()
    } else {
        format!(
            "different profile ({})",
            state::short_hash(file.plan_hash())
        )
        .yellow()
        .to_string()
    };
    ui::kv("Profile", &profile_state);

    for record in file.run.iter() {
        let detail = record
            .last_error
            .as_deref()
            .map(|e| format!(" {}", ui::truncate(e, 80).dimmed()))
            .unwrap_or_default();
        println!(
            "    {} {} {}{}",
            ui::status_symbol(record.status),
            record.step_id,
            format!("({}, {} attempts)", record.status, record.attempts).dimmed(),
            detail
        );
    }
}
