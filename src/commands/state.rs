use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::Context;
use crate::cli::StateCommand;
use crate::engine;
use crate::state::{self, RecordFile};
use crate::ui;

pub fn run(ctx: &Context, state_dir: Option<&Path>, cmd: StateCommand) -> Result<i32> {
    let store = super::record_store(state_dir)?;

    match cmd {
        StateCommand::Show { json } => {
            let recorded = store.load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&recorded)?);
                return Ok(0);
            }

            ui::header("Recorded Run");
            ui::kv("File", &store.path().display().to_string());
            match recorded {
                Some(file) => show(&file),
                None => ui::dim("No recorded run"),
            }
            println!();
        }
        StateCommand::Clear { yes } => {
            if !store.path().exists() {
                if !ctx.quiet {
                    ui::info("No recorded run to clear");
                }
                return Ok(0);
            }

            let prompt = format!("Remove {}?", store.path().display());
            if !yes && !engine::confirm(&prompt, false)? {
                ui::info("Aborted");
                return Ok(0);
            }

            if store.clear()? && !ctx.quiet {
                ui::success("Cleared recorded run");
            }
        }
    }

    Ok(0)
}

fn show(file: &RecordFile) {
    if let Some(role) = &file.role {
        ui::kv("Role", role);
    }
    ui::kv("Profile", state::short_hash(file.plan_hash()));
    ui::kv(
        "Updated",
        &file.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );

    let total = file.run.len();
    let satisfied = file.run.count(converge::StepStatus::Satisfied);
    ui::kv(
        "Steps",
        &format!(
            "{} total, {} satisfied",
            total.to_string().bold(),
            satisfied.to_string().green()
        ),
    );

    for record in file.run.iter() {
        println!(
            "    {} {} {}",
            ui::status_symbol(record.status),
            record.step_id,
            format!("({} attempts)", record.attempts).dimmed()
        );
        if let Some(error) = &record.last_error {
            println!("        {}", error.dimmed());
        }
    }
}
