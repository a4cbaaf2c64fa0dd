pub mod provision;
pub mod state;
pub mod status;

use crate::cli::ProfileArgs;
use crate::paths;
use crate::profile::{NodeProfile, ProfileSource};
use crate::state::RecordStore;
use anyhow::Result;
use std::path::Path;

/// Build the profile from `--profile` plus flag overrides
pub fn load_profile(args: &ProfileArgs) -> Result<NodeProfile> {
    let file = match &args.profile {
        Some(path) => ProfileSource::load(path)?,
        None => ProfileSource::default(),
    };
    Ok(file.merge(overrides(args)).build()?)
}

fn overrides(args: &ProfileArgs) -> ProfileSource {
    ProfileSource {
        role: args.role.clone(),
        cluster_endpoint: args.cluster_endpoint.clone(),
        advertised_address: args.advertised_address.clone(),
        work_dir: args.work_dir.clone(),
        hostname: args.hostname.clone(),
        distribution: args.distribution.clone(),
        init_system: args.init_system,
        ..Default::default()
    }
}

/// The record file under the resolved state directory
pub fn record_store(state_dir: Option<&Path>) -> Result<RecordStore> {
    let dir = paths::state_dir(state_dir)?;
    Ok(RecordStore::new(paths::records_file(&dir)))
}
