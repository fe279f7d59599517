use std::path::PathBuf;

use crate::cli::ConfigCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_config(
    command: ConfigCommands,
    global_profile: Option<&str>,
    db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { no_activate } => run_config_init(global_profile, db_path, no_activate),
    }
}

/// Create or update a profile, returning its resolved name
pub fn init_profile(
    config: &mut CliProfilesConfig,
    profile_name: Option<&str>,
    db_path: Option<PathBuf>,
    no_activate: bool,
) -> Result<String, CliError> {
    let profile_name = config.resolve_profile_name(profile_name);
    let db_path = db_path.filter(|path| !path.as_os_str().is_empty());
    if let Some(path) = db_path.as_ref() {
        if path.is_dir() {
            return Err(CliError::Config(format!(
                "db_path {} is a directory",
                path.display()
            )));
        }
    }

    let profile = config.profile_mut_or_default(&profile_name);
    if db_path.is_some() {
        profile.db_path = db_path;
    }
    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }
    Ok(profile_name)
}

fn run_config_init(
    profile_name: Option<&str>,
    db_path: Option<PathBuf>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = init_profile(&mut config, profile_name, db_path, no_activate)?;
    let path = config.save().map_err(CliError::Config)?;
    let db_path = config
        .resolve_db_path(&profile_name, None)
        .map_err(CliError::Config)?;

    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );
    println!("Database: {}", db_path.display());
    Ok(())
}
