use std::env;

use cmdkeep_core::sync::ResolutionPolicy;

use crate::cli::ConfigCommands;
use crate::config_profiles::{
    default_config_path, is_http_url, normalize_text_option, CliProfile, CliProfilesConfig,
};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            conflict_policy,
            request_timeout_secs,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            api_base_url,
            conflict_policy,
            request_timeout_secs,
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(),
    }
}

#[allow(clippy::needless_pass_by_value)]
pub fn run_config_init(
    profile_name: Option<&str>,
    api_base_url: Option<String>,
    conflict_policy: Option<String>,
    request_timeout_secs: Option<u64>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let merged = merge_profile(
        config.profile(&profile_name).cloned().unwrap_or_default(),
        normalize_text_option(api_base_url)
            .or_else(|| normalize_text_option(env::var("CMDKEEP_GITHUB_API_URL").ok())),
        normalize_text_option(conflict_policy),
        request_timeout_secs,
    )?;
    validate_profile(&merged)?;
    *config.profile_mut_or_default(&profile_name) = merged;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );
    println!("Run `cmdkeep auth login --profile {profile_name}` to store a GitHub token.");
    Ok(())
}

/// Layer explicit values over the stored profile.
pub fn merge_profile(
    existing: CliProfile,
    api_base_url: Option<String>,
    conflict_policy: Option<String>,
    request_timeout_secs: Option<u64>,
) -> Result<CliProfile, CliError> {
    let conflict_policy = conflict_policy
        .map(|raw| raw.parse::<ResolutionPolicy>().map_err(CliError::Config))
        .transpose()?;

    Ok(CliProfile {
        api_base_url: api_base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .or(existing.api_base_url),
        conflict_policy: conflict_policy.or(existing.conflict_policy),
        request_timeout_secs: request_timeout_secs.or(existing.request_timeout_secs),
    })
}

fn validate_profile(profile: &CliProfile) -> Result<(), CliError> {
    if let Some(url) = normalize_text_option(profile.api_base_url.clone()) {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }
    }
    if profile.request_timeout_secs == Some(0) {
        return Err(CliError::Config(
            "request_timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn run_config_show() -> Result<(), CliError> {
    let path = default_config_path().map_err(CliError::Config)?;
    let config = CliProfilesConfig::load_from_path(&path).map_err(CliError::Config)?;
    println!("{}", path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
