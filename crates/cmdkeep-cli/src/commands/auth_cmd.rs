use dialoguer::Password;

use crate::auth::{clear_stored_token, mask_token, resolve_token, store_token};
use crate::cli::AuthCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;

    match command {
        AuthCommands::Login { profile, token } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let token = match token {
                Some(token) => token,
                None => Password::new()
                    .with_prompt(format!("GitHub token for profile '{profile_name}'"))
                    .interact()
                    .map_err(|error| CliError::Prompt(error.to_string()))?,
            };

            store_token(&profile_name, &token)?;
            println!("Stored GitHub token for profile '{profile_name}'");
            Ok(())
        }
        AuthCommands::Status { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            match resolve_token(&profile_name)? {
                Some((token, source)) => println!(
                    "Profile '{profile_name}' syncs with token {} from {source}",
                    mask_token(&token)
                ),
                None => println!("Profile '{profile_name}' has no GitHub token."),
            }
            Ok(())
        }
        AuthCommands::Logout { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            if clear_stored_token(&profile_name)? {
                println!("Removed stored token for profile '{profile_name}'");
            } else {
                println!("Profile '{profile_name}' had no stored token.");
            }
            Ok(())
        }
    }
}
