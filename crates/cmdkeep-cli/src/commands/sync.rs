use std::path::Path;

use cmdkeep_core::db::{
    CommandRepository, LibSqlCommandRepository, LibSqlSyncStateRepository, SyncStateRepository,
};
use cmdkeep_core::sync::{link_remote, unlink_remote, GistClient, GistConfig, ResolutionPolicy};

use crate::auth::{resolve_token, TokenSource};
use crate::commands::common::{
    format_resolution_lines, format_sync_timestamp, open_database, resolution_to_item,
    ResolutionItem,
};
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;
use crate::prompt::TerminalConflictResolver;

/// Profile name, its settings and the token it syncs with.
struct SyncContext {
    profile_name: String,
    profile: CliProfile,
    token: Option<(String, TokenSource)>,
}

impl SyncContext {
    fn load(global_profile: Option<&str>) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(global_profile);
        let profile = config.profile(&profile_name).cloned().unwrap_or_default();
        let token = resolve_token(&profile_name)?;
        Ok(Self {
            profile_name,
            profile,
            token,
        })
    }

    fn client(&self, gist_id: Option<String>) -> Result<GistClient, CliError> {
        let Some((token, _)) = self.token.as_ref() else {
            return Err(CliError::SyncNotConfigured);
        };

        let config = GistConfig {
            api_base_url: self.profile.api_base_url(),
            timeout: self.profile.request_timeout(),
            ..GistConfig::new(token.clone())
        };
        Ok(GistClient::new(config, gist_id)?)
    }
}

pub fn resolve_policy(
    explicit: Option<&str>,
    profile: &CliProfile,
) -> Result<ResolutionPolicy, CliError> {
    explicit.map_or_else(
        || Ok(profile.conflict_policy()),
        |raw| raw.parse::<ResolutionPolicy>().map_err(CliError::Config),
    )
}

pub async fn run_sync(
    policy: Option<&str>,
    global_profile: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let context = SyncContext::load(global_profile)?;
    let policy = resolve_policy(policy, &context.profile)?;

    let db = open_database(db_path).await?;
    let gist_id = LibSqlSyncStateRepository::new(db.connection())
        .load_gist_id(&context.profile_name)
        .await?;
    tracing::debug!(
        profile = %context.profile_name,
        %policy,
        known_gist = gist_id.is_some(),
        "Starting sync"
    );
    let mut client = context.client(gist_id)?;
    let mut resolver = TerminalConflictResolver::default();

    let report = match cmdkeep_core::sync::run_sync(
        db.connection(),
        &mut client,
        &context.profile_name,
        policy,
        &mut resolver,
    )
    .await
    {
        Ok(report) => report,
        Err(error) => return Err(resolver.take_failure().unwrap_or_else(|| error.into())),
    };

    if report.created_gist {
        if let Some(gist_id) = report.gist_id.as_deref() {
            println!("Created gist {gist_id}");
        }
    }
    println!(
        "Synced {} commands (local {}, remote {}, {} conflicts resolved)",
        report.result_count, report.local_count, report.remote_count, report.conflicts
    );
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    global_profile: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);

    let db = open_database(db_path).await?;
    let records = LibSqlSyncStateRepository::new(db.connection())
        .list_resolutions(&profile_name, limit)
        .await?;

    if as_json {
        let json_items = records
            .iter()
            .map(resolution_to_item)
            .collect::<Vec<ResolutionItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_resolution_lines(&records) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_status(global_profile: Option<&str>, db_path: &Path) -> Result<(), CliError> {
    let context = SyncContext::load(global_profile)?;
    let db = open_database(db_path).await?;
    let state = LibSqlSyncStateRepository::new(db.connection());

    let gist_id = state.load_gist_id(&context.profile_name).await?;
    let last_synced_at = state.load_last_synced_at(&context.profile_name).await?;
    let commands = LibSqlCommandRepository::new(db.connection())
        .list_all()
        .await?;
    let pending = commands
        .iter()
        .filter(|command| command.changed_since_sync())
        .count();

    println!("Profile:      {}", context.profile_name);
    println!(
        "Token:        {}",
        context
            .token
            .as_ref()
            .map_or_else(|| "not configured".to_string(), |(_, source)| source.to_string())
    );
    println!("Gist:         {}", gist_id.as_deref().unwrap_or("(none)"));
    println!(
        "Last synced:  {}",
        last_synced_at.map_or_else(|| "never".to_string(), format_sync_timestamp)
    );
    println!("Pending:      {pending} of {} records", commands.len());
    Ok(())
}

pub async fn run_sync_link(global_profile: Option<&str>, db_path: &Path) -> Result<(), CliError> {
    let context = SyncContext::load(global_profile)?;
    let db = open_database(db_path).await?;
    let mut client = context.client(None)?;

    match link_remote(db.connection(), &mut client, &context.profile_name).await? {
        Some(gist_id) => println!("Linked profile '{}' to gist {gist_id}", context.profile_name),
        None => println!("No cmdkeep gist found; the next sync creates one."),
    }
    Ok(())
}

pub async fn run_sync_unlink(global_profile: Option<&str>, db_path: &Path) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);

    let db = open_database(db_path).await?;
    unlink_remote(db.connection(), &profile_name).await?;
    println!("Unlinked profile '{profile_name}'");
    Ok(())
}
