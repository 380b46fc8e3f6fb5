//! Command-line interface for voxdiary.
//!
//! `run` starts the bot. The other commands inspect plugins, configuration
//! and stored user settings.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::adapters::{DiaryWriter, OpenAiWriter, TelegramClient};
use crate::bot::{register_builtins, BotHost, BotServices, DiaryPipeline, Router};
use crate::config::{AiSettings, Settings};
use crate::core::{
    PluginConfigStore, PluginContext, PluginHost, PluginRegistry, UserConfigStore,
};
use crate::ingest::WhisperTranscriber;
use crate::plugins;
use crate::reminders::ReminderScheduler;

/// voxdiary - Voice notes in, diary entries out
#[derive(Parser, Debug)]
#[command(name = "voxdiary")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the Telegram bot and the reminder scheduler
    Run,

    /// List compiled-in plugins and whether they are enabled
    Plugins,

    /// Show resolved configuration (debug)
    Config,

    /// List stored user settings
    Users {
        /// Print the raw JSON document instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load()?;

        match self.command {
            Commands::Run => run_bot(settings).await,
            Commands::Plugins => list_plugins(&settings),
            Commands::Config => show_config(&settings),
            Commands::Users { json } => list_users(&settings, json),
        }
    }
}

/// Registry over the built-in catalog with the configured enablement set
fn build_registry(settings: &Settings, http: reqwest::Client) -> PluginRegistry {
    let config_store = Arc::new(PluginConfigStore::new(settings.paths().plugin_config()));
    PluginRegistry::new(
        PluginContext::with_http(config_store, http),
        settings.enabled_plugins.clone(),
    )
    .with_catalog(plugins::builtin_catalog())
}

/// Language model client, `None` when no API key is configured
fn build_writer(ai: &AiSettings, http: reqwest::Client) -> Result<Option<Arc<dyn DiaryWriter>>> {
    match ai.provider.as_str() {
        "openai" => match &ai.api_key {
            Some(key) => Ok(Some(Arc::new(OpenAiWriter::new(
                http,
                &ai.base_url,
                key.clone(),
                ai.model.clone(),
                ai.temperature,
            )))),
            None => {
                warn!("OPENAI_API_KEY is not set; diary entries will be raw transcriptions");
                Ok(None)
            }
        },
        other => anyhow::bail!(
            "Unsupported AI provider '{}' (supported: openai, or any OpenAI-compatible endpoint via AI_BASE_URL)",
            other
        ),
    }
}

/// Wire everything together and run until Ctrl-C
async fn run_bot(settings: Settings) -> Result<()> {
    let token = settings.require_telegram_token()?.to_string();
    let paths = settings.paths();
    std::fs::create_dir_all(paths.home())
        .with_context(|| format!("Failed to create {}", paths.home().display()))?;

    let http = reqwest::Client::new();
    let users = Arc::new(UserConfigStore::new(paths.user_config()));

    let mut router = Router::new();
    let mut host = PluginHost::new(build_registry(&settings, http.clone()))
        .with_timeout(settings.plugin_timeout());
    host.load_plugins(&mut router);
    let host = Arc::new(host);

    let transcriber = Arc::new(WhisperTranscriber::new(
        settings.whisper.path.clone(),
        settings.whisper.model.clone(),
        settings.whisper.language.clone(),
    ));
    let writer = build_writer(&settings.ai, http)?;

    let pipeline = Arc::new(DiaryPipeline::new(
        paths,
        transcriber,
        writer,
        Arc::clone(&users),
        host,
    ));
    let services = Arc::new(BotServices::new(Arc::clone(&users), pipeline));
    register_builtins(&mut router, Arc::clone(&services));

    let client = Arc::new(TelegramClient::new(token));
    let reminders = ReminderScheduler::new(users, client.clone(), settings.reminder_poll());
    let bot = BotHost::new(client, router, services);

    tokio::select! {
        result = bot.run() => result,
        result = reminders.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

fn list_plugins(settings: &Settings) -> Result<()> {
    let registry = build_registry(settings, reqwest::Client::new());
    let summaries = registry.describe();

    println!("{:<12} {:<9} {}", "PLUGIN", "ENABLED", "DESCRIPTION");
    println!("{}", "-".repeat(70));
    for plugin in &summaries {
        println!(
            "{:<12} {:<9} {}",
            plugin.id,
            if plugin.enabled { "yes" } else { "no" },
            plugin.description
        );
    }

    let known: Vec<&str> = summaries.iter().map(|p| p.id.as_str()).collect();
    for unknown in settings.enabled_plugins.iter().filter(|id| !known.contains(id)) {
        eprintln!("warning: enabled plugin '{}' is not compiled in", unknown);
    }

    Ok(())
}

fn show_config(settings: &Settings) -> Result<()> {
    let paths = settings.paths();
    let enabled: Vec<&str> = settings.enabled_plugins.iter().collect();

    println!("voxdiary configuration");
    println!();
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:           {}", paths.home().display());
    println!("  User config:    {}", paths.user_config().display());
    println!("  Plugin config:  {}", paths.plugin_config().display());
    println!("  Styles:         {}", paths.styles_dir().display());
    println!();
    println!("Telegram token:   {}", if settings.telegram_token.is_some() { "(set)" } else { "(missing)" });
    println!(
        "Enabled plugins:  {}",
        if enabled.is_empty() { "(none)".to_string() } else { enabled.join(", ") }
    );
    println!("Plugin timeout:   {}s", settings.plugin_timeout_secs);
    println!("Reminder poll:    {}s", settings.reminder_poll_secs);
    println!();
    println!("AI:");
    println!("  Provider:       {}", settings.ai.provider);
    println!("  Model:          {}", settings.ai.model);
    println!("  Temperature:    {}", settings.ai.temperature);
    println!("  Base URL:       {}", settings.ai.base_url);
    println!("  API key:        {}", if settings.ai.api_key.is_some() { "(set)" } else { "(missing)" });
    println!();
    println!("Whisper:");
    println!("  Binary:         {}", settings.whisper.path.display());
    println!("  Model:          {}", settings.whisper.model);
    println!(
        "  Language:       {}",
        settings.whisper.language.as_deref().unwrap_or("(auto)")
    );

    Ok(())
}

fn list_users(settings: &Settings, json: bool) -> Result<()> {
    let store = UserConfigStore::new(settings.paths().user_config());
    let users = store.load_all()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    if users.is_empty() {
        println!("No users found");
        return Ok(());
    }

    println!("{:<16} {:<6} {:<8}", "USER ID", "AI", "REMINDER");
    println!("{}", "-".repeat(32));
    for (user_id, cfg) in &users {
        println!(
            "{:<16} {:<6} {:<8}",
            user_id,
            if cfg.ai_enabled { "on" } else { "off" },
            cfg.reminder_time.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn ai(provider: &str, key: Option<&str>) -> AiSettings {
        AiSettings {
            provider: provider.to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            base_url: "http://localhost:1".to_string(),
            api_key: key.map(str::to_string),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_users_flag() {
        let cli = Cli::parse_from(["voxdiary", "users", "--json"]);
        assert!(matches!(cli.command, Commands::Users { json: true }));
    }

    #[test]
    fn test_build_writer() {
        let http = reqwest::Client::new();
        assert!(build_writer(&ai("openai", Some("k")), http.clone()).unwrap().is_some());
        assert!(build_writer(&ai("openai", None), http.clone()).unwrap().is_none());
        assert!(build_writer(&ai("google_genai", Some("k")), http).is_err());
    }
}
