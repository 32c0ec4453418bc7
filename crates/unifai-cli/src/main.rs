use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use unifai_core::{ChatMessage, Client, CompletionRequest, ResponseFormat};

mod config;

use config::UnifaiConfig;

#[derive(Parser)]
#[command(name = "unifai")]
#[command(version)]
#[command(about = "unifai: one chat-completion interface with provider fallback")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a one-shot message, falling back across the configured models
    Ask {
        /// The message to send
        message: String,

        /// Model identifier; repeat to set the fallback order
        #[arg(short, long = "model")]
        models: Vec<String>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        #[arg(long)]
        max_tokens: Option<u32>,

        #[arg(long)]
        temperature: Option<f32>,

        /// Ask for a JSON object reply
        #[arg(long)]
        json: bool,
    },

    /// List models from the first backend that answers
    Models,

    /// Report the first backend that answers a test completion
    Probe,

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Models => cmd_models(&cli.config).await,
        Commands::Probe => cmd_probe(&cli.config).await,
        Commands::Ask {
            message,
            models,
            system,
            max_tokens,
            temperature,
            json,
        } => {
            let request = AskRequest {
                message,
                models,
                system,
                max_tokens,
                temperature,
                json,
            };
            cmd_ask(&cli.config, request).await
        }
    }
}

fn build_client(cfg: &UnifaiConfig, models: Vec<String>) -> Client {
    let models = if models.is_empty() {
        cfg.client.models.clone()
    } else {
        models
    };
    debug!("Backends in fallback order: {:?}", models);
    Client::with_settings(models, cfg.provider_settings())
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config::default_config_path();
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("unifai initialized at {}", config_dir.display());
    println!(
        "Edit {} to configure your models and API keys.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = UnifaiConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

struct AskRequest {
    message: String,
    models: Vec<String>,
    system: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    json: bool,
}

impl AskRequest {
    fn into_completion(self, cfg: &UnifaiConfig) -> CompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(self.message));

        let mut request = CompletionRequest::new(messages)
            .with_max_tokens(self.max_tokens.unwrap_or(cfg.client.max_tokens))
            .with_temperature(self.temperature.unwrap_or(cfg.client.temperature));
        if self.json {
            request = request.with_response_format(ResponseFormat::JsonObject);
        }
        request
    }
}

async fn cmd_ask(config_path: &Option<PathBuf>, mut ask: AskRequest) -> Result<()> {
    let cfg = UnifaiConfig::load(config_path)?;
    let client = build_client(&cfg, std::mem::take(&mut ask.models));

    let response = client.create_completion(ask.into_completion(&cfg)).await?;

    debug!(
        "Answered by {} ({} tokens)",
        response.get("model", &serde_json::Value::Null),
        response
            .path("usage.total_tokens")
            .ok()
            .and_then(|f| f.as_u64())
            .unwrap_or(0)
    );

    let message = response.path("choices.0.message")?;
    if let Ok(calls) = message.attr("tool_calls") {
        println!("{}", serde_json::to_string_pretty(&calls.into_value())?);
    } else if let Some(text) = message.attr("content")?.as_str() {
        println!("{}", text);
    }
    Ok(())
}

async fn cmd_models(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = UnifaiConfig::load(config_path)?;
    let client = build_client(&cfg, Vec::new());

    let models = client.list_models().await?;
    for entry in models.attr("data")?.as_list().unwrap_or_default() {
        if let Some(id) = entry.attr("id").ok().and_then(|f| f.as_str().map(str::to_string)) {
            println!("{}", id);
        }
    }
    Ok(())
}

async fn cmd_probe(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = UnifaiConfig::load(config_path)?;
    let client = build_client(&cfg, Vec::new());

    match client.get_active_model().await {
        Some(model) => println!("{}", model),
        None => println!("none available"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(json: bool) -> AskRequest {
        AskRequest {
            message: "hello".to_string(),
            models: vec![],
            system: Some("be brief".to_string()),
            max_tokens: None,
            temperature: Some(0.0),
            json,
        }
    }

    #[test]
    fn test_cli_parses_repeated_models() {
        let cli = Cli::try_parse_from([
            "unifai", "ask", "hi", "-m", "claude-3-haiku", "-m", "gpt-4o-mini", "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask { models, json, .. } => {
                assert_eq!(models, vec!["claude-3-haiku", "gpt-4o-mini"]);
                assert!(json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_ask_request_uses_config_defaults() {
        let cfg = UnifaiConfig::default();
        let request = ask(false).into_completion(&cfg);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(request.temperature, Some(0.0));
        assert!(request.model.is_none());
        assert!(request.response_format.is_none());
    }

    #[test]
    fn test_ask_request_json_mode() {
        let request = ask(true).into_completion(&UnifaiConfig::default());
        assert!(matches!(
            request.response_format,
            Some(ResponseFormat::JsonObject)
        ));
    }

    #[test]
    fn test_build_client_prefers_cli_models() {
        let cfg = UnifaiConfig::default();
        assert_eq!(
            build_client(&cfg, vec!["claude-3-haiku".to_string()]).identifiers(),
            ["claude-3-haiku"]
        );
        assert_eq!(
            build_client(&cfg, Vec::new()).identifiers(),
            ["local", "gpt-4o-mini"]
        );
    }
}
