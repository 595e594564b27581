mod cli;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use tracing_subscriber::EnvFilter;

use chatbridge::{AppConfig, ChatClient, ProviderError, TracingObserver, Usage};
use cli::{AskArgs, Cli, Command};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => Ok(AppConfig::config_path()?),
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config = AppConfig::load_from(path)?;
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    Ok(config)
}

fn describe_usage(usage: Option<&Usage>) -> String {
    match usage {
        Some(u) if u.estimated => format!(
            "{} prompt + {} completion = {} tokens (estimated)",
            u.prompt_tokens, u.completion_tokens, u.total_tokens
        ),
        Some(u) => format!(
            "{} prompt + {} completion = {} tokens",
            u.prompt_tokens, u.completion_tokens, u.total_tokens
        ),
        None => "unknown".to_string(),
    }
}

async fn ask(config: AppConfig, args: &AskArgs) -> Result<()> {
    let limit = config.limits.max_message_chars;
    if args.message.chars().count() > limit {
        bail!("Message is longer than the configured limit of {} characters", limit);
    }

    let settings = config
        .provider
        .with_resolved_key(|name| std::env::var(name).ok())?;
    let client = ChatClient::from_settings(settings, Arc::new(TracingObserver));
    let request = args.to_request();
    eprintln!("[provider] {}", client.provider_name());

    if !args.stream {
        let result = client.complete(&request).await?;
        println!("{}", result.message);
        eprintln!("[conversation] {}", result.conversation_id);
        eprintln!("[model] {}", result.model);
        eprintln!("[usage] {}", describe_usage(result.usage.as_ref()));
        return Ok(());
    }

    let mut stream = client.stream(&request).await?;
    eprintln!("[conversation] {}", stream.conversation_id);
    eprintln!("[model] {} (requested)", stream.model);

    let mut reply = String::new();
    let mut stdout = std::io::stdout();
    while let Some(delta) = stream.next().await {
        match delta {
            Ok(delta) => {
                reply.push_str(delta.as_str());
                print!("{}", delta.as_str());
                stdout.flush().context("Failed to flush stdout")?;
            }
            Err(err) => {
                println!();
                return Err(err.into());
            }
        }
    }
    println!();

    let prompt = chatbridge::usage::prompt_text(&request);
    let usage = chatbridge::reconcile(None, &prompt, &reply);
    eprintln!("[usage] {}", describe_usage(Some(&usage)));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let path = config_path(&cli)?;

    match &cli.command {
        Command::Init => {
            if path.exists() {
                println!("Config already exists: {}", path.display());
            } else {
                AppConfig::save_default_to(&path)?;
                println!("Created default config: {}", path.display());
                println!("Edit it to set your provider, model and api_key.");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Ask(args) => {
            let config = load_config(&path)?;
            init_logging(&config.log_level);

            match ask(config, args).await {
                Ok(()) => Ok(ExitCode::SUCCESS),
                Err(err) => match err.downcast_ref::<ProviderError>() {
                    Some(provider_err) => {
                        eprintln!("[error:{}] {}", provider_err.kind(), provider_err);
                        Ok(ExitCode::FAILURE)
                    }
                    None => Err(err),
                },
            }
        }
    }
}
