//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use chatbridge::ChatCompletionRequest;

#[derive(Debug, Parser)]
#[command(name = "chatbridge", version, about = "Send chat requests to an LLM provider")]
pub struct Cli {
    /// Config file (defaults to ~/.chatbridge/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a default config file
    Init,
    /// Send one message and print the reply
    Ask(AskArgs),
}

#[derive(Debug, Args)]
pub struct AskArgs {
    pub message: String,

    #[arg(long)]
    pub system: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Continue an existing conversation
    #[arg(long)]
    pub conversation_id: Option<String>,

    /// Print the reply as it arrives
    #[arg(long)]
    pub stream: bool,
}

impl AskArgs {
    pub fn to_request(&self) -> ChatCompletionRequest {
        ChatCompletionRequest {
            message: self.message.clone(),
            conversation_id: self.conversation_id.clone(),
            system_prompt: self.system.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            history: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_options() {
        let cli = Cli::parse_from([
            "chatbridge",
            "ask",
            "Hello",
            "--system",
            "You are helpful",
            "--max-tokens",
            "64",
            "--stream",
        ]);
        let Command::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        assert!(args.stream);
        let request = args.to_request();
        assert_eq!(request.message, "Hello");
        assert_eq!(request.system_prompt.as_deref(), Some("You are helpful"));
        assert_eq!(request.max_tokens, Some(64));
        assert!(request.conversation_id.is_none());
    }

    #[test]
    fn test_parse_init_with_config() {
        let cli = Cli::parse_from(["chatbridge", "--config", "/tmp/c.toml", "init"]);
        assert!(matches!(cli.command, Command::Init));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }
}
