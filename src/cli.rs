use clap::{Parser, Subcommand};

/// Streaming chat for the desktop pet
#[derive(Debug, Parser)]
#[command(name = "pet-chat")]
#[command(version)]
#[command(about = "Streaming chat for the desktop pet", long_about = None)]
pub struct Args {
    /// Provider: zhipu, qwen or ollama (default: config/provider or "zhipu")
    #[arg(short = 'p', long = "provider")]
    pub provider: Option<String>,

    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Chat completion endpoint
    #[arg(long = "api-url", value_name = "URL")]
    pub api_url: Option<String>,

    /// System prompt (persona) sent before the message
    #[arg(long = "system-prompt", value_name = "TEXT")]
    pub system_prompt: Option<String>,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Message text (positional) (used when no subcommand is given)
    #[arg(value_name = "MESSAGE")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect or edit the saved settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },

    /// List supported providers and their defaults
    Providers,

    /// Run the interactive speech-bubble panel
    #[cfg(feature = "tui")]
    Tui,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective settings (API key masked)
    Show,
    /// Print the config file location
    Path,
    /// Switch provider, adjusting URL and model to its defaults where needed
    Use {
        /// zhipu, qwen or ollama
        provider: String,
    },
    /// Set one key (provider, model, api_url, api_key, system_prompt,
    /// temperature, top_p, timeout_secs)
    Set { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_words_and_overrides() {
        let args = Args::try_parse_from(["pet-chat", "-p", "ollama", "--model", "llama3", "hello", "there"]).unwrap();
        assert_eq!(args.provider.as_deref(), Some("ollama"));
        assert_eq!(args.model.as_deref(), Some("llama3"));
        assert!(args.cmd.is_none());
        assert_eq!(args.prompt, ["hello", "there"]);
    }

    #[test]
    fn config_set_subcommand() {
        let args = Args::try_parse_from(["pet-chat", "config", "set", "api_key", "sk-1"]).unwrap();
        match args.cmd {
            Some(Command::Config {
                cmd: ConfigCommand::Set { key, value },
            }) => {
                assert_eq!(key, "api_key");
                assert_eq!(value, "sk-1");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
