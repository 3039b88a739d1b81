mod app;
mod chat;
mod cli;
mod config;
mod paths;
mod provider;

#[cfg(feature = "tui")]
mod tui;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with the streamed reply.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_path()?;
    let cfg = config::Config::load_optional(&config_path)?;
    tracing::debug!(?config_path, loaded = cfg.is_some(), "resolved config");

    let overrides = config::Overrides {
        provider: args.provider.clone(),
        model: args.model.clone(),
        api_url: args.api_url.clone(),
        system_prompt: args.system_prompt.clone(),
    };

    match args.cmd {
        Some(cli::Command::Config { cmd }) => {
            return app::cmd_config(cmd, &config_path, cfg, &overrides, &mut std::io::stdout());
        }
        Some(cli::Command::Providers) => {
            return app::cmd_providers(&mut std::io::stdout());
        }
        #[cfg(feature = "tui")]
        Some(cli::Command::Tui) => {
            let settings = cfg.unwrap_or_default().resolve(&overrides);
            return tui::run_tui(settings).await;
        }
        None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No message provided. Try: pet-chat \"你好\" or `pet-chat config show`");
    }

    let settings = cfg.unwrap_or_default().resolve(&overrides);
    app::ensure_valid(&settings)?;

    let client = chat::ChatClient::new(app::http_client()?);
    app::run_prompt(&client, &settings, prompt.trim()).await
}
