use crate::chat::{ChatClient, Completion};
use crate::cli::ConfigCommand;
use crate::config::{self, Config, Overrides};
use crate::provider::{ChatSettings, ProviderKind};
use anyhow::{anyhow, Context};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::sync::oneshot;

pub fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")
}

/// Bail with every field problem at once.
pub fn ensure_valid(settings: &ChatSettings) -> anyhow::Result<()> {
    let errors = config::validate(settings);
    if errors.is_empty() {
        return Ok(());
    }
    let list = errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n");
    Err(anyhow!("invalid settings:\n{list}\nFix them with `pet-chat config set <key> <value>`."))
}

/// Stream one reply to stdout.
pub async fn run_prompt(client: &ChatClient, settings: &ChatSettings, message: &str) -> anyhow::Result<()> {
    let (tx, rx) = oneshot::channel::<Completion>();

    client.send_message(
        settings,
        message,
        |text| {
            let mut out = std::io::stdout();
            let _ = write!(out, "{text}");
            out.flush().ok();
        },
        move |completion| {
            let _ = tx.send(completion);
        },
    );

    let completion = rx.await.context("chat session ended without completing")?;
    println!();

    match completion {
        Completion::Finished => Ok(()),
        Completion::Cancelled => Err(anyhow!("request was cancelled")),
        Completion::Failed(e) if e.is_configuration() => {
            Err(anyhow::Error::new(e).context("could not build the chat request"))
        }
        Completion::Failed(e) => {
            debug_assert!(e.is_transport());
            Err(anyhow::Error::new(e).context("chat request failed"))
        }
    }
}

pub fn cmd_config(
    cmd: ConfigCommand,
    path: &Path,
    cfg: Option<Config>,
    overrides: &Overrides,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let settings = cfg.unwrap_or_default().resolve(overrides);
            let key = if settings.api_key.is_empty() {
                "(not set)".to_string()
            } else {
                config::mask_secret(&settings.api_key)
            };
            writeln!(out, "provider      = {}", settings.provider)?;
            writeln!(out, "model         = {}", settings.model)?;
            writeln!(out, "api_url       = {}", settings.api_url)?;
            writeln!(out, "api_key       = {key}")?;
            writeln!(out, "system_prompt = {}", settings.system_prompt)?;
            writeln!(out, "temperature   = {}", settings.sampling.temperature)?;
            writeln!(out, "top_p         = {}", settings.sampling.top_p)?;
            writeln!(out, "timeout_secs  = {}", settings.idle_timeout.as_secs())?;
            for e in config::validate(&settings) {
                writeln!(out, "warning: {e}")?;
            }
            Ok(())
        }
        ConfigCommand::Path => {
            writeln!(out, "{}", path.display())?;
            Ok(())
        }
        ConfigCommand::Use { provider } => {
            let kind: ProviderKind = provider.parse()?;
            let mut cfg = cfg.unwrap_or_default();
            cfg.switch_provider(kind);
            save_checked(&cfg, path, out)
        }
        ConfigCommand::Set { key, value } => {
            let mut cfg = cfg.unwrap_or_default();
            cfg.set(&key, &value)?;
            save_checked(&cfg, path, out)
        }
    }
}

/// Saving never blocks on an incomplete setup (the key is often set last),
/// but remaining problems are reported.
fn save_checked(cfg: &Config, path: &Path, out: &mut dyn Write) -> anyhow::Result<()> {
    cfg.save_atomic(path)?;
    tracing::info!(path = %path.display(), "config saved");
    writeln!(out, "Saved settings to: {}", path.display())?;
    for e in config::validate(&cfg.resolve(&Overrides::default())) {
        writeln!(out, "warning: {e}")?;
    }
    Ok(())
}

pub fn cmd_providers(out: &mut dyn Write) -> anyhow::Result<()> {
    for kind in ProviderKind::ALL {
        let auth = if kind.requires_credential() { "bearer key" } else { "no key" };
        writeln!(out, "{:<7} {} ({auth})", kind.id(), kind.display_name())?;
        writeln!(out, "        url:   {}", kind.default_url())?;
        writeln!(out, "        model: {}", kind.default_model())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(cmd: ConfigCommand, path: &Path) -> String {
        let cfg = Config::load_optional(path).unwrap();
        let mut out = Vec::new();
        cmd_config(cmd, path, cfg, &Overrides::default(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn use_then_set_persists_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let printed = run(ConfigCommand::Use { provider: "qwen".into() }, &path);
        assert!(printed.contains("Saved settings to"));

        run(
            ConfigCommand::Set {
                key: "api_key".into(),
                value: "sk-abcdef123456".into(),
            },
            &path,
        );

        let cfg = Config::load_optional(&path).unwrap().unwrap();
        assert_eq!(cfg.provider.as_deref(), Some("qwen"));
        assert_eq!(cfg.model.as_deref(), Some("qwen-turbo"));
        assert_eq!(cfg.api_key.as_deref(), Some("sk-abcdef123456"));
    }

    #[test]
    fn show_lists_resolved_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        run(ConfigCommand::Use { provider: "ollama".into() }, &path);

        let printed = run(ConfigCommand::Show, &path);
        assert!(printed.contains("provider      = ollama"));
        assert!(printed.contains("api_url       = http://localhost:11434/api/chat"));
        assert!(printed.contains("timeout_secs  = 60"));
    }

    #[test]
    fn unknown_provider_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut out = Vec::new();
        let res = cmd_config(
            ConfigCommand::Use { provider: "openai".into() },
            &path,
            None,
            &Overrides::default(),
            &mut out,
        );
        assert!(res.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn invalid_settings_list_every_problem() {
        let mut settings = Config::default().resolve(&Overrides::default());
        settings.api_key.clear();
        settings.model = "bad model".into();
        let msg = ensure_valid(&settings).unwrap_err().to_string();
        assert!(msg.contains("API key is empty"));
        assert!(msg.contains("bad model"));
    }

    #[test]
    fn providers_listing_mentions_each_default() {
        let mut out = Vec::new();
        cmd_providers(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        for kind in ProviderKind::ALL {
            assert!(text.contains(kind.default_url()));
            assert!(text.contains(kind.default_model()));
        }
    }
}
