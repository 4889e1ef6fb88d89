use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{builder::BoolishValueParser, Parser};
use rocket::{catchers, routes, Build, Rocket};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod clone;
use clone::{Cloner, CommandRunner, SystemRunner};

mod config;
use config::{ConfigFile, KoozieConfig, Overrides};

mod webhooks;
use webhooks::{default_catcher, github::GitHubSecret, github_webhook, unauthorized};

#[derive(Parser)]
#[clap(version, about = "GitHub webhook receiver")]
struct Opts {
    /// Optional YAML configuration file, command line and environment values take precedence
    #[clap(short, long, env = "KOOZIE_CONFIG")]
    config: Option<PathBuf>,

    /// Secret shared with GitHub to sign webhook deliveries
    #[clap(long, env = "GITHUB_WEBHOOK_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Port to listen on [default: 8080]
    #[clap(short, long, env = "WEBHOOK_PORT")]
    port: Option<u16>,

    /// Clone the repository of every newly opened issue
    #[clap(long, env = "CLONE_ENABLED", value_parser = BoolishValueParser::new())]
    clone_enabled: Option<bool>,

    /// Directory repositories get cloned into [default: ./repos]
    #[clap(long, env = "CLONE_BASE_DIR")]
    clone_base_dir: Option<PathBuf>,

    /// Pull repositories that were already cloned
    #[clap(long, env = "CLONE_UPDATE_EXISTING", value_parser = BoolishValueParser::new())]
    clone_update_existing: Option<bool>,
}

impl Opts {
    fn into_config(self) -> anyhow::Result<KoozieConfig> {
        let file = match &self.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        let overrides = Overrides {
            github_secret: self.secret,
            port: self.port,
            clone_enabled: self.clone_enabled,
            clone_base_dir: self.clone_base_dir,
            clone_update_existing: self.clone_update_existing,
        };
        Ok(KoozieConfig::resolve(file, overrides)?)
    }
}

/// Assembles the server: routes, catchers and the state they rely on.
pub(crate) fn build_server(
    config: KoozieConfig,
    runner: impl CommandRunner + 'static,
) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", "0.0.0.0"))
        .merge(("port", config.port));

    rocket::custom(figment)
        .mount("/", routes![github_webhook])
        .register("/", catchers![unauthorized, default_catcher])
        .manage(GitHubSecret(config.github_secret))
        .manage(Cloner::new(config.clone, runner))
}

/// Loads the `.env` file, then builds the log filter from `RUST_LOG` (which may come from it).
fn log_filter(dotenv_file: Option<&Path>) -> EnvFilter {
    // a missing .env file is fine, everything can come from the real environment
    let _ = match dotenv_file {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(None))
        .init();

    let opts = Opts::parse();
    let config = opts.into_config().context("couldn't load configuration")?;

    info!("starting GitHub webhook server...");
    info!("listening on http://0.0.0.0:{}/webhook", config.port);
    info!("configure your GitHub webhook to point to this endpoint");
    if config.clone.enabled {
        info!(
            "cloning repositories of new issues into {}",
            config.clone.base_dir.display()
        );
    }

    let rocket = build_server(config, SystemRunner);
    rocket
        .launch()
        .await
        .map(|_| ())
        .map_err(|err| anyhow::anyhow!(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let opts = Opts::try_parse_from([
            "koozie",
            "--secret",
            "s3cret",
            "--port",
            "9090",
            "--clone-enabled",
            "yes",
            "--clone-base-dir",
            "/tmp/repos",
        ])
        .unwrap();

        let config = opts.into_config().unwrap();
        assert_eq!(config.github_secret, "s3cret");
        assert_eq!(config.port, 9090);
        assert!(config.clone.enabled);
        assert!(!config.clone.update_existing);
        assert_eq!(config.clone.base_dir, PathBuf::from("/tmp/repos"));
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("koozie.yaml");
        std::fs::write(
            &path,
            "github_secret: from-file\nclone:\n  enabled: true\n  update_existing: true\n",
        )
        .unwrap();

        let opts = Opts::try_parse_from(["koozie", "--config", path.to_str().unwrap()]).unwrap();
        let config = opts.into_config().unwrap();
        assert_eq!(config.github_secret, "from-file");
        assert!(config.clone.enabled);
        assert!(config.clone.update_existing);
    }

    #[test]
    fn log_level_can_come_from_dotenv() {
        // dotenv never overrides the real environment
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "RUST_LOG=koozie=trace\n").unwrap();

        let filter = log_filter(Some(path.as_path()));
        assert_eq!(filter.to_string(), "koozie=trace");
    }

    #[test]
    fn unreadable_config_file_is_an_error() {
        let opts = Opts::try_parse_from(["koozie", "--config", "/nonexistent/koozie.yaml"]).unwrap();
        assert!(opts.into_config().is_err());
    }
}
