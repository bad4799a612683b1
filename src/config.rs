use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Script endpoint every data call is POSTed to.
    pub api_url: String,
    /// Kill switch document; `None` skips the startup check.
    pub flag_url: Option<String>,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl VerifierConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            api_url: cli_api_url,
            flag_url: cli_flag_url,
            request_timeout_secs: cli_timeout,
            user_agent: cli_user_agent,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            api_url: file_api_url,
            flag_url: file_flag_url,
            request_timeout_secs: file_timeout,
            user_agent: file_user_agent,
        } = file_config;

        let api_url = cli_api_url
            .or(file_api_url)
            .map(|url| url.trim().to_string())
            .unwrap_or_default();

        let flag_url = cli_flag_url
            .or(file_flag_url)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let request_timeout = Duration::from_secs(
            cli_timeout
                .or(file_timeout)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        let user_agent = cli_user_agent
            .or(file_user_agent)
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(default_user_agent);

        Ok(Self {
            api_url,
            flag_url,
            request_timeout,
            user_agent,
        })
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.api_url.is_empty(),
            "no API URL configured; set --api-url or SHEET_VERIFIER_API_URL"
        );
        check_http_url("API URL", &self.api_url)?;
        if let Some(flag_url) = &self.flag_url {
            check_http_url("flag URL", flag_url)?;
        }
        anyhow::ensure!(
            !self.request_timeout.is_zero(),
            "request timeout must be at least one second"
        );
        Ok(())
    }
}

fn default_user_agent() -> String {
    format!("sheet-verifier/{}", env!("CARGO_PKG_VERSION"))
}

fn check_http_url(what: &str, raw: &str) -> Result<()> {
    let url = Url::parse(raw).with_context(|| format!("{what} {raw:?} is not a valid URL"))?;
    anyhow::ensure!(
        matches!(url.scheme(), "http" | "https"),
        "{what} {raw:?} must use http or https"
    );
    Ok(())
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "sheet-verifier",
    about = "Check the kill switch and sheet data the verification workflow runs on",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "SHEET_VERIFIER_API_URL",
        value_name = "URL",
        help = "Script endpoint serving the sheet data"
    )]
    pub api_url: Option<String>,

    #[arg(
        long,
        env = "SHEET_VERIFIER_FLAG_URL",
        value_name = "URL",
        help = "Kill switch document checked before loading"
    )]
    pub flag_url: Option<String>,

    #[arg(
        long,
        env = "SHEET_VERIFIER_REQUEST_TIMEOUT",
        value_name = "SECS",
        help = "Timeout for each remote call",
        value_parser = clap::value_parser!(u64)
    )]
    pub request_timeout_secs: Option<u64>,

    #[arg(
        long,
        env = "SHEET_VERIFIER_USER_AGENT",
        value_name = "UA",
        help = "User agent sent with every request"
    )]
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    api_url: Option<String>,
    flag_url: Option<String>,
    request_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
