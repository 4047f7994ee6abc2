// Command line front-end: argument definitions, logging setup and the
// top-level flow. Everything that can be rejected up front (lists, action,
// config, token, base URL, HTTP client) is checked before the first request.

use crate::action::Action;
use crate::api::ApiClient;
use crate::config::{
    load_config, normalize_authorization, normalize_base_url, resolve_token,
};
use crate::driver::{self, Outcome};
use crate::users::{parse_contest_ids, parse_users};
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(
        long,
        allow_hyphen_values = true,
        help = "Users as id:name pairs separated by ';' or ','"
    )]
    pub users: String,

    #[arg(
        long,
        allow_hyphen_values = true,
        help = "Contest IDs separated by ';' or ','"
    )]
    pub contests: String,

    #[arg(long, default_value = "register", help = "register or unregister")]
    pub action: Action,

    #[arg(
        long,
        allow_hyphen_values = true,
        default_value = "http://localhost",
        help = "Base URL of the ejudge installation"
    )]
    pub base_url: String,

    #[arg(
        long,
        allow_hyphen_values = true,
        help = "Authorization header value; overrides the config file"
    )]
    pub token: Option<String>,

    #[arg(
        long,
        allow_hyphen_values = true,
        help = "JSON file with secrets, e.g. {\"token\": \"...\"}"
    )]
    pub config: Option<String>,

    #[arg(
        long,
        default_value = "15s",
        value_parser = humantime::parse_duration,
        help = "Timeout for each HTTP request"
    )]
    pub timeout: Duration,

    #[arg(long, help = "Skip TLS certificate verification")]
    pub insecure: bool,

    #[arg(long, help = "Prefix a bare token with 'Bearer '")]
    pub normalize_auth: bool,

    #[arg(long, help = "Enable debug logging")]
    pub debug: bool,
}

/// Rewrite `-flag` to `--flag` for every long option we define, so the
/// single-dash spelling works as well. Stops at a bare `--`.
pub fn normalize_flag_prefix<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let command = Args::command();
    let longs: Vec<&str> = command.get_arguments().filter_map(|arg| arg.get_long()).collect();

    let mut passthrough = false;
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 || passthrough || arg.starts_with("--") || !arg.starts_with('-') {
                passthrough |= arg == "--";
                return arg;
            }
            let name = arg[1..].split('=').next().unwrap_or_default();
            if longs.contains(&name) {
                format!("-{}", arg)
            } else {
                arg
            }
        })
        .collect()
}

pub fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

/// Validate everything, then run the whole contest × user product.
pub fn run(args: Args) -> Result<ExitCode> {
    let users = parse_users(&args.users).context("failed to parse users")?;
    let contests = parse_contest_ids(&args.contests).context("failed to parse contests")?;

    let config_path = args.config.as_deref().map(str::trim).map(Path::new);
    let config = load_config(config_path).context("failed to load config")?;

    let mut token = resolve_token(args.token.as_deref(), &config)?;
    if args.normalize_auth {
        token = normalize_authorization(&token);
    }
    let base_url = normalize_base_url(&args.base_url)?;

    let client = ApiClient::new(&base_url, &token, args.timeout, args.insecure)?;
    info!(
        endpoint = %client.endpoint(),
        action = %args.action,
        contests = contests.len(),
        users = users.len(),
        "starting"
    );

    let progress = progress_bar(contests.len() * users.len(), args.debug);
    let outcome = driver::run_all(&client, &contests, &users, args.action, &progress);
    progress.finish_and_clear();

    Ok(report(&outcome))
}

/// The bar stays hidden with `--debug`, whose request logs would tear it.
fn progress_bar(total: usize, debug: bool) -> ProgressBar {
    if debug {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}") {
        progress.set_style(style);
    }
    progress
}

/// Log the collected failures and map the outcome to an exit code.
pub fn report(outcome: &Outcome) -> ExitCode {
    if outcome.is_success() {
        info!("all {} registration changes succeeded", outcome.total());
        return ExitCode::SUCCESS;
    }
    for failure in &outcome.failures {
        error!("{}", failure);
    }
    error!(
        "{} of {} registration changes failed",
        outcome.failures.len(),
        outcome.total()
    );
    ExitCode::FAILURE
}
