//! resilience-probe: issue reads through the full pipeline and print signals.
//!
//! Usage:
//!   resilience-probe [--config <file>] [--base-url <url>] [--token <access>]
//!                    [--repeat <n>] <path>...
//!
//! Each path is requested `--repeat` times concurrently, so coalescing and
//! rate limiting are visible in the printed signals.

use anyhow::{bail, Context};
use api_resilience::{ApiClient, ApiClientBuilder, AuthSession, ResilienceConfig};
use tracing_subscriber::EnvFilter;

struct Args {
    config: Option<String>,
    base_url: Option<String>,
    token: Option<String>,
    repeat: usize,
    paths: Vec<String>,
}

fn parse_args(raw: &[String]) -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        base_url: None,
        token: None,
        repeat: 1,
        paths: Vec::new(),
    };
    let mut it = raw.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = Some(it.next().context("--config needs a file")?.clone()),
            "--base-url" => args.base_url = Some(it.next().context("--base-url needs a url")?.clone()),
            "--token" => args.token = Some(it.next().context("--token needs a value")?.clone()),
            "--repeat" => {
                args.repeat = it
                    .next()
                    .context("--repeat needs a number")?
                    .parse()
                    .context("--repeat must be a positive integer")?
            }
            "help" | "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown option: {other}"),
            path => args.paths.push(path.to_string()),
        }
    }
    if args.paths.is_empty() {
        bail!("at least one path is required");
    }
    args.repeat = args.repeat.max(1);
    Ok(args)
}

fn print_usage() {
    println!(
        r#"resilience-probe

USAGE:
    resilience-probe [OPTIONS] <PATH>...

OPTIONS:
    --config <file>     YAML configuration file
    --base-url <url>    Backend base URL (overrides config)
    --token <access>    Access token to install before probing
    --repeat <n>        Concurrent copies of each request (default 1)

ENVIRONMENT:
    RUST_LOG                     Log filter (default: info)
    API_BASE_URL                 Backend base URL
    API_HTTP_TIMEOUT_SECS        Request timeout
    API_PROXY_URL                Proxy for all requests"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}\n");
            print_usage();
            std::process::exit(1);
        }
    };

    let mut builder = match &args.config {
        Some(path) => ApiClientBuilder::from_config(
            ResilienceConfig::load(path)
                .await
                .with_context(|| format!("loading {path}"))?,
        ),
        None => ApiClient::builder(),
    };
    if let Some(url) = &args.base_url {
        builder = builder.base_url(url.clone());
    }
    let client = builder.build().context("building client")?;

    if let Some(token) = &args.token {
        client.login(AuthSession::new(token.clone())).await?;
    }

    for path in &args.paths {
        let calls = (0..args.repeat).map(|_| client.get(path));
        for (i, outcome) in futures::future::join_all(calls).await.into_iter().enumerate() {
            match outcome {
                Ok(resp) => println!(
                    "{path} #{i}: {} ({}){}",
                    resp.status,
                    if resp.from_cache { "cache" } else { "network" },
                    preview(&resp.body.to_string())
                ),
                Err(e) => println!(
                    "{path} #{i}: {} [{}]",
                    e,
                    e.kind().map(|k| k.name()).unwrap_or("internal")
                ),
            }
        }
    }

    let signals = client.signals();
    println!("\nsignals:");
    for rl in &signals.rate_limits {
        println!(
            "  class {:<14} {}/{} in window, blocked {:?}ms",
            rl.class,
            rl.count,
            rl.max_requests,
            rl.blocked_remaining_ms.unwrap_or(0)
        );
    }
    println!(
        "  cache: {} hits, {} misses, {} entries",
        signals.cache.hits, signals.cache.misses, signals.cache.entries
    );
    println!("  refresh phase: {:?}", signals.refresh_phase);
    Ok(())
}

fn preview(body: &str) -> String {
    const MAX: usize = 80;
    if body.chars().count() <= MAX {
        format!(" {body}")
    } else {
        format!(" {}...", body.chars().take(MAX).collect::<String>())
    }
}
