use clap::Parser;
use registry_bearer_transport::auth::{Anonymous, Authenticator, from_config};
use registry_bearer_transport::error::handlers::status_error;
use registry_bearer_transport::logging::Logger;
use registry_bearer_transport::transport::{Transport, from_ping, ping};
use registry_bearer_transport::{Config, Registry, Repository, Result, TransportError};
use reqwest::{Method, Request};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "registry-bearer-transport")]
#[command(about = "Authenticate against a container registry and send one request")]
struct Cli {
    /// Registry host, e.g. registry.example.com or localhost:5000
    registry: String,

    /// Repository to request a token scope for
    #[arg(short, long)]
    repository: Option<String>,

    /// Actions requested on the repository
    #[arg(short, long, default_value = "pull")]
    action: String,

    /// Path requested once authenticated
    #[arg(long, default_value = "/v2/")]
    path: String,

    /// Username for authentication (or REGISTRY_USERNAME)
    #[arg(short, long)]
    username: Option<String>,

    /// Password for authentication (or REGISTRY_PASSWORD)
    #[arg(short, long)]
    password: Option<String>,

    /// OAuth2 refresh token (or REGISTRY_IDENTITY_TOKEN)
    #[arg(long)]
    identity_token: Option<String>,

    /// Allow plain http for this registry
    #[arg(long)]
    insecure: bool,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let logger = Logger::new(cli.verbose, cli.quiet);
    logger.init_tracing();

    match run(cli, &logger).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logger.error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, logger: &Logger) -> Result<()> {
    let config = Config::from_env().merge(
        cli.username,
        cli.password,
        cli.identity_token,
        cli.insecure,
    );

    let registry = if config.insecure {
        Registry::insecure(&cli.registry)?
    } else {
        Registry::new(&cli.registry)?
    };

    let scopes = match &cli.repository {
        Some(name) => vec![Repository::new(registry.clone(), name)?.scope(&cli.action)],
        None => Vec::new(),
    };

    let auth: Arc<dyn Authenticator> = if config.has_auth() {
        from_config(config.auth.clone())
    } else {
        logger.info("No credentials provided, proceeding anonymously");
        Arc::new(Anonymous)
    };

    logger.section(&format!("Registry {}", registry));
    let inner: Arc<dyn Transport> = Arc::new(reqwest::Client::new());

    let pr = ping(&registry, inner.as_ref()).await?;
    logger.detail(&format!("Scheme: {}", pr.scheme));
    logger.detail(&format!("Challenge: {:?}", pr.challenge));
    for (key, value) in &pr.parameters {
        logger.detail(&format!("  {}={}", key, value));
    }
    for scope in &scopes {
        logger.detail(&format!("Scope: {}", scope));
    }

    let scheme = pr.scheme;
    let transport = from_ping(&registry, auth, inner, scopes, pr)?;

    let url = format!("{}://{}{}", scheme, registry.registry_str(), cli.path);
    let url = url::Url::parse(&url)
        .map_err(|e| TransportError::InvalidRegistry(format!("{}: {}", url, e)))?;

    logger.info(&format!("GET {}", url));
    let response = transport.round_trip(Request::new(Method::GET, url)).await?;
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_success() {
        logger.success(&format!(
            "{} ({}, {} ms)",
            status,
            logger.format_size(body.len() as u64),
            logger.elapsed_ms()
        ));
        Ok(())
    } else {
        logger.warning(&format!("Registry answered {}", status));
        Err(status_error(status, String::from_utf8_lossy(&body).into_owned()))
    }
}
