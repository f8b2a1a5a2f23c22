//! Resolve a credential chain and print the token
//!
//! ```text
//! azauth-token --scope https://graph.microsoft.com/.default -c azure_cli -c device_code -v
//! ```

use anyhow::Context;
use azauth::{
    CacheMode, Config, Credential, CredentialKind, CredentialParams, Resolver, credential_chain,
    default_credential_chain,
};
use clap::{Parser, ValueEnum};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Output {
    /// Expiry time and remaining validity
    #[default]
    Expiry,
    /// `Authorization` header value
    Header,
    /// Bare access token
    Token,
}

#[derive(Debug, Parser)]
#[command(version, about = "Acquire an Azure bearer token")]
struct Args {
    /// Scope to request
    #[arg(short, long)]
    scope: Option<String>,

    /// Credential to try, in order (default: the full default chain)
    #[arg(short, long = "credential", value_name = "KIND")]
    credentials: Vec<CredentialKind>,

    /// Tenant ID or domain
    #[arg(short, long)]
    tenant: Option<String>,

    /// Keep tokens in memory instead of on disk
    #[arg(long)]
    no_disk_cache: bool,

    /// What to print
    #[arg(short, long, value_enum, default_value_t)]
    output: Output,

    /// Report each credential attempt on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Override with RUST_LOG env var for more detail
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("azauth=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let chain = if args.credentials.is_empty() {
        default_credential_chain()
    } else {
        credential_chain(args.credentials.iter().copied())?
    };

    let params = CredentialParams {
        scope: args.scope.clone(),
        tenant_id: args.tenant.clone(),
        cache_mode: args.no_disk_cache.then_some(CacheMode::Memory),
        ..CredentialParams::default()
    };

    // This binary owns the process, so Ctrl-C may abort a sign-in
    let mut config = Config::from_env();
    config.handle_ctrl_c = true;

    let resolution = Resolver::new(chain, config)
        .with_params(params)
        .verbose(args.verbose)
        .resolve_traced()
        .await
        .context("no credential could provide a token")?;

    tracing::debug!(credential = %resolution.name, "Token source resolved");

    let token = resolution.credential.get_token().await?;
    match args.output {
        Output::Expiry => {
            let remaining = token.remaining_validity().unwrap_or_default();
            println!(
                "{} token expires at {} ({}s remaining)",
                token.token_type,
                token.expires_at,
                remaining.as_secs()
            );
        }
        Output::Header => println!("{}", token.authorization_header()),
        Output::Token => println!("{}", token.access_token),
    }

    Ok(())
}
