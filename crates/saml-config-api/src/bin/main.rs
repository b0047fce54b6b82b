//! SAML config service entry point
//!
//! Serves the REST API, or runs one-shot keystore operations from the shell.

use clap::{Args, Parser, Subcommand};
use saml_config_api::{create_router, AppState};
use saml_config_core::{
    CredentialLoader, CredentialService, MetricsRegistry, SealedKeystoreBuilder,
    SealedKeystoreLoader, Settings,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "saml-config")]
#[command(about = "SAML provider credential configuration service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SettingsArgs {
    /// Settings file (YAML or JSON)
    #[arg(short, long, env = "SAML_CONFIG_SETTINGS")]
    config: Option<PathBuf>,

    /// Provider configuration endpoint, overrides the settings file
    #[arg(long, env = "SAML_CONFIG_ENDPOINT")]
    endpoint: Option<String>,

    /// Cache TTL in seconds; zero or negative never expires
    #[arg(long, env = "SAML_CONFIG_TTL_SECS", allow_hyphen_values = true)]
    ttl_secs: Option<i64>,

    /// Overall keystore aggregation timeout in seconds
    #[arg(long, env = "SAML_CONFIG_AGGREGATION_TIMEOUT_SECS")]
    aggregation_timeout_secs: Option<u64>,

    /// Maximum concurrent keystore loads
    #[arg(long, env = "SAML_CONFIG_MAX_WORKERS")]
    max_workers: Option<usize>,
}

impl SettingsArgs {
    fn load(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        if let Some(endpoint) = &self.endpoint {
            settings = settings.with_endpoint(endpoint);
        }
        if let Some(ttl) = self.ttl_secs {
            settings = settings.with_ttl_secs(ttl);
        }
        if let Some(timeout) = self.aggregation_timeout_secs {
            settings = settings.with_aggregation_timeout_secs(timeout);
        }
        if self.max_workers.is_some() {
            settings = settings.with_max_workers(self.max_workers);
        }

        Ok(settings)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080", env = "PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Aggregate keystore metadata for every provider once and print it
    Keystores {
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Create a sealed keystore from PEM files
    Seal {
        /// Output keystore path
        #[arg(short, long)]
        output: PathBuf,

        /// Alias of the key entry
        #[arg(short, long)]
        alias: String,

        /// PKCS#8 private key (PEM or DER)
        #[arg(long)]
        key: PathBuf,

        /// Certificate chain, leaf first (PEM or DER)
        #[arg(long)]
        cert: PathBuf,

        /// Trusted certificates as ALIAS=PATH
        #[arg(long = "trusted", value_parser = parse_trusted)]
        trusted: Vec<(String, PathBuf)>,

        /// Keystore password
        #[arg(long, env = "SAML_KEYSTORE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Open a keystore and print its metadata
    Inspect {
        /// Keystore path
        path: PathBuf,

        /// Primary alias
        #[arg(short, long)]
        alias: String,

        /// Keystore password
        #[arg(long, env = "SAML_KEYSTORE_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

fn parse_trusted(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((alias, path)) if !alias.is_empty() && !path.is_empty() => {
            Ok((alias.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected ALIAS=PATH, got {}", value)),
    }
}

fn build_service(settings: &Settings, metrics: &MetricsRegistry) -> anyhow::Result<CredentialService> {
    Ok(CredentialService::from_settings(
        settings,
        Some(metrics.metrics()),
    )?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            settings,
        } => {
            let settings = settings.load()?;
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            let metrics = MetricsRegistry::new()?;
            let service = Arc::new(build_service(&settings, &metrics)?);

            let config = service.init().await?;
            tracing::info!(
                providers = config.provider_count(),
                endpoint = %settings.endpoint,
                "Loaded provider configuration"
            );

            let router = create_router(Arc::new(AppState::new(service, metrics)));

            tracing::info!("Starting SAML config service on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await?;
        }

        Commands::Keystores { settings } => {
            let settings = settings.load()?;
            let metrics = MetricsRegistry::new()?;
            let service = build_service(&settings, &metrics)?;

            let result = service.get_all_credential_metadata().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if result.summary.has_errors {
                std::process::exit(1);
            }
        }

        Commands::Seal {
            output,
            alias,
            key,
            cert,
            trusted,
            password,
        } => {
            let mut builder = SealedKeystoreBuilder::new()
                .add_key_entry_pem(&alias, &std::fs::read(&key)?, &std::fs::read(&cert)?)?;
            for (trusted_alias, path) in &trusted {
                builder = builder.add_trusted_certificate_pem(trusted_alias, &std::fs::read(path)?)?;
            }

            builder.write_to(&output, &password)?;
            tracing::info!(
                path = %output.display(),
                alias = %alias,
                trusted = trusted.len(),
                "Sealed keystore written"
            );
        }

        Commands::Inspect {
            path,
            alias,
            password,
        } => {
            let store = tokio::task::spawn_blocking(move || {
                SealedKeystoreLoader::new().load(&path, &password, &alias)
            })
            .await??;

            println!("{}", serde_json::to_string_pretty(&store.metadata())?);
        }
    }

    Ok(())
}
