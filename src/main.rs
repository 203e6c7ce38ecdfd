mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use cs_core::config::Config;
use cs_playback::{NegotiateOptions, StreamNegotiator};

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting Cinesync server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    cs_server::start(config).await?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "cinesync=trace,cs_playback=trace,cs_server=debug,tower_http=debug".to_string()
        } else {
            "cinesync=debug,cs_playback=debug,cs_server=info,tower_http=info".to_string()
        }
    });

    // Logs go to stderr so `negotiate` output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Negotiate {
            title,
            offset,
            quality,
            force_reencode,
            session,
        } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let negotiator = StreamNegotiator::from_config(&config);
            let opts = NegotiateOptions {
                offset_seconds: offset,
                quality,
                force_reencode,
                session,
                ..Default::default()
            };
            let descriptor = negotiator.build_stream_descriptor(&title, &opts);
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
            Ok(())
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("cinesync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = Config::load(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Upstream: {}", config.upstream.url);
    println!("  Token configured: {}", config.upstream.token.is_some());
    println!("  Qualities: {}", config.quality_catalog().len());

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("Warnings:");
        for warning in warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}
