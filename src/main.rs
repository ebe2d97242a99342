use clap::{Parser, Subcommand};
use image_transformer::config::{self, ServiceConfig};
use image_transformer::server::TransformService;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "image-transformer")]
#[command(about = "HTTP service that transforms a region of a PNG image")]
#[command(long_about = "\
HTTP service that transforms a region of a PNG image

Post a PNG (at most 100 KiB, 1000x1000 by default) to

  POST /process/<operation>/<x>,<y>,<width>,<height>

Operations:
  rotate-cw, rotate-ccw     rotate 90 degrees, area is in rotated coordinates
  flip-h, flip-v            mirror horizontally or vertically
  grayscale, sepia          color filters
  threshold(N)              black/white at N percent intensity, 0..=100

Negative width or height extend left or up from (x, y). The area is clipped
to the image; an area outside the image returns 204.

Responses: 200 PNG, 204 empty area, 400 bad request, 429 busy, 500 internal.

Run 'image-transformer gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override server.host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Override server.port
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the service and run until Ctrl+C or SIGTERM
    Serve,
    /// Load and validate the config, then print the effective settings
    CheckConfig,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => {
            init_logging();
            let config = resolve(&cli)?;
            init_thread_pool(&config.processing);

            let mut service = TransformService::new(&config);
            service.start().await?;
            shutdown_signal().await;
            info!("shutdown requested");
            service.stop().await;
        }
        Command::CheckConfig => {
            let config = resolve(&cli)?;
            println!("bind address:    {}", config.server.bind_address());
            println!(
                "slots:           {}",
                config::effective_slots(&config.processing)
            );
            println!(
                "filter threads:  {}",
                config::effective_threads(&config.processing)
            );
            println!("max body bytes:  {}", config.limits.max_body_bytes);
            println!(
                "max image size:  {}x{}",
                config.limits.max_image_width, config.limits.max_image_height
            );
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config file and apply command line overrides.
fn resolve(cli: &Cli) -> Result<ServiceConfig, config::ConfigError> {
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;
    Ok(config)
}

/// `RUST_LOG` wins; otherwise `info`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
