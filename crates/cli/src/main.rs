use clap::{Parser, Subcommand, ValueEnum};
use extguard_cli::{get_config_dir, serve, Services};
use extguard_console::{AdminView, FileSelection, NoticeKind, SubmitOutcome, UploadTestView};
use extguard_core::config::AppConfig;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "extguard")]
#[command(version = VERSION)]
#[command(about = "File extension blocklist admin and upload checker")]
struct Cli {
    /// Config file (default: ~/.extguard/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Policy server to talk to (default: client.server_url)
    #[arg(long, global = true, env = "EXTGUARD_SERVER_URL")]
    server: Option<String>,

    /// Open the storage backend directly instead of going through a server
    #[arg(long, global = true, conflicts_with = "server")]
    local: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the policy server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show the whole policy
    Show,
    /// List fixed extensions and their blocked state
    Fixed,
    /// Block or unblock a fixed extension
    Toggle {
        extension: String,
        #[arg(value_enum)]
        state: FixedState,
    },
    /// List custom extensions
    Custom,
    /// Add a custom extension
    Add { extension: String },
    /// Remove a custom extension
    Remove { extension: String },
    /// Confirm the current policy
    Save,
    /// Check whether a file would be accepted
    Upload {
        path: PathBuf,
        #[arg(short, long, default_value = "")]
        title: String,
    },
    /// Show recent upload checks
    History,
    /// Show server counters
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum FixedState {
    Blocked,
    Allowed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (non_blocking, _guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
        get_config_dir().join("logs"),
        "audit.jsonl",
    ));

    let audit_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_target(false)
        .with_level(false)
        .with_file(false)
        .with_line_number(false)
        .without_time() // audit lines carry their own timestamp
        .with_filter(tracing_subscriber::filter::Targets::new().with_target("audit", Level::INFO));

    // Only the server logs at info by default; one-shot commands keep stdout for their output.
    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        Level::INFO
    } else {
        Level::WARN
    };
    let stdout_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(stdout_filter)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() != "audit"
        }));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(audit_layer)
        .init();

    let config = AppConfig::load(cli.config.clone())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    match cli.command {
        Commands::Serve { port } => serve(&config, port).await,
        command => {
            let services = if cli.local {
                extguard_cli::prepare_storage(&config).await?;
                Services::local(&config).await?
            } else {
                let url = cli
                    .server
                    .unwrap_or_else(|| config.client.server_url.clone());
                Services::remote(&url, config.client.auth_token.clone())?
            };
            run_command(&services, command).await
        }
    }
}

async fn run_command(services: &Services, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Upload { path, title } => run_upload(services, path, &title).await,
        Commands::History => {
            let view = UploadTestView::new(services.judge.clone());
            view.load_recent().await?;
            print!("{}", view.render());
            Ok(())
        }
        Commands::Status => run_status(services).await,
        admin_command => run_admin(services, admin_command).await,
    }
}

async fn run_admin(services: &Services, command: Commands) -> anyhow::Result<()> {
    let mut view = AdminView::new(services.policy.clone());
    view.load().await?;

    let result = match &command {
        Commands::Toggle { extension, state } => {
            let blocked = matches!(state, FixedState::Blocked);
            view.toggle_fixed(extension, blocked).await
        }
        Commands::Add { extension } => view.add_custom(extension).await.map(|_| ()),
        Commands::Remove { extension } => view.remove_custom(extension).await,
        Commands::Save => {
            view.save();
            Ok(())
        }
        _ => Ok(()),
    };

    for notice in view.take_notices() {
        match notice.kind {
            NoticeKind::Error => eprintln!("error: {}", notice.message),
            NoticeKind::Info => println!("{}", notice.message),
        }
    }

    match command {
        Commands::Fixed => {
            for f in view.fixed() {
                println!("{:<10} {}", f.extension, if f.checked { "blocked" } else { "allowed" });
            }
        }
        Commands::Custom => {
            println!("{}/{}", view.custom_count(), view.limits().max_custom_extensions);
            for chip in view.chips() {
                println!("{}", chip.extension);
            }
        }
        _ => print!("{}", view.render()),
    }

    Ok(result?)
}

async fn run_upload(services: &Services, path: PathBuf, title: &str) -> anyhow::Result<()> {
    let selection = match FileSelection::from_path(&path).await {
        Ok(selection) => Some(selection),
        Err(e) => {
            eprintln!("Cannot read {}: {}", path.display(), e);
            None
        }
    };

    let view = UploadTestView::new(services.judge.clone());
    view.set_title(title);
    let outcome = view.submit(selection).await;
    print!("{}", view.render());

    match outcome {
        SubmitOutcome::Failed(message) => Err(anyhow::anyhow!(message)),
        SubmitOutcome::Judged(_) | SubmitOutcome::Busy => Ok(()),
    }
}

async fn run_status(services: &Services) -> anyhow::Result<()> {
    let source = if services.is_remote() { "server" } else { "local" };
    let snapshot = services.metrics_snapshot().await?;
    println!("extguard {} ({})\n", VERSION, source);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
