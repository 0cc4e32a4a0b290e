use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lookalike_core::{PipelineConfig, PredictionService};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lookalike", about = "Celebrity lookalike prediction CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the closest celebrities for an image
    Predict {
        /// JPEG or PNG file to classify
        image: PathBuf,
        #[command(flatten)]
        local: LocalArgs,
        /// Number of ranked predictions to return (local mode only)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// List the celebrities the model can recognize
    Celebrities {
        #[command(flatten)]
        local: LocalArgs,
    },
    /// Show daemon health
    Status {
        /// Connect to lookaliked on the system bus instead of the session bus
        #[arg(long)]
        system: bool,
    },
}

#[derive(Args)]
struct LocalArgs {
    /// Load the models in-process instead of asking lookaliked
    #[arg(long)]
    local: bool,
    /// Model directory for --local (default: $LOOKALIKE_MODEL_DIR or ~/.local/share/lookalike/models)
    #[arg(long, requires = "local")]
    model_dir: Option<PathBuf>,
    /// Connect to lookaliked on the system bus instead of the session bus
    #[arg(long, conflicts_with = "local")]
    system: bool,
}

// D-Bus proxy — `#[zbus::proxy]` generates `LookalikeProxy` (async) and
// `LookalikeProxyBlocking`. Only the async variant is used here.
#[zbus::proxy(
    interface = "org.lookalike.Lookalike1",
    default_service = "org.lookalike.Lookalike1",
    default_path = "/org/lookalike/Lookalike1"
)]
trait Lookalike {
    async fn predict(&self, image: &[u8]) -> zbus::Result<String>;
    async fn celebrities(&self) -> zbus::Result<String>;
    async fn health(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Predict { image, local, top_k } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            if local.local {
                let mut config = pipeline_config(&local);
                if let Some(k) = top_k {
                    config.top_k = k;
                }
                let service = load_service(&config)?;
                let result = service.predict(&bytes)?;
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let json = proxy(local.system).await?.predict(&bytes).await?;
                print_json(&json)?;
            }
        }
        Commands::Celebrities { local } => {
            if local.local {
                let service = load_service(&pipeline_config(&local))?;
                for (index, name) in service.celebrities().iter().enumerate() {
                    println!("{index:>2}  {name}");
                }
            } else {
                let json = proxy(local.system).await?.celebrities().await?;
                print_json(&json)?;
            }
        }
        Commands::Status { system } => match proxy(system).await {
            Ok(proxy) => print_json(&proxy.health().await?)?,
            Err(e) => println!("lookaliked: not connected ({e})"),
        },
    }

    Ok(())
}

fn pipeline_config(args: &LocalArgs) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.apply_env();
    if let Some(dir) = &args.model_dir {
        config.model_dir = dir.clone();
    }
    config
}

fn load_service(config: &PipelineConfig) -> Result<PredictionService> {
    tracing::debug!(model_dir = %config.model_dir.display(), "loading models in-process");
    PredictionService::load(config)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))
}

async fn proxy(system: bool) -> Result<LookalikeProxy<'static>> {
    let conn = if system {
        zbus::Connection::system().await?
    } else {
        zbus::Connection::session().await?
    };
    Ok(LookalikeProxy::new(&conn).await?)
}

fn print_json(json: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
