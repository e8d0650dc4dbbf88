use clap::{Parser, Subcommand};
use levelgate::access::seed::{apply_seed, load_seed};
use levelgate::access::types::PolicyKey;
use levelgate::access::{Level, Module, Role, User};
use levelgate::errors::GateError;
use levelgate::{settings, storage, web};
use miette::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "levelgate",
    version,
    about = "Access control resolver for JLPT study content"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the access control API (default)
    Serve,
    /// Evaluate a single access check and print the decision
    Check {
        /// level, jlpt or dashboard
        #[arg(long)]
        module: Module,
        /// n1 through n5
        #[arg(long)]
        level: Option<Level>,
        /// Id of the user; omit for an anonymous visitor
        #[arg(long)]
        user_id: Option<String>,
        /// guest, user, editor or admin
        #[arg(long, default_value = "user", requires = "user_id")]
        role: Role,
    },
    /// Print a stored policy document (materializing its default)
    Show { key: PolicyKey },
    /// Remove a stored policy document so its default applies again
    Reset { key: PolicyKey },
    /// Apply a KDL seed file
    Seed {
        file: PathBuf,
        /// Overwrite stored documents and levels named by the seed
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::debug!(?settings, "Loaded configuration");

    let evaluator = storage::evaluator(&settings)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => web::serve(settings, evaluator).await?,
        Command::Check {
            module,
            level,
            user_id,
            role,
        } => {
            let user = user_id.map(|id| User::new(id, role));
            let decision = evaluator.evaluate(module, level, user.as_ref());
            print_json(&decision)?;
        }
        Command::Show { key } => {
            print_json(&evaluator.store().get_value(key))?;
        }
        Command::Reset { key } => {
            evaluator.store().reset(key)?;
            tracing::info!(%key, "Policy reset to default");
        }
        Command::Seed { file, force } => {
            let seed = load_seed(&file)?;
            let report = apply_seed(evaluator.store(), &seed, force)?;
            for key in &report.skipped {
                tracing::warn!(%key, "Stored policy kept, skipped (use --force to overwrite)");
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), GateError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
