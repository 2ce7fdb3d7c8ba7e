use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use url::Url;

mod commands;

#[derive(Parser)]
#[command(name = "wikibots")]
#[command(version, about = "Shared launcher for MediaWiki maintenance bots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to a MediaWiki instance and store credentials under a profile
    Login {
        /// Wiki API URL (e.g., https://en.wikipedia.org/w/api.php)
        #[arg(long)]
        wiki: Url,

        /// Bot username
        #[arg(long)]
        username: String,

        /// Profile ID to save credentials under
        #[arg(long, default_value = "default")]
        profile: String,
    },

    /// Replicate recent changes and enqueue jobs for them
    Sync {
        /// Wiki API URL
        #[arg(long)]
        wiki: Url,

        /// Profile file path (TOML)
        #[arg(long)]
        profile: PathBuf,

        /// Profile ID for credentials
        #[arg(long, default_value = "default")]
        auth_profile: String,

        /// Stable identifier this bot's resume state is kept under
        #[arg(long)]
        bot_id: String,

        /// Bot account name, used for exclusion and emergency-stop checks
        #[arg(long)]
        bot_name: String,

        /// Parent directory for local stores and state files
        #[arg(long)]
        datadir: PathBuf,

        /// Changelog store path (default: <datadir>/changelog.sqlite)
        #[arg(long)]
        rcdatabasefile: Option<PathBuf>,

        /// Directory holding per-bot resume state (default: <datadir>)
        #[arg(long)]
        statefile: Option<PathBuf>,

        /// No remote writes, no queue mutations, no resume-token persistence
        #[arg(long)]
        dryrun: bool,

        /// Emit a progress log line every N changes scanned
        #[arg(long, default_value = "50")]
        log_every_n: u32,
    },

    /// Drain the job queue against the registered handlers
    Run {
        /// Wiki API URL
        #[arg(long)]
        wiki: Url,

        /// Profile file path (TOML)
        #[arg(long)]
        profile: PathBuf,

        /// Profile ID for credentials
        #[arg(long, default_value = "default")]
        auth_profile: String,

        /// Stable identifier this bot's resume state is kept under
        #[arg(long)]
        bot_id: String,

        /// Bot account name, used for exclusion and emergency-stop checks
        #[arg(long)]
        bot_name: String,

        /// Parent directory for local stores and state files
        #[arg(long)]
        datadir: PathBuf,

        /// Changelog store path (default: <datadir>/changelog.sqlite)
        #[arg(long)]
        rcdatabasefile: Option<PathBuf>,

        /// Directory holding per-bot resume state (default: <datadir>)
        #[arg(long)]
        statefile: Option<PathBuf>,

        /// No remote writes, no queue mutations
        #[arg(long)]
        dryrun: bool,

        /// Caps the number of queue reads this invocation will spend
        #[arg(long, default_value = "100")]
        max_jobs_per_run: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    wikibots_telemetry::init_telemetry(&wikibots_telemetry::TelemetryConfig {
        log_dir: "logs".into(),
        level: tracing::Level::INFO,
        json_output: true,
        human_output: true,
    })?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Login {
            wiki,
            username,
            profile,
        } => commands::login::run(wiki, username, profile).await,
        Commands::Sync {
            wiki,
            profile,
            auth_profile,
            bot_id,
            bot_name,
            datadir,
            rcdatabasefile,
            statefile,
            dryrun,
            log_every_n,
        } => {
            commands::sync::run(commands::sync::SyncArgs {
                wiki,
                profile_path: profile,
                auth_profile,
                bot_id,
                bot_name,
                datadir,
                rcdatabasefile,
                statefile,
                dryrun,
                log_every_n,
            })
            .await
        }
        Commands::Run {
            wiki,
            profile,
            auth_profile,
            bot_id,
            bot_name,
            datadir,
            rcdatabasefile,
            statefile,
            dryrun,
            max_jobs_per_run,
        } => {
            commands::run::run(commands::run::RunArgs {
                wiki,
                profile_path: profile,
                auth_profile,
                bot_id,
                bot_name,
                datadir,
                rcdatabasefile,
                statefile,
                dryrun,
                max_jobs_per_run,
            })
            .await
        }
    }
}
