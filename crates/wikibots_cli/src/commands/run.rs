use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;
use wikibots_bot::{BotConfig, BotDaemon, EditJobHandler};
use wikibots_client::client::{MediaWikiClient, ReqwestMwClient};
use wikibots_domain::profile::AuthMethod;
use wikibots_domain::types::Namespace;
use wikibots_domain::{Clock, SystemClock};
use wikibots_engine::page_mutator::{PageMutator, TalkPageEmergencyStop, WriteFlags};
use wikibots_runner::{HandlerRegistry, JobHandler};
use wikibots_security::{CredentialPort, FileCredentialStore};
use wikibots_storage::{ChangeLog, JobQueue, JsonStateStore, TomlConfigStore};

pub struct RunArgs {
    pub wiki: Url,
    pub profile_path: PathBuf,
    pub auth_profile: String,
    pub bot_id: String,
    pub bot_name: String,
    pub datadir: PathBuf,
    pub rcdatabasefile: Option<PathBuf>,
    pub statefile: Option<PathBuf>,
    pub dryrun: bool,
    pub max_jobs_per_run: i64,
}

pub async fn run(args: RunArgs) -> Result<()> {
    println!("{}", style("Run").bold().cyan());
    println!("Wiki: {}", args.wiki);
    println!("Bot:  {} ({})", args.bot_name, args.bot_id);
    println!(
        "Mode: {}",
        if args.dryrun {
            style("DRY-RUN").yellow()
        } else {
            style("LIVE").green().bold()
        }
    );
    println!();

    let config_store = TomlConfigStore::new(&args.profile_path);
    let profile = config_store
        .load_profile(&args.auth_profile)
        .context("Failed to load profile. Create one first or use a different auth-profile.")?;

    let username = match &profile.auth_method {
        AuthMethod::BotPassword { username } => username.clone(),
        _ => anyhow::bail!("run currently only supports bot-password profiles"),
    };

    let cred_store = FileCredentialStore::new().context("Failed to initialize credential store")?;
    let password = cred_store
        .get_password(&args.auth_profile)
        .context("No stored credentials found. Run 'login' first.")?;

    let client = ReqwestMwClient::new(args.wiki.clone(), profile.throttle_policy.clone());
    client
        .login_bot_password(&username, &password)
        .await
        .context("Authentication failed")?;
    client
        .fetch_csrf_token()
        .await
        .context("Failed to fetch CSRF token")?;
    let client = Arc::new(client);

    std::fs::create_dir_all(&args.datadir)
        .with_context(|| format!("Failed to create data directory {}", args.datadir.display()))?;

    let config = BotConfig::new(args.bot_id.clone(), args.bot_name.clone(), args.datadir.clone())
        .with_dry_run(args.dryrun)
        .with_max_jobs_per_run(args.max_jobs_per_run);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let changelog_path = args.rcdatabasefile.unwrap_or_else(|| config.changelog_path());
    let changelog = ChangeLog::open(&changelog_path, Arc::clone(&clock))
        .with_context(|| format!("Failed to open changelog store at {}", changelog_path.display()))?;
    let job_queue = JobQueue::open(config.jobqueue_path(), Arc::clone(&clock))
        .context("Failed to open job queue")?;
    let state_dir = args.statefile.unwrap_or_else(|| config.state_dir().to_path_buf());
    let state_store = Arc::new(JsonStateStore::new(state_dir));

    let emergency_stop = Arc::new(TalkPageEmergencyStop::new(
        Arc::clone(&client),
        args.bot_name.clone(),
        "emergency stop",
        &clock,
    ));
    let mutator = PageMutator::new(
        Arc::clone(&client),
        args.bot_name.clone(),
        config.message_type.clone(),
        emergency_stop,
    );

    // The minimal illustrative handler this binary ships with: it collapses
    // runs of spaces in the page body. Individual bot tasks register their
    // own handlers under their own job-handler prefix.
    let mut handlers: HandlerRegistry = HandlerRegistry::new();
    let handler: Arc<dyn JobHandler> = Arc::new(EditJobHandler::new(
        mutator,
        Namespace::MAIN,
        WriteFlags::empty(),
        |content: &mut String, _summary: &mut String| {
            while content.contains("  ") {
                *content = content.replace("  ", " ");
            }
        },
    ));
    handlers.insert("page-normalize".to_string(), handler);

    let daemon = BotDaemon::new(config, changelog, job_queue, state_store, clock);
    let report = daemon.run(&handlers).await.context("Run failed")?;

    println!("{}", report.to_summary());
    Ok(())
}
