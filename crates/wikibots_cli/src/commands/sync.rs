use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;
use wikibots_bot::{BotConfig, BotDaemon, ChangeClassifier, WikiChangeSource};
use wikibots_client::client::{MediaWikiClient, ReqwestMwClient};
use wikibots_domain::change::{ChangeKind, RawChange};
use wikibots_domain::profile::AuthMethod;
use wikibots_domain::{Clock, SystemClock};
use wikibots_security::{CredentialPort, FileCredentialStore};
use wikibots_storage::{ChangeLog, Job, JobQueue, JsonStateStore, TomlConfigStore};

pub struct SyncArgs {
    pub wiki: Url,
    pub profile_path: PathBuf,
    pub auth_profile: String,
    pub bot_id: String,
    pub bot_name: String,
    pub datadir: PathBuf,
    pub rcdatabasefile: Option<PathBuf>,
    pub statefile: Option<PathBuf>,
    pub dryrun: bool,
    pub log_every_n: u32,
}

/// Enqueues a `page-normalize` job for every non-log change, the minimal
/// illustrative classifier this binary ships with. Individual bot tasks are
/// each their own collaborator; this one just exercises the pipeline end to
/// end from a fresh checkout.
struct PageNormalizeClassifier;

impl ChangeClassifier for PageNormalizeClassifier {
    fn classify(&self, change: &RawChange) -> Option<Job> {
        if change.kind != ChangeKind::Edit {
            return None;
        }
        Some(Job::new(
            "page-normalize",
            change.title.display.clone(),
            0,
            change.timestamp,
        ))
    }
}

pub async fn run(args: SyncArgs) -> Result<()> {
    println!("{}", style("Sync").bold().cyan());
    println!("Wiki: {}", args.wiki);
    println!("Bot:  {} ({})", args.bot_name, args.bot_id);
    println!();

    let config_store = TomlConfigStore::new(&args.profile_path);
    let profile = config_store
        .load_profile(&args.auth_profile)
        .context("Failed to load profile. Create one first or use a different auth-profile.")?;

    let username = match &profile.auth_method {
        AuthMethod::BotPassword { username } => username.clone(),
        _ => anyhow::bail!("sync currently only supports bot-password profiles"),
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
    let client = Arc::new(client);

    std::fs::create_dir_all(&args.datadir)
        .with_context(|| format!("Failed to create data directory {}", args.datadir.display()))?;

    let config = BotConfig::new(args.bot_id.clone(), args.bot_name.clone(), args.datadir.clone())
        .with_dry_run(args.dryrun)
        .with_log_every_n(args.log_every_n);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let changelog_path = args.rcdatabasefile.unwrap_or_else(|| config.changelog_path());
    let changelog = ChangeLog::open(&changelog_path, Arc::clone(&clock))
        .with_context(|| format!("Failed to open changelog store at {}", changelog_path.display()))?;
    let job_queue = JobQueue::open(config.jobqueue_path(), Arc::clone(&clock))
        .context("Failed to open job queue")?;
    let state_dir = args.statefile.unwrap_or_else(|| config.state_dir().to_path_buf());
    let state_store = Arc::new(JsonStateStore::new(state_dir));

    let daemon = BotDaemon::new(config, changelog, job_queue, state_store, clock);
    let source = WikiChangeSource::new(Arc::clone(&client));

    let report = daemon
        .sync(&source, &PageNormalizeClassifier)
        .await
        .context("Sync failed")?;

    println!("{}", report.to_summary());
    Ok(())
}
