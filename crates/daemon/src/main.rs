use agent::{
    CalendarService, EnrichmentPipeline, SummaryOptions, SummaryOutcome, SyncManager, TaskQueue, TaskState,
};
use ai::StructuredExtractor;
use analysis::HeuristicAnalyzer;
use anyhow::{anyhow, bail, Context};
use mailbox::{CalendarClient, GmailClient, GoogleCalendarClient, MailboxClient};
use mailroom_core::config::Config;
use mailroom_core::types::{ProviderKind, ReplyTone};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use storage::SqliteStorage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: mailroom <command>

commands:
  sync                               fetch, reconcile and analyze new messages
  sync-events                        reconcile upcoming calendar events
  watch                              sync in the background until interrupted
  analyze <id>                       run the heuristic analyzer on a message
  summarize <id> [provider] [tone]   generate a summary (provider: openai|anthropic)
  extract <id>                       turn a message into reminders and events
  free-time [minutes] [days]         suggest free slots (default 60 minutes, 7 days)
  status                             show provider and store status";

struct AppState {
    config: Config,
    store: Arc<SqliteStorage>,
    pipeline: Arc<EnrichmentPipeline>,
    sync: Arc<SyncManager>,
    calendar: CalendarService,
}

impl AppState {
    async fn init(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(
            SqliteStorage::new(&config.database_url)
                .await
                .with_context(|| format!("opening {}", config.database_url))?,
        );

        let mailbox: Option<Arc<dyn MailboxClient>> = config
            .gmail
            .clone()
            .map(|bundle| Arc::new(GmailClient::new(bundle, config.gmail_api_base.clone())) as Arc<dyn MailboxClient>);
        if mailbox.is_none() {
            warn!("No Gmail credentials configured; message sync is disabled");
        }
        let calendar: Option<Arc<dyn CalendarClient>> = config.calendar.clone().map(|bundle| {
            Arc::new(GoogleCalendarClient::new(bundle, config.calendar_api_base.clone())) as Arc<dyn CalendarClient>
        });

        let extractor = Arc::new(StructuredExtractor::from_config(&config));
        if !extractor.registry().any_available() {
            warn!("No AI provider configured; summaries and extraction will use fallbacks");
        }

        let pipeline = Arc::new(EnrichmentPipeline::new(
            store.clone(),
            HeuristicAnalyzer::new(),
            extractor,
            TaskQueue::new(config.worker_concurrency),
        ));
        let sync = Arc::new(SyncManager::new(
            store.clone(),
            mailbox,
            calendar.clone(),
            pipeline.clone(),
            config.sync.clone(),
            config.provider_timeout,
        ));
        let calendar = CalendarService::new(store.clone(), calendar, config.provider_timeout);

        Ok(Self {
            config,
            store,
            pipeline,
            sync,
            calendar,
        })
    }
}

fn parse_id(raw: Option<&String>) -> anyhow::Result<i64> {
    let raw = raw.ok_or_else(|| anyhow!("missing message id\n\n{}", USAGE))?;
    raw.parse().with_context(|| format!("invalid message id '{}'", raw))
}

fn parse_or<T: FromStr>(raw: Option<&String>, default: T, what: &str) -> anyhow::Result<T> {
    match raw {
        Some(raw) => raw.parse().map_err(|_| anyhow!("invalid {} '{}'", what, raw)),
        None => Ok(default),
    }
}

async fn run(state: &AppState, args: &[String]) -> anyhow::Result<serde_json::Value> {
    let command = args.first().map(String::as_str).unwrap_or("help");
    match command {
        "sync" => {
            let report = state.sync.run_once().await?;
            Ok(serde_json::to_value(report)?)
        }
        "sync-events" => {
            let report = state.sync.sync_events(state.config.sync.max_results).await?;
            Ok(serde_json::to_value(report)?)
        }
        "watch" => {
            let handle = state.sync.clone().start_background_sync()?;
            info!("Watching mailbox; press Ctrl-C to stop");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutting down"),
                joined = handle => {
                    if let Err(e) = joined {
                        error!("Background sync stopped: {}", e);
                    }
                }
            }
            state.pipeline.queue().wait_idle().await;
            Ok(json!({ "stopped": true }))
        }
        "analyze" => {
            let id = parse_id(args.get(1))?;
            let result = state.pipeline.analyze_message(id).await?;
            Ok(serde_json::to_value(result)?)
        }
        "summarize" => {
            let id = parse_id(args.get(1))?;
            let provider = args
                .get(2)
                .map(|raw| ProviderKind::from_str(raw).map_err(|_| anyhow!("unknown provider '{}'", raw)))
                .transpose()?;
            let tone = args
                .get(3)
                .map(|raw| ReplyTone::parse_lenient(raw))
                .unwrap_or_default();

            let options = SummaryOptions {
                provider,
                tone,
                ..Default::default()
            };
            let outcome = state.pipeline.summarize(id, &options).await?;
            let status = match &outcome {
                SummaryOutcome::Created(_) => "created",
                SummaryOutcome::AlreadyExists(_) => "already exists",
            };
            Ok(json!({ "status": status, "summary": outcome.summary() }))
        }
        "extract" => {
            let id = parse_id(args.get(1))?;
            let handle = state.pipeline.spawn_extraction(id);
            info!("Queued extraction task {} for message {}", handle.id(), id);
            match handle.wait().await {
                TaskState::Succeeded(detail) => Ok(serde_json::from_str(&detail)?),
                TaskState::Failed(e) => bail!("extraction failed: {}", e),
                other => bail!("extraction ended as {:?}", other),
            }
        }
        "free-time" => {
            let minutes = parse_or(args.get(1), 60i64, "duration")?;
            let days = parse_or(args.get(2), 7i64, "day count")?;
            let slots = state
                .calendar
                .find_free_slots(minutes, days, chrono::Utc::now())
                .await?;
            Ok(serde_json::to_value(slots)?)
        }
        "status" => {
            let providers = state.pipeline.extractor().registry().status();
            Ok(json!({
                "providers": providers,
                "messages": state.store.count_messages().await?,
                "mailbox_configured": state.config.gmail.is_some(),
                "calendar_configured": state.config.calendar.is_some(),
            }))
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(serde_json::Value::Null)
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let state = AppState::init(config).await?;

    let output = run(&state, &args).await?;
    if !output.is_null() {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}
