use std::sync::Arc;

use teloxide::Bot;
use tracing::{info, warn};

use warden_ai::{BackendConfig, HttpBackend};
use warden_core::{
    config::Config,
    domain::ChatId,
    metrics::Metrics,
    moderation::{AiModerator, AiScorer, PromptSet, RateLimitedNotifier},
    ports::{AiBackend, ModerationTransport},
    processor::MessageProcessor,
    service::AntiSpamService,
};
use warden_storage::SqliteStore;
use warden_telegram::{
    router::{self, AppState},
    TelegramTransport,
};

#[tokio::main]
async fn main() -> Result<(), warden_core::Error> {
    warden_core::logging::init("warden");

    let cfg = Arc::new(Config::load()?);

    let store = SqliteStore::connect(&cfg.database_url).await?;

    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let transport: Arc<dyn ModerationTransport> =
        Arc::new(TelegramTransport::new(bot.clone()).await?);

    let metrics = Arc::new(Metrics::default());

    let backend: Option<Arc<dyn AiBackend>> = match (&cfg.ai.base_url, cfg.ai.enabled) {
        (Some(base_url), true) => Some(Arc::new(HttpBackend::new(BackendConfig {
            base_url: base_url.clone(),
            api_key: cfg.ai.api_key.clone(),
            model: cfg.ai.model.clone(),
            request_timeout: cfg.ai.request_timeout,
            concurrency: cfg.ai.concurrency,
        })?)),
        (None, true) => {
            warn!("WARDEN_AI_ENABLED is set but WARDEN_AI_BASE_URL is missing; AI checks fail open");
            None
        }
        _ => None,
    };

    let prompts = Arc::new(PromptSet::load(&cfg.prompt_files)?);
    let scorer = AiScorer::new(backend, cfg.ai.temperature, metrics.clone());
    let moderator = AiModerator::new(scorer, prompts, cfg.ai.spam_threshold);
    let notifier = Arc::new(RateLimitedNotifier::new(
        transport.clone(),
        ChatId(cfg.main_admin_id),
        cfg.notify_cooldown,
    ));

    let processor = Arc::new(MessageProcessor::new(
        cfg.clone(),
        transport,
        moderator,
        notifier,
        metrics.clone(),
    ));
    let service = Arc::new(AntiSpamService::new(&cfg, processor, metrics.clone()));

    service.start(Arc::new(store)).await;

    let state = Arc::new(AppState {
        service: service.clone(),
    });
    let poll_result = router::run_polling(bot, state).await;

    // Drain in-flight work before reporting the polling outcome.
    service.stop().await;

    let snap = metrics.snapshot();
    info!(
        messages_processed = snap.messages_processed,
        spam_blocked = snap.spam_blocked,
        ai_requests = snap.ai_requests,
        errors = snap.processing_errors,
        "shutdown"
    );

    poll_result.map_err(|e| warden_core::Error::Telegram(format!("telegram bot failed: {e}")))
}
