use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{debug, info};

use warden_core::service::AntiSpamService;

use crate::ingest::message_task_from;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AntiSpamService>,
}

/// Long-polling dispatcher: every group message becomes a moderation task.
pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    if let Ok(me) = bot.get_me().await {
        info!(username = me.username(), "bot connected");
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

/// Fire-and-forget from Telegram's point of view: the outcome is decided by
/// the workers, never in the update handler.
pub async fn handle_message(
    _bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(task) = message_task_from(&msg) else {
        return Ok(());
    };

    debug!(
        chat_id = task.chat_id.0,
        msg_id = task.message_id.0,
        user_id = task.user_id.0,
        "enqueueing message for moderation"
    );
    state.service.enqueue(task).await;

    Ok(())
}
