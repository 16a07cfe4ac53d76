use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::{
    config::{Config, FailPolicy},
    detectors::{has_excessive_emojis, has_links, has_mentions},
    domain::{MessageTask, NewChat, Outcome, UserId, UserTrustState},
    errors::Error,
    metrics::Metrics,
    moderation::{AiModerator, RateLimitedNotifier},
    ports::{ModerationTransport, StorageSession},
    Result,
};

/// Per-message moderation orchestration.
///
/// Runs the fixed decision sequence for one task inside one storage session:
/// chat resolution, title sync, active gate, trust gate, rule cascade, AI
/// moderation. Message deletion is best-effort and never escalates.
pub struct MessageProcessor {
    cfg: Arc<Config>,
    transport: Arc<dyn ModerationTransport>,
    moderator: AiModerator,
    notifier: Arc<RateLimitedNotifier>,
    metrics: Arc<Metrics>,
}

impl MessageProcessor {
    pub fn new(
        cfg: Arc<Config>,
        transport: Arc<dyn ModerationTransport>,
        moderator: AiModerator,
        notifier: Arc<RateLimitedNotifier>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cfg,
            transport,
            moderator,
            notifier,
            metrics,
        }
    }

    /// Process a single message task. `Ok(Outcome::Kept)` means the message
    /// stays; `Ok(Outcome::Deleted)` means it was judged spam.
    pub async fn process(
        &self,
        session: &mut dyn StorageSession,
        task: &MessageTask,
    ) -> Result<Outcome> {
        let incoming_title = task
            .chat_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let mut needs_commit = false;

        // Chat resolution: create lazily with safe defaults, tolerating the
        // create race via rollback + one re-fetch.
        let mut chat = match session.chat_by_telegram_id(task.chat_id).await? {
            Some(chat) => chat,
            None => {
                let new = NewChat {
                    chat_id: task.chat_id,
                    title: incoming_title.map(str::to_string),
                    ai_check_enabled: self.cfg.ai.enabled,
                };
                match session.create_chat(new).await {
                    Ok(chat) => {
                        needs_commit = true;
                        info!(
                            chat_id = task.chat_id.0,
                            title = incoming_title.unwrap_or_default(),
                            "created chat"
                        );
                        chat
                    }
                    Err(Error::Conflict(_)) => {
                        session.rollback().await?;
                        match session.chat_by_telegram_id(task.chat_id).await? {
                            Some(chat) => chat,
                            None => {
                                // Bookkeeping failed twice; fail open.
                                error!(
                                    chat_id = task.chat_id.0,
                                    "chat create race lost, but chat still missing"
                                );
                                return Ok(Outcome::Kept);
                            }
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        // Title sync (deferred commit).
        if let Some(title) = incoming_title {
            if chat.title.as_deref() != Some(title) {
                session.update_chat_title(chat.id, title).await?;
                chat.title = Some(title.to_string());
                needs_commit = true;
            }
        }

        // No moderation while moderation is administratively disabled.
        if !chat.is_active {
            if needs_commit {
                session.commit().await?;
            }
            return Ok(Outcome::Kept);
        }

        let Some(user_state) = self
            .fetch_or_create_state(session, chat.id, task.user_id)
            .await?
        else {
            return Ok(Outcome::Kept);
        };

        // Trusted users bypass all further checks.
        let now = Utc::now();
        if user_state.is_trusted(now, self.cfg.min_seconds_in_chat, self.cfg.min_valid_messages) {
            if needs_commit {
                session.commit().await?;
            }
            debug!(
                chat_id = chat.chat_id.0,
                user_id = task.user_id.0,
                valid_messages = user_state.valid_messages,
                "user is trusted"
            );
            return Ok(Outcome::Kept);
        }

        // Rule cascade: cheap and deterministic, evaluated before any AI call.
        let rule_hit = (chat.cleanup_mentions && has_mentions(task))
            || (chat.cleanup_links && has_links(task, Some(&chat)))
            || (chat.cleanup_emojis && has_excessive_emojis(task, self.cfg.max_emojis));
        if rule_hit {
            self.try_delete_message(task).await;
            if needs_commit {
                session.commit().await?;
            }
            return Ok(Outcome::Deleted);
        }

        // Global config wins over the per-chat flag.
        let mut ai_enabled = chat.ai_check_enabled;
        if ai_enabled && !self.cfg.ai.enabled {
            warn!(
                chat_id = chat.chat_id.0,
                "chat has AI enabled but global AI is disabled; using safe default (no AI)"
            );
            ai_enabled = false;
        }

        if ai_enabled {
            self.process_with_ai(session, task, &user_state, needs_commit)
                .await
        } else {
            debug!(chat_id = chat.chat_id.0, "chat has AI disabled");
            self.count_valid_message(session, &user_state).await?;
            session.commit().await?;
            Ok(Outcome::Kept)
        }
    }

    async fn process_with_ai(
        &self,
        session: &mut dyn StorageSession,
        task: &MessageTask,
        user_state: &UserTrustState,
        needs_commit: bool,
    ) -> Result<Outcome> {
        match self.moderator.first_score_over_threshold(task).await {
            Ok(Some(hit)) => {
                self.metrics.incr_spam_blocked();
                info!(
                    chat_id = task.chat_id.0,
                    msg_id = task.message_id.0,
                    prompt = hit.prompt_index,
                    score = hit.score,
                    "AI flagged message as spam"
                );
                self.try_delete_message(task).await;
                if needs_commit {
                    session.commit().await?;
                }
                Ok(Outcome::Deleted)
            }
            Ok(None) => {
                self.count_valid_message(session, user_state).await?;
                session.commit().await?;
                Ok(Outcome::Kept)
            }
            Err(e) if e.is_ai_failure() => {
                match self.cfg.ai.fail_policy {
                    FailPolicy::Closed => {
                        warn!(
                            chat_id = task.chat_id.0,
                            msg_id = task.message_id.0,
                            "AI moderation failed; treating as spam (fail-closed): {e}"
                        );
                        self.try_delete_message(task).await;
                        self.notifier.notify(&e.to_string()).await;
                        if needs_commit {
                            session.commit().await?;
                        }
                        Ok(Outcome::Deleted)
                    }
                    FailPolicy::Permissive => {
                        // Keep the message but do not grow trust on it.
                        warn!(
                            chat_id = task.chat_id.0,
                            msg_id = task.message_id.0,
                            "AI moderation failed; keeping message (fail-permissive): {e}"
                        );
                        self.notifier.notify(&e.to_string()).await;
                        if needs_commit {
                            session.commit().await?;
                        }
                        Ok(Outcome::Kept)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch-or-create the trust record, recovering a create race the same
    /// way chat creation does.
    async fn fetch_or_create_state(
        &self,
        session: &mut dyn StorageSession,
        chat_ref: i64,
        user_id: UserId,
    ) -> Result<Option<UserTrustState>> {
        if let Some(state) = session.user_state(chat_ref, user_id).await? {
            return Ok(Some(state));
        }

        match session.create_user_state(chat_ref, user_id, Utc::now()).await {
            Ok(state) => Ok(Some(state)),
            Err(Error::Conflict(_)) => {
                session.rollback().await?;
                match session.user_state(chat_ref, user_id).await? {
                    Some(state) => Ok(Some(state)),
                    None => {
                        error!(
                            chat_ref,
                            user_id = user_id.0,
                            "user state create race lost, but state still missing"
                        );
                        Ok(None)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn count_valid_message(
        &self,
        session: &mut dyn StorageSession,
        user_state: &UserTrustState,
    ) -> Result<()> {
        session.increment_valid_messages(user_state.id).await?;

        // Log the moment a user crosses into trusted.
        let now = Utc::now();
        let elapsed_ok =
            (now - user_state.joined_at).num_seconds() >= self.cfg.min_seconds_in_chat as i64;
        let was_trusted = elapsed_ok && user_state.valid_messages >= self.cfg.min_valid_messages;
        let trusted_now =
            elapsed_ok && user_state.valid_messages + 1 >= self.cfg.min_valid_messages;
        if !was_trusted && trusted_now {
            info!(
                chat_ref = user_state.chat_ref,
                user_id = user_state.user_id.0,
                valid_messages = user_state.valid_messages + 1,
                "user became trusted"
            );
        }

        Ok(())
    }

    /// Best-effort deletion: checks the bot's own permissions first and
    /// swallows every failure (logs only). A failed delete never rolls back
    /// the moderation decision.
    async fn try_delete_message(&self, task: &MessageTask) {
        let membership = match self.transport.bot_membership(task.chat_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    chat_id = task.chat_id.0,
                    "could not check bot membership: {e}"
                );
                return;
            }
        };

        if !membership.may_delete() {
            warn!(
                chat_id = task.chat_id.0,
                is_admin = membership.is_admin,
                can_delete = membership.can_delete_messages,
                "no permission to delete messages"
            );
            return;
        }

        match self
            .transport
            .delete_message(task.chat_id, task.message_id)
            .await
        {
            Ok(()) => info!(
                chat_id = task.chat_id.0,
                msg_id = task.message_id.0,
                user_id = task.user_id.0,
                "deleted message"
            ),
            Err(e) => warn!(
                chat_id = task.chat_id.0,
                msg_id = task.message_id.0,
                "failed to delete message: {e}"
            ),
        }
    }
}
