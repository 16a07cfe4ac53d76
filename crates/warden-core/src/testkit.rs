//! In-memory port implementations shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    config::{AiConfig, Config, FailPolicy},
    domain::{ChatConfig, ChatId, MessageId, NewChat, UserId, UserTrustState},
    errors::Error,
    ports::{AiBackend, BotMembership, ModerationTransport, SessionFactory, StorageSession},
    Result,
};

/// Baseline config for unit tests; individual tests tweak fields as needed.
pub fn test_config() -> Config {
    Config {
        telegram_bot_token: "test-token".to_string(),
        main_admin_id: 999,
        database_url: "sqlite::memory:".to_string(),
        min_seconds_in_chat: 3600,
        min_valid_messages: 5,
        max_emojis: 5,
        queue_size: 64,
        workers: 2,
        dedupe_ttl: Duration::from_secs(300),
        dedupe_max_size: 128,
        notify_cooldown: Duration::from_secs(60),
        ai: AiConfig {
            enabled: false,
            base_url: None,
            api_key: None,
            model: None,
            temperature: 0.2,
            spam_threshold: 0.3,
            concurrency: 2,
            request_timeout: Duration::from_secs(5),
            fail_policy: FailPolicy::Permissive,
        },
        prompt_files: vec![],
    }
}

// ============== AI backend ==============

/// Backend that replays a scripted list of responses (or always fails).
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<Vec<String>>,
    fail_with: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            fail_with: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiBackend for ScriptedBackend {
    async fn one_shot(&self, _prompt: &str, _temperature: f64) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.fail_with {
            return Err(Error::AiHttp(msg.clone()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok("0.0".to_string());
        }
        Ok(responses.remove(0))
    }
}

// ============== Transport ==============

/// Transport that records outbound calls instead of talking to Telegram.
pub struct RecordingTransport {
    membership: Mutex<BotMembership>,
    deleted: Mutex<Vec<(ChatId, MessageId)>>,
    sent: Mutex<Vec<(ChatId, String)>>,
    fail_sends: AtomicBool,
    fail_deletes: AtomicBool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            membership: Mutex::new(BotMembership {
                is_owner: false,
                is_admin: true,
                can_delete_messages: true,
            }),
            deleted: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }
}

impl RecordingTransport {
    pub fn set_membership(&self, membership: BotMembership) {
        *self.membership.lock().unwrap() = membership;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn deleted(&self) -> Vec<(ChatId, MessageId)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModerationTransport for RecordingTransport {
    async fn bot_membership(&self, _chat_id: ChatId) -> Result<BotMembership> {
        Ok(*self.membership.lock().unwrap())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::Telegram("message to delete not found".to_string()));
        }
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Telegram("send failed".to_string()));
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

// ============== Storage ==============

#[derive(Default)]
struct MemoryState {
    chats: HashMap<i64, ChatConfig>,
    states: HashMap<(i64, i64), UserTrustState>,
    next_chat_id: i64,
    next_state_id: i64,
    /// When set, the next chat create loses a simulated race: the row
    /// appears as if another worker inserted it and the create errors with
    /// `Conflict`.
    conflict_next_chat_create: bool,
}

/// Shared in-memory store; sessions write through (commit/rollback are
/// no-ops apart from race simulation).
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_chat(&self, chat: ChatConfig) {
        let mut st = self.state.lock().unwrap();
        st.next_chat_id = st.next_chat_id.max(chat.id);
        st.chats.insert(chat.chat_id.0, chat);
    }

    pub fn seed_state(&self, state: UserTrustState) {
        let mut st = self.state.lock().unwrap();
        st.next_state_id = st.next_state_id.max(state.id);
        st.states.insert((state.chat_ref, state.user_id.0), state);
    }

    pub fn conflict_on_next_chat_create(&self) {
        self.state.lock().unwrap().conflict_next_chat_create = true;
    }

    pub fn chat(&self, chat_id: ChatId) -> Option<ChatConfig> {
        self.state.lock().unwrap().chats.get(&chat_id.0).cloned()
    }

    pub fn user_state(&self, chat_ref: i64, user_id: UserId) -> Option<UserTrustState> {
        self.state
            .lock()
            .unwrap()
            .states
            .get(&(chat_ref, user_id.0))
            .cloned()
    }
}

pub struct MemorySession {
    store: MemoryStore,
}

#[async_trait]
impl StorageSession for MemorySession {
    async fn chat_by_telegram_id(&mut self, chat_id: ChatId) -> Result<Option<ChatConfig>> {
        Ok(self.store.chat(chat_id))
    }

    async fn create_chat(&mut self, new: NewChat) -> Result<ChatConfig> {
        let mut st = self.store.state.lock().unwrap();

        if st.conflict_next_chat_create {
            st.conflict_next_chat_create = false;
            st.next_chat_id += 1;
            let racing = ChatConfig {
                id: st.next_chat_id,
                chat_id: new.chat_id,
                title: new.title.clone(),
                is_active: false,
                ai_check_enabled: new.ai_check_enabled,
                cleanup_mentions: true,
                cleanup_links: true,
                cleanup_emojis: true,
                allowed_domains: Default::default(),
                invite_link: None,
            };
            st.chats.insert(new.chat_id.0, racing);
            return Err(Error::Conflict("chats.chat_id".to_string()));
        }

        if st.chats.contains_key(&new.chat_id.0) {
            return Err(Error::Conflict("chats.chat_id".to_string()));
        }

        st.next_chat_id += 1;
        let chat = ChatConfig {
            id: st.next_chat_id,
            chat_id: new.chat_id,
            title: new.title,
            is_active: false,
            ai_check_enabled: new.ai_check_enabled,
            cleanup_mentions: true,
            cleanup_links: true,
            cleanup_emojis: true,
            allowed_domains: Default::default(),
            invite_link: None,
        };
        st.chats.insert(new.chat_id.0, chat.clone());
        Ok(chat)
    }

    async fn update_chat_title(&mut self, chat_ref: i64, title: &str) -> Result<()> {
        let mut st = self.store.state.lock().unwrap();
        for chat in st.chats.values_mut() {
            if chat.id == chat_ref {
                chat.title = Some(title.to_string());
                return Ok(());
            }
        }
        Err(Error::Storage(format!("no chat with id {chat_ref}")))
    }

    async fn user_state(
        &mut self,
        chat_ref: i64,
        user_id: UserId,
    ) -> Result<Option<UserTrustState>> {
        Ok(self.store.user_state(chat_ref, user_id))
    }

    async fn create_user_state(
        &mut self,
        chat_ref: i64,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<UserTrustState> {
        let mut st = self.store.state.lock().unwrap();
        if st.states.contains_key(&(chat_ref, user_id.0)) {
            return Err(Error::Conflict("user_states.chat_ref_user_id".to_string()));
        }
        st.next_state_id += 1;
        let state = UserTrustState {
            id: st.next_state_id,
            chat_ref,
            user_id,
            joined_at,
            valid_messages: 0,
        };
        st.states.insert((chat_ref, user_id.0), state.clone());
        Ok(state)
    }

    async fn increment_valid_messages(&mut self, state_id: i64) -> Result<()> {
        let mut st = self.store.state.lock().unwrap();
        for state in st.states.values_mut() {
            if state.id == state_id {
                state.valid_messages += 1;
                return Ok(());
            }
        }
        Err(Error::Storage(format!("no user state with id {state_id}")))
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for MemoryStore {
    async fn session(&self) -> Result<Box<dyn StorageSession>> {
        Ok(Box::new(MemorySession {
            store: self.clone(),
        }))
    }
}
