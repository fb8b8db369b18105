// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-session cache of calendar adapters and chat sessions.
//!
//! Entries are keyed by the session token and live until that token expires.
//! Misses are serialized per token: the first request builds the entry while
//! concurrent requests for the same token wait and then reuse it. If an entry
//! appears anyway, the existing one wins and the duplicate is dropped.

use crate::db::UserStore;
use crate::error::AppError;
use crate::middleware::auth::AuthSession;
use crate::models::CalendarEvent;
use crate::services::calendar::{Calendar, CalendarFactory};
use crate::services::chat::ChatSession;
use crate::services::gemini::LlmClient;
use crate::services::kms::{decrypt_token, KmsService};
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Window of upcoming events that seeds a new chat.
const CHAT_CONTEXT_DAYS: i64 = 7;

struct Cached<T> {
    value: T,
    email: String,
    expires_at: DateTime<Utc>,
}

impl<T: Clone> Cached<T> {
    fn live(&self, now: DateTime<Utc>) -> Option<T> {
        (now < self.expires_at).then(|| self.value.clone())
    }
}

type SharedChat = Arc<Mutex<ChatSession>>;
type BuildLocks = DashMap<String, Arc<Mutex<()>>>;

pub struct SessionCache {
    users: Arc<dyn UserStore>,
    kms: KmsService,
    factory: Arc<dyn CalendarFactory>,
    llm: Arc<dyn LlmClient>,
    chat_timeout: std::time::Duration,
    calendars: DashMap<String, Cached<Arc<dyn Calendar>>>,
    chats: DashMap<String, Cached<SharedChat>>,
    calendar_locks: BuildLocks,
    chat_locks: BuildLocks,
}

impl SessionCache {
    pub fn new(
        users: Arc<dyn UserStore>,
        kms: KmsService,
        factory: Arc<dyn CalendarFactory>,
        llm: Arc<dyn LlmClient>,
        chat_timeout: std::time::Duration,
    ) -> Self {
        Self {
            users,
            kms,
            factory,
            llm,
            chat_timeout,
            calendars: DashMap::new(),
            chats: DashMap::new(),
            calendar_locks: DashMap::new(),
            chat_locks: DashMap::new(),
        }
    }

    /// Calendar adapter for a session, built on first use.
    pub async fn calendar_for(&self, session: &AuthSession) -> Result<Arc<dyn Calendar>, AppError> {
        let now = Utc::now();
        ensure_live(session, now)?;

        if let Some(calendar) = self.live_calendar(&session.token, now) {
            return Ok(calendar);
        }

        let lock = build_lock(&self.calendar_locks, &session.token);
        let _guard = lock.lock().await;

        if let Some(calendar) = self.live_calendar(&session.token, now) {
            return Ok(calendar);
        }

        let user = self
            .users
            .get_user(&session.email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", session.email)))?;

        let provider = user.provider.ok_or_else(|| {
            AppError::ProviderCredential("no calendar provider linked to this account".to_string())
        })?;
        let blob = user.oauth_token_encrypted.as_deref().ok_or_else(|| {
            AppError::ProviderCredential("no stored provider credential".to_string())
        })?;
        let token = decrypt_token(&self.kms, blob, &user.email).await?;

        let calendar = self.factory.build(provider, token)?;
        tracing::debug!(email = %session.email, provider = %provider, "Calendar adapter built");

        Ok(self.insert_calendar(session, calendar))
    }

    /// Prime the cache with an adapter. An existing live entry is kept and returned.
    pub fn insert_calendar(
        &self,
        session: &AuthSession,
        calendar: Arc<dyn Calendar>,
    ) -> Arc<dyn Calendar> {
        insert_first_wins(&self.calendars, session, calendar, Utc::now())
    }

    /// Chat session for a session token, created on first use.
    pub async fn chat_for(&self, session: &AuthSession) -> Result<SharedChat, AppError> {
        let now = Utc::now();
        ensure_live(session, now)?;

        if let Some(chat) = self.live_chat(&session.token, now) {
            return Ok(chat);
        }

        let lock = build_lock(&self.chat_locks, &session.token);
        let _guard = lock.lock().await;

        if let Some(chat) = self.live_chat(&session.token, now) {
            return Ok(chat);
        }

        let tier = self
            .users
            .get_user(&session.email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", session.email)))?
            .tier()
            .ok_or(AppError::SubscriptionRequired)?;

        let calendar = self.calendar_for(session).await?;
        let events = calendar
            .list_events(now, now + Duration::days(CHAT_CONTEXT_DAYS))
            .await?;

        let chat = ChatSession::start(tier, &events, now, self.chat_timeout);
        tracing::info!(
            email = %session.email,
            model = chat.model(),
            events = events.len(),
            "Chat session started"
        );

        Ok(insert_first_wins(
            &self.chats,
            session,
            Arc::new(Mutex::new(chat)),
            now,
        ))
    }

    /// Send one chat message. Messages within a session are serialized.
    pub async fn send_chat(&self, session: &AuthSession, message: &str) -> Result<String, AppError> {
        let chat = self.chat_for(session).await?;
        let mut chat = chat.lock().await;
        chat.send(self.llm.as_ref(), message, Utc::now()).await
    }

    /// Existing live chat for a token, if any.
    pub fn cached_chat(&self, token: &str) -> Option<SharedChat> {
        self.live_chat(token, Utc::now())
    }

    /// Append a calendar-change note to the session's chat, if one exists.
    pub async fn note_calendar_change(&self, token: &str, action: &str, event: &CalendarEvent) {
        if let Some(chat) = self.cached_chat(token) {
            chat.lock().await.note_calendar_change(action, event);
        }
    }

    /// Drop everything cached for a token (logout).
    pub fn evict(&self, token: &str) {
        self.calendars.remove(token);
        self.chats.remove(token);
        self.calendar_locks.remove(token);
        self.chat_locks.remove(token);
    }

    /// Drop every cached chat of a user so the next message re-checks the
    /// subscription. Returns how many were dropped.
    pub fn evict_chats_for(&self, email: &str) -> usize {
        let before = self.chats.len();
        self.chats.retain(|_, c| !c.email.eq_ignore_ascii_case(email));
        before - self.chats.len()
    }

    /// Remove entries whose session token has expired. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.calendars.len() + self.chats.len();
        self.calendars.retain(|_, c| now < c.expires_at);
        self.chats.retain(|_, c| now < c.expires_at);

        self.calendar_locks
            .retain(|token, _| self.calendars.contains_key(token));
        self.chat_locks.retain(|token, _| self.chats.contains_key(token));

        before - (self.calendars.len() + self.chats.len())
    }

    /// Run `purge_expired` on a fixed interval.
    pub fn spawn_sweeper(self: Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired(Utc::now());
                if purged > 0 {
                    tracing::info!(purged, "Expired session cache entries removed");
                }
            }
        })
    }

    fn live_calendar(&self, token: &str, now: DateTime<Utc>) -> Option<Arc<dyn Calendar>> {
        self.calendars.get(token).and_then(|c| c.live(now))
    }

    fn live_chat(&self, token: &str, now: DateTime<Utc>) -> Option<SharedChat> {
        self.chats.get(token).and_then(|c| c.live(now))
    }
}

fn ensure_live(session: &AuthSession, now: DateTime<Utc>) -> Result<(), AppError> {
    if now >= session.expires_at {
        return Err(AppError::InvalidToken);
    }
    Ok(())
}

fn build_lock(locks: &BuildLocks, token: &str) -> Arc<Mutex<()>> {
    locks
        .entry(token.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

fn insert_first_wins<T: Clone>(
    map: &DashMap<String, Cached<T>>,
    session: &AuthSession,
    value: T,
    now: DateTime<Utc>,
) -> T {
    let fresh = Cached {
        value,
        email: session.email.clone(),
        expires_at: session.expires_at,
    };
    match map.entry(session.token.clone()) {
        Entry::Occupied(mut slot) => {
            if let Some(existing) = slot.get().live(now) {
                return existing;
            }
            let value = fresh.value.clone();
            slot.insert(fresh);
            value
        }
        Entry::Vacant(slot) => {
            let value = fresh.value.clone();
            slot.insert(fresh);
            value
        }
    }
}
