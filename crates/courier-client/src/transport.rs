//! Polling transport
//!
//! A [`Transport`] fakes a persistent connection with repeated long-polls.
//! `connect` spawns one poll loop on the current tokio runtime; the loop
//! fires on a fixed interval and keeps going through failures until
//! `disconnect` (or drop) stops it.
//!
//! Outbound actions (`send_message`, `mark_message_as_read`, join/leave) are
//! independent requests and may run while a poll is in flight.

use crate::api::{HttpApi, RealtimeApi};
use crate::config::TransportConfig;
use crate::dedupe::SeenEvents;
use crate::echo::{PendingEchoes, Reconciliation};
use crate::error::{ClientError, Result};
use crate::handler::EventHandler;
use crate::identity::IdentityProvider;
use courier_common::{
    ids, Attachment, ErrorPayload, Event, EventType, Identity, MembershipChange, Message,
    ReadReceipt, SendMessageRequest,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Error recorded when a poll cannot reach the server.
pub const CONNECTIVITY_ERROR: &str = "Connection to the message server was lost; retrying";

const NOT_AUTHENTICATED: &str = "Not authenticated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Inner {
    config: TransportConfig,
    api: Arc<dyn RealtimeApi>,
    identity: Arc<dyn IdentityProvider>,
    handler: Arc<dyn EventHandler>,
    state: RwLock<ConnectionState>,
    last_error: RwLock<Option<String>>,
    session_id: RwLock<Option<String>>,
    /// Bumped on every connect and disconnect; a poll result is only
    /// dispatched if the generation it started under is still current.
    generation: AtomicU64,
    /// Stop signal of the running loop.
    running: Mutex<Option<oneshot::Sender<()>>>,
    active_loops: AtomicUsize,
    consecutive_failures: AtomicU64,
    seen: Mutex<SeenEvents>,
    echoes: Mutex<PendingEchoes>,
}

pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    pub fn new(
        config: TransportConfig,
        api: Arc<dyn RealtimeApi>,
        identity: Arc<dyn IdentityProvider>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let seen = SeenEvents::new(config.dedupe_capacity);
        let echoes = PendingEchoes::new(config.reconcile_window);
        Self {
            inner: Arc::new(Inner {
                config,
                api,
                identity,
                handler,
                state: RwLock::new(ConnectionState::Disconnected),
                last_error: RwLock::new(None),
                session_id: RwLock::new(None),
                generation: AtomicU64::new(0),
                running: Mutex::new(None),
                active_loops: AtomicUsize::new(0),
                consecutive_failures: AtomicU64::new(0),
                seen: Mutex::new(seen),
                echoes: Mutex::new(echoes),
            }),
        }
    }

    /// Transport over HTTP using [`HttpApi`].
    pub fn http(
        config: TransportConfig,
        identity: Arc<dyn IdentityProvider>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self> {
        let api = Arc::new(HttpApi::new(&config)?);
        Ok(Self::new(config, api, identity, handler))
    }

    /// Start polling. No-op while a loop is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        {
            let mut running = self.inner.running.lock();
            if running.is_some() {
                debug!("[Transport] connect ignored, already {:?}", self.state());
                return;
            }

            let generation = {
                let mut state = self.inner.state.write();
                *state = ConnectionState::Connecting;
                self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
            };

            let (stop_tx, stop_rx) = oneshot::channel();
            tokio::spawn(run_loop(self.inner.clone(), generation, stop_rx));
            *running = Some(stop_tx);
        }

        info!("[Transport] connecting to {}", self.inner.config.base_url);
        self.inner.handler.on_state_change(ConnectionState::Connecting);
    }

    /// Stop polling. Safe to call any number of times.
    pub fn disconnect(&self) {
        let handle = self.inner.running.lock().take();

        let was = {
            let mut state = self.inner.state.write();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        };

        let Some(stop) = handle else {
            return;
        };
        // The loop may already have exited on its own.
        let _ = stop.send(());

        let session = self.inner.session_id.write().take();
        if let (Some(_), Some(identity)) = (session, self.inner.identity.current()) {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let api = self.inner.api.clone();
                runtime.spawn(async move {
                    if let Err(e) = api.disconnect(&identity.user_id).await {
                        debug!("[Transport] disconnect notification failed: {}", e);
                    }
                });
            }
        }

        if was != ConnectionState::Disconnected {
            self.inner
                .handler
                .on_state_change(ConnectionState::Disconnected);
        }
        info!("[Transport] disconnected");
    }

    /// Run one poll outside the loop. Returns the number of events handed
    /// to the handler.
    pub async fn poll(&self) -> Result<usize> {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner.poll_once(generation).await
    }

    /// Send a message. The optimistic copy reaches `on_message` before the
    /// request is issued.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        attachments: Option<Vec<Attachment>>,
    ) -> bool {
        let Some(identity) = self.inner.require_identity() else {
            return false;
        };

        let temp_id = ids::new_temp_id();
        let mut optimistic = Message::new(conversation_id, &identity, content)
            .with_attachments(attachments.clone().unwrap_or_default())
            .with_client_id(Some(temp_id.clone()));
        optimistic.id = temp_id.clone();

        self.inner.echoes.lock().track(&optimistic);
        self.inner.handler.on_message(&optimistic);

        let request = SendMessageRequest {
            content: content.to_string(),
            attachments,
            client_id: Some(temp_id.clone()),
        };

        match self.inner.api.send_message(conversation_id, &request).await {
            Ok(message) => {
                debug!("[Transport] sent {} as {}", temp_id, message.id);
                self.inner.deliver_message(message);
                true
            }
            Err(e) => {
                warn!("[Transport] send to {} failed: {}", conversation_id, e);
                self.inner.echoes.lock().forget(&temp_id);
                let message = e.to_string();
                self.inner.set_error(message.clone());
                self.inner.handler.on_send_failed(&temp_id, &message);
                false
            }
        }
    }

    pub async fn mark_message_as_read(&self, message_id: &str) -> bool {
        if self.inner.require_identity().is_none() {
            return false;
        }

        match self.inner.api.mark_read(message_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[Transport] mark read {} failed: {}", message_id, e);
                self.inner.set_error(e.to_string());
                false
            }
        }
    }

    pub async fn join_conversation(&self, conversation_id: &str) -> bool {
        let Some(identity) = self.inner.require_identity() else {
            return false;
        };

        let change = MembershipChange {
            conversation_id: conversation_id.to_string(),
            user_id: identity.user_id,
        };
        self.inner.handler.on_joined(&change);

        match self.inner.api.join(conversation_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[Transport] join {} failed: {}", conversation_id, e);
                self.inner.set_error(e.to_string());
                false
            }
        }
    }

    pub async fn leave_conversation(&self, conversation_id: &str) -> bool {
        let Some(identity) = self.inner.require_identity() else {
            return false;
        };

        let change = MembershipChange {
            conversation_id: conversation_id.to_string(),
            user_id: identity.user_id,
        };
        self.inner.handler.on_left(&change);

        match self.inner.api.leave(conversation_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[Transport] leave {} failed: {}", conversation_id, e);
                self.inner.set_error(e.to_string());
                false
            }
        }
    }

    pub async fn ping(&self) -> Result<Event> {
        let identity = self
            .inner
            .identity
            .current()
            .ok_or(ClientError::Unauthenticated)?;
        self.inner.api.ping(&identity.user_id).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.read().clone()
    }

    /// Number of poll loops currently alive.
    pub fn active_loops(&self) -> usize {
        self.inner.active_loops.load(Ordering::SeqCst)
    }

    pub fn is_polling(&self) -> bool {
        self.inner.running.lock().is_some()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_loop(inner: Arc<Inner>, generation: u64, mut stop: oneshot::Receiver<()>) {
    inner.active_loops.fetch_add(1, Ordering::SeqCst);

    let mut ticker = interval(inner.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => {}
        }

        // An in-flight poll finishes; its result is dropped if stale.
        if let Err(e) = inner.poll_once(generation).await {
            debug!("[Transport] poll failed: {}", e);
        }

        if !inner.is_current(generation) {
            break;
        }
    }

    inner.active_loops.fetch_sub(1, Ordering::SeqCst);
    debug!("[Transport] poll loop {} exited", generation);
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn require_identity(&self) -> Option<Identity> {
        let identity = self.identity.current();
        if identity.is_none() {
            warn!("[Transport] rejected: no signed-in user");
            self.set_error(NOT_AUTHENTICATED.to_string());
            self.handler.on_error(NOT_AUTHENTICATED);
        }
        identity
    }

    fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    async fn poll_once(&self, generation: u64) -> Result<usize> {
        let Some(identity) = self.identity.current() else {
            debug!("[Transport] no identity, skipping poll");
            return Ok(0);
        };

        let result = self.poll_events(&identity).await;

        if !self.is_current(generation) {
            debug!("[Transport] discarding result of stale poll");
            return Ok(0);
        }

        match result {
            Ok(events) => {
                self.record_success(generation);
                let mut dispatched = 0;
                for event in events {
                    if !self.is_current(generation) {
                        break;
                    }
                    if self.dispatch(event) {
                        dispatched += 1;
                    }
                }
                Ok(dispatched)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn poll_events(&self, identity: &Identity) -> Result<Vec<Event>> {
        let has_session = self.session_id.read().is_some();
        if !has_session {
            let response = self.api.connect(&identity.user_id).await?;
            info!("[Transport] session {}", response.session_id);
            *self.session_id.write() = Some(response.session_id);
        }

        let ack = if self.config.ack_events {
            Some(self.seen.lock().highest_seq())
        } else {
            None
        };
        self.api
            .poll(&identity.user_id, self.config.wait_budget, ack)
            .await
    }

    fn record_success(&self, generation: u64) {
        let failures = self.consecutive_failures.swap(0, Ordering::SeqCst);
        if failures > 0 {
            info!("[Transport] recovered after {} failed poll(s)", failures);
            *self.last_error.write() = None;
        }

        let connected = {
            let mut state = self.state.write();
            if self.is_current(generation) && *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected;
                true
            } else {
                false
            }
        };
        if connected {
            info!("[Transport] connected");
            self.handler.on_state_change(ConnectionState::Connected);
        }
    }

    fn record_failure(&self, error: &ClientError) {
        let streak = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let message = if error.is_terminal() {
            // Force a fresh session once credentials are fixed.
            *self.session_id.write() = None;
            error.to_string()
        } else {
            CONNECTIVITY_ERROR.to_string()
        };

        warn!("[Transport] poll failed ({} in a row): {}", streak, error);
        self.set_error(message.clone());
        if streak == 1 {
            self.handler.on_error(&message);
        }
    }

    /// Hand one event to the handler. Returns false for replays and
    /// events that are only logged.
    fn dispatch(&self, event: Event) -> bool {
        if !self.seen.lock().insert(&event) {
            debug!("[Transport] skipping replayed event {}", event.id);
            return false;
        }

        match event.event_type {
            EventType::MessageNew => match event.message() {
                Ok(message) => return self.deliver_message(message),
                Err(e) => warn!("[Transport] bad message:new {}: {}", event.id, e),
            },
            EventType::MessageRead => match event.payload::<ReadReceipt>() {
                Ok(receipt) => {
                    self.handler.on_read(&receipt);
                    return true;
                }
                Err(e) => warn!("[Transport] bad message:read {}: {}", event.id, e),
            },
            EventType::ConversationJoined => match event.payload::<MembershipChange>() {
                Ok(change) => {
                    self.handler.on_joined(&change);
                    return true;
                }
                Err(e) => warn!("[Transport] bad conversation:joined {}: {}", event.id, e),
            },
            EventType::ConversationLeft => match event.payload::<MembershipChange>() {
                Ok(change) => {
                    self.handler.on_left(&change);
                    return true;
                }
                Err(e) => warn!("[Transport] bad conversation:left {}: {}", event.id, e),
            },
            EventType::Error => {
                let message = event
                    .payload::<ErrorPayload>()
                    .map(|p| p.message)
                    .unwrap_or_else(|_| "Unknown server error".to_string());
                warn!("[Transport] server error event: {}", message);
                self.set_error(message.clone());
                self.handler.on_error(&message);
                return true;
            }
            EventType::Pong | EventType::Welcome => {
                debug!("[Transport] {} {}", event.event_type, event.id);
            }
        }
        false
    }

    fn deliver_message(&self, message: Message) -> bool {
        let outcome = self.echoes.lock().reconcile(&message);
        match outcome {
            Reconciliation::New => {
                self.handler.on_message(&message);
                true
            }
            Reconciliation::Replaces(temp_id) => {
                self.handler.on_reconciled(&temp_id, &message);
                true
            }
            Reconciliation::Duplicate => {
                debug!("[Transport] {} already reconciled", message.id);
                false
            }
        }
    }
}
