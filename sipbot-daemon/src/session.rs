//! Call session state machine
//!
//! ```text
//! IDLE --INCOMING_CALL--> RINGING --accept--> ACTIVE --CALL_ENDED--> TERMINATING
//!   ^                                                                     |
//!   +------------------------------ TERMINATED <----loop stopped---------+
//! ```
//!
//! The controller owns the single [`CallSession`] and is the only writer of
//! its state. The turn loop for the active call runs as its own task and
//! watches the state; the controller waits for it before declaring the call
//! terminated.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sipbot_assist::Synthesizer;
use sipbot_signaling::{CommandSink, EventKind, SignalingEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::turn::TurnLoop;

/// Synthesized greeting, overwritten every call
pub const GREETING_FILE: &str = "greeting.wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Idle,
    Ringing,
    Active,
    Terminating,
    Terminated,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ringing => "ringing",
            Self::Active => "active",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one call currently being handled
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: Uuid,
    pub caller: Option<String>,
    pub started_at: DateTime<Utc>,
    pub state: CallState,
    turns: Arc<AtomicU32>,
}

impl CallSession {
    fn new(caller: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            caller,
            started_at: Utc::now(),
            state: CallState::Idle,
            turns: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn turn_count(&self) -> u32 {
        self.turns.load(Ordering::SeqCst)
    }

    fn caller_label(&self) -> &str {
        self.caller.as_deref().unwrap_or("unknown caller")
    }
}

/// What remains of a session once it is torn down
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: Uuid,
    pub caller: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub final_state: CallState,
    pub turn_count: u32,
}

impl SessionSummary {
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

/// Result of feeding one event to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Event had no effect in the current state
    Ignored,
    /// A new call was accepted and is now active
    Started,
    /// The active call was torn down
    Ended,
    /// An incoming call arrived while another call was in progress
    Rejected,
    /// The event stream is gone; no further events will arrive
    Shutdown,
}

/// What to play once a call is accepted
#[derive(Debug, Clone)]
pub enum Greeting {
    None,
    /// Pre-recorded file
    File(PathBuf),
    /// Synthesize `text` into `output` on every call
    Spoken { text: String, output: PathBuf },
}

pub struct CallController {
    sink: Arc<dyn CommandSink>,
    synthesizer: Arc<dyn Synthesizer>,
    turn_loop: TurnLoop,
    greeting: Greeting,
    accept_delay: Duration,
    synthesis_timeout: Duration,
    session: Option<CallSession>,
    state_tx: Option<watch::Sender<CallState>>,
    loop_handle: Option<JoinHandle<()>>,
    last_session: Option<SessionSummary>,
    rejected_calls: u64,
}

/// Wait for the loop task if there is one; pending forever otherwise
async fn join_loop(handle: &mut Option<JoinHandle<()>>) {
    match handle {
        Some(handle) => {
            if let Err(e) = handle.await {
                warn!("Turn loop task failed: {}", e);
            }
        }
        None => std::future::pending().await,
    }
}

enum Wake {
    Event(Option<SignalingEvent>),
    LoopExited,
}

impl CallController {
    pub fn new(
        sink: Arc<dyn CommandSink>,
        synthesizer: Arc<dyn Synthesizer>,
        turn_loop: TurnLoop,
        greeting: Greeting,
        accept_delay: Duration,
    ) -> Self {
        let synthesis_timeout = turn_loop.settings().collaborator_timeout;
        Self {
            sink,
            synthesizer,
            turn_loop,
            greeting,
            accept_delay,
            synthesis_timeout,
            session: None,
            state_tx: None,
            loop_handle: None,
            last_session: None,
            rejected_calls: 0,
        }
    }

    /// Current machine state; IDLE when there is no session
    pub fn state(&self) -> CallState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(CallState::Idle)
    }

    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    pub fn last_session(&self) -> Option<&SessionSummary> {
        self.last_session.as_ref()
    }

    pub fn rejected_calls(&self) -> u64 {
        self.rejected_calls
    }

    /// Drive the machine from `events` until the stream closes
    ///
    /// Returns the summary of the last finished session, if any.
    pub async fn run(
        &mut self,
        mut events: mpsc::UnboundedReceiver<SignalingEvent>,
    ) -> Option<SessionSummary> {
        info!("📡 Waiting for calls");

        loop {
            let wake = tokio::select! {
                event = events.recv() => Wake::Event(event),
                _ = join_loop(&mut self.loop_handle), if self.loop_handle.is_some() => Wake::LoopExited,
            };

            match wake {
                Wake::Event(Some(event))
                    if event.kind == EventKind::IncomingCall && self.session.is_none() =>
                {
                    if self.ring_then_answer(event, &mut events).await == EventOutcome::Shutdown {
                        break;
                    }
                }
                Wake::Event(Some(event)) => {
                    if self.handle_event(event).await == EventOutcome::Shutdown {
                        break;
                    }
                }
                Wake::Event(None) => {
                    // Monitor dropped its sender without a close marker
                    self.end_call().await;
                    break;
                }
                Wake::LoopExited => {
                    self.loop_handle = None;
                    warn!("Turn loop exited while the call was active");
                    self.end_call().await;
                }
            }
        }

        info!("📴 Event stream closed, state machine stopped");
        self.last_session.clone()
    }

    /// Apply one signaling event
    pub async fn handle_event(&mut self, event: SignalingEvent) -> EventOutcome {
        match event.kind {
            EventKind::IncomingCall => {
                if self.session.is_some() {
                    self.rejected_calls += 1;
                    warn!(
                        "📵 Rejecting incoming call while {} (rejected so far: {}): {}",
                        self.state(),
                        self.rejected_calls,
                        event.raw_line
                    );
                    return EventOutcome::Rejected;
                }
                self.start_call(event.caller().map(str::to_string)).await;
                EventOutcome::Started
            }
            EventKind::CallEnded => {
                if self.session.is_none() {
                    debug!("Call end with no active session: {}", event.raw_line);
                    return EventOutcome::Ignored;
                }
                info!("Call ended by signaling: {}", event.raw_line);
                self.end_call().await;
                EventOutcome::Ended
            }
            EventKind::StreamClosed => {
                if self.session.is_some() {
                    warn!("Event stream closed during a call, ending it");
                    self.end_call().await;
                }
                EventOutcome::Shutdown
            }
            EventKind::Other => EventOutcome::Ignored,
        }
    }

    fn transition(&mut self, to: CallState) {
        if let Some(session) = self.session.as_mut() {
            debug!("Call {}: {} → {}", session.id, session.state, to);
            session.state = to;
        }
        if let Some(tx) = &self.state_tx {
            tx.send_replace(to);
        }
    }

    async fn start_call(&mut self, caller: Option<String>) {
        let (state_rx, turns) = self.ring(caller);
        tokio::time::sleep(self.accept_delay).await;
        self.answer(state_rx, turns).await;
    }

    /// IDLE → RINGING; hands back what the turn loop will need once answered
    fn ring(&mut self, caller: Option<String>) -> (watch::Receiver<CallState>, Arc<AtomicU32>) {
        let session = CallSession::new(caller);
        info!("📞 Incoming call {} from {}", session.id, session.caller_label());
        let turns = session.turns.clone();
        self.session = Some(session);

        let (state_tx, state_rx) = watch::channel(CallState::Ringing);
        self.state_tx = Some(state_tx);
        self.transition(CallState::Ringing);
        (state_rx, turns)
    }

    /// RINGING → ACTIVE: accept, greet, start the turn loop
    async fn answer(&mut self, state_rx: watch::Receiver<CallState>, turns: Arc<AtomicU32>) {
        self.sink.accept_call().await;
        self.transition(CallState::Active);
        info!("✅ Call accepted");

        self.play_greeting().await;

        self.loop_handle = Some(tokio::spawn(self.turn_loop.clone().run(state_rx, turns)));
    }

    /// Ring through the accept delay while still watching `events`
    ///
    /// A hang-up during the delay tears the session down without sending
    /// `/accept`. Once answered, events queue until the greeting has played.
    async fn ring_then_answer(
        &mut self,
        event: SignalingEvent,
        events: &mut mpsc::UnboundedReceiver<SignalingEvent>,
    ) -> EventOutcome {
        let (state_rx, turns) = self.ring(event.caller().map(str::to_string));

        let accept_at = tokio::time::sleep(self.accept_delay);
        tokio::pin!(accept_at);

        loop {
            tokio::select! {
                _ = &mut accept_at => {
                    self.answer(state_rx, turns).await;
                    return EventOutcome::Started;
                }
                next = events.recv() => match next {
                    Some(next) if next.kind == EventKind::CallEnded => {
                        info!("Caller hung up while ringing: {}", next.raw_line);
                        self.end_call().await;
                        return EventOutcome::Ended;
                    }
                    Some(next) if next.kind == EventKind::StreamClosed => {
                        warn!("Event stream closed while ringing");
                        self.end_call().await;
                        return EventOutcome::Shutdown;
                    }
                    Some(next) => {
                        self.handle_event(next).await;
                    }
                    None => {
                        self.end_call().await;
                        return EventOutcome::Shutdown;
                    }
                },
            }
        }
    }

    async fn play_greeting(&self) {
        let path = match &self.greeting {
            Greeting::None => return,
            Greeting::File(path) => path.clone(),
            Greeting::Spoken { text, output } => {
                match tokio::time::timeout(
                    self.synthesis_timeout,
                    self.synthesizer.synthesize(text, output),
                )
                .await
                {
                    Ok(Ok(path)) => path,
                    Ok(Err(e)) => {
                        warn!("⚠️ Greeting synthesis failed, continuing without it: {}", e);
                        return;
                    }
                    Err(_) => {
                        warn!("⚠️ Greeting synthesis timed out, continuing without it");
                        return;
                    }
                }
            }
        };

        info!("👋 Playing greeting {}", path.display());
        self.sink.play_file(&path).await;
    }

    /// ACTIVE/RINGING → TERMINATING → TERMINATED → IDLE
    async fn end_call(&mut self) {
        if self.session.is_none() {
            return;
        }

        self.transition(CallState::Terminating);
        if let Some(handle) = self.loop_handle.take() {
            if let Err(e) = handle.await {
                warn!("Turn loop task failed: {}", e);
            }
        }
        self.transition(CallState::Terminated);
        self.state_tx = None;

        if let Some(session) = self.session.take() {
            let summary = SessionSummary {
                id: session.id,
                caller: session.caller.clone(),
                started_at: session.started_at,
                ended_at: Utc::now(),
                final_state: session.state,
                turn_count: session.turn_count(),
            };
            info!(
                "📴 Call {} with {} ended after {}s, {} turns",
                summary.id,
                session.caller_label(),
                summary.duration().num_seconds(),
                summary.turn_count
            );
            self.last_session = Some(summary);
        }
    }
}
