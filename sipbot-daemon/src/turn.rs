//! Turn-taking loop: listen → transcribe → respond → synthesize → play
//!
//! One loop task runs per active call. It owns the conversation history for
//! that call and observes the session state through a watch channel, checking
//! it before every turn so a hang-up never starts another one.

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sipbot_assist::{
    word_count, AssistError, Exchange, Responder, Synthesizer, Transcriber, RESPONSE_APOLOGY,
    TRANSCRIPTION_APOLOGY,
};
use sipbot_audio::CaptureBuffer;
use sipbot_signaling::CommandSink;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::session::CallState;

/// Utterances shorter than this are treated as noise
pub const MIN_UTTERANCE_WORDS: usize = 2;

/// Reply audio, overwritten every turn
pub const RESPONSE_FILE: &str = "response.wav";

/// Last captured clip when `keep_last_clip` is on
pub const INCOMING_FILE: &str = "incoming.wav";

/// The three services a turn calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub responder: Arc<dyn Responder>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub listen_window: Duration,
    /// Bound on each collaborator call
    pub collaborator_timeout: Duration,
    pub history_turns: usize,
    /// Where reply audio (and the debug clip) is written
    pub audio_dir: PathBuf,
    pub keep_last_clip: bool,
}

/// How a single turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing was captured in the window
    NoAudio,
    /// Transcript had too few words to answer
    Filtered { words: usize },
    /// Reply produced; `played` is false when synthesis failed
    Completed { played: bool },
}

impl TurnOutcome {
    pub fn counts(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Recent exchanges of the current call, oldest first
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    limit: usize,
    exchanges: VecDeque<Exchange>,
}

impl Conversation {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            exchanges: VecDeque::with_capacity(limit),
        }
    }

    pub fn push(&mut self, exchange: Exchange) {
        if self.limit == 0 {
            return;
        }
        while self.exchanges.len() >= self.limit {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(exchange);
    }

    pub fn exchanges(&mut self) -> &[Exchange] {
        self.exchanges.make_contiguous()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

/// Run a collaborator call under `limit`, flattening the timeout into a message
async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, String>
where
    F: Future<Output = Result<T, AssistError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", limit)),
    }
}

#[derive(Clone)]
pub struct TurnLoop {
    capture: Arc<CaptureBuffer>,
    sink: Arc<dyn CommandSink>,
    collaborators: Collaborators,
    settings: Arc<TurnSettings>,
}

impl TurnLoop {
    pub fn new(
        capture: Arc<CaptureBuffer>,
        sink: Arc<dyn CommandSink>,
        collaborators: Collaborators,
        settings: TurnSettings,
    ) -> Self {
        Self {
            capture,
            sink,
            collaborators,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Take turns until the session leaves ACTIVE
    ///
    /// `turns` is shared with the session and bumped after every counted turn.
    pub async fn run(self, state: watch::Receiver<CallState>, turns: Arc<AtomicU32>) {
        let mut conversation = Conversation::new(self.settings.history_turns);
        info!(
            "🔁 Turn loop started ({:.1}s listening window)",
            self.settings.listen_window.as_secs_f32()
        );

        while *state.borrow() == CallState::Active {
            let outcome = self.take_turn(&mut conversation).await;
            if outcome.counts() {
                let n = turns.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("Turn {} complete ({:?})", n, outcome);
            }
        }

        info!(
            "⏹️ Turn loop stopped after {} turns",
            turns.load(Ordering::SeqCst)
        );
    }

    /// One listen/answer cycle
    pub async fn take_turn(&self, conversation: &mut Conversation) -> TurnOutcome {
        let collaborator_timeout = self.settings.collaborator_timeout;

        self.capture.arm();
        tokio::time::sleep(self.settings.listen_window).await;
        let clip = self.capture.disarm();

        if clip.is_empty() {
            debug!("No audio captured in this window");
            return TurnOutcome::NoAudio;
        }

        if self.settings.keep_last_clip {
            let path = self.settings.audio_dir.join(INCOMING_FILE);
            if let Err(e) = clip.write_wav(&path) {
                warn!("Failed to keep clip at {}: {}", path.display(), e);
            }
        }

        let utterance = match bounded(
            collaborator_timeout,
            self.collaborators.transcriber.transcribe(&clip),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️ Transcription failed: {}", e);
                TRANSCRIPTION_APOLOGY.to_string()
            }
        };

        let words = word_count(&utterance);
        if words < MIN_UTTERANCE_WORDS {
            debug!("Ignoring short utterance ({} words): {:?}", words, utterance);
            return TurnOutcome::Filtered { words };
        }
        info!("🗣️ Caller: {}", utterance);

        let reply = match bounded(
            collaborator_timeout,
            self.collaborators
                .responder
                .respond(&utterance, conversation.exchanges()),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️ Response generation failed: {}", e);
                RESPONSE_APOLOGY.to_string()
            }
        };
        info!("🤖 Reply: {}", reply);

        let output = self.settings.audio_dir.join(RESPONSE_FILE);
        let played = match bounded(
            collaborator_timeout,
            self.collaborators.synthesizer.synthesize(&reply, &output),
        )
        .await
        {
            Ok(path) => {
                self.sink.play_file(&path).await;
                true
            }
            Err(e) => {
                warn!("⚠️ Speech synthesis failed, skipping playback: {}", e);
                false
            }
        };

        conversation.push(Exchange::new(utterance, reply));
        TurnOutcome::Completed { played }
    }
}
