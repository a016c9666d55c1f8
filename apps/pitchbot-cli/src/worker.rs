//! Background task that owns the chat session and runs model calls.
//!
//! The UI sends [`WorkerRequest`]s and receives [`WorkerReply`]s. Requests
//! are handled one at a time in arrival order, so a reset queued before a
//! message always applies before that message is sent.

use std::sync::Arc;

use pitchbot_core::{
    CancellationToken, CoreError, Engine, PitchResult, RatingResult, SessionManager, Transcript,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug)]
pub enum WorkerRequest {
    /// Send a chat message through the live session.
    Chat {
        text: String,
        cancel: CancellationToken,
    },
    Pitch {
        idea: String,
        location: Option<String>,
        cancel: CancellationToken,
    },
    Rate {
        idea: String,
        pitch: Box<PitchResult>,
        cancel: CancellationToken,
    },
    /// Drop the live session.
    Reset,
    /// Replace the live session with one seeded from an archived transcript.
    Resume(Transcript),
}

#[derive(Debug)]
pub enum WorkerReply {
    Chat(Result<String, CoreError>),
    Pitch(Result<PitchResult, CoreError>),
    Rating(Result<RatingResult, CoreError>),
}

/// Process requests until the UI drops its sender.
pub async fn run(
    engine: Arc<Engine>,
    mut requests: mpsc::Receiver<WorkerRequest>,
    replies: mpsc::Sender<WorkerReply>,
) {
    let mut sessions = engine.session_manager();
    while let Some(request) = requests.recv().await {
        let Some(reply) = handle(&engine, &mut sessions, request).await else {
            continue;
        };
        if replies.send(reply).await.is_err() {
            break;
        }
    }
    info!("chat worker stopped");
}

async fn handle(
    engine: &Engine,
    sessions: &mut SessionManager,
    request: WorkerRequest,
) -> Option<WorkerReply> {
    match request {
        WorkerRequest::Chat { text, cancel } => {
            Some(WorkerReply::Chat(sessions.exchange(&text, &cancel).await))
        }
        WorkerRequest::Pitch {
            idea,
            location,
            cancel,
        } => Some(WorkerReply::Pitch(
            engine
                .generate_pitch(&idea, location.as_deref(), &cancel)
                .await,
        )),
        WorkerRequest::Rate {
            idea,
            pitch,
            cancel,
        } => Some(WorkerReply::Rating(
            engine.rate_idea(&idea, &pitch, &cancel).await,
        )),
        WorkerRequest::Reset => {
            sessions.reset_session();
            None
        }
        WorkerRequest::Resume(transcript) => {
            sessions.rebuild_session_from_transcript(&transcript);
            debug!(
                generation = sessions.get_or_create_session().generation(),
                "resumed archived conversation"
            );
            None
        }
    }
}
