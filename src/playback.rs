//! Client-side playback session discipline, modeled as an explicit state
//! machine so UIs (or tests) drive one shared audio session per user.
//!
//! The controller owns three pieces of coordination:
//! - a loading target: of all overlapping `play` requests, only the most
//!   recent one may promote its fetched audio to the active session;
//!   superseded fetches are cancelled and their results dropped
//! - a per-load cancellation token handed to the byte source
//! - a cache keyed by podcast id so replaying an episode never re-fetches

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Fetched audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAudio {
    pub bytes: Arc<Vec<u8>>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AudioSourceError {
    /// The load was cancelled by a newer request; not an error condition.
    #[error("load cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

/// Byte source for podcast audio. Implementations must bail out promptly
/// with `Cancelled` once the token fires.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn fetch(
        &self,
        podcast_id: i64,
        cancel: &CancellationToken,
    ) -> Result<LoadedAudio, AudioSourceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackPhase {
    Idle,
    Loading {
        podcast_id: i64,
    },
    Active {
        podcast_id: i64,
        playing: bool,
        position_secs: f64,
        duration_secs: f64,
    },
}

/// What a `play` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    /// Duplicate request for the id already being loaded
    Ignored,
    /// Same id as the active session: pause/resume flipped in place
    Toggled { playing: bool },
    /// The id became the active session
    Started,
    /// A newer request took over while this one was loading
    Superseded,
    /// Load or decode failed; the session was fully reset
    Failed(String),
}

struct SessionState {
    phase: PlaybackPhase,
    loading: Option<(i64, CancellationToken)>,
    cache: HashMap<i64, LoadedAudio>,
}

pub struct PlaybackController<S> {
    source: S,
    state: Mutex<SessionState>,
}

impl<S: AudioSource> PlaybackController<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: Mutex::new(SessionState {
                phase: PlaybackPhase::Idle,
                loading: None,
                cache: HashMap::new(),
            }),
        }
    }

    pub async fn phase(&self) -> PlaybackPhase {
        self.state.lock().await.phase.clone()
    }

    pub async fn cached_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.state.lock().await.cache.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Requests playback of a podcast. See `PlayOutcome` for the possible
    /// transitions.
    pub async fn play(&self, podcast_id: i64) -> PlayOutcome {
        let cancel = {
            let mut state = self.state.lock().await;

            // Rapid duplicate clicks while that id is already loading
            if let Some((loading_id, _)) = &state.loading {
                if *loading_id == podcast_id {
                    return PlayOutcome::Ignored;
                }
            }

            // Same id as the active session with no load pending: toggle
            if state.loading.is_none() {
                if let PlaybackPhase::Active {
                    podcast_id: active,
                    playing,
                    ..
                } = &mut state.phase
                {
                    if *active == podcast_id {
                        *playing = !*playing;
                        return PlayOutcome::Toggled { playing: *playing };
                    }
                }
            }

            // A different podcast: stop what is playing and supersede any
            // in-flight load
            if let Some((_, old_token)) = state.loading.take() {
                old_token.cancel();
            }

            if let Some(audio) = state.cache.get(&podcast_id).cloned() {
                state.phase = PlaybackPhase::Active {
                    podcast_id,
                    playing: true,
                    position_secs: 0.0,
                    duration_secs: audio.duration_secs,
                };
                return PlayOutcome::Started;
            }

            let cancel = CancellationToken::new();
            state.loading = Some((podcast_id, cancel.clone()));
            state.phase = PlaybackPhase::Loading { podcast_id };
            cancel
        };

        let result = self.source.fetch(podcast_id, &cancel).await;

        let mut state = self.state.lock().await;

        // Only the current loading target may apply its result; anything
        // else was superseded and its audio is dropped here.
        let still_current = matches!(
            &state.loading,
            Some((loading_id, token)) if *loading_id == podcast_id && !token.is_cancelled()
        );
        if !still_current {
            return PlayOutcome::Superseded;
        }

        state.loading = None;
        match result {
            Ok(audio) => {
                state.phase = PlaybackPhase::Active {
                    podcast_id,
                    playing: true,
                    position_secs: 0.0,
                    duration_secs: audio.duration_secs,
                };
                state.cache.insert(podcast_id, audio);
                PlayOutcome::Started
            }
            Err(AudioSourceError::Cancelled) => {
                state.phase = PlaybackPhase::Idle;
                PlayOutcome::Superseded
            }
            Err(AudioSourceError::Failed(message)) => {
                state.phase = PlaybackPhase::Idle;
                PlayOutcome::Failed(message)
            }
        }
    }

    /// Seeks within the active session. No-op unless a duration is known.
    pub async fn seek(&self, position_secs: f64) {
        let mut state = self.state.lock().await;
        if let PlaybackPhase::Active {
            position_secs: position,
            duration_secs,
            ..
        } = &mut state.phase
        {
            *position = position_secs.clamp(0.0, *duration_secs);
        }
    }

    /// Stops playback and cancels any in-flight load. Cached audio is kept
    /// for later replays.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some((_, token)) = state.loading.take() {
            token.cancel();
        }
        state.phase = PlaybackPhase::Idle;
    }

    /// Session teardown: stop and release every cached audio handle.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some((_, token)) = state.loading.take() {
            token.cancel();
        }
        state.phase = PlaybackPhase::Idle;
        state.cache.clear();
    }
}
