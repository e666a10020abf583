use tracing::{debug, info, warn};

use super::action_block::extract_actions;
use super::actions::StreamAction;
use super::cleaner::strip_action_with;
use super::state::AbortReason;
use super::state::CompletedStream;
use super::state::StreamPhase;
use super::state::StreamState;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEffect {
    Started {
        generation: u64,
        client_id: Option<String>,
    },
    Display {
        generation: u64,
        text: String,
    },
    Completed(CompletedStream),
    /// Best-effort request asking the server to stop generating.
    RequestStop {
        generation: u64,
        stream_id: Option<String>,
    },
    Aborted {
        generation: u64,
        retained_text: String,
        reason: AbortReason,
    },
}

pub fn reduce(state: &mut StreamState, action: StreamAction) -> Vec<StreamEffect> {
    match action {
        StreamAction::Begin { client_id } => {
            let effects = if state.is_streaming() {
                stop_in_flight(state, AbortReason::Superseded)
            } else {
                Vec::new()
            };
            info!(client_id = client_id.as_deref().unwrap_or("-"), "begin message");
            state.suppressed = false;
            state.client_id = client_id;
            state.stream_id = None;
            state.display_text.clear();
            effects
        }
        StreamAction::Chunk(text) => reduce_chunk(state, text),
        StreamAction::Complete => reduce_complete(state),
        StreamAction::Cancel => {
            if state.is_streaming() {
                return stop_in_flight(state, AbortReason::UserStop);
            }
            state.suppressed = true;
            // Stopped before the first chunk arrived; the server may still be generating.
            match state.stream_id.take() {
                Some(stream_id) => vec![StreamEffect::RequestStop {
                    generation: state.generation,
                    stream_id: Some(stream_id),
                }],
                None => Vec::new(),
            }
        }
        StreamAction::TransportFailed { reason } => {
            if !state.is_streaming() {
                debug!(%reason, "transport failure with no active stream");
                return Vec::new();
            }
            warn!(generation = state.generation, %reason, "transport failed mid-stream");
            let generation = state.generation;
            discard_stream(state);
            vec![StreamEffect::Aborted {
                generation,
                retained_text: state.display_text.clone(),
                reason: AbortReason::Transport(reason),
            }]
        }
        StreamAction::SetStreamId(stream_id) => {
            state.stream_id = stream_id;
            Vec::new()
        }
    }
}

fn reduce_chunk(state: &mut StreamState, text: String) -> Vec<StreamEffect> {
    if state.suppressed {
        debug!(len = text.len(), "dropping chunk after stop");
        return Vec::new();
    }

    let mut effects = Vec::new();
    if state.phase != StreamPhase::Streaming {
        state.phase = StreamPhase::Streaming;
        state.generation = state.generation.saturating_add(1);
        state.buffer.clear();
        state.chunk_count = 0;
        info!(generation = state.generation, "stream started");
        effects.push(StreamEffect::Started {
            generation: state.generation,
            client_id: state.client_id.clone(),
        });
    }

    state.buffer.push_str(&text);
    state.chunk_count += 1;
    let visible = strip_action_with(&state.buffer, state.detector_options());
    debug!(
        generation = state.generation,
        chunk = state.chunk_count,
        buffered = state.buffer.len(),
        shown = visible.len(),
        "chunk appended"
    );
    state.display_text = visible.clone();
    effects.push(StreamEffect::Display {
        generation: state.generation,
        text: visible,
    });
    effects
}

fn reduce_complete(state: &mut StreamState) -> Vec<StreamEffect> {
    if !state.is_streaming() {
        debug!(phase = state.phase.label(), "ignoring completion with no active stream");
        return Vec::new();
    }

    state.phase = StreamPhase::Completing;
    let extracted = extract_actions(&state.buffer, &state.config);
    let completed = CompletedStream {
        generation: state.generation,
        final_text: extracted.final_text,
        actions: extracted.actions,
    };
    info!(
        generation = completed.generation,
        chunks = state.chunk_count,
        actions = completed.actions.len(),
        "stream completed"
    );

    state.display_text = completed.final_text.clone();
    reset_to_idle(state);
    vec![StreamEffect::Completed(completed)]
}

fn stop_in_flight(state: &mut StreamState, reason: AbortReason) -> Vec<StreamEffect> {
    let generation = state.generation;
    let stream_id = state.stream_id.take();
    info!(generation, reason = reason.label(), "stopping stream");
    discard_stream(state);
    vec![
        StreamEffect::RequestStop {
            generation,
            stream_id,
        },
        StreamEffect::Aborted {
            generation,
            retained_text: state.display_text.clone(),
            reason,
        },
    ]
}

fn discard_stream(state: &mut StreamState) {
    reset_to_idle(state);
    state.suppressed = true;
}

fn reset_to_idle(state: &mut StreamState) {
    state.buffer.clear();
    state.chunk_count = 0;
    state.stream_id = None;
    state.phase = StreamPhase::Idle;
}

#[cfg(test)]
mod tests;
