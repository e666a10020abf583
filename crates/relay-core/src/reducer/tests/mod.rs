use pretty_assertions::assert_eq;

pub(super) use super::reduce;
pub(super) use super::StreamEffect;
pub(super) use crate::action_block::ActionBlock;
pub(super) use crate::actions::StreamAction;
pub(super) use crate::config::StreamConfig;
pub(super) use crate::state::AbortReason;
pub(super) use crate::state::CompletedStream;
pub(super) use crate::state::StreamPhase;
pub(super) use crate::state::StreamState;


fn state() -> StreamState {
    StreamState::new(StreamConfig::default())
}

fn chunk(state: &mut StreamState, text: &str) -> Vec<StreamEffect> {
    reduce(state, StreamAction::Chunk(text.to_string()))
}

fn feed(state: &mut StreamState, chunks: &[&str]) -> Vec<StreamEffect> {
    chunks
        .iter()
        .flat_map(|text| chunk(state, text))
        .collect()
}

fn complete(state: &mut StreamState) -> Option<CompletedStream> {
    let effects = reduce(state, StreamAction::Complete);
    match effects.as_slice() {
        [] => None,
        [StreamEffect::Completed(completed)] => Some(completed.clone()),
        other => panic!("unexpected completion effects: {other:?}"),
    }
}

fn display_texts(effects: &[StreamEffect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            StreamEffect::Display { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn assert_idle_and_empty(state: &StreamState) {
    assert_eq!(state.phase, StreamPhase::Idle);
    assert_eq!(state.buffer, "");
    assert_eq!(state.chunk_count, 0);
}
