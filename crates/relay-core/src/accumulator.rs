use crate::actions::StreamAction;
use crate::config::StreamConfig;
use crate::reducer::reduce;
use crate::reducer::StreamEffect;
use crate::state::CompletedStream;
use crate::state::StreamState;

/// Receives every effect the accumulator produces, in order.
pub trait StreamSink {
    fn emit(&mut self, effect: &StreamEffect);
}

impl StreamSink for Vec<StreamEffect> {
    fn emit(&mut self, effect: &StreamEffect) {
        self.push(effect.clone());
    }
}

impl<T: StreamSink + ?Sized> StreamSink for &mut T {
    fn emit(&mut self, effect: &StreamEffect) {
        (**self).emit(effect);
    }
}

/// Adapts a closure into a [`StreamSink`].
pub struct CallbackSink<F>(pub F);

impl<F> StreamSink for CallbackSink<F>
where
    F: FnMut(&StreamEffect),
{
    fn emit(&mut self, effect: &StreamEffect) {
        (self.0)(effect);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn emit(&mut self, _effect: &StreamEffect) {}
}

/// Callback-style front for the stream reducer, handed to whatever transport
/// delivers chunks.
pub struct StreamAccumulator<S> {
    state: StreamState,
    sink: S,
}

impl<S: StreamSink> StreamAccumulator<S> {
    pub fn new(config: StreamConfig, sink: S) -> Self {
        Self {
            state: StreamState::new(config),
            sink,
        }
    }

    pub fn begin(&mut self, client_id: Option<String>) {
        self.dispatch(StreamAction::Begin { client_id });
    }

    pub fn on_chunk(&mut self, text: &str) {
        self.dispatch(StreamAction::Chunk(text.to_string()));
    }

    pub fn on_complete(&mut self) -> Option<CompletedStream> {
        self.dispatch(StreamAction::Complete)
            .into_iter()
            .find_map(|effect| match effect {
                StreamEffect::Completed(completed) => Some(completed),
                _ => None,
            })
    }

    pub fn cancel(&mut self) {
        self.dispatch(StreamAction::Cancel);
    }

    pub fn transport_failed(&mut self, reason: impl Into<String>) {
        self.dispatch(StreamAction::TransportFailed {
            reason: reason.into(),
        });
    }

    pub fn set_stream_id(&mut self, stream_id: Option<String>) {
        self.dispatch(StreamAction::SetStreamId(stream_id));
    }

    pub fn dispatch(&mut self, action: StreamAction) -> Vec<StreamEffect> {
        let effects = reduce(&mut self.state, action);
        for effect in &effects {
            self.sink.emit(effect);
        }
        effects
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn display_text(&self) -> &str {
        &self.state.display_text
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::action_block::ActionBlock;

    fn accumulator() -> StreamAccumulator<Vec<StreamEffect>> {
        StreamAccumulator::new(StreamConfig::default(), Vec::new())
    }

    fn displays(effects: &[StreamEffect]) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                StreamEffect::Display { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn completion_returns_final_text_and_action() {
        let mut acc = accumulator();
        acc.on_chunk("hi ACTION: {\"type\":\"click\",");
        acc.on_chunk("\"params\":{\"a\":1}}");

        let completed = acc.on_complete().expect("completed");
        assert_eq!(completed.final_text, "hi");
        assert_eq!(
            completed.action(),
            Some(&ActionBlock::new("click").with_param("a", json!(1)))
        );
        assert_eq!(displays(acc.sink()), vec!["hi", "hi"]);
    }

    #[test]
    fn chunks_after_cancel_emit_nothing() {
        let mut acc = accumulator();
        acc.on_chunk("partial answ");
        acc.cancel();
        let emitted = acc.sink().len();

        acc.on_chunk("er that should be dropped");
        acc.on_chunk(" and more");
        assert_eq!(acc.sink().len(), emitted);
        assert!(acc.state().buffer.is_empty());
        assert!(acc.on_complete().is_none());

        acc.begin(Some("next".to_string()));
        acc.on_chunk("fresh");
        assert_eq!(acc.state().buffer, "fresh");
        assert_eq!(acc.display_text(), "fresh");
    }

    #[test]
    fn callback_sink_sees_effects_in_order() {
        let mut seen = Vec::new();
        {
            let mut acc = StreamAccumulator::new(
                StreamConfig::default(),
                CallbackSink(|effect: &StreamEffect| seen.push(effect.clone())),
            );
            acc.on_chunk("a");
            acc.on_chunk("b");
            acc.on_complete();
        }
        let kinds: Vec<&str> = seen
            .iter()
            .map(|effect| match effect {
                StreamEffect::Started { .. } => "started",
                StreamEffect::Display { .. } => "display",
                StreamEffect::Completed(_) => "completed",
                StreamEffect::RequestStop { .. } => "stop",
                StreamEffect::Aborted { .. } => "aborted",
            })
            .collect();
        assert_eq!(kinds, vec!["started", "display", "display", "completed"]);
    }

    #[test]
    fn borrowed_sink_can_be_reused_across_accumulators() {
        let mut effects: Vec<StreamEffect> = Vec::new();
        {
            let mut acc = StreamAccumulator::new(StreamConfig::default(), &mut effects);
            acc.on_chunk("one");
        }
        {
            let mut acc = StreamAccumulator::new(StreamConfig::default(), &mut effects);
            acc.on_chunk("two");
        }
        assert_eq!(displays(&effects), vec!["one", "two"]);
    }

    #[test]
    fn null_sink_still_returns_completion() {
        let mut acc = StreamAccumulator::new(StreamConfig::default(), NullSink);
        acc.on_chunk("plain");
        let completed = acc.on_complete().expect("completed");
        assert_eq!(completed.final_text, "plain");
        assert!(completed.action().is_none());
    }
}
