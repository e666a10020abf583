use relay_core::accumulator::StreamAccumulator;
use relay_core::accumulator::StreamSink;
use relay_core::actions::StreamAction;
use relay_core::config::StreamConfig;
use relay_core::reducer::StreamEffect;
use tracing::debug;

use crate::envelope::Envelope;
use crate::envelope::EnvelopeKind;
use crate::envelope::MessageRecord;
use crate::stop::StopRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyChunk,
    MissingClientId,
    MissingMessage,
    MissingThread,
    MissingAgent,
    OtherThread,
    OtherClient,
    OtherDevice,
    UnhandledKind,
}

impl IgnoreReason {
    pub fn label(self) -> &'static str {
        match self {
            Self::EmptyChunk => "empty_chunk",
            Self::MissingClientId => "missing_client_id",
            Self::MissingMessage => "missing_message",
            Self::MissingThread => "missing_thread",
            Self::MissingAgent => "missing_agent",
            Self::OtherThread => "other_thread",
            Self::OtherClient => "other_client",
            Self::OtherDevice => "other_device",
            Self::UnhandledKind => "unhandled_kind",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Handled(Vec<StreamEffect>),
    Ignored(IgnoreReason),
}

/// Who is looking at the chat view. Owner messages echoed from another of
/// the owner's devices are not replayed here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub guest_id: Option<String>,
}

impl Viewer {
    fn owns(&self, record: &MessageRecord) -> bool {
        let same = |mine: &Option<String>, theirs: &Option<String>| {
            theirs.is_some() && mine.as_deref() == theirs.as_deref()
        };
        same(&self.user_id, &record.user_id) || same(&self.guest_id, &record.guest_id)
    }
}

/// Routes envelopes for one chat view into its accumulator.
pub struct StreamDispatcher<S> {
    accumulator: StreamAccumulator<S>,
    thread_id: Option<String>,
    client_id: Option<String>,
    viewer: Viewer,
    last_message: Option<MessageRecord>,
}

impl<S: StreamSink> StreamDispatcher<S> {
    pub fn new(config: StreamConfig, sink: S) -> Self {
        Self {
            accumulator: StreamAccumulator::new(config, sink),
            thread_id: None,
            client_id: None,
            viewer: Viewer::default(),
            last_message: None,
        }
    }

    pub fn with_thread(mut self, thread_id: Option<String>) -> Self {
        self.thread_id = thread_id;
        self
    }

    pub fn with_viewer(mut self, viewer: Viewer) -> Self {
        self.viewer = viewer;
        self
    }

    /// A new user message: binds `client_id` and stops anything in flight.
    pub fn begin(&mut self, client_id: Option<String>) -> Vec<StreamEffect> {
        self.client_id = client_id.clone();
        self.last_message = None;
        self.accumulator.dispatch(StreamAction::Begin { client_id })
    }

    pub fn handle(&mut self, envelope: &Envelope) -> Dispatch {
        let kind = envelope.envelope_kind();
        if matches!(kind, EnvelopeKind::Message | EnvelopeKind::Other) {
            return self.ignore(envelope, IgnoreReason::UnhandledKind);
        }
        if self.from_other_device(envelope) {
            return self.ignore(envelope, IgnoreReason::OtherDevice);
        }
        if kind == EnvelopeKind::StreamUpdate {
            self.handle_update(envelope)
        } else {
            self.handle_complete(envelope)
        }
    }

    fn handle_update(&mut self, envelope: &Envelope) -> Dispatch {
        let Some(chunk) = envelope.chunk() else {
            return self.ignore(envelope, IgnoreReason::EmptyChunk);
        };
        let Some(client_id) = envelope.data.client_id.as_deref() else {
            return self.ignore(envelope, IgnoreReason::MissingClientId);
        };
        if envelope.data.message.is_none() {
            return self.ignore(envelope, IgnoreReason::MissingMessage);
        }
        if let Err(reason) = self.check_thread(envelope) {
            return self.ignore(envelope, reason);
        }
        match self.client_id.as_deref() {
            Some(bound) if bound != client_id => {
                return self.ignore(envelope, IgnoreReason::OtherClient);
            }
            Some(_) => {}
            None => self.client_id = Some(client_id.to_string()),
        }

        self.remember(envelope);
        let mut effects = Vec::new();
        if let Some(stream_id) = envelope.data.stream_id.as_deref() {
            if self.accumulator.state().stream_id.as_deref() != Some(stream_id) {
                effects.extend(
                    self.accumulator
                        .dispatch(StreamAction::SetStreamId(Some(stream_id.to_string()))),
                );
            }
        }
        effects.extend(
            self.accumulator
                .dispatch(StreamAction::Chunk(chunk.to_string())),
        );
        Dispatch::Handled(effects)
    }

    fn handle_complete(&mut self, envelope: &Envelope) -> Dispatch {
        if envelope.thread_id().is_none() {
            return self.ignore(envelope, IgnoreReason::MissingThread);
        }
        if let Err(reason) = self.check_thread(envelope) {
            return self.ignore(envelope, reason);
        }
        if envelope.ai_agent().is_none() {
            return self.ignore(envelope, IgnoreReason::MissingAgent);
        }
        self.remember(envelope);
        Dispatch::Handled(self.accumulator.dispatch(StreamAction::Complete))
    }

    /// User pressed stop. Returns the payload to send to the server when a
    /// stream (or a known stream id) was in flight.
    pub fn stop(&mut self) -> Option<StopRequest> {
        self.accumulator
            .dispatch(StreamAction::Cancel)
            .into_iter()
            .find_map(|effect| match effect {
                StreamEffect::RequestStop { stream_id, .. } => {
                    Some(StopRequest::new(stream_id).for_message(self.last_message.as_ref()))
                }
                _ => None,
            })
    }

    pub fn connection_lost(&mut self, reason: impl Into<String>) -> Vec<StreamEffect> {
        self.accumulator.dispatch(StreamAction::TransportFailed {
            reason: reason.into(),
        })
    }

    pub fn accumulator(&self) -> &StreamAccumulator<S> {
        &self.accumulator
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.accumulator.sink_mut()
    }

    pub fn into_sink(self) -> S {
        self.accumulator.into_sink()
    }

    /// A bound thread rejects envelopes for other threads and threadless ones.
    fn check_thread(&self, envelope: &Envelope) -> Result<(), IgnoreReason> {
        match self.thread_id.as_deref() {
            Some(bound) if envelope.thread_id() != Some(bound) => Err(IgnoreReason::OtherThread),
            _ => Ok(()),
        }
    }

    fn from_other_device(&self, envelope: &Envelope) -> bool {
        let Some(record) = envelope.message_record() else {
            return false;
        };
        if record.agent_id.is_none() || !self.viewer.owns(record) {
            return false;
        }
        envelope
            .data
            .device_id
            .as_deref()
            .is_some_and(|device| Some(device) != self.viewer.device_id.as_deref())
    }

    fn remember(&mut self, envelope: &Envelope) {
        if let Some(record) = envelope.message_record() {
            self.last_message = Some(record.clone());
        }
    }

    fn ignore(&self, envelope: &Envelope, reason: IgnoreReason) -> Dispatch {
        debug!(kind = %envelope.kind, reason = reason.label(), "ignoring envelope");
        Dispatch::Ignored(reason)
    }
}
