use crate::action_block::ActionBlock;
use crate::config::StreamConfig;
use crate::detector::DetectorOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Streaming,
    Completing,
}

impl StreamPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Completing => "completing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    UserStop,
    /// A new user message started while this stream was in flight.
    Superseded,
    Transport(String),
}

impl AbortReason {
    pub fn label(&self) -> &str {
        match self {
            Self::UserStop => "user_stop",
            Self::Superseded => "superseded",
            Self::Transport(reason) => reason.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedStream {
    pub generation: u64,
    pub final_text: String,
    pub actions: Vec<ActionBlock>,
}

impl CompletedStream {
    /// The primary action, if the response carried any.
    pub fn action(&self) -> Option<&ActionBlock> {
        self.actions.first()
    }
}

/// One chat view's streaming state. Exactly one buffer is live at a time.
#[derive(Debug, Clone)]
pub struct StreamState {
    pub phase: StreamPhase,
    /// Bumped every time a new stream starts.
    pub generation: u64,
    pub buffer: String,
    /// Last text emitted for display; survives aborts.
    pub display_text: String,
    /// Set by a stop; cleared only when the next user message begins.
    pub suppressed: bool,
    pub client_id: Option<String>,
    pub stream_id: Option<String>,
    pub chunk_count: usize,
    pub config: StreamConfig,
}

impl StreamState {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            phase: StreamPhase::Idle,
            generation: 0,
            buffer: String::new(),
            display_text: String::new(),
            suppressed: false,
            client_id: None,
            stream_id: None,
            chunk_count: 0,
            config,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == StreamPhase::Streaming
    }

    pub fn detector_options(&self) -> DetectorOptions<'_> {
        DetectorOptions {
            marker: self.config.marker.as_str(),
            allow_arrays: self.config.allow_array_actions,
        }
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}
