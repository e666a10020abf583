#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAction {
    /// The user sent a new message; any in-flight stream is stopped first.
    Begin {
        client_id: Option<String>,
    },
    Chunk(String),
    Complete,
    Cancel,
    TransportFailed {
        reason: String,
    },
    SetStreamId(Option<String>),
}
