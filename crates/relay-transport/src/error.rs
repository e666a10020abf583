use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("read envelopes: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: invalid envelope: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode payload: {0}")]
    Encode(#[source] serde_json::Error),
}
