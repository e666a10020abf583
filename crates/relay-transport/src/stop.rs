use serde::Deserialize;
use serde::Serialize;

use crate::envelope::MessageRecord;
use crate::error::TransportError;

/// Route the host POSTs a [`StopRequest`] to.
pub const STOP_ENDPOINT: &str = "/ai";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub stop_stream_id: Option<String>,
    pub message_id: Option<String>,
    pub agent_id: Option<String>,
}

impl StopRequest {
    pub fn new(stream_id: Option<String>) -> Self {
        Self {
            stop_stream_id: stream_id,
            message_id: None,
            agent_id: None,
        }
    }

    pub fn for_message(mut self, record: Option<&MessageRecord>) -> Self {
        if let Some(record) = record {
            self.message_id = record.id.clone();
            self.agent_id = record
                .selected_agent_id
                .clone()
                .or_else(|| record.agent_id.clone());
        }
        self
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(TransportError::Encode)
    }
}
