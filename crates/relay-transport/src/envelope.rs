use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

pub const STREAM_UPDATE: &str = "stream_update";
pub const STREAM_COMPLETE: &str = "stream_complete";
pub const MESSAGE: &str = "message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    StreamUpdate,
    StreamComplete,
    Message,
    Other,
}

/// One WebSocket event: `{ "type": "...", "data": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: EnvelopeData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_agent: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<String>,
}

impl Envelope {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn stream_update(client_id: &str, chunk: &str) -> Self {
        Self {
            kind: STREAM_UPDATE.to_string(),
            data: EnvelopeData {
                client_id: Some(client_id.to_string()),
                chunk: Some(chunk.to_string()),
                message: Some(MessagePayload::default()),
                ..EnvelopeData::default()
            },
        }
    }

    pub fn stream_complete() -> Self {
        Self {
            kind: STREAM_COMPLETE.to_string(),
            data: EnvelopeData::default(),
        }
    }

    pub fn with_thread(mut self, thread_id: &str) -> Self {
        self.record_mut().thread_id = Some(thread_id.to_string());
        self
    }

    pub fn with_stream_id(mut self, stream_id: &str) -> Self {
        self.data.stream_id = Some(stream_id.to_string());
        self
    }

    pub fn with_device(mut self, device_id: &str) -> Self {
        self.data.device_id = Some(device_id.to_string());
        self
    }

    pub fn with_ai_agent(mut self, agent: Value) -> Self {
        self.data
            .message
            .get_or_insert_with(MessagePayload::default)
            .ai_agent = Some(agent);
        self
    }

    /// Mutable access to the message record, creating it if absent.
    pub fn record_mut(&mut self) -> &mut MessageRecord {
        self.data
            .message
            .get_or_insert_with(MessagePayload::default)
            .message
            .get_or_insert_with(MessageRecord::default)
    }

    pub fn envelope_kind(&self) -> EnvelopeKind {
        match self.kind.as_str() {
            STREAM_UPDATE => EnvelopeKind::StreamUpdate,
            STREAM_COMPLETE => EnvelopeKind::StreamComplete,
            MESSAGE => EnvelopeKind::Message,
            _ => EnvelopeKind::Other,
        }
    }

    pub fn message_record(&self) -> Option<&MessageRecord> {
        self.data.message.as_ref()?.message.as_ref()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.message_record()?.thread_id.as_deref()
    }

    pub fn ai_agent(&self) -> Option<&Value> {
        self.data.message.as_ref()?.ai_agent.as_ref()
    }

    /// Non-empty chunk text, if any.
    pub fn chunk(&self) -> Option<&str> {
        self.data.chunk.as_deref().filter(|chunk| !chunk.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn decodes_stream_update_from_wire_shape() {
        let envelope = Envelope::decode(
            r#"{"type":"stream_update","data":{"clientId":"c1","streamId":"s1","chunk":"Hel","message":{"message":{"id":"m1","threadId":"t1","selectedAgentId":"a1"},"aiAgent":{"name":"sushi"}}}}"#,
        )
        .expect("decode");

        assert_eq!(envelope.envelope_kind(), EnvelopeKind::StreamUpdate);
        assert_eq!(envelope.data.client_id.as_deref(), Some("c1"));
        assert_eq!(envelope.data.stream_id.as_deref(), Some("s1"));
        assert_eq!(envelope.chunk(), Some("Hel"));
        assert_eq!(envelope.thread_id(), Some("t1"));
        let record = envelope.message_record().expect("record");
        assert_eq!(record.selected_agent_id.as_deref(), Some("a1"));
    }

    #[test]
    fn missing_data_and_unknown_kinds_decode() {
        let envelope = Envelope::decode(r#"{"type":"mood"}"#).expect("decode");
        assert_eq!(envelope.envelope_kind(), EnvelopeKind::Other);
        assert_eq!(envelope.data, EnvelopeData::default());
        assert_eq!(envelope.thread_id(), None);
    }

    #[test]
    fn empty_chunk_is_treated_as_absent() {
        let envelope = Envelope::stream_update("c1", "");
        assert_eq!(envelope.chunk(), None);
    }

    #[test]
    fn owner_and_agent_fields_decode() {
        let envelope = Envelope::decode(
            r#"{"type":"stream_complete","data":{"deviceId":"d2","message":{"message":{"threadId":"t1","agentId":"a1","userId":"u1"},"aiAgent":{"name":"sushi"}}}}"#,
        )
        .expect("decode");
        assert_eq!(envelope.data.device_id.as_deref(), Some("d2"));
        assert_eq!(
            envelope.message_record().and_then(|record| record.user_id.as_deref()),
            Some("u1")
        );
        assert_eq!(envelope.ai_agent(), Some(&serde_json::json!({"name": "sushi"})));
    }

    #[test]
    fn builders_encode_camel_case_fields() {
        let envelope = Envelope::stream_update("c1", "x")
            .with_thread("t1")
            .with_stream_id("s1");
        let encoded = serde_json::to_value(&envelope).expect("encode");
        assert_eq!(
            encoded,
            serde_json::json!({
                "type": "stream_update",
                "data": {
                    "clientId": "c1",
                    "streamId": "s1",
                    "chunk": "x",
                    "message": {"message": {"threadId": "t1"}}
                }
            })
        );
    }
}
