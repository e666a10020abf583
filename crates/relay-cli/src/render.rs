use std::io::Write;

use relay_core::accumulator::StreamSink;
use relay_core::reducer::StreamEffect;
use relay_core::transcript::SessionSummary;
use relay_core::transcript::TranscriptStore;
use relay_transport::stop::StopRequest;
use relay_transport::stop::STOP_ENDPOINT;
use serde_json::json;
use serde_json::Value;

pub fn effect_value(effect: &StreamEffect) -> Value {
    match effect {
        StreamEffect::Started {
            generation,
            client_id,
        } => json!({
            "event": "started",
            "generation": generation,
            "clientId": client_id,
        }),
        StreamEffect::Display { generation, text } => json!({
            "event": "display",
            "generation": generation,
            "text": text,
        }),
        StreamEffect::Completed(completed) => json!({
            "event": "completed",
            "generation": completed.generation,
            "finalText": completed.final_text,
            "action": completed.action(),
            "actions": completed.actions,
        }),
        StreamEffect::RequestStop {
            generation,
            stream_id,
        } => json!({
            "event": "stop_requested",
            "generation": generation,
            "streamId": stream_id,
        }),
        StreamEffect::Aborted {
            generation,
            retained_text,
            reason,
        } => json!({
            "event": "aborted",
            "generation": generation,
            "retainedText": retained_text,
            "reason": reason.label(),
        }),
    }
}

pub fn stop_value(request: &StopRequest) -> Value {
    json!({
        "event": "stop_request",
        "endpoint": STOP_ENDPOINT,
        "body": request,
    })
}

pub fn session_value(summary: &SessionSummary) -> Value {
    json!(summary)
}

/// Prints effects as JSON lines and mirrors lifecycle events into an
/// optional transcript. The first write failure is kept and reported once
/// the feed finishes.
pub struct OutputSink<W> {
    out: W,
    quiet: bool,
    transcript: Option<TranscriptStore>,
    error: Option<std::io::Error>,
}

impl<W: Write> OutputSink<W> {
    pub fn new(out: W, quiet: bool, transcript: Option<TranscriptStore>) -> Self {
        Self {
            out,
            quiet,
            transcript,
            error: None,
        }
    }

    pub fn write_value(&mut self, value: &Value) {
        let result = writeln!(self.out, "{value}");
        self.keep_first_error(result);
    }

    pub fn finish(mut self) -> std::io::Result<()> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.out.flush()
    }

    fn keep_first_error(&mut self, result: std::io::Result<()>) {
        if let Err(err) = result {
            if self.error.is_none() {
                self.error = Some(err);
            }
        }
    }
}

impl<W: Write> StreamSink for OutputSink<W> {
    fn emit(&mut self, effect: &StreamEffect) {
        if let Some(store) = self.transcript.as_mut() {
            let result = store.record_effect(effect).map(|_| ());
            self.keep_first_error(result);
        }
        let chatty = matches!(
            effect,
            StreamEffect::Started { .. } | StreamEffect::Display { .. }
        );
        if self.quiet && chatty {
            return;
        }
        self.write_value(&effect_value(effect));
    }
}
