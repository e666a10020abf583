use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::reducer::StreamEffect;
use crate::state::AbortReason;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEvent {
    SessionStarted {
        generation: u64,
        client_id: Option<String>,
    },
    SessionCompleted {
        generation: u64,
        final_text: String,
        action_types: Vec<String>,
    },
    SessionCancelled {
        generation: u64,
        reason: String,
        retained_text: String,
    },
    SessionFailed {
        generation: u64,
        reason: String,
        retained_text: String,
    },
}

impl TranscriptEvent {
    /// Lifecycle events worth persisting; per-chunk display updates are not.
    pub fn from_effect(effect: &StreamEffect) -> Option<Self> {
        match effect {
            StreamEffect::Started {
                generation,
                client_id,
            } => Some(Self::SessionStarted {
                generation: *generation,
                client_id: client_id.clone(),
            }),
            StreamEffect::Completed(completed) => Some(Self::SessionCompleted {
                generation: completed.generation,
                final_text: completed.final_text.clone(),
                action_types: completed
                    .actions
                    .iter()
                    .map(|action| action.kind.clone())
                    .collect(),
            }),
            StreamEffect::Aborted {
                generation,
                retained_text,
                reason: AbortReason::Transport(reason),
            } => Some(Self::SessionFailed {
                generation: *generation,
                reason: reason.clone(),
                retained_text: retained_text.clone(),
            }),
            StreamEffect::Aborted {
                generation,
                retained_text,
                reason,
            } => Some(Self::SessionCancelled {
                generation: *generation,
                reason: reason.label().to_string(),
                retained_text: retained_text.clone(),
            }),
            StreamEffect::Display { .. } | StreamEffect::RequestStop { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub seq: u64,
    pub ts_ms: i64,
    #[serde(flatten)]
    pub event: TranscriptEvent,
}

#[derive(Debug)]
pub struct TranscriptStore {
    path: PathBuf,
    next_seq: u64,
}

impl TranscriptStore {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let existing = load_records(path.as_path())?;
        let next_seq = existing
            .iter()
            .map(|record| record.seq)
            .max()
            .map_or(1, |seq| seq.saturating_add(1));
        Ok(Self { path, next_seq })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn append(&mut self, event: TranscriptEvent) -> std::io::Result<u64> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        let record = TranscriptRecord {
            seq,
            ts_ms: chrono::Utc::now().timestamp_millis(),
            event,
        };
        let line = serde_json::to_string(&record)
            .map_err(|err| std::io::Error::other(format!("serialize: {err}")))?;
        append_line(self.path.as_path(), line.as_str())?;
        Ok(seq)
    }

    /// Appends the lifecycle event for `effect`, if it has one.
    pub fn record_effect(&mut self, effect: &StreamEffect) -> std::io::Result<Option<u64>> {
        match TranscriptEvent::from_effect(effect) {
            Some(event) => self.append(event).map(Some),
            None => Ok(None),
        }
    }

    pub fn load(&self) -> std::io::Result<Vec<TranscriptRecord>> {
        load_records(self.path.as_path())
    }

    pub fn load_since(&self, seq_exclusive: u64) -> std::io::Result<Vec<TranscriptRecord>> {
        let records = self.load()?;
        Ok(records
            .into_iter()
            .filter(|record| record.seq > seq_exclusive)
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub generation: u64,
    pub started_seq: u64,
    pub client_id: Option<String>,
    pub status: SessionStatus,
    pub final_text: Option<String>,
    pub action_types: Vec<String>,
    pub reason: Option<String>,
}

/// Folds records into one summary per started session, oldest first.
/// Generations restart with every process, so terminal events attach to the
/// most recent open session carrying the same generation.
pub fn replay_sessions(records: &[TranscriptRecord]) -> Vec<SessionSummary> {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|record| record.seq);

    let mut sessions: Vec<SessionSummary> = Vec::new();
    for record in sorted {
        match record.event {
            TranscriptEvent::SessionStarted {
                generation,
                client_id,
            } => sessions.push(SessionSummary {
                generation,
                started_seq: record.seq,
                client_id,
                status: SessionStatus::Streaming,
                final_text: None,
                action_types: Vec::new(),
                reason: None,
            }),
            TranscriptEvent::SessionCompleted {
                generation,
                final_text,
                action_types,
            } => {
                if let Some(session) = open_session(&mut sessions, generation) {
                    session.status = SessionStatus::Completed;
                    session.final_text = Some(final_text);
                    session.action_types = action_types;
                }
            }
            TranscriptEvent::SessionCancelled {
                generation,
                reason,
                retained_text,
            } => {
                if let Some(session) = open_session(&mut sessions, generation) {
                    session.status = SessionStatus::Cancelled;
                    session.final_text = Some(retained_text);
                    session.reason = Some(reason);
                }
            }
            TranscriptEvent::SessionFailed {
                generation,
                reason,
                retained_text,
            } => {
                if let Some(session) = open_session(&mut sessions, generation) {
                    session.status = SessionStatus::Failed;
                    session.final_text = Some(retained_text);
                    session.reason = Some(reason);
                }
            }
        }
    }

    sessions
}

fn open_session(sessions: &mut [SessionSummary], generation: u64) -> Option<&mut SessionSummary> {
    sessions
        .iter_mut()
        .rev()
        .find(|session| session.generation == generation && session.status == SessionStatus::Streaming)
}

fn load_records(path: &Path) -> std::io::Result<Vec<TranscriptRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<TranscriptRecord>(&line) {
            records.push(record);
        }
    }
    Ok(records)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::replay_sessions;
    use super::SessionStatus;
    use super::TranscriptEvent;
    use super::TranscriptRecord;
    use super::TranscriptStore;
    use crate::action_block::ActionBlock;
    use crate::reducer::StreamEffect;
    use crate::state::AbortReason;
    use crate::state::CompletedStream;
    use pretty_assertions::assert_eq;

    fn record(seq: u64, event: TranscriptEvent) -> TranscriptRecord {
        TranscriptRecord {
            seq,
            ts_ms: 0,
            event,
        }
    }

    #[test]
    fn append_records_are_monotonic_across_reopen() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("transcript.jsonl");
        let mut store = TranscriptStore::open(&path).expect("open");
        let seq1 = store
            .append(TranscriptEvent::SessionStarted {
                generation: 1,
                client_id: None,
            })
            .expect("append");
        let seq2 = store
            .append(TranscriptEvent::SessionCompleted {
                generation: 1,
                final_text: "hi".to_string(),
                action_types: Vec::new(),
            })
            .expect("append");
        assert_eq!((seq1, seq2), (1, 2));

        let mut reopened = TranscriptStore::open(&path).expect("reopen");
        let seq3 = reopened
            .append(TranscriptEvent::SessionStarted {
                generation: 1,
                client_id: None,
            })
            .expect("append");
        assert_eq!(seq3, 3);

        let loaded = reopened.load().expect("load");
        let seqs: Vec<u64> = loaded.iter().map(|record| record.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(reopened.load_since(2).expect("tail").len(), 1);
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("transcript.jsonl");
        let mut store = TranscriptStore::open(&path).expect("open");
        store
            .append(TranscriptEvent::SessionStarted {
                generation: 1,
                client_id: None,
            })
            .expect("append");
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut file| std::io::Write::write_all(&mut file, b"not json\n\n"))
            .expect("corrupt");

        assert_eq!(store.load().expect("load").len(), 1);
    }

    #[test]
    fn only_lifecycle_effects_are_recorded() {
        let dir = tempdir().expect("tmpdir");
        let mut store = TranscriptStore::open(dir.path().join("t.jsonl")).expect("open");

        let display = StreamEffect::Display {
            generation: 1,
            text: "x".to_string(),
        };
        assert_eq!(store.record_effect(&display).expect("record"), None);

        let completed = StreamEffect::Completed(CompletedStream {
            generation: 1,
            final_text: "x".to_string(),
            actions: vec![ActionBlock::new("click")],
        });
        assert_eq!(store.record_effect(&completed).expect("record"), Some(1));

        let loaded = store.load().expect("load");
        assert_eq!(
            loaded[0].event,
            TranscriptEvent::SessionCompleted {
                generation: 1,
                final_text: "x".to_string(),
                action_types: vec!["click".to_string()],
            }
        );
    }

    #[test]
    fn aborts_map_to_cancelled_or_failed() {
        let cancelled = TranscriptEvent::from_effect(&StreamEffect::Aborted {
            generation: 2,
            retained_text: "half".to_string(),
            reason: AbortReason::UserStop,
        });
        assert_eq!(
            cancelled,
            Some(TranscriptEvent::SessionCancelled {
                generation: 2,
                reason: "user_stop".to_string(),
                retained_text: "half".to_string(),
            })
        );

        let failed = TranscriptEvent::from_effect(&StreamEffect::Aborted {
            generation: 2,
            retained_text: "half".to_string(),
            reason: AbortReason::Transport("socket closed".to_string()),
        });
        assert!(matches!(
            failed,
            Some(TranscriptEvent::SessionFailed { ref reason, .. }) if reason == "socket closed"
        ));
    }

    #[test]
    fn replay_tracks_each_session_outcome() {
        let records = vec![
            record(
                1,
                TranscriptEvent::SessionStarted {
                    generation: 1,
                    client_id: Some("c1".to_string()),
                },
            ),
            record(
                2,
                TranscriptEvent::SessionCompleted {
                    generation: 1,
                    final_text: "first".to_string(),
                    action_types: vec!["click".to_string()],
                },
            ),
            record(
                3,
                TranscriptEvent::SessionStarted {
                    generation: 2,
                    client_id: None,
                },
            ),
            record(
                4,
                TranscriptEvent::SessionCancelled {
                    generation: 2,
                    reason: "user_stop".to_string(),
                    retained_text: "sec".to_string(),
                },
            ),
            // A later process restarts generations at 1.
            record(
                5,
                TranscriptEvent::SessionStarted {
                    generation: 1,
                    client_id: None,
                },
            ),
        ];

        let sessions = replay_sessions(&records);
        let statuses: Vec<SessionStatus> = sessions.iter().map(|session| session.status).collect();
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Completed,
                SessionStatus::Cancelled,
                SessionStatus::Streaming,
            ]
        );
        assert_eq!(sessions[0].final_text.as_deref(), Some("first"));
        assert_eq!(sessions[0].action_types, vec!["click".to_string()]);
        assert_eq!(sessions[1].reason.as_deref(), Some("user_stop"));
        assert_eq!(sessions[2].started_seq, 5);
    }

    #[test]
    fn replay_orders_by_seq_and_ignores_orphans() {
        let records = vec![
            record(
                3,
                TranscriptEvent::SessionFailed {
                    generation: 1,
                    reason: "reset".to_string(),
                    retained_text: String::new(),
                },
            ),
            record(
                2,
                TranscriptEvent::SessionStarted {
                    generation: 1,
                    client_id: None,
                },
            ),
            record(
                1,
                TranscriptEvent::SessionCompleted {
                    generation: 9,
                    final_text: "orphan".to_string(),
                    action_types: Vec::new(),
                },
            ),
        ];
        let sessions = replay_sessions(&records);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Failed);
        assert_eq!(sessions[0].reason.as_deref(), Some("reset"));
    }
}
