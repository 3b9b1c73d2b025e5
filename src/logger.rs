use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::warn;

pub enum MessageLogMode {
    Full,
    Diffed,
}

/// Append-only NDJSON log of wire traffic for one device session.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous_state: Option<Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous_state: None,
        })
    }

    pub fn log_status(&mut self, device: &str, connected: bool) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "status",
            "device": device,
            "connected": connected,
        });
        self.write_line(&entry);
    }

    pub fn log_outbound(&mut self, device: &str, fragment: &Value) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "device": device,
            "body": fragment,
        });
        self.write_line(&entry);
    }

    pub fn log_inbound(&mut self, device: &str, body: &Value) {
        match self.mode {
            MessageLogMode::Full => {
                let entry = json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "state",
                    "device": device,
                    "body": body,
                });
                self.write_line(&entry);
            }
            MessageLogMode::Diffed => {
                match self.previous_state.take() {
                    None => {
                        let entry = json!({
                            "ts": Utc::now().to_rfc3339(),
                            "dir": "state",
                            "device": device,
                            "full": true,
                            "body": body,
                        });
                        self.write_line(&entry);
                    }
                    Some(prev) => {
                        let changes = diff_fields(&prev, body);
                        let entry = json!({
                            "ts": Utc::now().to_rfc3339(),
                            "dir": "state",
                            "device": device,
                            "changes": changes,
                        });
                        self.write_line(&entry);
                    }
                }
                self.previous_state = Some(body.clone());
            }
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

/// Field-level diff of two flat state documents.
fn diff_fields(previous: &Value, current: &Value) -> Vec<Value> {
    let empty = Map::new();
    let prev = previous.as_object().unwrap_or(&empty);
    let curr = current.as_object().unwrap_or(&empty);

    curr.iter()
        .filter(|(key, value)| prev.get(*key) != Some(*value))
        .map(|(key, value)| {
            json!({
                "field": key,
                "old": prev.get(key).cloned().unwrap_or(Value::Null),
                "new": value,
            })
        })
        .collect()
}
