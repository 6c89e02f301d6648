//! JSON-lines protocol between a UI host and the sync engine.
//!
//! One request object per line, one response object per line:
//!
//! ```text
//! → {"cmd":"play","profile":"1","item":{"id":"yt-42","title":"Song","artist":"Band"}}
//! ← {"ok":true,"outcome":"inserted","score":220}
//! → {"cmd":"queue","profile":"1","req_id":7}
//! ← {"ok":true,"req_id":7,"entries":[...]}
//! ```
//!
//! Requests are applied one at a time in arrival order, so a read always
//! sees every mutation sent before it. `sweep` is the exception: it runs in
//! the background and replies when done, which is why a `req_id` in the
//! request is echoed back.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::connectivity::NetworkStatus;
use crate::downloads::DownloadController;
use crate::engine::{EnqueueOutcome, SyncEngine};
use crate::item::Item;
use crate::priority::TriggerClass;

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Play { profile: String, item: Item },
    Favorite { profile: String, item: Item, favorited: bool },
    PlaylistAdd { profile: String, item: Item },
    Download { profile: String, item: Item },
    /// Enqueue under an explicit trigger class ("history", "playlist", ...).
    Enqueue { profile: String, item: Item, trigger: String },
    RemoveDownload { profile: String, id: String },
    ToggleDownload { profile: String, item: Item },
    Cancel { profile: String, id: String },
    Queue { profile: String },
    Catalog { profile: String },
    History { profile: String },
    Stats { profile: String },
    Sweep { profile: String },
    Online { online: bool },
    /// The host deleted a profile.
    ForgetProfile { profile: String },
}

pub struct RpcHandler {
    engine: Arc<SyncEngine>,
    controller: Arc<DownloadController>,
    network: Arc<NetworkStatus>,
}

impl RpcHandler {
    pub fn new(controller: Arc<DownloadController>, network: Arc<NetworkStatus>) -> Self {
        Self {
            engine: controller.engine().clone(),
            controller,
            network,
        }
    }

    /// Answer requests from `input` until EOF, sending every reply to `out`.
    /// Returns once background sweeps have replied too.
    pub async fn serve<R>(self: Arc<Self>, input: R, out: mpsc::UnboundedSender<Value>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut sweeps = JoinSet::new();

        while let Some(line) = lines.next_line().await.context("failed to read request")? {
            if line.trim().is_empty() {
                continue;
            }

            let resp = match parse_line(&line) {
                Ok((request @ Request::Sweep { .. }, req_id)) => {
                    let handler = Arc::clone(&self);
                    let out = out.clone();
                    sweeps.spawn(async move {
                        let resp = with_req_id(handler.handle(request).await, req_id);
                        let _ = out.send(resp);
                    });
                    continue;
                }
                Ok((request, req_id)) => with_req_id(self.handle(request).await, req_id),
                Err(resp) => resp,
            };

            if out.send(resp).is_err() {
                break;
            }
        }

        while sweeps.join_next().await.is_some() {}
        Ok(())
    }

    /// Parse and execute one protocol line. Never fails: problems come back
    /// as `{"error": ...}`.
    pub async fn handle_line(&self, line: &str) -> Value {
        match parse_line(line) {
            Ok((request, req_id)) => with_req_id(self.handle(request).await, req_id),
            Err(resp) => resp,
        }
    }

    pub async fn handle(&self, request: Request) -> Value {
        match request {
            Request::Play { profile, item } => enqueue_response(self.engine.on_play(&profile, &item)),
            Request::Favorite { profile, item, favorited } => {
                enqueue_response(self.engine.on_favorite_toggle(&profile, &item, favorited))
            }
            Request::PlaylistAdd { profile, item } => enqueue_response(self.engine.on_playlist_add(&profile, &item)),
            Request::Download { profile, item } => {
                enqueue_response(self.engine.on_explicit_download_request(&profile, &item))
            }
            Request::Enqueue { profile, item, trigger } => match trigger.parse::<TriggerClass>() {
                Ok(trigger) => enqueue_response(self.engine.enqueue_or_boost(&profile, &item, trigger)),
                Err(e) => json!({"error": e.to_string()}),
            },
            Request::ToggleDownload { profile, item } => {
                enqueue_response(self.engine.toggle_download(&profile, &item))
            }
            Request::RemoveDownload { profile, id } => {
                let removed = self.engine.on_explicit_download_removal(&profile, &id);
                json!({"ok": true, "removed": removed})
            }
            Request::Cancel { profile, id } => {
                let removed = self.engine.cancel_pending(&profile, &id);
                json!({"ok": true, "removed": removed})
            }
            Request::Queue { profile } => {
                let entries: Vec<Value> = self
                    .engine
                    .get_queue_snapshot(&profile)
                    .into_iter()
                    .map(|entry| {
                        json!({
                            "id": entry.id,
                            "item": entry.item,
                            "priority_score": entry.priority_score,
                            "enqueued_at": entry.enqueued_at,
                            "progress": self.controller.progress(&profile, &entry.id),
                        })
                    })
                    .collect();
                json!({"ok": true, "entries": entries})
            }
            Request::Catalog { profile } => {
                json!({"ok": true, "items": self.engine.get_offline_catalog(&profile)})
            }
            Request::History { profile } => {
                json!({"ok": true, "items": self.engine.history(&profile)})
            }
            Request::Stats { profile } => {
                let stats = self.engine.stats(&profile);
                json!({
                    "ok": true,
                    "online": self.engine.is_online(),
                    "pending": stats.pending,
                    "completed": stats.completed,
                    "favorites": stats.favorites,
                    "tracked_plays": stats.tracked_plays,
                })
            }
            Request::Sweep { profile } => {
                let report = self.controller.sweep(&profile).await;
                json!({"ok": true, "report": report})
            }
            Request::Online { online } => {
                self.network.set_online(online);
                json!({"ok": true, "online": online})
            }
            Request::ForgetProfile { profile } => {
                self.engine.forget_profile(&profile);
                json!({"ok": true})
            }
        }
    }
}

fn parse_line(line: &str) -> Result<(Request, Option<Value>), Value> {
    let raw: Value =
        serde_json::from_str(line).map_err(|e| json!({"error": format!("invalid json: {}", e)}))?;
    let req_id = raw.get("req_id").cloned();

    match serde_json::from_value::<Request>(raw) {
        Ok(request) => Ok((request, req_id)),
        Err(e) => Err(with_req_id(json!({"error": format!("bad request: {}", e)}), req_id)),
    }
}

fn with_req_id(mut resp: Value, req_id: Option<Value>) -> Value {
    if let (Some(id), Some(obj)) = (req_id, resp.as_object_mut()) {
        obj.insert("req_id".to_string(), id);
    }
    resp
}

fn enqueue_response(outcome: EnqueueOutcome) -> Value {
    match outcome {
        EnqueueOutcome::Inserted { score } => json!({"ok": true, "outcome": "inserted", "score": score}),
        EnqueueOutcome::Boosted { from, to } => {
            json!({"ok": true, "outcome": "boosted", "from": from, "score": to})
        }
        EnqueueOutcome::Unchanged { score } => json!({"ok": true, "outcome": "unchanged", "score": score}),
        EnqueueOutcome::Offline => json!({"ok": true, "outcome": "offline"}),
        EnqueueOutcome::AlreadyDownloaded => json!({"ok": true, "outcome": "already_downloaded"}),
        EnqueueOutcome::Removed => json!({"ok": true, "outcome": "removed"}),
        EnqueueOutcome::NotQueued => json!({"ok": true, "outcome": "not_queued"}),
    }
}
