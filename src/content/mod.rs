//! Content delivery orchestration.
//!
//! Turns a validated content-push message into a fetch (video only), a
//! display instruction, and a stream of `(contentId, status, error?)` events
//! consumed by the session layer. Each transition for a push is reported
//! exactly once; `error` is always terminal, and tasks are evicted from the
//! active table once a terminal status has been reported.

pub mod fetch;
pub mod surface;

pub use fetch::{CacheEntry, FetchCache, FetchError, FetchTicket, FetchUpdate};
pub use surface::{DisplayRequest, LoggingSurface, PresentationSurface, SharedSurface};

use crate::protocol::{ContentKind, ContentPush, ContentStatus, Envelope};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One status transition for a content push, published upstream as a
/// content_response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEvent {
    pub content_id: String,
    pub status: ContentStatus,
    pub error: Option<String>,
}

/// Active content push being progressed.
#[derive(Debug, Clone)]
struct ContentTask {
    kind: ContentKind,
    status: ContentStatus,
}

struct OrchestratorInner {
    surface: SharedSurface,
    cache: FetchCache,
    events: mpsc::UnboundedSender<ContentEvent>,
    tasks: Mutex<HashMap<String, ContentTask>>,
}

/// Shared handle to the orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct ContentOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl ContentOrchestrator {
    pub fn new(
        surface: SharedSurface,
        cache: FetchCache,
    ) -> (Self, mpsc::UnboundedReceiver<ContentEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(OrchestratorInner {
                    surface,
                    cache,
                    events,
                    tasks: Mutex::new(HashMap::new()),
                }),
            },
            rx,
        )
    }

    /// Handle one content-push envelope. Slow work (fetch, duration timers)
    /// runs on spawned tasks so the dispatch path never stalls.
    pub fn handle_push(&self, envelope: &Envelope) {
        let push = match ContentPush::from_data(&envelope.data) {
            Ok(push) => push,
            Err(err) => {
                // Best-effort content id so the rejection is attributable.
                let content_id = envelope.data["contentId"]
                    .as_str()
                    .unwrap_or("unknown")
                    .to_string();
                tracing::warn!(content_id, "dropping content push: {err:#}");
                self.emit_error(&content_id, "invalid content push format");
                return;
            }
        };

        let Some(kind) = ContentKind::parse(&push.kind) else {
            tracing::warn!(content_id = %push.content_id, kind = %push.kind, "unsupported content type");
            self.emit_error(
                &push.content_id,
                &format!("unsupported content type: {}", push.kind),
            );
            return;
        };

        let source = match (&push.url, kind) {
            (Some(url), _) => url.clone(),
            // Text pushes may carry inline text with no source reference.
            (None, ContentKind::Text) => String::new(),
            (None, _) => {
                self.emit_error(&push.content_id, "missing content url");
                return;
            }
        };

        tracing::info!(
            content_id = %push.content_id,
            kind = kind.as_str(),
            duration = push.duration,
            "handling content push"
        );
        {
            let mut tasks = self.inner.tasks.lock();
            if tasks.contains_key(&push.content_id) {
                tracing::debug!(content_id = %push.content_id, "content push already in progress");
                return;
            }
            tasks.insert(
                push.content_id.clone(),
                ContentTask {
                    kind,
                    status: ContentStatus::Received,
                },
            );
        }

        match kind {
            ContentKind::Image | ContentKind::Text | ContentKind::Webpage => {
                self.display_direct(&push, kind, source);
            }
            ContentKind::Video => self.deliver_video(&push, source),
        }
    }

    /// Image/text/webpage: display straight from the source reference, then
    /// auto-complete after the configured duration.
    fn display_direct(&self, push: &ContentPush, kind: ContentKind, source: String) {
        self.inner.surface.display_content(DisplayRequest {
            content_id: push.content_id.clone(),
            kind,
            source,
            title: push.title.clone(),
            text: push.text.clone(),
            duration_seconds: push.duration,
        });
        self.report(&push.content_id, ContentStatus::Playing, None);

        if push.duration > 0 {
            let orchestrator = self.clone();
            let content_id = push.content_id.clone();
            let duration = push.duration;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(duration)).await;
                orchestrator.report(&content_id, ContentStatus::Completed, None);
            });
        }
    }

    /// Video: cached copies play immediately; otherwise fetch first.
    /// Completion comes from the surface's playback-finished callback, never
    /// from a timer.
    fn deliver_video(&self, push: &ContentPush, source: String) {
        let cache_key = FetchCache::cache_key(
            &push.content_id,
            push.title.as_deref(),
            push.format.as_deref(),
        );
        match self.inner.cache.fetch(&cache_key, &source) {
            FetchTicket::Cached(path) => {
                self.display_video(push, &path.display().to_string());
            }
            ticket @ FetchTicket::Pending(_) => {
                self.report(&push.content_id, ContentStatus::Downloading, None);
                let orchestrator = self.clone();
                let push = push.clone();
                tokio::spawn(async move {
                    match FetchCache::wait(ticket).await {
                        Ok(path) => {
                            orchestrator.display_video(&push, &path.display().to_string());
                        }
                        Err(err) => {
                            orchestrator.report(
                                &push.content_id,
                                ContentStatus::Error,
                                Some(format!("video download failed: {err}")),
                            );
                        }
                    }
                });
            }
        }
    }

    fn display_video(&self, push: &ContentPush, local_path: &str) {
        self.inner.surface.display_content(DisplayRequest {
            content_id: push.content_id.clone(),
            kind: ContentKind::Video,
            source: local_path.to_string(),
            title: push.title.clone(),
            text: None,
            duration_seconds: push.duration,
        });
        self.report(&push.content_id, ContentStatus::Playing, None);
    }

    /// The surface finished playing a video.
    pub fn on_playback_finished(&self, content_id: &str) {
        let known = {
            let tasks = self.inner.tasks.lock();
            matches!(tasks.get(content_id), Some(task) if task.kind == ContentKind::Video)
        };
        if known {
            self.report(content_id, ContentStatus::Completed, None);
        } else {
            tracing::warn!(content_id, "playback finished for unknown content");
        }
    }

    /// The surface failed to play a video.
    pub fn on_playback_error(&self, content_id: &str, reason: &str) {
        self.report(
            content_id,
            ContentStatus::Error,
            Some(format!("playback failed: {reason}")),
        );
    }

    /// Report one transition, deduplicated per task: a repeated status is
    /// dropped, and nothing follows a terminal status. Terminal tasks are
    /// evicted once reported.
    fn report(&self, content_id: &str, status: ContentStatus, error: Option<String>) {
        {
            let mut tasks = self.inner.tasks.lock();
            match tasks.get_mut(content_id) {
                Some(task) => {
                    if task.status == status || task.status.is_terminal() {
                        return;
                    }
                    task.status = status;
                    if status.is_terminal() {
                        tasks.remove(content_id);
                    }
                }
                None if status.is_terminal() => {
                    // Late duplicate after eviction.
                    return;
                }
                None => {}
            }
        }
        let _ = self.inner.events.send(ContentEvent {
            content_id: content_id.to_string(),
            status,
            error,
        });
    }

    /// Error for a push that never became a task (validation failures).
    fn emit_error(&self, content_id: &str, reason: &str) {
        let _ = self.inner.events.send(ContentEvent {
            content_id: content_id.to_string(),
            status: ContentStatus::Error,
            error: Some(reason.to_string()),
        });
    }
}
