//! Presentation surface seam.
//!
//! The agent never renders anything itself; it instructs a surface to show a
//! resource and hears back about video playback through the orchestrator's
//! callbacks. The default surface only logs, which is what headless
//! deployments and tests use.

use crate::protocol::ContentKind;
use std::sync::Arc;

/// Everything the surface needs to show one piece of content. `source` is a
/// resolved local path for cached video and the original URL otherwise.
#[derive(Debug, Clone)]
pub struct DisplayRequest {
    pub content_id: String,
    pub kind: ContentKind,
    pub source: String,
    pub title: Option<String>,
    pub text: Option<String>,
    pub duration_seconds: u64,
}

/// Fire-and-forget display instructions. Implementations must not block;
/// playback completion for video is reported back asynchronously.
pub trait PresentationSurface: Send + Sync {
    fn display_content(&self, request: DisplayRequest);

    /// Operator broadcast notice; display only, no state change.
    fn show_notice(&self, message: &str, level: &str);
}

/// Surface that logs instructions instead of rendering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSurface;

impl PresentationSurface for LoggingSurface {
    fn display_content(&self, request: DisplayRequest) {
        tracing::info!(
            content_id = %request.content_id,
            kind = request.kind.as_str(),
            source = %request.source,
            duration = request.duration_seconds,
            "display content"
        );
    }

    fn show_notice(&self, message: &str, level: &str) {
        tracing::info!(level, "broadcast notice: {message}");
    }
}

pub type SharedSurface = Arc<dyn PresentationSurface>;
