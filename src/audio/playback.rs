use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::clip::Clip;

const URL_SCHEME: &str = "blob:oya-speak/";

/// Revocable playback resource for one clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackHandle {
    url: String,
    content_type: String,
}

impl PlaybackHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// Owner of playable resource URLs
///
/// Holds at most one current preview; creating a new one revokes the old.
/// Everything still registered is revoked on drop.
#[derive(Default)]
pub struct PlaybackRegistry {
    resources: HashMap<String, Arc<Vec<u8>>>,
    current: Option<PlaybackHandle>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip for preview, replacing (and revoking) the current one
    pub fn create(&mut self, clip: &Clip) -> Result<PlaybackHandle, hound::Error> {
        let bytes = clip.encoded_bytes()?;
        self.reset();

        let handle = PlaybackHandle {
            url: format!("{}{}", URL_SCHEME, Uuid::new_v4()),
            content_type: clip.content_type().to_string(),
        };
        self.resources.insert(handle.url.clone(), Arc::new(bytes));
        debug!("Created playback resource {}", handle.url);

        self.current = Some(handle.clone());
        Ok(handle)
    }

    /// Bytes behind a live URL
    pub fn resolve(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.resources.get(url).cloned()
    }

    pub fn current(&self) -> Option<&PlaybackHandle> {
        self.current.as_ref()
    }

    /// Revoke one URL; returns whether it was live
    pub fn revoke(&mut self, url: &str) -> bool {
        if self.current.as_ref().is_some_and(|h| h.url == url) {
            self.current = None;
        }
        let removed = self.resources.remove(url).is_some();
        if removed {
            debug!("Revoked playback resource {}", url);
        }
        removed
    }

    /// Revoke the current preview
    pub fn reset(&mut self) {
        if let Some(handle) = self.current.take() {
            self.revoke(&handle.url);
        }
    }

    /// Number of URLs not yet revoked
    pub fn outstanding(&self) -> usize {
        self.resources.len()
    }
}

impl Drop for PlaybackRegistry {
    fn drop(&mut self) {
        if !self.resources.is_empty() {
            debug!("Revoking {} playback resource(s) on teardown", self.resources.len());
            self.resources.clear();
        }
    }
}
