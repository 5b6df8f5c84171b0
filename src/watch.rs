//! File change notifications.
//!
//! With the **notify** feature, [`NotifyWatchSource`] supplies events from
//! the platform's native mechanism (inotify, kqueue, FSEvents...) through
//! the [`notify`] crate.

use thiserror::Error;

#[cfg(feature = "notify")]
use crate::api::{ChangeKind, PathWatcher, WatchEvent, WatchEvents, WatchSource};
#[cfg(feature = "notify")]
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
#[cfg(feature = "notify")]
use std::path::Path;

/// Error type for watch setup and watch runtime failures.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Wrapper for notify::Error
    #[cfg(feature = "notify")]
    #[error("{0}")]
    NotifyError(#[from] notify::Error),
    /// Reported by some other [`crate::api::WatchSource`].
    #[error("{0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "notify")]
fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    use notify::event::ModifyKind;
    match kind {
        EventKind::Any | EventKind::Create(_) => Some(ChangeKind::Write),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(ChangeKind::Permissions),
        EventKind::Modify(_) => Some(ChangeKind::Write),
        EventKind::Remove(_) => Some(ChangeKind::Remove),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

#[cfg(feature = "notify")]
struct NotifyPathWatcher(RecommendedWatcher);

#[cfg(feature = "notify")]
impl PathWatcher for NotifyPathWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        Ok(self.0.watch(path, RecursiveMode::NonRecursive)?)
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatchError> {
        Ok(self.0.unwatch(path)?)
    }
}

/// [`WatchSource`] backed by [`notify::RecommendedWatcher`].
#[cfg(feature = "notify")]
#[derive(Debug, Default)]
pub struct NotifyWatchSource;

#[cfg(feature = "notify")]
impl WatchSource for NotifyWatchSource {
    fn open(&self) -> Result<(Box<dyn PathWatcher>, WatchEvents), WatchError> {
        // notify calls back on its own thread.
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let Some(kind) = change_kind(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        let _ = tx.unbounded_send(WatchEvent::Changed { path, kind });
                    }
                }
                Err(e) => {
                    let _ = tx.unbounded_send(WatchEvent::Error(e.into()));
                }
            }
        })?;
        Ok((Box::new(NotifyPathWatcher(watcher)), Box::pin(rx)))
    }
}
