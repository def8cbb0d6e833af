use std::path::{Path, PathBuf};

use fragcanvas::tracking::TextCallback;
use fragcanvas::{Subscription, TargetId, TextMutationTracker};
use notify::{EventKind, RecursiveMode, Watcher};
use tracing::{debug, warn};
use winit::event_loop::EventLoopProxy;

use crate::window::HostEvent;

/// Reports edits to a shader file as text mutations.
///
/// Each `track` call starts its own watcher on the file's directory and
/// filters by file name, so editors that save by rename are still seen. The
/// event loop is woken through `proxy` after the callback ran.
pub struct FileWatchTracker {
    path: Option<PathBuf>,
    proxy: EventLoopProxy<HostEvent>,
}

impl FileWatchTracker {
    /// `path` is `None` for inline shader text, which never changes.
    pub fn new(path: Option<PathBuf>, proxy: EventLoopProxy<HostEvent>) -> Self {
        Self { path, proxy }
    }
}

impl TextMutationTracker for FileWatchTracker {
    fn track(&self, target: &TargetId, mut callback: TextCallback) -> Subscription {
        let Some(path) = self.path.as_ref() else {
            return Subscription::noop();
        };
        let file_name = path.file_name().map(ToOwned::to_owned);
        let proxy = self.proxy.clone();

        let handler = move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                let hit = event
                    .paths
                    .iter()
                    .any(|changed| changed.file_name() == file_name.as_deref());
                if hit {
                    callback();
                    let _ = proxy.send_event(HostEvent::SourceChanged);
                }
            }
            Err(error) => warn!(%error, "shader watch error"),
        };

        let mut watcher = match notify::recommended_watcher(handler) {
            Ok(watcher) => watcher,
            Err(error) => {
                warn!(%error, path = %path.display(), "unable to watch shader file");
                return Subscription::noop();
            }
        };
        let directory = watch_root(path);
        if let Err(error) = watcher.watch(directory, RecursiveMode::NonRecursive) {
            warn!(%error, dir = %directory.display(), "unable to watch shader directory");
            return Subscription::noop();
        }
        debug!(surface = %target, path = %path.display(), "watching shader source");

        let target = target.clone();
        Subscription::new(move || {
            drop(watcher);
            debug!(surface = %target, "stopped watching shader source");
        })
    }
}

fn watch_root(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
