use futures::channel::mpsc::UnboundedSender;
use rustls::sign::CertifiedKey;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::{
    CertificateLoader, ChangeKind, PathWatcher, WatchEvent, WatchEvents, WatchSource,
};
use crate::files::{LoadError, PemFileLoader};
use crate::watch::WatchError;

/// [`PemFileLoader`] which counts its invocations.
#[derive(Default)]
pub(crate) struct CountingLoader {
    inner: PemFileLoader,
    loads: AtomicUsize,
}

impl CountingLoader {
    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }
}

impl CertificateLoader for CountingLoader {
    fn load(&self, cert_path: &Path, key_path: &Path) -> Result<Arc<CertifiedKey>, LoadError> {
        self.loads.fetch_add(1, Ordering::AcqRel);
        self.inner.load(cert_path, key_path)
    }
}

#[derive(Default)]
struct Shared {
    senders: Vec<UnboundedSender<WatchEvent>>,
    watch_calls: usize,
    unwatch_calls: usize,
    failing_watches: usize,
}

/// [`WatchSource`] whose events are injected by the test.
#[derive(Default)]
pub(crate) struct ManualWatchSource {
    shared: Arc<Mutex<Shared>>,
    fail_open: bool,
}

struct ManualPathWatcher(Arc<Mutex<Shared>>);

impl PathWatcher for ManualPathWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        let mut shared = self.0.lock().unwrap();
        shared.watch_calls += 1;
        if shared.failing_watches > 0 {
            shared.failing_watches -= 1;
            return Err(WatchError::Custom(
                format!("{} does not exist", path.display()).into(),
            ));
        }
        Ok(())
    }

    fn unwatch(&mut self, _: &Path) -> Result<(), WatchError> {
        self.0.lock().unwrap().unwatch_calls += 1;
        Ok(())
    }
}

impl WatchSource for ManualWatchSource {
    fn open(&self) -> Result<(Box<dyn PathWatcher>, WatchEvents), WatchError> {
        if self.fail_open {
            return Err(WatchError::Custom("no watching today".into()));
        }
        let (tx, rx) = futures::channel::mpsc::unbounded();
        self.shared.lock().unwrap().senders.push(tx);
        Ok((
            Box::new(ManualPathWatcher(Arc::clone(&self.shared))),
            Box::pin(rx),
        ))
    }
}

impl ManualWatchSource {
    pub(crate) fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Deliver `event` to the most recently opened watcher.
    pub(crate) fn send(&self, event: WatchEvent) {
        let shared = self.shared.lock().unwrap();
        shared
            .senders
            .last()
            .expect("watch source not opened")
            .unbounded_send(event)
            .expect("reloader dropped its events");
    }

    pub(crate) fn change(&self, path: &Path) {
        self.send(WatchEvent::Changed {
            path: path.to_owned(),
            kind: ChangeKind::Write,
        });
    }

    pub(crate) fn remove(&self, path: &Path) {
        self.send(WatchEvent::Changed {
            path: path.to_owned(),
            kind: ChangeKind::Remove,
        });
    }

    pub(crate) fn error(&self, message: &str) {
        self.send(WatchEvent::Error(WatchError::Custom(message.into())));
    }

    /// End every event stream.
    pub(crate) fn close(&self) {
        self.shared.lock().unwrap().senders.clear();
    }

    /// Make the next `n` calls to `watch` fail.
    pub(crate) fn fail_next_watches(&self, n: usize) {
        self.shared.lock().unwrap().failing_watches = n;
    }

    pub(crate) fn watch_calls(&self) -> usize {
        self.shared.lock().unwrap().watch_calls
    }

    pub(crate) fn unwatch_calls(&self) -> usize {
        self.shared.lock().unwrap().unwatch_calls
    }
}
