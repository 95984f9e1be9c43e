//! The notification queue.
//!
//! Notifications are appended to a FIFO and drained by a single background
//! worker. The worker waits a short debounce window when it starts so a
//! burst of notifications is coalesced, then takes one notification at a
//! time:
//!
//! 1. fetch audio for each speakable fragment concurrently,
//! 2. play the results strictly in fragment order (title, then detail),
//! 3. commit the cache index in the background,
//!
//! and only then moves on. A failure in one fragment is reported and
//! skipped; it never stops the remaining fragments or notifications.
//! Fetched audio stays pinned in the cache until it has played.
//!
//! ## Duplicate Titles
//!
//! A notification whose normalized title (trimmed, lowercased) matches one
//! that is still pending has its title suppressed. Its detail is still
//! spoken. Notifications that have already been taken by the worker do not
//! count.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::audio_cache::AudioCache;
use crate::errors::HeraldError;
use crate::fetch::{FetchOrchestrator, FetchedAudio};
use crate::traits::{ErrorReporter, PlaybackSink, SpeechProvider};
use crate::types::{FragmentKind, Notification, VoiceSelection};

/// How long a freshly started worker waits before draining.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug)]
struct PendingNotification {
    notification: Notification,
    selection: VoiceSelection,
}

struct QueueInner<P, S, R> {
    pending: Mutex<VecDeque<PendingNotification>>,
    active: AtomicBool,
    idle: Notify,
    fetcher: Arc<FetchOrchestrator<P>>,
    sink: S,
    reporter: R,
    debounce: Duration,
}

/// Debounced, deduplicating, strictly ordered notification player.
///
/// Cloning is cheap; clones share the same queue and worker.
pub struct NotificationQueue<P, S, R> {
    inner: Arc<QueueInner<P, S, R>>,
}

impl<P, S, R> Clone for NotificationQueue<P, S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, S, R> std::fmt::Debug for NotificationQueue<P, S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("pending", &self.pending_len())
            .field("active", &self.is_active())
            .field("debounce", &self.inner.debounce)
            .finish_non_exhaustive()
    }
}

impl<P, S, R> NotificationQueue<P, S, R> {
    /// Number of notifications waiting to be processed.
    pub fn pending_len(&self) -> usize {
        self.inner.lock_pending().len()
    }

    /// Whether a worker is currently running.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// The cache the queue fetches into.
    pub fn cache(&self) -> &Arc<AudioCache> {
        self.inner.fetcher.cache()
    }

    /// The fetch path shared with the worker.
    pub fn fetcher(&self) -> &Arc<FetchOrchestrator<P>> {
        &self.inner.fetcher
    }

    /// Resolve once the queue is empty and no worker is running.
    pub async fn drained(&self) {
        loop {
            let mut notified = std::pin::pin!(self.inner.idle.notified());
            notified.as_mut().enable();

            if !self.is_active() && self.inner.lock_pending().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl<P, S, R> NotificationQueue<P, S, R>
where
    P: SpeechProvider + 'static,
    S: PlaybackSink + 'static,
    R: ErrorReporter + 'static,
{
    /// Create a queue with the default debounce window.
    pub fn new(fetcher: FetchOrchestrator<P>, sink: S, reporter: R) -> Self {
        Self::with_debounce(fetcher, sink, reporter, DEFAULT_DEBOUNCE)
    }

    /// Create a queue with a custom debounce window.
    pub fn with_debounce(
        fetcher: FetchOrchestrator<P>,
        sink: S,
        reporter: R,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(VecDeque::new()),
                active: AtomicBool::new(false),
                idle: Notify::new(),
                fetcher: Arc::new(fetcher),
                sink,
                reporter,
                debounce,
            }),
        }
    }

    /// Add a notification to the tail of the queue.
    ///
    /// Never blocks on network or disk. Starts a worker if none is running;
    /// this needs a Tokio runtime, and without one the notification stays
    /// pending until the next enqueue from inside a runtime. Returns `true`
    /// if the title was suppressed as a duplicate.
    pub fn enqueue(&self, mut notification: Notification, selection: VoiceSelection) -> bool {
        let suppressed = {
            let mut pending = self.inner.lock_pending();
            let title = notification.normalized_title();
            let duplicate = pending
                .iter()
                .any(|queued| queued.notification.normalized_title() == title);
            if duplicate {
                notification.suppression.title = true;
                tracing::debug!(title = %title, "Suppressing duplicate title");
            }
            pending.push_back(PendingNotification {
                notification,
                selection,
            });
            duplicate
        };

        if self
            .inner
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.start_worker();
        }
        suppressed
    }

    fn start_worker(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(QueueInner::run(Arc::clone(&self.inner)));
            }
            Err(e) => {
                self.inner.active.store(false, Ordering::SeqCst);
                tracing::warn!(error = %e, "No async runtime; notification left pending");
            }
        }
    }
}

impl<P, S, R> QueueInner<P, S, R> {
    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<PendingNotification>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P, S, R> QueueInner<P, S, R>
where
    P: SpeechProvider + 'static,
    S: PlaybackSink + 'static,
    R: ErrorReporter + 'static,
{
    async fn run(self: Arc<Self>) {
        tokio::time::sleep(self.debounce).await;
        tracing::trace!("Queue worker started");

        loop {
            let next = self.lock_pending().pop_front();
            if let Some(item) = next {
                self.process(item).await;
                continue;
            }

            self.active.store(false, Ordering::SeqCst);
            // An enqueue may have landed between the pop and the store above.
            let empty = self.lock_pending().is_empty();
            if empty
                || self
                    .active
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                break;
            }
        }

        tracing::trace!("Queue worker idle");
        self.idle.notify_waiters();
    }

    async fn process(&self, item: PendingNotification) {
        let PendingNotification {
            notification,
            selection,
        } = item;

        let fragments = notification.fragments();
        tracing::debug!(
            title = %notification.title,
            fragments = fragments.len(),
            "Processing notification"
        );

        let selection = Arc::new(selection);
        let fetches: Vec<(FragmentKind, JoinHandle<Result<FetchedAudio, HeraldError>>)> = fragments
            .into_iter()
            .map(|fragment| {
                let fetcher = Arc::clone(&self.fetcher);
                let selection = Arc::clone(&selection);
                let kind = fragment.kind;
                let handle = tokio::spawn(async move {
                    fetcher.get_pinned_audio(&fragment, &selection).await
                });
                (kind, handle)
            })
            .collect();

        for (kind, fetch) in fetches {
            // The pin keeps sibling fetches from evicting this audio until it has played.
            let audio = match fetch.await.map_err(HeraldError::from).and_then(|result| result) {
                Ok(audio) => audio,
                Err(e) => {
                    let context = format!("while retrieving {} audio for '{}'", kind.as_str(), notification.title);
                    self.reporter.report(&e, &context);
                    continue;
                }
            };

            if let Err(e) = self.sink.play(audio.path()).await {
                self.reporter.report(&e, &format!("while playing {}", audio.path().display()));
            }
        }

        self.fetcher.cache().spawn_commit();
    }
}
