use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use pin_project_lite::pin_project;

/// Progress sink: receives integer percentages, 0 through 100.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

struct TrackerState {
    bytes_sent: u64,
    last_emitted: Option<u8>,
}

/// Converts byte counts into clamped, strictly increasing percentages.
///
/// Duplicate values are suppressed so downstream consumers see each percent
/// at most once, in non-decreasing order.
pub struct ProgressTracker {
    total_bytes: u64,
    state: Mutex<TrackerState>,
    sink: ProgressFn,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64, sink: ProgressFn) -> Self {
        Self {
            total_bytes,
            state: Mutex::new(TrackerState {
                bytes_sent: 0,
                last_emitted: None,
            }),
            sink,
        }
    }

    fn percent(&self, bytes_sent: u64) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        ((bytes_sent.saturating_mul(100)) / self.total_bytes).min(100) as u8
    }

    /// Account for `bytes` more having gone out, emitting if the percent
    /// moved forward.
    pub fn record_bytes(&self, bytes: u64) {
        let emit = {
            let mut state = self.state.lock();
            state.bytes_sent += bytes;
            let percent = self.percent(state.bytes_sent);
            if state.last_emitted.map_or(true, |last| percent > last) {
                state.last_emitted = Some(percent);
                Some(percent)
            } else {
                None
            }
        };

        if let Some(percent) = emit {
            (self.sink)(percent);
        }
    }

    /// Force the terminal 100% tick. Emits nothing if 100 was already seen.
    pub fn finish(&self) {
        let emit = {
            let mut state = self.state.lock();
            if state.last_emitted == Some(100) {
                false
            } else {
                state.last_emitted = Some(100);
                true
            }
        };

        if emit {
            (self.sink)(100);
        }
    }
}

pin_project! {
    /// Stream wrapper that feeds every chunk length into a tracker before
    /// handing the chunk on.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        tracker: Arc<ProgressTracker>,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, tracker: Arc<ProgressTracker>) -> Self {
        Self { inner, tracker }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    this.tracker.record_bytes(chunk.len() as u64);
                }

                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}
