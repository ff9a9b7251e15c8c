// ── Reactive device streams ──
//
// Subscription handle for consuming changes of one mirror entry.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::DeviceState;

/// A subscription to a single box in the [`DeviceStore`](crate::DeviceStore).
///
/// Provides point-in-time access and change notification via
/// [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct DeviceStream {
    current: Arc<DeviceState>,
    receiver: watch::Receiver<Arc<DeviceState>>,
}

impl DeviceStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<DeviceState>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The state captured at creation time or by the last `changed()`.
    pub fn current(&self) -> &Arc<DeviceState> {
        &self.current
    }

    /// The latest state (may have changed since creation).
    pub fn latest(&self) -> Arc<DeviceState> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, including republishes.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<DeviceState>> {
        self.receiver.changed().await.ok()?;
        let state = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&state);
        Some(state)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    ///
    /// The stream yields the current value first.
    pub fn into_stream(self) -> DeviceWatchStream {
        DeviceWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct DeviceWatchStream {
    inner: WatchStream<Arc<DeviceState>>,
}

impl Stream for DeviceWatchStream {
    type Item = Arc<DeviceState>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
