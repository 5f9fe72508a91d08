//! Observing readers
//!
//! An [`ObservingReader`] forwards reads to an inner reader and hands every
//! byte range it returns to a set of observers. Stacking them lets one pass
//! over a stream feed any number of digests.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Receives every byte read through an [`ObservingReader`].
pub trait Observer {
    fn observe(&mut self, bytes: &[u8]);
}

impl<D: sha2::Digest> Observer for D {
    fn observe(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

/// Counts observed bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ByteCounter(pub u64);

impl Observer for ByteCounter {
    fn observe(&mut self, bytes: &[u8]) {
        self.0 += bytes.len() as u64;
    }
}

pub struct ObservingReader<'a, R> {
    inner: R,
    observers: Vec<&'a mut (dyn Observer + Send)>,
}

impl<'a, R> ObservingReader<'a, R> {
    pub fn new(inner: R, observers: Vec<&'a mut (dyn Observer + Send)>) -> Self {
        Self { inner, observers }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ObservingReader<'_, R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let fresh = &buf.filled()[before..];
        if !fresh.is_empty() {
            for observer in this.observers.iter_mut() {
                observer.observe(fresh);
            }
        }

        Poll::Ready(Ok(()))
    }
}
