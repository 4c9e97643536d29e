use bytes::Buf;
use hyper::body::Body;
use pin_project_lite::pin_project;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// A fully read response body. Only the first `retain` bytes are kept,
/// `total` counts everything that came over the wire.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainedBody {
    pub head: Vec<u8>,
    pub total: u64,
}

impl DrainedBody {
    /// Lossy utf-8 rendering of the retained prefix, for log lines.
    #[must_use]
    pub fn snippet(&self) -> String {
        String::from_utf8_lossy(&self.head).into_owned()
    }
}

pin_project! {
    pub struct DrainBodyFuture<B: Body> {
        #[pin]
        body: B,
        retain: usize,
        drained: DrainedBody,
    }
}

impl<B> DrainBodyFuture<B>
where
    B: Body,
{
    /// Reads `body` to the end, keeping at most `retain` bytes of it.
    #[inline]
    #[must_use]
    pub fn new(body: B, retain: usize) -> Self {
        Self {
            body,
            retain,
            drained: DrainedBody {
                head: Vec::with_capacity(retain.min(4096)),
                total: 0,
            },
        }
    }
}

impl<B> Future for DrainBodyFuture<B>
where
    B: Body,
    B::Error: Display,
{
    type Output = Result<DrainedBody, anyhow::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slf = self.project();
        loop {
            let Some(next_res) = ready!(slf.body.as_mut().poll_frame(cx)) else {
                return Poll::Ready(Ok(std::mem::take(slf.drained)));
            };
            let frame = match next_res {
                Ok(frame) => frame,
                Err(e) => {
                    return Poll::Ready(Err(anyhow::anyhow!("Failed to poll next frame: {e}")));
                }
            };
            // Trailers carry no payload
            let Ok(mut data) = frame.into_data() else {
                continue;
            };
            while data.has_remaining() {
                let chunk = data.chunk();
                let len = chunk.len();
                let room = slf.retain.saturating_sub(slf.drained.head.len());
                slf.drained
                    .head
                    .extend_from_slice(&chunk[..room.min(len)]);
                slf.drained.total += len as u64;
                data.advance(len);
            }
            if slf.body.is_end_stream() {
                return Poll::Ready(Ok(std::mem::take(slf.drained)));
            }
        }
    }
}
