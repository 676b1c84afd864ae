//! Reader idle detection.
//!
//! Wraps the decoded inbound stream. When no message arrives for the
//! configured window, one [`IdleStateEvent`] is emitted in-band; the next
//! message re-arms the monitor. Write and combined inactivity are not
//! monitored.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::time::{sleep, Instant, Sleep};

/// Fired when a connection has been read-idle for `idle_for`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleStateEvent {
    pub idle_for: Duration,
}

/// Item produced by the idle monitor stage.
#[derive(Debug)]
pub enum InboundEvent<T> {
    Message(T),
    Idle(IdleStateEvent),
}

/// Stream adapter implementing the `server-idle-handle` stage.
pub struct IdleStateMonitor<S> {
    inner: S,
    reader_idle: Duration,
    /// `None` when idle detection is disabled.
    deadline: Option<Pin<Box<Sleep>>>,
    /// Event already emitted for the current idle stretch.
    fired: bool,
}

impl<S> IdleStateMonitor<S> {
    /// Monitor `inner` for read inactivity. A zero window disables detection.
    ///
    /// Must be created inside a runtime with the time driver enabled.
    pub fn new(inner: S, reader_idle: Duration) -> Self {
        let deadline = (!reader_idle.is_zero()).then(|| Box::pin(sleep(reader_idle)));
        Self {
            inner,
            reader_idle,
            deadline,
            fired: false,
        }
    }
}

impl<S> Stream for IdleStateMonitor<S>
where
    S: Stream + Unpin,
{
    type Item = InboundEvent<S::Item>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                if let Some(deadline) = this.deadline.as_mut() {
                    deadline.as_mut().reset(Instant::now() + this.reader_idle);
                }
                this.fired = false;
                return Poll::Ready(Some(InboundEvent::Message(item)));
            }
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => {}
        }

        if let Some(deadline) = this.deadline.as_mut() {
            if !this.fired && deadline.as_mut().poll(cx).is_ready() {
                this.fired = true;
                return Poll::Ready(Some(InboundEvent::Idle(IdleStateEvent {
                    idle_for: this.reader_idle,
                })));
            }
        }

        Poll::Pending
    }
}
