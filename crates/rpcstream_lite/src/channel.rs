use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tonic::Status;

use crate::codec::Outgoing;
use crate::error::ChannelError;

enum Frame<T> {
    Message(T),
    Completed,
    Failed(Status),
}

/// Create an unbounded, ordered message channel.
///
/// The sender pushes messages and then closes the channel exactly once, either
/// normally or with an error. Both close operations consume the sender, so a
/// push after close does not compile.
pub fn channel<T>() -> (MessageSender<T>, MessageReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MessageSender { tx },
        MessageReceiver {
            rx,
            terminated: false,
        },
    )
}

/// The producing half of a message channel.
pub struct MessageSender<T> {
    tx: mpsc::UnboundedSender<Frame<T>>,
}

impl<T> MessageSender<T> {
    /// Push a message. Fails only when the receiver has been dropped.
    pub fn push(&self, message: T) -> Result<(), ChannelError> {
        self.tx
            .send(Frame::Message(message))
            .map_err(|_| ChannelError::ReceiverDropped)
    }

    /// Close the channel; the receiver ends after the pushed messages.
    pub fn close(self) {
        let _ = self.tx.send(Frame::Completed);
    }

    /// Close the channel with an error delivered after the pushed messages.
    pub fn close_with_error(self, status: Status) {
        let _ = self.tx.send(Frame::Failed(status));
    }

    /// Whether the receiving half is gone.
    pub fn is_receiver_dropped(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> std::fmt::Debug for MessageSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSender")
            .field("receiver_dropped", &self.tx.is_closed())
            .finish()
    }
}

/// The consuming half of a message channel.
///
/// Yields `Ok(message)` in push order, then ends. An error close yields one
/// `Err(status)` before ending. A sender dropped without closing is reported
/// as `CANCELLED`.
pub struct MessageReceiver<T> {
    rx: mpsc::UnboundedReceiver<Frame<T>>,
    terminated: bool,
}

impl<T> MessageReceiver<T>
where
    T: Send + 'static,
{
    /// Adapt into a tonic request body for use with [`AbortableCodec`].
    ///
    /// A normal close ends the stream, which half-closes the call. An error
    /// close, or a sender dropped without closing, yields one
    /// [`Outgoing::Abort`] so the remote sees the call fail rather than a
    /// clean half-close.
    ///
    /// [`AbortableCodec`]: crate::codec::AbortableCodec
    pub fn into_outgoing(mut self) -> impl Stream<Item = Outgoing<T>> + Send + 'static {
        async_stream::stream! {
            while let Some(frame) = self.next().await {
                match frame {
                    Ok(message) => yield Outgoing::Message(message),
                    Err(status) => {
                        tracing::debug!(error = %status, "Outbound channel closed with error");
                        yield Outgoing::Abort(status);
                        break;
                    }
                }
            }
        }
    }
}

impl<T> Stream for MessageReceiver<T> {
    type Item = Result<T, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.terminated {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Frame::Message(message))) => Poll::Ready(Some(Ok(message))),
            Poll::Ready(Some(Frame::Completed)) => {
                self.terminated = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Frame::Failed(status))) => {
                self.terminated = true;
                Poll::Ready(Some(Err(status)))
            }
            Poll::Ready(None) => {
                self.terminated = true;
                Poll::Ready(Some(Err(Status::cancelled(
                    "message sender dropped without closing the channel",
                ))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for MessageReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReceiver")
            .field("terminated", &self.terminated)
            .finish()
    }
}
