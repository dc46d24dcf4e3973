//! Incremental delivery of collaboration events.
//!
//! The producer runs as a spawned task writing [`StreamMessage`]s into a
//! bounded channel. [`CollaborationStream`] consumes them and owns a drop
//! guard for the producer's cancellation token, so abandoning the stream
//! stops the producer at its next await point.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::events::CollaborationEvent;
use crate::errors::EnsembleError;

#[derive(Debug, Clone)]
pub enum StreamMessage {
    Data(CollaborationEvent),
    Done,
    Error(EnsembleError),
}

/// Destination for events as the orchestrator produces them.
#[async_trait]
pub(crate) trait EventSink: Send {
    async fn emit(&mut self, event: &CollaborationEvent) -> Result<(), EnsembleError>;
}

/// Sink for buffered runs, where the session log is the result.
pub(crate) struct Discard;

#[async_trait]
impl EventSink for Discard {
    async fn emit(&mut self, _event: &CollaborationEvent) -> Result<(), EnsembleError> {
        Ok(())
    }
}

pub(crate) struct ChannelSink {
    sender: mpsc::Sender<StreamMessage>,
    token: CancellationToken,
}

impl ChannelSink {
    pub(crate) fn new(sender: mpsc::Sender<StreamMessage>, token: CancellationToken) -> Self {
        Self { sender, token }
    }

    /// Terminal marker. Ignored when the consumer is already gone.
    pub(crate) async fn finish(self, outcome: Result<(), EnsembleError>) {
        let message = match outcome {
            Ok(()) => StreamMessage::Done,
            Err(e) => StreamMessage::Error(e),
        };
        if self.sender.send(message).await.is_err() {
            log::debug!("Collaboration stream closed before the terminal marker");
        }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&mut self, event: &CollaborationEvent) -> Result<(), EnsembleError> {
        let cancelled = || EnsembleError::Cancelled("collaboration stream was dropped".to_string());
        tokio::select! {
            _ = self.token.cancelled() => Err(cancelled()),
            sent = self.sender.send(StreamMessage::Data(event.clone())) => {
                sent.map_err(|_| cancelled())
            }
        }
    }
}

pub struct CollaborationStream {
    receiver: mpsc::Receiver<StreamMessage>,
    finished: bool,
    _guard: DropGuard,
}

impl CollaborationStream {
    pub(crate) fn new(receiver: mpsc::Receiver<StreamMessage>, token: CancellationToken) -> Self {
        Self {
            receiver,
            finished: false,
            _guard: token.drop_guard(),
        }
    }

    /// Next raw channel message, including the terminal marker.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        if self.finished {
            return None;
        }
        let message = self.receiver.recv().await;
        if !matches!(message, Some(StreamMessage::Data(_))) {
            self.finished = true;
        }
        message
    }

    /// Drain the stream into the event list a buffered run would have returned.
    pub async fn collect_events(mut self) -> Result<Vec<CollaborationEvent>, EnsembleError> {
        let mut events = Vec::new();
        loop {
            match self.recv().await {
                Some(StreamMessage::Data(event)) => events.push(event),
                Some(StreamMessage::Done) => return Ok(events),
                Some(StreamMessage::Error(e)) => return Err(e),
                None => {
                    return Err(EnsembleError::InternalError(
                        "Collaboration producer stopped without a terminal marker".to_string(),
                    ))
                }
            }
        }
    }
}

impl Stream for CollaborationStream {
    type Item = Result<CollaborationEvent, EnsembleError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(StreamMessage::Data(event))) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(Some(StreamMessage::Error(e))) => {
                self.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(Some(StreamMessage::Done)) | Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_stream_yields_data_until_done() {
        let (tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let mut stream = CollaborationStream::new(rx, token.clone());

        tx.send(StreamMessage::Data(CollaborationEvent::started("t")))
            .await
            .unwrap();
        tx.send(StreamMessage::Done).await.unwrap();
        tx.send(StreamMessage::Data(CollaborationEvent::finished(1)))
            .await
            .unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_marker_ends_stream() {
        let (tx, rx) = mpsc::channel(4);
        let stream = CollaborationStream::new(rx, CancellationToken::new());
        tx.send(StreamMessage::Error(EnsembleError::StorageError("disk".to_string())))
            .await
            .unwrap();

        let err = stream.collect_events().await.unwrap_err();
        assert_eq!(err, EnsembleError::StorageError("disk".to_string()));
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_token() {
        let (tx, rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let stream = CollaborationStream::new(rx, token.clone());
        let mut sink = ChannelSink::new(tx, token.clone());

        drop(stream);
        assert!(token.is_cancelled());
        let result = sink.emit(&CollaborationEvent::started("t")).await;
        assert!(matches!(result, Err(EnsembleError::Cancelled(_))));
    }
}
