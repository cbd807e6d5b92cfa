//! Async tasks for writing to and reading from the socket
//!
//! One writer task serializes everything the client sends, so audio frames
//! go out in capture order. One reader task turns socket messages into
//! `TransportEvent`s for the session driver.

use crate::network::connection::{WsReader, WsWriter};
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::messages::{OutboundMessage, TransportEvent};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

/// Writer task: sends encoded audio frames and control messages
///
/// Control messages take priority over queued audio. The task ends when it
/// receives `OutboundMessage::Close` or both channels are closed, and closes
/// the socket on the way out.
///
/// # Example
/// ```no_run
/// use tokio::sync::mpsc;
/// use voxlink_lib::network::{ConnectionConfig, VoiceConnection};
/// use voxlink_lib::network::tasks::writer_task;
///
/// #[tokio::main]
/// async fn main() {
///     let conn = VoiceConnection::connect(&ConnectionConfig::default()).await.unwrap();
///     let (writer, _reader) = conn.split();
///
///     let (audio_tx, audio_rx) = mpsc::channel(100);
///     let (control_tx, control_rx) = mpsc::channel(32);
///
///     tokio::spawn(writer_task(writer, audio_rx, control_rx));
/// }
/// ```
pub async fn writer_task(
    ws_writer: WsWriter,
    audio_rx: mpsc::Receiver<Vec<u8>>,
    control_rx: mpsc::Receiver<OutboundMessage>,
) -> NetworkResult<()> {
    write_loop(ws_writer, audio_rx, control_rx).await
}

async fn write_loop<S>(
    mut ws_writer: S,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    mut control_rx: mpsc::Receiver<OutboundMessage>,
) -> NetworkResult<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    info!("Writer task started");

    let mut frame_count = 0u64;
    let mut text_count = 0u64;

    loop {
        tokio::select! {
            biased;

            Some(message) = control_rx.recv() => match message {
                OutboundMessage::Json(text) => {
                    debug!("Sending text message: {}", text);
                    ws_writer
                        .send(Message::Text(text.into()))
                        .await
                        .map_err(NetworkError::WebSocketError)?;
                    text_count += 1;
                }
                OutboundMessage::Close => {
                    debug!("Close requested");
                    break;
                }
            },

            Some(frame) = audio_rx.recv() => {
                ws_writer
                    .send(Message::Binary(frame.into()))
                    .await
                    .map_err(NetworkError::WebSocketError)?;
                frame_count += 1;
            }

            else => {
                debug!("Outbound channels closed");
                break;
            }
        }
    }

    info!(
        "Writer task completed: {} audio frames, {} text messages sent",
        frame_count, text_count
    );

    if let Err(e) = ws_writer.close().await {
        warn!("Failed to close WebSocket writer: {}", e);
    }

    Ok(())
}

/// Reader task: forwards socket messages to the session driver
///
/// Always finishes by sending a terminal event (`Closed` or `Failed`) unless
/// the driver has already gone away.
pub async fn reader_task(ws_reader: WsReader, event_tx: mpsc::Sender<TransportEvent>) {
    read_loop(ws_reader, event_tx).await
}

async fn read_loop<S>(mut ws_reader: S, event_tx: mpsc::Sender<TransportEvent>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    info!("Reader task started");

    let mut message_count = 0u64;

    let terminal = loop {
        match ws_reader.next().await {
            Some(Ok(message)) => {
                let Some(event) = TransportEvent::from_message(message) else {
                    continue;
                };
                if event.is_terminal() {
                    info!("Received close frame: {:?}", event);
                    break event;
                }

                message_count += 1;
                if event_tx.send(event).await.is_err() {
                    debug!("Session driver gone, stopping reader");
                    return;
                }
            }
            Some(Err(e)) => {
                error!("WebSocket error: {}", e);
                break TransportEvent::Failed(e.to_string());
            }
            None => {
                info!("WebSocket stream ended");
                break TransportEvent::Closed { reason: None };
            }
        }
    };

    info!("Reader task completed: {} messages received", message_count);
    let _ = event_tx.send(terminal).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    /// Sink that records every message it is given
    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<Message>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl Sink<Message> for RecordingSink {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.sent.lock().unwrap().push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            *self.closed.lock().unwrap() = true;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_writer_preserves_audio_order() {
        let sink = RecordingSink::default();
        let (audio_tx, audio_rx) = mpsc::channel(10);
        let (control_tx, control_rx) = mpsc::channel(10);

        for i in 0..5u8 {
            audio_tx.send(vec![i; 4]).await.unwrap();
        }
        drop(audio_tx);
        drop(control_tx);

        write_loop(sink.clone(), audio_rx, control_rx).await.unwrap();

        let sent = sink.sent.lock().unwrap();
        let payloads: Vec<u8> = sent
            .iter()
            .map(|m| match m {
                Message::Binary(data) => data[0],
                other => panic!("Expected binary, got {:?}", other),
            })
            .collect();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
        assert!(*sink.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_writer_sends_text_and_stops_on_close() {
        let sink = RecordingSink::default();
        let (_audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(10);
        let (control_tx, control_rx) = mpsc::channel(10);

        control_tx
            .send(OutboundMessage::Json(r#"{"a":1}"#.to_string()))
            .await
            .unwrap();
        control_tx.send(OutboundMessage::Close).await.unwrap();
        control_tx
            .send(OutboundMessage::Json("ignored".to_string()))
            .await
            .unwrap();

        write_loop(sink.clone(), audio_rx, control_rx).await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], Message::Text(r#"{"a":1}"#.into()));
        assert!(*sink.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_reader_forwards_and_ends_with_closed() {
        let messages = vec![
            Ok(Message::Text(r#"{"type":"UID","uid":"u1"}"#.into())),
            Ok(Message::Ping(Vec::new().into())),
            Ok(Message::Binary(vec![9u8, 9].into())),
        ];
        let (tx, mut rx) = mpsc::channel(10);

        read_loop(stream::iter(messages), tx).await;

        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Text(r#"{"type":"UID","uid":"u1"}"#.to_string()))
        );
        assert_eq!(rx.recv().await, Some(TransportEvent::Binary(vec![9, 9])));
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Closed { reason: None })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_reader_reports_socket_error() {
        let messages = vec![
            Ok(Message::Binary(vec![1u8, 2].into())),
            Err(tungstenite::Error::ConnectionClosed),
            Ok(Message::Binary(vec![3u8, 4].into())),
        ];
        let (tx, mut rx) = mpsc::channel(10);

        read_loop(stream::iter(messages), tx).await;

        assert_eq!(rx.recv().await, Some(TransportEvent::Binary(vec![1, 2])));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Failed(_))));
        assert_eq!(rx.recv().await, None);
    }
}
