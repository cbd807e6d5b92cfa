//! Session event loop
//!
//! All mutable session state lives here and is touched only from the
//! driver task, one event at a time.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::audio::{AcquiredInput, AudioResult, CaptureConfig, CapturePipeline, InputDevice};
use crate::codec::{self, DecodeError};
use crate::network::{ControlMessage, OutboundMessage, TransportEvent};
use crate::playback::{EnqueueOutcome, OutputDevice, PlaybackScheduler};
use crate::session::observer::StatusObserver;
use crate::state::{SessionState, StateManager};

/// Request from the controller
#[derive(Debug)]
pub(crate) enum DriverCommand {
    /// Tear the session down; `done` fires once teardown has finished
    Disconnect { done: Option<oneshot::Sender<()>> },
}

/// Result of a capture acquisition started by the driver
pub(crate) struct Acquisition {
    epoch: u64,
    result: AudioResult<AcquiredInput>,
}

/// Everything the driver reacts to
enum DriverEvent {
    Transport(TransportEvent),
    Command(DriverCommand),
    CaptureAcquired(Acquisition),
}

pub(crate) struct SessionDriver {
    state: Arc<StateManager>,
    observer: Arc<dyn StatusObserver>,
    input: Arc<dyn InputDevice>,
    output: Arc<dyn OutputDevice>,
    capture_config: CaptureConfig,
    capture_enabled: bool,
    scheduler: PlaybackScheduler,
    capture: CapturePipeline,
    first_message: bool,
    acquisition_epoch: u64,
    audio_tx: mpsc::Sender<Vec<u8>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
}

impl SessionDriver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        state: Arc<StateManager>,
        observer: Arc<dyn StatusObserver>,
        input: Arc<dyn InputDevice>,
        output: Arc<dyn OutputDevice>,
        capture_config: CaptureConfig,
        capture_enabled: bool,
        scheduler: PlaybackScheduler,
        audio_tx: mpsc::Sender<Vec<u8>>,
        outbound_tx: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            state,
            observer,
            input,
            output,
            capture_config,
            capture_enabled,
            scheduler,
            capture: CapturePipeline::new(),
            first_message: true,
            acquisition_epoch: 0,
            audio_tx,
            outbound_tx,
        }
    }

    /// Run until the session ends
    pub(crate) async fn run(
        mut self,
        mut transport_rx: mpsc::Receiver<TransportEvent>,
        mut command_rx: mpsc::Receiver<DriverCommand>,
    ) {
        let (acquired_tx, mut acquired_rx) = mpsc::channel(4);

        self.start_playback().await;
        self.start_capture(&acquired_tx);

        loop {
            let event = tokio::select! {
                event = transport_rx.recv() => DriverEvent::Transport(
                    event.unwrap_or(TransportEvent::Closed { reason: None }),
                ),
                command = command_rx.recv() => DriverEvent::Command(
                    command.unwrap_or(DriverCommand::Disconnect { done: None }),
                ),
                Some(acquisition) = acquired_rx.recv() => DriverEvent::CaptureAcquired(acquisition),
            };

            if self.handle(event).is_break() {
                break;
            }
        }

        debug!("Session driver finished");
    }

    fn handle(&mut self, event: DriverEvent) -> ControlFlow<()> {
        match event {
            DriverEvent::Transport(TransportEvent::Text(text)) => self.on_text(&text),
            DriverEvent::Transport(TransportEvent::Binary(bytes)) => self.on_binary(&bytes),
            DriverEvent::Transport(TransportEvent::Closed { reason }) => {
                let message = match reason {
                    Some(reason) => format!("Connection closed by server: {}", reason),
                    None => "Connection closed by server".to_string(),
                };
                self.teardown(SessionState::Disconnected, &message);
                return ControlFlow::Break(());
            }
            DriverEvent::Transport(TransportEvent::Failed(error)) => {
                self.teardown(SessionState::Failed, &format!("Connection error: {}", error));
                return ControlFlow::Break(());
            }
            DriverEvent::Command(DriverCommand::Disconnect { done }) => {
                self.teardown(SessionState::Disconnected, "Disconnected");
                if let Some(done) = done {
                    let _ = done.send(());
                }
                return ControlFlow::Break(());
            }
            DriverEvent::CaptureAcquired(acquisition) => self.on_capture_acquired(acquisition),
        }

        ControlFlow::Continue(())
    }

    async fn start_playback(&mut self) {
        match self.output.open().await {
            Ok(sink) => self.scheduler.activate(sink),
            Err(e) => {
                warn!("Audio output unavailable, received audio will be dropped: {}", e);
                self.observer.on_error(
                    self.state.current(),
                    &format!("Audio output unavailable: {}", e),
                );
            }
        }
    }

    fn start_capture(&mut self, acquired_tx: &mpsc::Sender<Acquisition>) {
        if !self.capture_enabled {
            info!("Capture disabled, session is receive-only");
            return;
        }

        self.acquisition_epoch += 1;
        let epoch = self.acquisition_epoch;
        let acquire = CapturePipeline::acquire(self.input.as_ref(), self.capture_config.clone());
        let acquired_tx = acquired_tx.clone();

        tokio::spawn(async move {
            let result = acquire.await;
            // A closed channel means the session is gone; dropping the
            // result releases the device
            let _ = acquired_tx.send(Acquisition { epoch, result }).await;
        });
    }

    fn on_capture_acquired(&mut self, acquisition: Acquisition) {
        let Acquisition { epoch, result } = acquisition;

        if epoch != self.acquisition_epoch || !self.state.current().is_connected() {
            debug!("Discarding stale capture acquisition (epoch {})", epoch);
            return;
        }

        match result {
            Ok(acquired) => match self.capture.attach(acquired, self.audio_tx.clone()) {
                Ok(()) => self
                    .observer
                    .on_state_change(SessionState::Connected, "Microphone streaming"),
                Err(e) => {
                    warn!("Failed to start capture: {}", e);
                    self.observer.on_error(
                        SessionState::Connected,
                        &format!("Failed to start capture: {}", e),
                    );
                }
            },
            Err(e) => {
                warn!("Microphone unavailable, continuing receive-only: {}", e);
                self.observer.on_error(
                    SessionState::Connected,
                    &format!("Microphone unavailable: {}", e),
                );
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        let first = std::mem::replace(&mut self.first_message, false);

        if first {
            if let Some(ControlMessage::Uid { uid }) = ControlMessage::parse(text) {
                info!("Session uid assigned: {}", uid);
                self.state.set_uid(uid.clone());
                self.observer
                    .on_state_change(SessionState::Connected, &format!("Session uid: {}", uid));
                return;
            }
        }

        debug!("Ignoring text message ({} bytes)", text.len());
    }

    fn on_binary(&mut self, bytes: &[u8]) {
        self.first_message = false;

        let frame = match codec::decode(bytes) {
            Ok(frame) => frame,
            Err(DecodeError::EmptyAudio) => {
                debug!("Received frame without audio");
                return;
            }
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                self.observer
                    .on_error(SessionState::Connected, &format!("Bad audio frame: {}", e));
                return;
            }
        };

        match self.scheduler.enqueue(&frame) {
            Ok(EnqueueOutcome::Scheduled {
                start_at,
                duration,
                dropped,
            }) => {
                debug!(start_at, duration, dropped, "Scheduled audio chunk");
            }
            Ok(outcome) => debug!("Audio chunk not scheduled: {:?}", outcome),
            Err(e) => {
                warn!("Dropping audio chunk: {}", e);
                self.observer
                    .on_error(SessionState::Connected, &format!("Playback error: {}", e));
            }
        }
    }

    fn teardown(&mut self, target: SessionState, message: &str) {
        info!("Tearing down session: {}", message);

        self.capture.stop();
        // Acquisitions still in flight are now stale
        self.acquisition_epoch += 1;
        self.scheduler.reset();

        if self.outbound_tx.try_send(OutboundMessage::Close).is_err() {
            debug!("Writer already gone");
        }

        match self.state.transition(target) {
            Ok(()) if target == SessionState::Failed => self.observer.on_error(target, message),
            Ok(()) => self.observer.on_state_change(target, message),
            Err(e) => debug!("Skipping state change: {}", e),
        }
    }
}
