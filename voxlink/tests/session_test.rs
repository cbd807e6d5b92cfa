//! Voxlink 会话集成测试
//!
//! 在本地回环 WebSocket 服务上运行完整会话，使用假的输入/输出设备，
//! 覆盖连接、UID、播放调度、发送、断开与错误路径。

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use voxlink_lib::audio::{
    AudioError, AudioResult, CaptureConfig, InputDevice, InputFormat, InputStream,
};
use voxlink_lib::codec;
use voxlink_lib::network::NetworkError;
use voxlink_lib::playback::{OutputDevice, PlaybackBuffer, PlaybackSink};
use voxlink_lib::session::{
    BasicAuth, SessionConfig, SessionController, SessionError, StaticAuth, StatusObserver,
};
use voxlink_lib::state::SessionState;

// ==================== 回环服务 ====================

/// 只接受一个连接的 WebSocket 服务
struct Loopback {
    addr: SocketAddr,
    /// 发给客户端的消息
    to_client: mpsc::UnboundedSender<Message>,
    /// 从客户端收到的消息
    from_client: mpsc::UnboundedReceiver<Message>,
    /// 握手请求的 URI
    request_uri: Arc<Mutex<Option<String>>>,
}

impl Loopback {
    async fn start() -> Self {
        Self::start_with_status(None).await
    }

    /// `reject` 不为空时以该状态码拒绝握手
    async fn start_with_status(reject: Option<StatusCode>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (to_client, mut to_client_rx) = mpsc::unbounded_channel::<Message>();
        let (from_client_tx, from_client) = mpsc::unbounded_channel();
        let request_uri = Arc::new(Mutex::new(None));
        let uri_slot = Arc::clone(&request_uri);

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };

            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                *uri_slot.lock().unwrap() = Some(req.uri().to_string());
                match reject {
                    Some(status) => {
                        let mut error = ErrorResponse::new(Some("rejected".to_string()));
                        *error.status_mut() = status;
                        Err(error)
                    }
                    None => Ok(resp),
                }
            };

            let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                return;
            };

            loop {
                tokio::select! {
                    Some(message) = to_client_rx.recv() => {
                        if ws.send(message).await.is_err() {
                            break;
                        }
                    }
                    incoming = ws.next() => match incoming {
                        Some(Ok(message)) => {
                            let _ = from_client_tx.send(message);
                        }
                        _ => break,
                    },
                }
            }
        });

        Self {
            addr,
            to_client,
            from_client,
            request_uri,
        }
    }

    fn socket_url(&self) -> String {
        format!("ws://{}/ws/voices/", self.addr)
    }

    fn base_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    fn send(&self, message: Message) {
        self.to_client.send(message).unwrap();
    }

    /// 等待下一条非控制帧消息
    async fn next_data(&mut self) -> Message {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
                .await
                .expect("timed out waiting for client message")
                .expect("server connection ended");
            if message.is_text() || message.is_binary() || message.is_close() {
                return message;
            }
        }
    }
}

// ==================== 假设备 ====================

#[derive(Default)]
struct SinkLog {
    scheduled: Vec<(f64, f64)>,
    flushes: usize,
    dropped: bool,
}

/// 时钟固定为 0 的播放输出
struct FakeSink {
    log: Arc<Mutex<SinkLog>>,
}

impl PlaybackSink for FakeSink {
    fn now(&self) -> f64 {
        0.0
    }

    fn schedule(&mut self, buffer: PlaybackBuffer, start_at: f64) {
        self.log
            .lock()
            .unwrap()
            .scheduled
            .push((start_at, buffer.duration_secs()));
    }

    fn flush(&mut self) {
        self.log.lock().unwrap().flushes += 1;
    }

    fn cancel_from(&mut self, start_at: f64) {
        self.log
            .lock()
            .unwrap()
            .scheduled
            .retain(|&(start, _)| start < start_at);
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.log.lock().unwrap().dropped = true;
    }
}

#[derive(Clone, Default)]
struct FakeOutput {
    log: Arc<Mutex<SinkLog>>,
}

impl OutputDevice for FakeOutput {
    fn open(&self) -> BoxFuture<'static, AudioResult<Box<dyn PlaybackSink>>> {
        let log = Arc::clone(&self.log);
        Box::pin(async move { Ok(Box::new(FakeSink { log }) as Box<dyn PlaybackSink>) })
    }
}

/// 打开后立即推送固定的采样数据
#[derive(Clone, Default)]
struct ScriptedInput {
    buffers: Vec<Vec<f32>>,
    released: Arc<AtomicBool>,
}

impl InputDevice for ScriptedInput {
    fn open(
        &self,
        _config: &CaptureConfig,
        samples: mpsc::Sender<Vec<f32>>,
    ) -> BoxFuture<'static, AudioResult<InputStream>> {
        let buffers = self.buffers.clone();
        let released = Arc::clone(&self.released);
        Box::pin(async move {
            for buffer in buffers {
                let _ = samples.send(buffer).await;
            }
            let format = InputFormat {
                sample_rate: 24000,
                channels: 1,
            };
            Ok(InputStream::new(format, move || {
                released.store(true, Ordering::SeqCst)
            }))
        })
    }
}

/// 直到 `gate` 被通知才完成打开，模拟等待系统授权
#[derive(Clone, Default)]
struct SlowInput {
    gate: Arc<Notify>,
    opened: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl InputDevice for SlowInput {
    fn open(
        &self,
        _config: &CaptureConfig,
        _samples: mpsc::Sender<Vec<f32>>,
    ) -> BoxFuture<'static, AudioResult<InputStream>> {
        let gate = Arc::clone(&self.gate);
        let opened = Arc::clone(&self.opened);
        let released = Arc::clone(&self.released);
        Box::pin(async move {
            gate.notified().await;
            opened.store(true, Ordering::SeqCst);
            let format = InputFormat {
                sample_rate: 24000,
                channels: 1,
            };
            Ok(InputStream::new(format, move || {
                released.store(true, Ordering::SeqCst)
            }))
        })
    }
}

struct DeniedInput;

impl InputDevice for DeniedInput {
    fn open(
        &self,
        _config: &CaptureConfig,
        _samples: mpsc::Sender<Vec<f32>>,
    ) -> BoxFuture<'static, AudioResult<InputStream>> {
        Box::pin(async { Err(AudioError::DeviceUnavailable("permission denied".to_string())) })
    }
}

// ==================== 观察者 ====================

#[derive(Debug, Clone, PartialEq)]
struct Notification {
    state: SessionState,
    message: String,
    is_error: bool,
}

#[derive(Clone, Default)]
struct RecordingObserver {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingObserver {
    fn snapshot(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    fn has_error_containing(&self, text: &str) -> bool {
        self.snapshot()
            .iter()
            .any(|n| n.is_error && n.message.contains(text))
    }
}

impl StatusObserver for RecordingObserver {
    fn on_state_change(&self, state: SessionState, message: &str) {
        self.notifications.lock().unwrap().push(Notification {
            state,
            message: message.to_string(),
            is_error: false,
        });
    }

    fn on_error(&self, state: SessionState, message: &str) {
        self.notifications.lock().unwrap().push(Notification {
            state,
            message: message.to_string(),
            is_error: true,
        });
    }
}

// ==================== 辅助函数 ====================

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn receive_only_session(
    server: &Loopback,
    output: &FakeOutput,
    observer: &RecordingObserver,
) -> SessionController {
    let config = SessionConfig::new(server.base_url())
        .with_socket_url(server.socket_url())
        .receive_only();

    SessionController::new(config, StaticAuth("unused".to_string()))
        .with_observer(observer.clone())
        .with_output_device(output.clone())
}

// ==================== 连接 ====================

#[tokio::test]
async fn test_connect_appends_authorization() {
    let server = Loopback::start().await;
    let output = FakeOutput::default();

    let config = SessionConfig::new(server.base_url()).receive_only();
    let mut session = SessionController::new(config, BasicAuth::new("user", "pass"))
        .with_output_device(output);

    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);

    let uri = server.request_uri.lock().unwrap().clone().unwrap();
    assert_eq!(uri, "/ws/voices/?authorization=Basic+dXNlcjpwYXNz");

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_connect_reports_states_in_order() {
    let server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();
    let mut session = receive_only_session(&server, &output, &observer);
    let mut states = session.subscribe();

    session.connect().await.unwrap();

    assert_eq!(states.recv().await, Some(SessionState::Connecting));
    assert_eq!(states.recv().await, Some(SessionState::Connected));

    let notifications = observer.snapshot();
    assert_eq!(notifications[0].state, SessionState::Connecting);
    assert_eq!(notifications[1].state, SessionState::Connected);

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();
    let mut session = receive_only_session(&server, &output, &observer);

    session.connect().await.unwrap();
    let result = session.connect().await;
    assert!(matches!(
        result,
        Err(SessionError::AlreadyStarted(SessionState::Connected))
    ));

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_connect_refused_fails_session() {
    // 绑定后立即释放端口，确保无人监听
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let observer = RecordingObserver::default();
    let config = SessionConfig::new(format!("ws://{}", addr)).receive_only();
    let mut session = SessionController::new(config, BasicAuth::new("user", "pass"))
        .with_observer(observer.clone())
        .with_output_device(FakeOutput::default());

    let result = session.connect().await;

    assert!(matches!(result, Err(SessionError::Transport(_))));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(observer
        .snapshot()
        .iter()
        .any(|n| n.is_error && n.state == SessionState::Failed));

    // 终止状态下断开是空操作
    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = Loopback::start_with_status(Some(StatusCode::UNAUTHORIZED)).await;

    let config = SessionConfig::new(server.base_url()).receive_only();
    let mut session = SessionController::new(config, BasicAuth::new("user", "wrong"))
        .with_output_device(FakeOutput::default());

    let result = session.connect().await;

    assert!(matches!(
        result,
        Err(SessionError::Transport(NetworkError::AuthenticationFailed))
    ));
    assert_eq!(session.state(), SessionState::Failed);
}

// ==================== 接收 ====================

#[tokio::test]
async fn test_uid_and_audio_are_scheduled() {
    let server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();
    let mut session = receive_only_session(&server, &output, &observer);

    session.connect().await.unwrap();

    server.send(Message::Text(r#"{"type":"UID","uid":"session-1"}"#.into()));
    // 480 个 16 位单声道采样，24 kHz 下为 20ms
    let frame = codec::encode(&[0u8; 960], 24000, 1);
    server.send(Message::Binary(frame.into()));

    wait_until("audio to be scheduled", || {
        !output.log.lock().unwrap().scheduled.is_empty()
    })
    .await;

    assert_eq!(session.uid(), Some("session-1".to_string()));

    let (start_at, duration) = output.log.lock().unwrap().scheduled[0];
    assert!((start_at - 0.05).abs() < 1e-9, "start_at = {}", start_at);
    assert!((duration - 0.02).abs() < 1e-9, "duration = {}", duration);

    assert!(observer
        .snapshot()
        .iter()
        .any(|n| !n.is_error && n.message.contains("session-1")));

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_consecutive_chunks_play_back_to_back() {
    let server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();
    let mut session = receive_only_session(&server, &output, &observer);

    session.connect().await.unwrap();

    for _ in 0..3 {
        let frame = codec::encode(&[0u8; 960], 24000, 1);
        server.send(Message::Binary(frame.into()));
    }

    wait_until("three chunks to be scheduled", || {
        output.log.lock().unwrap().scheduled.len() == 3
    })
    .await;

    let scheduled = output.log.lock().unwrap().scheduled.clone();
    for pair in scheduled.windows(2) {
        let (start, duration) = pair[0];
        let (next_start, _) = pair[1];
        assert!((start + duration - next_start).abs() < 1e-9);
    }

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_bad_frames_do_not_end_session() {
    let server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();
    let mut session = receive_only_session(&server, &output, &observer);

    session.connect().await.unwrap();

    // 非 protobuf 数据、没有音频的帧、非 UID 文本
    server.send(Message::Binary(vec![0xff, 0xff, 0xff].into()));
    server.send(Message::Binary(codec::encode(&[], 24000, 1).into()));
    server.send(Message::Text(r#"{"type":"status"}"#.into()));
    server.send(Message::Binary(codec::encode(&[0u8; 960], 24000, 1).into()));

    wait_until("valid chunk to be scheduled", || {
        output.log.lock().unwrap().scheduled.len() == 1
    })
    .await;

    assert_eq!(session.state(), SessionState::Connected);
    assert!(observer.has_error_containing("Bad audio frame"));
    assert_eq!(session.uid(), None);

    session.disconnect().await.unwrap();
}

// ==================== 发送 ====================

#[tokio::test]
async fn test_send_before_connect() {
    let session = SessionController::new(SessionConfig::default(), StaticAuth(String::new()));

    let result = session.send(r#"{"type":"hello"}"#).await;
    assert!(matches!(
        result,
        Err(SessionError::NotConnected(SessionState::Idle))
    ));
}

#[tokio::test]
async fn test_send_delivers_compact_json() {
    let mut server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();
    let mut session = receive_only_session(&server, &output, &observer);

    session.connect().await.unwrap();
    session
        .send("{ \"type\": \"hello\",\n  \"n\": 1 }")
        .await
        .unwrap();

    let message = server.next_data().await;
    assert_eq!(message, Message::Text(r#"{"type":"hello","n":1}"#.into()));

    let result = session.send("{ not json").await;
    assert!(matches!(result, Err(SessionError::InvalidPayload(_))));
    assert_eq!(session.state(), SessionState::Connected);

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_captured_audio_is_streamed() {
    let mut server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();
    let input = ScriptedInput {
        buffers: vec![vec![0.5; 512]],
        ..Default::default()
    };

    let config = SessionConfig::new(server.base_url()).with_socket_url(server.socket_url());
    let mut session = SessionController::new(config, StaticAuth("unused".to_string()))
        .with_observer(observer.clone())
        .with_input_device(input.clone())
        .with_output_device(output.clone());

    session.connect().await.unwrap();

    let Message::Binary(bytes) = server.next_data().await else {
        panic!("expected an audio frame");
    };
    let frame = codec::decode(&bytes).unwrap();
    assert_eq!(frame.sample_rate(), 24000);
    assert_eq!(frame.num_channels(), 1);
    assert_eq!(frame.payload().len(), 1024);
    assert_eq!(&frame.payload()[..2], &16383i16.to_le_bytes());

    session.disconnect().await.unwrap();
    assert!(input.released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_microphone_denied_continues_receive_only() {
    let server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();

    let config = SessionConfig::new(server.base_url()).with_socket_url(server.socket_url());
    let mut session = SessionController::new(config, StaticAuth("unused".to_string()))
        .with_observer(observer.clone())
        .with_input_device(DeniedInput)
        .with_output_device(output.clone());

    session.connect().await.unwrap();

    wait_until("microphone error", || {
        observer.has_error_containing("Microphone unavailable")
    })
    .await;
    assert_eq!(session.state(), SessionState::Connected);

    // 仍然可以接收音频
    server.send(Message::Binary(codec::encode(&[0u8; 960], 24000, 1).into()));
    wait_until("audio to be scheduled", || {
        !output.log.lock().unwrap().scheduled.is_empty()
    })
    .await;

    session.disconnect().await.unwrap();
}

// ==================== 断开 ====================

#[tokio::test]
async fn test_disconnect_releases_playback() {
    let mut server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();
    let mut session = receive_only_session(&server, &output, &observer);

    session.connect().await.unwrap();
    session.disconnect().await.unwrap();

    assert_eq!(session.state(), SessionState::Disconnected);
    {
        let log = output.log.lock().unwrap();
        assert!(log.flushes >= 1);
        assert!(log.dropped);
    }

    assert!(server.next_data().await.is_close());

    // 重复断开不报错
    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);

    let result = session.send("{}").await;
    assert!(matches!(
        result,
        Err(SessionError::NotConnected(SessionState::Disconnected))
    ));
}

#[tokio::test]
async fn test_disconnect_before_connect() {
    let mut session = SessionController::new(SessionConfig::default(), StaticAuth(String::new()));

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);

    let result = session.connect().await;
    assert!(matches!(
        result,
        Err(SessionError::AlreadyStarted(SessionState::Disconnected))
    ));
}

#[tokio::test]
async fn test_disconnect_returns_when_peer_stops_reading() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // 握手后不再读取，客户端的写入最终会阻塞
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        std::future::pending::<()>().await;
    });

    let config = SessionConfig::new(format!("ws://{}", addr))
        .with_socket_url(format!("ws://{}/ws/voices/", addr))
        .receive_only();
    let mut session = SessionController::new(config, StaticAuth("unused".to_string()))
        .with_output_device(FakeOutput::default());
    session.connect().await.unwrap();

    // 超过回环连接两端的缓冲区
    let payload = format!(r#"{{"text":"{}"}}"#, "x".repeat(1 << 20));
    for _ in 0..24 {
        session.send(&payload).await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(10), session.disconnect())
        .await
        .expect("disconnect should not wait on a stalled peer")
        .unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_server_close_disconnects() {
    let server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();
    let mut session = receive_only_session(&server, &output, &observer);

    session.connect().await.unwrap();
    server.send(Message::Close(None));

    wait_until("session to disconnect", || {
        session.state() == SessionState::Disconnected
    })
    .await;

    assert!(output.log.lock().unwrap().dropped);
    assert!(observer
        .snapshot()
        .iter()
        .any(|n| n.state == SessionState::Disconnected && !n.is_error));

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_during_microphone_prompt_releases_device() {
    let server = Loopback::start().await;
    let output = FakeOutput::default();
    let observer = RecordingObserver::default();
    let input = SlowInput::default();

    let config = SessionConfig::new(server.base_url()).with_socket_url(server.socket_url());
    let mut session = SessionController::new(config, StaticAuth("unused".to_string()))
        .with_observer(observer.clone())
        .with_input_device(input.clone())
        .with_output_device(output.clone());

    session.connect().await.unwrap();
    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);

    // 授权在会话结束后才完成
    input.gate.notify_one();

    wait_until("late device to be released", || {
        input.released.load(Ordering::SeqCst)
    })
    .await;
    assert!(input.opened.load(Ordering::SeqCst));
    assert!(!observer
        .snapshot()
        .iter()
        .any(|n| n.message.contains("Microphone streaming")));
}
