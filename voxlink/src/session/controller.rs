use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioCapture, InputDevice};
use crate::network::tasks::{reader_task, writer_task};
use crate::network::{NetworkResult, OutboundMessage, VoiceConnection};
use crate::playback::{CpalOutput, OutputDevice, PlaybackScheduler};
use crate::session::auth::Authorizer;
use crate::session::config::SessionConfig;
use crate::session::driver::{DriverCommand, SessionDriver};
use crate::session::error::{SessionError, SessionResult};
use crate::session::observer::{StatusObserver, TracingObserver};
use crate::state::{SessionState, StateManager};

/// 发送音频帧的通道容量
const AUDIO_CHANNEL_CAPACITY: usize = 100;

/// 控制消息与服务端事件的通道容量
const MESSAGE_CHANNEL_CAPACITY: usize = 32;

/// 断开时等待写任务发完剩余数据的上限
const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// 会话控制器
///
/// 负责一次语音会话的完整生命周期：建立连接、双向传输音频、断开。
/// 一个控制器只对应一次会话，进入终止状态后需要创建新的控制器。
///
/// # Example
/// ```no_run
/// use voxlink_lib::session::{BasicAuth, SessionConfig, SessionController};
///
/// #[tokio::main]
/// async fn main() {
///     let mut session = SessionController::new(
///         SessionConfig::new("wss://voice.example.com"),
///         BasicAuth::new("user", "pass"),
///     );
///
///     session.connect().await.unwrap();
///     session.send(r#"{"type":"hello"}"#).await.unwrap();
///
///     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
///     session.disconnect().await.unwrap();
/// }
/// ```
pub struct SessionController {
    /// 会话配置
    config: SessionConfig,
    /// 鉴权值提供者
    authorizer: Arc<dyn Authorizer>,
    /// 状态观察者
    observer: Arc<dyn StatusObserver>,
    /// 麦克风
    input: Arc<dyn InputDevice>,
    /// 扬声器
    output: Arc<dyn OutputDevice>,
    /// 状态与 uid
    state: Arc<StateManager>,
    /// 控制消息发送端（连接后有效）
    outbound_tx: Option<mpsc::Sender<OutboundMessage>>,
    /// 驱动任务命令发送端
    command_tx: Option<mpsc::Sender<DriverCommand>>,
    /// 驱动任务句柄
    driver_handle: Option<JoinHandle<()>>,
    /// 写任务句柄
    writer_handle: Option<JoinHandle<NetworkResult<()>>>,
    /// 读任务句柄
    reader_handle: Option<JoinHandle<()>>,
}

impl SessionController {
    /// 创建控制器
    ///
    /// 默认使用 cpal 的输入/输出设备，并把状态通知写入日志
    pub fn new(config: SessionConfig, authorizer: impl Authorizer + 'static) -> Self {
        let output = CpalOutput {
            device_id: config.output_device_id.clone(),
        };

        Self {
            config,
            authorizer: Arc::new(authorizer),
            observer: Arc::new(TracingObserver),
            input: Arc::new(AudioCapture),
            output: Arc::new(output),
            state: Arc::new(StateManager::new()),
            outbound_tx: None,
            command_tx: None,
            driver_handle: None,
            writer_handle: None,
            reader_handle: None,
        }
    }

    /// 设置状态观察者
    pub fn with_observer(mut self, observer: impl StatusObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// 设置输入设备
    pub fn with_input_device(mut self, input: impl InputDevice + 'static) -> Self {
        self.input = Arc::new(input);
        self
    }

    /// 设置输出设备
    pub fn with_output_device(mut self, output: impl OutputDevice + 'static) -> Self {
        self.output = Arc::new(output);
        self
    }

    /// 建立连接并开始双向传输
    ///
    /// 连接成功后打开播放输出，并在后台申请麦克风；
    /// 麦克风不可用时通过观察者报告，会话继续以仅接收模式运行。
    ///
    /// # Errors
    ///
    /// - `SessionError::AlreadyStarted` - 控制器已经连接过
    /// - `SessionError::Transport` - 连接失败或超时，状态变为 `Failed`
    pub async fn connect(&mut self) -> SessionResult<()> {
        let current = self.state.current();
        if current != SessionState::Idle {
            return Err(SessionError::AlreadyStarted(current));
        }

        self.transition(SessionState::Connecting, "Connecting")?;

        let connection_config = match &self.config.connection.socket_url {
            Some(_) => self.config.connection.clone(),
            None => self
                .config
                .connection
                .clone()
                .with_authorization(self.authorizer.authorization()),
        };

        let connection = match VoiceConnection::connect(&connection_config).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("Failed to connect: {}", e);
                self.state.transition(SessionState::Failed)?;
                self.observer
                    .on_error(SessionState::Failed, &format!("Connection failed: {}", e));
                return Err(SessionError::Transport(e));
            }
        };

        self.transition(SessionState::Connected, "Connected")?;

        let (writer, reader) = connection.split();
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(AUDIO_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (transport_tx, transport_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(4);

        let writer_handle = tokio::spawn(writer_task(writer, audio_rx, outbound_rx));
        let reader_handle = tokio::spawn(reader_task(reader, transport_tx));

        let scheduler = PlaybackScheduler::new(self.config.schedule_delay, self.config.max_backlog);
        let driver = SessionDriver::new(
            Arc::clone(&self.state),
            Arc::clone(&self.observer),
            Arc::clone(&self.input),
            Arc::clone(&self.output),
            self.config.capture.clone(),
            self.config.capture_enabled,
            scheduler,
            audio_tx,
            outbound_tx.clone(),
        );
        let driver_handle = tokio::spawn(driver.run(transport_rx, command_rx));

        self.outbound_tx = Some(outbound_tx);
        self.command_tx = Some(command_tx);
        self.driver_handle = Some(driver_handle);
        self.writer_handle = Some(writer_handle);
        self.reader_handle = Some(reader_handle);

        info!("Session started");
        Ok(())
    }

    /// 发送 JSON 文本消息
    ///
    /// 内容会被重新序列化为紧凑格式后发送
    ///
    /// # Errors
    ///
    /// - `SessionError::NotConnected` - 当前不是 `Connected` 状态
    /// - `SessionError::InvalidPayload` - 内容不是合法 JSON
    pub async fn send(&self, json: &str) -> SessionResult<()> {
        let state = self.state.current();
        if !state.is_connected() {
            return Err(SessionError::NotConnected(state));
        }

        let message = OutboundMessage::json(json)?;

        let Some(outbound_tx) = &self.outbound_tx else {
            return Err(SessionError::NotConnected(state));
        };

        outbound_tx
            .send(message)
            .await
            .map_err(|_| SessionError::NotConnected(self.state.current()))
    }

    /// 断开连接
    ///
    /// 停止采集、重置播放、关闭连接，状态变为 `Disconnected`。
    /// 可以重复调用。
    pub async fn disconnect(&mut self) -> SessionResult<()> {
        if self.state.current() == SessionState::Idle {
            self.transition(SessionState::Disconnected, "Disconnected")?;
            return Ok(());
        }

        if let Some(command_tx) = self.command_tx.take() {
            let (done_tx, done_rx) = oneshot::channel();
            let command = DriverCommand::Disconnect {
                done: Some(done_tx),
            };
            if command_tx.send(command).await.is_ok() {
                let _ = done_rx.await;
            } else {
                debug!("Session driver already finished");
            }
        }

        self.outbound_tx = None;
        self.join_tasks().await;
        Ok(())
    }

    /// 当前状态
    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    /// 服务端分配的会话 uid
    pub fn uid(&self) -> Option<String> {
        self.state.uid()
    }

    /// 订阅状态变更
    pub fn subscribe(&self) -> mpsc::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// 会话配置
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn transition(&self, state: SessionState, message: &str) -> SessionResult<()> {
        self.state.transition(state)?;
        self.observer.on_state_change(state, message);
        Ok(())
    }

    async fn join_tasks(&mut self) {
        if let Some(handle) = self.driver_handle.take() {
            if let Err(e) = handle.await {
                error!("Session driver panicked: {}", e);
            }
        }

        // 对端不再读取时写任务会一直阻塞，超时后直接中止
        if let Some(mut handle) = self.writer_handle.take() {
            match tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, &mut handle).await {
                Ok(Ok(Ok(()))) => debug!("Writer task completed successfully"),
                Ok(Ok(Err(e))) => warn!("Writer task completed with error: {}", e),
                Ok(Err(e)) => error!("Writer task panicked: {}", e),
                Err(_) => {
                    warn!(
                        "Writer task still blocked after {:?}, aborting",
                        WRITER_SHUTDOWN_TIMEOUT
                    );
                    handle.abort();
                }
            }
        }

        // The reader only ends when the server closes; nothing is lost by
        // stopping it here
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
    }
}
