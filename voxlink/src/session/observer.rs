//! 会话状态观察者
//!
//! 状态组件（例如界面上的状态指示）通过实现 [`StatusObserver`] 接收通知

use crate::state::SessionState;

/// 会话状态观察者
///
/// 回调在会话内部任务中同步调用，实现应尽快返回
pub trait StatusObserver: Send + Sync {
    /// 状态变更或一般性通知
    fn on_state_change(&self, state: SessionState, message: &str);

    /// 错误通知，默认转发给 `on_state_change`
    fn on_error(&self, state: SessionState, message: &str) {
        self.on_state_change(state, message);
    }
}

/// 闭包形式的观察者
///
/// ```
/// use voxlink_lib::session::StatusObserver;
/// use voxlink_lib::state::SessionState;
///
/// let observer = |state: SessionState, message: &str| println!("[{}] {}", state, message);
/// observer.on_state_change(SessionState::Connecting, "Connecting");
/// ```
impl<F> StatusObserver for F
where
    F: Fn(SessionState, &str) + Send + Sync,
{
    fn on_state_change(&self, state: SessionState, message: &str) {
        self(state, message)
    }
}

/// 把通知写入 tracing 日志的观察者
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl StatusObserver for TracingObserver {
    fn on_state_change(&self, state: SessionState, message: &str) {
        tracing::info!(state = %state, "{}", message);
    }

    fn on_error(&self, state: SessionState, message: &str) {
        tracing::warn!(state = %state, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        changes: Mutex<Vec<(SessionState, String)>>,
    }

    impl StatusObserver for Recorder {
        fn on_state_change(&self, state: SessionState, message: &str) {
            self.changes
                .lock()
                .unwrap()
                .push((state, message.to_string()));
        }
    }

    #[test]
    fn test_on_error_forwards_by_default() {
        let recorder = Recorder::default();
        recorder.on_error(SessionState::Failed, "boom");

        assert_eq!(
            *recorder.changes.lock().unwrap(),
            vec![(SessionState::Failed, "boom".to_string())]
        );
    }

    #[test]
    fn test_closure_observer() {
        let seen = Mutex::new(Vec::new());
        let observer = |state: SessionState, message: &str| {
            seen.lock().unwrap().push(format!("{}:{}", state, message));
        };

        observer.on_state_change(SessionState::Connected, "Connected");
        observer.on_error(SessionState::Connected, "Microphone unavailable");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "Connected:Connected".to_string(),
                "Connected:Microphone unavailable".to_string()
            ]
        );
    }

    #[test]
    fn test_tracing_observer_is_object_safe() {
        let observer: Box<dyn StatusObserver> = Box::new(TracingObserver);
        observer.on_state_change(SessionState::Idle, "idle");
        observer.on_error(SessionState::Failed, "failed");
    }
}
