//! 工作线程辅助

use crate::error::DriverError;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 带超时的 join
///
/// 工作线程可能卡在一次阻塞的网络读取上（例如视频流服务器既不发数据也不断开），
/// 关闭会话时不能无限等待它。
pub trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责 join 目标线程
        thread::spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            // 超时：看门狗继续等待，目标线程结束后一并回收
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 以指定名字启动工作线程
pub fn spawn_named<F, T>(name: &str, f: F) -> Result<JoinHandle<T>, DriverError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| DriverError::Worker(format!("failed to spawn {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_timeout_finished_thread() {
        let handle = spawn_named("helmet-test", || 42).unwrap();
        assert!(handle.join_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_join_timeout_stuck_thread() {
        let handle = spawn_named("helmet-test-stuck", || {
            thread::sleep(Duration::from_millis(500));
        })
        .unwrap();
        assert!(handle.join_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn test_thread_name() {
        let handle = spawn_named("helmet-named", || {
            thread::current().name().map(str::to_string)
        })
        .unwrap();
        assert_eq!(handle.join().unwrap().as_deref(), Some("helmet-named"));
    }
}
