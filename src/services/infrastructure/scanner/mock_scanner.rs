/// Mock 扫码器
/// 按脚本依次返回应答，脚本用完后返回 NoRead

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::services::traits::CodeReader;
use crate::utils::error::{AppError, AppResult};

pub struct MockCodeReader {
    name: String,
    responses: Mutex<VecDeque<AppResult<String>>>,
    no_read_answer: String,
    scan_delay: Mutex<Duration>,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    connect_calls: AtomicUsize,
    scan_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockCodeReader {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(VecDeque::new()),
            no_read_answer: "NoRead".to_string(),
            scan_delay: Mutex::new(Duration::ZERO),
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn new_for_testing(name: impl Into<String>) -> Self {
        Self::new(name)
    }

    /// 追加一条应答
    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Ok(response.into()));
        }
    }

    /// 追加一次扫码失败
    pub fn push_error(&self, error: AppError) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Err(error));
        }
    }

    pub fn pending_responses(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 每次扫码前等待的时间，用于模拟慢相机
    pub fn set_scan_delay(&self, delay: Duration) {
        if let Ok(mut scan_delay) = self.scan_delay.lock() {
            *scan_delay = delay;
        }
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeReader for MockCodeReader {
    fn device_name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> AppResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(AppError::device_error(&self.name, "连接被拒绝"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn scan(&self) -> AppResult<String> {
        if !self.is_connected() {
            return Err(AppError::device_error(&self.name, "扫码器未连接"));
        }
        let delay = self.scan_delay.lock().map(|d| *d).unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().ok().and_then(|mut r| r.pop_front());
        next.unwrap_or_else(|| Ok(self.no_read_answer.clone()))
    }

    async fn close(&self) -> AppResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
