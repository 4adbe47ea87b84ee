/// Mock 打印设备
/// `MockPrinter` 模拟打印机传输层，`MockLabelPrinter` 模拟整个标签服务

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::structs::{Product, Task};
use crate::services::traits::{LabelPrinter, PrinterTransport};
use crate::utils::error::{AppError, AppResult};

/// 打印机传输层模拟
#[derive(Default)]
pub struct MockPrinter {
    connected: AtomicBool,
    fail_send: AtomicBool,
    connect_calls: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl MockPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PrinterTransport for MockPrinter {
    async fn connect(&self) -> AppResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, content: &str) -> AppResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AppError::device_error("MockPrinter", "打印机连接未建立"));
        }
        if self.fail_send.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(AppError::device_error("MockPrinter", "模拟发送失败"));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(content.to_string());
        }
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// 一次打印请求的记录
#[derive(Debug, Clone, PartialEq)]
pub struct PrintedLabel {
    pub task_id: i64,
    pub product_id: i64,
    pub serial: i64,
    pub container_code: String,
}

/// 标签服务模拟
#[derive(Default)]
pub struct MockLabelPrinter {
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_print: AtomicBool,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
    printed: Mutex<Vec<PrintedLabel>>,
}

impl MockLabelPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_for_testing() -> Self {
        Self::default()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_print(&self, fail: bool) {
        self.fail_print.store(fail, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn printed(&self) -> Vec<PrintedLabel> {
        self.printed.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LabelPrinter for MockLabelPrinter {
    async fn connect(&self) -> AppResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(AppError::device_error("MockLabelPrinter", "连接被拒绝"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn print_label(&self, task: &Task, product: &Product, serial: i64, container_code: &str) -> AppResult<()> {
        if self.fail_print.load(Ordering::SeqCst) {
            return Err(AppError::device_error("MockLabelPrinter", "模拟打印失败"));
        }
        if let Ok(mut printed) = self.printed.lock() {
            printed.push(PrintedLabel {
                task_id: task.id,
                product_id: product.id,
                serial,
                container_code: container_code.to_string(),
            });
        }
        Ok(())
    }
}
