/// Mock PLC 实现
/// 用于开发和测试阶段，模拟产品传感器与剔除器

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::services::domain::trigger::{spawn_sensor_poller, SignalStream};
use crate::services::traits::Plc;
use crate::utils::error::{AppError, AppResult};

pub struct MockPlc {
    name: String,
    /// 传感器当前状态，由测试控制
    sensor: Arc<AtomicBool>,
    connected: AtomicBool,
    rejector_active: AtomicBool,
    fail_connect: AtomicBool,
    fail_reads: Arc<AtomicBool>,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
    poll_interval: Duration,
    signal_buffer_size: usize,
}

impl MockPlc {
    pub fn new(name: impl Into<String>, poll_interval: Duration, signal_buffer_size: usize) -> Self {
        Self {
            name: name.into(),
            sensor: Arc::new(AtomicBool::new(false)),
            connected: AtomicBool::new(false),
            rejector_active: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_reads: Arc::new(AtomicBool::new(false)),
            connect_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            poll_interval,
            signal_buffer_size,
        }
    }

    /// 创建用于测试的实例，轮询间隔 5ms
    pub fn new_for_testing(name: impl Into<String>) -> Self {
        Self::new(name, Duration::from_millis(5), 5)
    }

    pub fn set_sensor(&self, active: bool) {
        self.sensor.store(active, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_rejector_active(&self) -> bool {
        self.rejector_active.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> AppResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(AppError::plc_communication_error(format!("{} 未连接", self.name)))
        }
    }
}

#[async_trait]
impl Plc for MockPlc {
    fn device_name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> AppResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(AppError::plc_communication_error(format!("{} 连接被拒绝", self.name)));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read_product_sensor(&self) -> AppResult<bool> {
        self.ensure_connected()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::plc_communication_error("模拟读取失败"));
        }
        Ok(self.sensor.load(Ordering::SeqCst))
    }

    async fn handle_product_signal(&self, cancel: CancellationToken) -> AppResult<SignalStream> {
        self.ensure_connected()?;
        let sensor = self.sensor.clone();
        let fail_reads = self.fail_reads.clone();
        Ok(spawn_sensor_poller(
            format!("MOCK_PLC:{}", self.name),
            move || {
                let reading = if fail_reads.load(Ordering::SeqCst) {
                    Err(AppError::plc_communication_error("模拟读取失败"))
                } else {
                    Ok(sensor.load(Ordering::SeqCst))
                };
                async move { reading }
            },
            self.poll_interval,
            self.signal_buffer_size,
            cancel,
        ))
    }

    async fn rejector_on(&self) -> AppResult<()> {
        self.ensure_connected()?;
        self.rejector_active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn rejector_off(&self) -> AppResult<()> {
        self.ensure_connected()?;
        self.rejector_active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
