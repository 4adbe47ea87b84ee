// modbus_plc.rs
//! Modbus TCP PLC 适配器
//!
//! 产品到位传感器与剔除器都接在线圈上（0 基地址）

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio_modbus::client::Context as ModbusClientContext;
use tokio_modbus::prelude::*; // for tcp::connect_slave and Slave
use tokio_util::sync::CancellationToken;

use crate::services::domain::trigger::{spawn_sensor_poller, SignalStream};
use crate::services::traits::Plc;
use crate::utils::config::PlcConfig;
use crate::utils::error::{AppError, AppResult};

/// Modbus TCP PLC 配置
#[derive(Debug, Clone)]
pub struct ModbusPlcConfig {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    /// 连接与单次读写的超时
    pub connection_timeout_ms: u64,
    pub product_sensor_coil: u16,
    pub rejector_coil: u16,
    pub sensor_scan_interval_ms: u64,
    pub signal_buffer_size: usize,
}

impl From<&PlcConfig> for ModbusPlcConfig {
    fn from(config: &PlcConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            slave_id: config.slave_id,
            connection_timeout_ms: config.connection_timeout_ms,
            product_sensor_coil: config.product_sensor_coil,
            rejector_coil: config.rejector_coil,
            sensor_scan_interval_ms: config.sensor_scan_interval_ms,
            signal_buffer_size: config.signal_buffer_size,
        }
    }
}

/// 通讯统计
#[derive(Debug, Clone, Default)]
pub struct PlcStats {
    pub connection_count: u64,
    pub successful_reads: u64,
    pub failed_reads: u64,
    pub successful_writes: u64,
    pub failed_writes: u64,
}

/// 连接状态与统计，轮询任务与设备对象共享
struct ModbusLink {
    config: ModbusPlcConfig,
    client_context: Mutex<Option<ModbusClientContext>>,
    stats: Mutex<PlcStats>,
    /// 连接因通讯错误丢失，下一次读写时重连
    connection_lost: AtomicBool,
}

impl ModbusLink {
    fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.config.connection_timeout_ms)
    }

    async fn resolve_socket_addr(&self) -> AppResult<SocketAddr> {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let mut addrs = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| AppError::configuration_error(format!("无效的PLC地址 {}: {}", target, e)))?;
        addrs
            .next()
            .ok_or_else(|| AppError::configuration_error(format!("无法解析PLC地址: {}", target)))
    }

    async fn open(&self) -> AppResult<ModbusClientContext> {
        let socket_addr = self.resolve_socket_addr().await?;
        let slave = Slave(self.config.slave_id);

        match tokio::time::timeout(self.io_timeout(), tcp::connect_slave(socket_addr, slave)).await {
            Ok(Ok(ctx)) => {
                self.stats.lock().await.connection_count += 1;
                info!("🔗 [MODBUS_PLC] 已连接 {}", socket_addr);
                Ok(ctx)
            }
            Ok(Err(e)) => Err(AppError::plc_communication_error(format!("Modbus连接失败 {}: {}", socket_addr, e))),
            Err(_) => Err(AppError::timeout_error(
                "连接PLC",
                format!("{} 在 {}ms 内无响应", socket_addr, self.config.connection_timeout_ms),
            )),
        }
    }

    /// 取得可用的连接上下文，连接丢失过则先重连
    async fn context<'a>(
        &self,
        guard: &'a mut Option<ModbusClientContext>,
    ) -> AppResult<&'a mut ModbusClientContext> {
        if guard.is_none() && self.connection_lost.load(Ordering::SeqCst) {
            info!("[MODBUS_PLC] 尝试重连 {}:{}", self.config.host, self.config.port);
            *guard = Some(self.open().await?);
            self.connection_lost.store(false, Ordering::SeqCst);
        }
        guard
            .as_mut()
            .ok_or_else(|| AppError::plc_communication_error("PLC未连接"))
    }

    /// 通讯层错误或超时：丢弃连接，下一次读写时重连
    fn drop_connection(&self, guard: &mut Option<ModbusClientContext>) {
        if guard.take().is_some() {
            warn!("[MODBUS_PLC] 连接已丢失 {}:{}", self.config.host, self.config.port);
        }
        self.connection_lost.store(true, Ordering::SeqCst);
    }

    /// 读取单个线圈
    async fn read_coil(&self, address: u16) -> AppResult<bool> {
        let mut client_ctx_guard = self.client_context.lock().await;
        let ctx = self.context(&mut client_ctx_guard).await?;

        let read_result = tokio::time::timeout(self.io_timeout(), ctx.read_coils(address, 1)).await;
        let modbus_io_result = match read_result {
            Ok(result) => result,
            Err(_) => {
                self.stats.lock().await.failed_reads += 1;
                // 迟到的应答会与下一次请求错位
                self.drop_connection(&mut client_ctx_guard);
                return Err(AppError::timeout_error("读取线圈", format!("地址 {}", address)));
            }
        };

        let values: Vec<bool> = match modbus_io_result { // Outer Result for IO errors
            Ok(modbus_protocol_result) => match modbus_protocol_result { // Inner Result for Modbus exceptions
                Ok(v) => v,
                Err(e_code) => {
                    self.stats.lock().await.failed_reads += 1;
                    return Err(AppError::plc_communication_error(format!(
                        "Modbus协议错误 (读取线圈 {}): {:?}",
                        address, e_code
                    )));
                }
            },
            Err(io_err) => {
                self.stats.lock().await.failed_reads += 1;
                self.drop_connection(&mut client_ctx_guard);
                return Err(AppError::plc_communication_error(format!(
                    "Modbus IO错误 (读取线圈 {}): {}",
                    address, io_err
                )));
            }
        };

        self.stats.lock().await.successful_reads += 1;
        values
            .first()
            .copied()
            .ok_or_else(|| AppError::plc_communication_error("读取线圈时返回为空"))
    }

    async fn write_coil(&self, address: u16, value: bool) -> AppResult<()> {
        let mut client_ctx_guard = self.client_context.lock().await;
        let ctx = self.context(&mut client_ctx_guard).await?;

        let write_result = tokio::time::timeout(self.io_timeout(), ctx.write_single_coil(address, value)).await;
        let modbus_io_result = match write_result {
            Ok(result) => result,
            Err(_) => {
                self.stats.lock().await.failed_writes += 1;
                self.drop_connection(&mut client_ctx_guard);
                return Err(AppError::timeout_error("写入线圈", format!("地址 {}", address)));
            }
        };

        match modbus_io_result {
            Ok(Ok(())) => {}
            Ok(Err(e_code)) => {
                self.stats.lock().await.failed_writes += 1;
                return Err(AppError::plc_communication_error(format!(
                    "Modbus协议错误 (写入线圈 {}): {:?}",
                    address, e_code
                )));
            }
            Err(io_err) => {
                self.stats.lock().await.failed_writes += 1;
                self.drop_connection(&mut client_ctx_guard);
                return Err(AppError::plc_communication_error(format!(
                    "Modbus IO错误 (写入线圈 {}): {}",
                    address, io_err
                )));
            }
        }

        self.stats.lock().await.successful_writes += 1;
        Ok(())
    }
}

pub struct ModbusPlc {
    name: String,
    link: Arc<ModbusLink>,
}

impl ModbusPlc {
    pub fn new(config: ModbusPlcConfig) -> Self {
        Self {
            name: format!("ModbusPLC@{}:{}", config.host, config.port),
            link: Arc::new(ModbusLink {
                config,
                client_context: Mutex::new(None),
                stats: Mutex::new(PlcStats::default()),
                connection_lost: AtomicBool::new(false),
            }),
        }
    }

    pub async fn stats(&self) -> PlcStats {
        self.link.stats.lock().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.link.client_context.lock().await.is_some()
    }
}

#[async_trait]
impl Plc for ModbusPlc {
    fn device_name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> AppResult<()> {
        let mut guard = self.link.client_context.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(self.link.open().await?);
        self.link.connection_lost.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read_product_sensor(&self) -> AppResult<bool> {
        self.link.read_coil(self.link.config.product_sensor_coil).await
    }

    async fn handle_product_signal(&self, cancel: CancellationToken) -> AppResult<SignalStream> {
        if !self.is_connected().await {
            return Err(AppError::plc_communication_error("PLC未连接，无法监听产品信号"));
        }
        let config = &self.link.config;
        if config.sensor_scan_interval_ms == 0 {
            return Err(AppError::configuration_error("传感器轮询间隔必须大于0"));
        }

        let link = self.link.clone();
        let coil = config.product_sensor_coil;

        debug!("[MODBUS_PLC] 开始监听产品传感器, 线圈: {}", coil);

        Ok(spawn_sensor_poller(
            "MODBUS_PLC".to_string(),
            move || {
                let link = link.clone();
                async move { link.read_coil(coil).await }
            },
            Duration::from_millis(config.sensor_scan_interval_ms),
            config.signal_buffer_size,
            cancel,
        ))
    }

    async fn rejector_on(&self) -> AppResult<()> {
        self.link.write_coil(self.link.config.rejector_coil, true).await
    }

    async fn rejector_off(&self) -> AppResult<()> {
        self.link.write_coil(self.link.config.rejector_coil, false).await
    }

    async fn close(&self) -> AppResult<()> {
        self.link.connection_lost.store(false, Ordering::SeqCst);
        if let Some(mut ctx) = self.link.client_context.lock().await.take() {
            if let Err(e) = ctx.disconnect().await {
                warn!("[MODBUS_PLC] 断开连接时出错: {}", e);
            }
            info!("[MODBUS_PLC] 已断开 {}", self.name);
        }
        Ok(())
    }
}
