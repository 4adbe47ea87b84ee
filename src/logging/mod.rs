//! # 日志记录模块 (Logging Module)
//!
//! ## 业务说明
//! 记录产线运行过程中的设备通讯、扫码校验、数据落库和人工操作
//! 为故障排查和生产追溯提供日志支持
//!
//! ## 日志策略
//! - **设备日志**: 扫码器、PLC、打印机的连接与通讯
//! - **校验日志**: 每一层被拒绝的原因
//! - **持久化日志**: 箱码与单品码写库失败
//!
//! 日志格式: `[2024-01-01 08:00:00.000] [INFO] [target] 消息`

use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;

use chrono::Local;
use log::LevelFilter;

use crate::utils::config::LoggingConfig;
use crate::utils::error::{AppError, AppResult};

/// 初始化全局日志
///
/// 日志级别取自配置，`RUST_LOG` 环境变量可以覆盖。
/// 关闭控制台输出且配置了日志文件时，输出追加到文件。
/// 重复初始化返回错误，调用方可以忽略。
pub fn init_logging(config: &LoggingConfig) -> AppResult<()> {
    let level = LevelFilter::from_str(&config.log_level)
        .map_err(|_| AppError::configuration_error(format!("无效的日志级别: {}", config.log_level)))?;

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] [{}] [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(path) = config.log_file_path.as_ref().filter(|_| !config.console_output) {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| AppError::configuration_error(format!("日志系统初始化失败: {}", e)))?;

    log::info!("日志系统初始化完成 - 级别: {}", level);
    Ok(())
}

/// 记录通讯失败日志
#[macro_export]
macro_rules! log_communication_failure {
    ($msg:expr) => {
        log::error!("[通讯失败] {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        log::error!("[通讯失败] {}", format!($msg, $($arg)*));
    };
}

/// 记录层校验拒绝日志
#[macro_export]
macro_rules! log_validation_rejection {
    ($msg:expr) => {
        log::warn!("[校验拒绝] {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        log::warn!("[校验拒绝] {}", format!($msg, $($arg)*));
    };
}

/// 记录数据持久化失败日志
#[macro_export]
macro_rules! log_persistence_failure {
    ($msg:expr) => {
        log::error!("[持久化失败] {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        log::error!("[持久化失败] {}", format!($msg, $($arg)*));
    };
}

/// 记录用户操作日志
#[macro_export]
macro_rules! log_user_operation {
    ($msg:expr) => {
        log::info!("[用户操作] {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        log::info!("[用户操作] {}", format!($msg, $($arg)*));
    };
}
