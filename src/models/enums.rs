//! # 模型枚举类型模块
//!
//! ## 业务作用
//! - **任务状态**: 工厂系统中生产任务的状态
//! - **箱码/单品码状态**: 聚合记录落库时的状态
//! - **处理器状态**: 任务处理器状态机
//!
//! 持久化到数据库的状态统一使用小写字符串，见各枚举的 `as_str`

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// 生产任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 新建
    New,
    /// 生产中
    InProgress,
    /// 已暂停
    Paused,
    /// 已完成
    Completed,
    /// 已上报
    Sent,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::New
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::New => "new",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Sent => "sent",
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TaskStatus::New),
            "in_progress" => Ok(TaskStatus::InProgress),
            "paused" => Ok(TaskStatus::Paused),
            "completed" => Ok(TaskStatus::Completed),
            "sent" => Ok(TaskStatus::Sent),
            _ => Err(format!("无效的任务状态: {}", s)),
        }
    }
}

/// 箱码（容器）状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    /// 已创建
    Created,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
        }
    }
}

impl Display for ContainerStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 单品码状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// 已扫描，尚未装箱
    Scanned,
    /// 已聚合到箱
    Aggregated,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Scanned => "scanned",
            ItemStatus::Aggregated => "aggregated",
        }
    }
}

impl Display for ItemStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scanned" => Ok(ItemStatus::Scanned),
            "aggregated" => Ok(ItemStatus::Aggregated),
            _ => Err(format!("无效的单品码状态: {}", s)),
        }
    }
}

/// 任务处理器状态
///
/// Idle → Starting → Running → Stopping → Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessorState {
    /// 空闲，未绑定任务
    Idle,
    /// 正在加载任务数据、连接设备
    Starting,
    /// 扫码循环运行中
    Running,
    /// 已发出取消，等待循环退出并断开设备
    Stopping,
}

impl Default for ProcessorState {
    fn default() -> Self {
        Self::Idle
    }
}

impl Display for ProcessorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessorState::Idle => "Idle",
            ProcessorState::Starting => "Starting",
            ProcessorState::Running => "Running",
            ProcessorState::Stopping => "Stopping",
        };
        write!(f, "{}", s)
    }
}
