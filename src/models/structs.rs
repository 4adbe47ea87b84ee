//! 业务数据结构
//!
//! 任务与产品快照来自外部工厂系统，处理器运行期间只读；
//! 箱码与单品码记录由扫码循环创建

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::enums::TaskStatus;
use crate::models::label::LabelData;

/// 生产任务快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub line_id: i64,
    #[serde(default)]
    pub line_name: String,
    /// 生产日期，格式 DD.MM.YYYY
    pub date: String,
    /// 批号
    pub batch_number: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// 产品快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub gtin: String,
    /// 标签数据（JSON 字符串）
    #[serde(default)]
    pub label_data: String,
}

impl Product {
    /// 解析标签数据
    ///
    /// 标签数据为空时返回 `Ok(None)`
    pub fn parse_label_data(&self) -> Result<Option<LabelData>, serde_json::Error> {
        if self.label_data.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&self.label_data).map(Some)
    }
}

/// 箱码记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: i64,
    pub code: String,
    pub serial_number: i64,
    pub task_id: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// 单品码记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub code: String,
    pub task_id: i64,
    /// 装箱前为空
    pub container_id: Option<i64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// 最近扫码记录保留条数
pub const RECENT_CODES_LIMIT: usize = 10;

/// 扫码统计快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatistics {
    /// 触发的扫码周期总数
    pub cycles_total: u64,
    /// NoRead 次数
    pub no_reads: u64,
    /// 码数量不符被拒绝的层
    pub rejected_wrong_count: u64,
    /// 层内重复被拒绝的层
    pub rejected_duplicate_in_layer: u64,
    /// 长度或 GTIN 不符被拒绝的层
    pub rejected_invalid_code: u64,
    /// 码已使用被拒绝的层
    pub rejected_already_used: u64,
    /// 已提交的箱
    pub committed_containers: u64,
    /// 已提交的单品码
    pub committed_codes: u64,
    /// 扫码器通讯失败
    pub scan_errors: u64,
    /// 序列号生成失败
    pub serial_failures: u64,
    /// 写库失败
    pub persistence_failures: u64,
    /// 打印失败
    pub print_failures: u64,
    pub last_serial: Option<i64>,
    pub last_container_code: Option<String>,
    pub last_error: Option<String>,
    /// 最近提交的单品码，最新的在前
    pub recent_codes: Vec<String>,
}

impl ScanStatistics {
    /// 被拒绝的层总数
    pub fn rejected_layers(&self) -> u64 {
        self.rejected_wrong_count
            + self.rejected_duplicate_in_layer
            + self.rejected_invalid_code
            + self.rejected_already_used
    }

    pub(crate) fn push_recent_codes(&mut self, codes: &[String]) {
        for code in codes {
            self.recent_codes.insert(0, code.clone());
        }
        self.recent_codes.truncate(RECENT_CODES_LIMIT);
    }
}
