//! # 箱序列号生成器
//!
//! 每个任务的序列号从 1 开始单调递增。新值先持久化再交给调用方，
//! 因此进程重启后总是从已发放的最大值之后继续。
//! 箱码提交失败时序列号视为已消耗（允许空号，不允许重号）。

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::services::traits::SerialStore;
use crate::utils::error::{AppError, AppResult};

/// 箱码格式：GTIN + 补零批号 + 补零序列号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerCodeFormat {
    pub batch_width: usize,
    pub serial_width: usize,
}

impl Default for ContainerCodeFormat {
    fn default() -> Self {
        Self { batch_width: 4, serial_width: 6 }
    }
}

/// 生成箱码
///
/// 批号和序列号左侧补零到固定宽度，超出宽度时原样保留
pub fn compose_container_code(gtin: &str, batch_number: &str, serial: i64, format: ContainerCodeFormat) -> String {
    format!(
        "{}{:0>batch_width$}{:0serial_width$}",
        gtin,
        batch_number,
        serial,
        batch_width = format.batch_width,
        serial_width = format.serial_width,
    )
}

#[derive(Debug, Clone)]
struct SerialState {
    task_id: i64,
    gtin: String,
    date: String,
    batch_number: String,
    last_serial: i64,
}

/// 序列号生成器
pub struct SerialGenerator {
    store: Arc<dyn SerialStore>,
    format: ContainerCodeFormat,
    state: Mutex<Option<SerialState>>,
}

impl SerialGenerator {
    pub fn new(store: Arc<dyn SerialStore>, format: ContainerCodeFormat) -> Self {
        Self {
            store,
            format,
            state: Mutex::new(None),
        }
    }

    /// 从持久化状态恢复任务最后发放的序列号
    pub async fn initialize(&self, task_id: i64, gtin: &str, date: &str, batch_number: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let last_serial = self.store.load_last_serial(task_id).await.map_err(|e| {
            AppError::persistence_error(format!("恢复任务 {} 的序列号失败: {}", task_id, e))
        })?;

        if last_serial < 0 {
            return Err(AppError::validation_error(format!(
                "任务 {} 的序列号记录无效: {}",
                task_id, last_serial
            )));
        }

        info!(
            "[SERIAL] 任务 {} 序列号已恢复 (策略: {}), 最后序列号: {}, 日期: {}",
            task_id,
            self.store.strategy_name(),
            last_serial,
            date
        );

        *state = Some(SerialState {
            task_id,
            gtin: gtin.to_string(),
            date: date.to_string(),
            batch_number: batch_number.to_string(),
            last_serial,
        });
        Ok(())
    }

    /// 生成下一个序列号
    ///
    /// 锁在持久化完成前不释放；持久化失败时计数器不前进
    pub async fn generate_serial(&self) -> AppResult<i64> {
        let mut guard = self.state.lock().await;
        let state = guard
            .as_mut()
            .ok_or_else(|| AppError::not_initialized("SerialGenerator"))?;

        let next = state
            .last_serial
            .checked_add(1)
            .ok_or_else(|| AppError::validation_error("序列号溢出"))?;

        if let Err(e) = self.store.persist_serial(state.task_id, next).await {
            warn!("[SERIAL] 任务 {} 序列号 {} 持久化失败: {}", state.task_id, next, e);
            return Err(e);
        }

        state.last_serial = next;
        debug!("[SERIAL] 任务 {} 发放序列号 {}", state.task_id, next);
        Ok(next)
    }

    /// 当前任务的箱码
    pub async fn container_code(&self, serial: i64) -> AppResult<String> {
        let guard = self.state.lock().await;
        let state = guard
            .as_ref()
            .ok_or_else(|| AppError::not_initialized("SerialGenerator"))?;
        Ok(compose_container_code(&state.gtin, &state.batch_number, serial, self.format))
    }

    pub async fn last_serial(&self) -> Option<i64> {
        self.state.lock().await.as_ref().map(|s| s.last_serial)
    }

    pub async fn production_date(&self) -> Option<String> {
        self.state.lock().await.as_ref().map(|s| s.date.clone())
    }

    pub async fn reset(&self) {
        *self.state.lock().await = None;
    }
}
