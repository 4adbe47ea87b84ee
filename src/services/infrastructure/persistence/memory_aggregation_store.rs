//! 内存聚合数据存储
//!
//! 用于演示与测试，进程退出后数据丢失

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::enums::{ContainerStatus, ItemStatus};
use crate::models::structs::{Container, Item};
use crate::services::traits::{AggregationStore, SerialStore};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Default)]
struct MemoryState {
    containers: Vec<Container>,
    items: Vec<Item>,
    counters: HashMap<i64, i64>,
    next_container_id: i64,
    next_item_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryAggregationStore {
    state: Mutex<MemoryState>,
}

impl MemoryAggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> AppResult<T>) -> AppResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AppError::concurrency_error("内存存储锁已损坏"))?;
        f(&mut state)
    }
}

#[async_trait]
impl AggregationStore for MemoryAggregationStore {
    async fn create_container(&self, code: &str, serial_number: i64, task_id: i64, status: ContainerStatus) -> AppResult<i64> {
        self.with_state(|state| {
            state.next_container_id += 1;
            let id = state.next_container_id;
            state.containers.push(Container {
                id,
                code: code.to_string(),
                serial_number,
                task_id,
                status: status.as_str().to_string(),
                created_at: Utc::now(),
            });
            Ok(id)
        })
    }

    async fn create_item(&self, code: &str, task_id: i64, status: ItemStatus) -> AppResult<i64> {
        self.with_state(|state| {
            state.next_item_id += 1;
            let id = state.next_item_id;
            state.items.push(Item {
                id,
                code: code.to_string(),
                task_id,
                container_id: None,
                status: status.as_str().to_string(),
                created_at: Utc::now(),
            });
            Ok(id)
        })
    }

    async fn assign_item_to_container(&self, item_id: i64, container_id: i64) -> AppResult<()> {
        self.with_state(|state| {
            let item = state
                .items
                .iter_mut()
                .find(|item| item.id == item_id)
                .ok_or_else(|| AppError::not_found_error("Item", format!("单品码 {} 不存在", item_id)))?;
            item.container_id = Some(container_id);
            item.status = ItemStatus::Aggregated.as_str().to_string();
            Ok(())
        })
    }

    async fn commit_layer(&self, container_code: &str, serial_number: i64, task_id: i64, codes: &[String]) -> AppResult<i64> {
        self.with_state(|state| {
            // 先检查再写入，失败时状态不变
            if let Some(existing) = state
                .items
                .iter()
                .find(|i| i.task_id == task_id && codes.contains(&i.code))
            {
                return Err(AppError::persistence_error(format!(
                    "单品码 {} 已在任务 {} 中落库，整层未提交",
                    existing.code, task_id
                )));
            }

            let now = Utc::now();
            state.next_container_id += 1;
            let container_id = state.next_container_id;
            state.containers.push(Container {
                id: container_id,
                code: container_code.to_string(),
                serial_number,
                task_id,
                status: ContainerStatus::Created.as_str().to_string(),
                created_at: now,
            });
            for code in codes {
                state.next_item_id += 1;
                let id = state.next_item_id;
                state.items.push(Item {
                    id,
                    code: code.clone(),
                    task_id,
                    container_id: Some(container_id),
                    status: ItemStatus::Aggregated.as_str().to_string(),
                    created_at: now,
                });
            }
            Ok(container_id)
        })
    }

    async fn get_items_by_task_id(&self, task_id: i64) -> AppResult<Vec<Item>> {
        self.with_state(|state| Ok(state.items.iter().filter(|i| i.task_id == task_id).cloned().collect()))
    }

    async fn get_last_serial_number(&self, task_id: i64) -> AppResult<i64> {
        self.with_state(|state| {
            Ok(state
                .containers
                .iter()
                .filter(|c| c.task_id == task_id)
                .map(|c| c.serial_number)
                .max()
                .unwrap_or(0))
        })
    }

    async fn get_containers_by_task_id(&self, task_id: i64) -> AppResult<Vec<Container>> {
        self.with_state(|state| {
            let mut containers: Vec<Container> =
                state.containers.iter().filter(|c| c.task_id == task_id).cloned().collect();
            containers.sort_by_key(|c| c.serial_number);
            Ok(containers)
        })
    }

    async fn get_items_by_container_id(&self, container_id: i64) -> AppResult<Vec<Item>> {
        self.with_state(|state| {
            Ok(state
                .items
                .iter()
                .filter(|i| i.container_id == Some(container_id))
                .cloned()
                .collect())
        })
    }
}

#[async_trait]
impl SerialStore for MemoryAggregationStore {
    fn strategy_name(&self) -> &'static str {
        "memory"
    }

    async fn load_last_serial(&self, task_id: i64) -> AppResult<i64> {
        let from_containers = self.get_last_serial_number(task_id).await?;
        self.with_state(|state| Ok(state.counters.get(&task_id).copied().unwrap_or(0).max(from_containers)))
    }

    async fn persist_serial(&self, task_id: i64, serial: i64) -> AppResult<()> {
        self.with_state(|state| {
            state.counters.insert(task_id, serial);
            Ok(())
        })
    }
}
