//! 任务内标识码唯一性校验
//!
//! 启动时从已落库的单品码预加载；只有在单品码写库成功后才标记为已使用

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::RwLock;

use crate::services::traits::AggregationStore;
use crate::utils::error::AppResult;

#[derive(Debug, Default)]
struct UsedCodes {
    task_id: Option<i64>,
    codes: HashSet<String>,
}

/// 唯一性校验器
pub struct UniquenessValidator {
    store: Arc<dyn AggregationStore>,
    state: RwLock<UsedCodes>,
}

impl UniquenessValidator {
    pub fn new(store: Arc<dyn AggregationStore>) -> Self {
        Self {
            store,
            state: RwLock::new(UsedCodes::default()),
        }
    }

    /// 加载任务已使用的全部码
    ///
    /// 加载失败时保持未初始化状态并返回错误
    pub async fn initialize(&self, task_id: i64) -> AppResult<()> {
        let items = self.store.get_items_by_task_id(task_id).await?;
        let codes: HashSet<String> = items.into_iter().map(|item| item.code).collect();

        info!("[UNIQUENESS] 任务 {} 预加载已使用码 {} 个", task_id, codes.len());

        let mut state = self.state.write().await;
        state.task_id = Some(task_id);
        state.codes = codes;
        Ok(())
    }

    /// 检查一组码是否都未使用过，不修改内部状态
    ///
    /// 未初始化时所有码都视为重复
    pub async fn is_codes_unique(&self, codes: &[String]) -> (bool, Vec<String>) {
        let state = self.state.read().await;
        if state.task_id.is_none() {
            return (false, codes.to_vec());
        }

        let duplicates: Vec<String> = codes
            .iter()
            .filter(|code| state.codes.contains(code.as_str()))
            .cloned()
            .collect();
        (duplicates.is_empty(), duplicates)
    }

    /// 标记码为已使用
    pub async fn mark_codes_as_used(&self, codes: &[String]) {
        let mut state = self.state.write().await;
        if state.task_id.is_none() {
            debug!("[UNIQUENESS] 未初始化，忽略 {} 个码", codes.len());
            return;
        }
        state.codes.extend(codes.iter().cloned());
        debug!("[UNIQUENESS] 已使用码总数: {}", state.codes.len());
    }

    pub async fn used_count(&self) -> usize {
        self.state.read().await.codes.len()
    }

    /// 清空状态，回到未初始化
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.task_id = None;
        state.codes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::structs::Item;
    use crate::services::traits::MockAggregationStore;
    use crate::utils::error::AppError;
    use chrono::Utc;

    fn item(code: &str) -> Item {
        Item {
            id: 1,
            code: code.to_string(),
            task_id: 7,
            container_id: Some(1),
            status: "aggregated".to_string(),
            created_at: Utc::now(),
        }
    }

    fn codes(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_uninitialized_reports_everything_as_duplicate() {
        let store = MockAggregationStore::new();
        let validator = UniquenessValidator::new(Arc::new(store));
        let (unique, duplicates) = validator.is_codes_unique(&codes(&["A", "B"])).await;
        assert!(!unique);
        assert_eq!(duplicates, codes(&["A", "B"]));
    }

    #[tokio::test]
    async fn test_mark_before_initialize_is_ignored() {
        let validator = UniquenessValidator::new(Arc::new(MockAggregationStore::new()));
        validator.mark_codes_as_used(&codes(&["A", "B"])).await;
        assert_eq!(validator.used_count().await, 0);

        validator.reset().await;
        validator.mark_codes_as_used(&codes(&["C"])).await;
        assert_eq!(validator.used_count().await, 0);
    }

    #[tokio::test]
    async fn test_preload_and_mark() {
        let mut store = MockAggregationStore::new();
        store
            .expect_get_items_by_task_id()
            .withf(|task_id| *task_id == 7)
            .times(1)
            .returning(|_| Ok(vec![item("A"), item("B")]));

        let validator = UniquenessValidator::new(Arc::new(store));
        validator.initialize(7).await.unwrap();

        let (unique, duplicates) = validator.is_codes_unique(&codes(&["B", "C"])).await;
        assert!(!unique);
        assert_eq!(duplicates, codes(&["B"]));

        // 检查不修改状态
        let (unique, _) = validator.is_codes_unique(&codes(&["C", "D"])).await;
        assert!(unique);
        assert_eq!(validator.used_count().await, 2);

        validator.mark_codes_as_used(&codes(&["C", "D"])).await;
        let (unique, duplicates) = validator.is_codes_unique(&codes(&["D", "E"])).await;
        assert!(!unique);
        assert_eq!(duplicates, codes(&["D"]));
    }

    #[tokio::test]
    async fn test_preload_failure_is_reported() {
        let mut store = MockAggregationStore::new();
        store
            .expect_get_items_by_task_id()
            .returning(|_| Err(AppError::persistence_error("数据库已锁定")));

        let validator = UniquenessValidator::new(Arc::new(store));
        let err = validator.initialize(7).await.unwrap_err();
        assert_eq!(err.error_code(), "PERSISTENCE_ERROR");

        let (unique, _) = validator.is_codes_unique(&codes(&["A"])).await;
        assert!(!unique);
    }
}
