//! 任务/产品目录数据服务
//!
//! 目录为 JSON 文件 `{ "tasks": [...], "products": [...] }`。
//! 文件模式下每次查询都重新读取文件，外部系统更新目录后无需重启。

use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::structs::{Product, Task};
use crate::services::traits::DataService;
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub products: Vec<Product>,
}

enum CatalogSource {
    File(PathBuf),
    Memory(Catalog),
}

pub struct CatalogDataService {
    source: CatalogSource,
}

impl CatalogDataService {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self { source: CatalogSource::File(path.into()) }
    }

    pub fn in_memory(catalog: Catalog) -> Self {
        Self { source: CatalogSource::Memory(catalog) }
    }

    async fn load(&self) -> AppResult<Catalog> {
        match &self.source {
            CatalogSource::Memory(catalog) => Ok(catalog.clone()),
            CatalogSource::File(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    AppError::io_error(format!("读取目录文件 {} 失败: {}", path.display(), e), format!("{:?}", e.kind()))
                })?;
                debug!("[CATALOG] 已读取目录文件 {}", path.display());
                serde_json::from_str(&content)
                    .map_err(|e| AppError::json_error(format!("解析目录文件 {} 失败: {}", path.display(), e)))
            }
        }
    }
}

#[async_trait]
impl DataService for CatalogDataService {
    async fn get_task_by_id(&self, task_id: i64) -> AppResult<Task> {
        self.load()
            .await?
            .tasks
            .into_iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| AppError::not_found_error("Task", format!("任务 {} 不存在", task_id)))
    }

    async fn get_product_by_id(&self, product_id: i64) -> AppResult<Product> {
        self.load()
            .await?
            .products
            .into_iter()
            .find(|p| p.id == product_id)
            .ok_or_else(|| AppError::not_found_error("Product", format!("产品 {} 不存在", product_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CATALOG: &str = r#"{
        "tasks": [
            {"id": 1, "product_id": 10, "date": "01.02.2024", "batch_number": "5", "status": "in_progress"}
        ],
        "products": [
            {"id": 10, "name": "Молоко", "gtin": "04600000000017", "label_data": "{\"box_quantity\":\"6\"}"}
        ]
    }"#;

    #[tokio::test]
    async fn test_file_catalog_lookup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, CATALOG).await.unwrap();

        let service = CatalogDataService::from_file(&path);
        let task = service.get_task_by_id(1).await.unwrap();
        assert_eq!(task.batch_number, "5");
        assert_eq!(task.status.as_str(), "in_progress");

        let product = service.get_product_by_id(task.product_id).await.unwrap();
        assert_eq!(product.gtin, "04600000000017");

        let err = service.get_task_by_id(2).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND_ERROR");
    }

    #[tokio::test]
    async fn test_file_catalog_is_reread() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, r#"{"tasks": [], "products": []}"#).await.unwrap();

        let service = CatalogDataService::from_file(&path);
        assert!(service.get_task_by_id(1).await.is_err());

        tokio::fs::write(&path, CATALOG).await.unwrap();
        assert!(service.get_task_by_id(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_and_broken_catalog() {
        let dir = tempdir().unwrap();
        let service = CatalogDataService::from_file(dir.path().join("absent.json"));
        assert_eq!(service.get_task_by_id(1).await.unwrap_err().error_code(), "IO_ERROR");

        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{").await.unwrap();
        let service = CatalogDataService::from_file(&path);
        assert_eq!(service.get_product_by_id(1).await.unwrap_err().error_code(), "JSON_ERROR");
    }
}
