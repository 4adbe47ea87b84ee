// 文件: src/services/infrastructure/persistence/sqlite_orm_aggregation_store.rs
// 使用SeaORM和SQLite实现聚合数据存储与序列号计数器

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Schema, Set, NotSet, TransactionTrait,
};

use crate::models::entities::{container, item, serial_counter};
use crate::models::enums::{ContainerStatus, ItemStatus};
use crate::models::structs::{Container, Item};
use crate::services::traits::{AggregationStore, SerialStore};
use crate::utils::error::{AppError, AppResult};

// 数据库URL前缀，mode=rwc 在文件不存在时创建
const SQLITE_URL_PREFIX: &str = "sqlite://";
const SQLITE_URL_SUFFIX: &str = "?mode=rwc";

/// 基于SeaORM和SQLite的聚合数据存储
pub struct SqliteOrmAggregationStore {
    db_conn: Arc<DatabaseConnection>,
    db_file_path: PathBuf,
}

impl SqliteOrmAggregationStore {
    /// 打开（必要时创建）数据库文件并初始化表结构
    pub async fn new(db_path: &Path) -> AppResult<Self> {
        if let Some(parent_dir) = db_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                tokio::fs::create_dir_all(parent_dir).await.map_err(|e| {
                    AppError::io_error(format!("创建数据库目录失败: {:?}", parent_dir), e.kind().to_string())
                })?;
            }
        }

        let db_url = format!("{}{}{}", SQLITE_URL_PREFIX, db_path.to_string_lossy(), SQLITE_URL_SUFFIX);
        let conn = Database::connect(&db_url)
            .await
            .map_err(|db_err| AppError::persistence_error(format!("连接数据库失败: {}", db_err)))?;

        Self::setup_schema(&conn).await?;

        Ok(Self {
            db_conn: Arc::new(conn),
            db_file_path: db_path.to_path_buf(),
        })
    }

    /// 初始化数据库表结构
    async fn setup_schema(db: &DatabaseConnection) -> AppResult<()> {
        let backend = db.get_database_backend();
        let schema = Schema::new(backend);

        let stmt_containers = schema.create_table_from_entity(container::Entity).if_not_exists().to_owned();
        db.execute(backend.build(&stmt_containers))
            .await
            .map_err(|e| AppError::persistence_error(format!("创建 containers 表失败: {}", e)))?;

        let stmt_items = schema.create_table_from_entity(item::Entity).if_not_exists().to_owned();
        db.execute(backend.build(&stmt_items))
            .await
            .map_err(|e| AppError::persistence_error(format!("创建 items 表失败: {}", e)))?;

        let stmt_serial_counters = schema.create_table_from_entity(serial_counter::Entity).if_not_exists().to_owned();
        db.execute(backend.build(&stmt_serial_counters))
            .await
            .map_err(|e| AppError::persistence_error(format!("创建 serial_counters 表失败: {}", e)))?;

        log::info!("[SQLITE_STORE] 数据库表结构设置完成或已存在");
        Ok(())
    }

    pub fn db_file_path(&self) -> &Path {
        &self.db_file_path
    }

    pub async fn health_check(&self) -> AppResult<()> {
        self.db_conn
            .ping()
            .await
            .map_err(|db_err| AppError::persistence_error(format!("数据库健康检查失败: {}", db_err)))
    }
}

#[async_trait]
impl AggregationStore for SqliteOrmAggregationStore {
    async fn create_container(&self, code: &str, serial_number: i64, task_id: i64, status: ContainerStatus) -> AppResult<i64> {
        let model = container::ActiveModel {
            id: NotSet,
            code: Set(code.to_string()),
            serial_number: Set(serial_number),
            task_id: Set(task_id),
            status: Set(status.as_str().to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(self.db_conn.as_ref())
        .await
        .map_err(|e| AppError::persistence_error(format!("创建箱码 {} 失败: {}", code, e)))?;
        Ok(model.id)
    }

    async fn create_item(&self, code: &str, task_id: i64, status: ItemStatus) -> AppResult<i64> {
        let model = item::ActiveModel {
            id: NotSet,
            code: Set(code.to_string()),
            task_id: Set(task_id),
            container_id: Set(None),
            status: Set(status.as_str().to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(self.db_conn.as_ref())
        .await
        .map_err(|e| AppError::persistence_error(format!("创建单品码 {} 失败: {}", code, e)))?;
        Ok(model.id)
    }

    async fn assign_item_to_container(&self, item_id: i64, container_id: i64) -> AppResult<()> {
        let existing = item::Entity::find_by_id(item_id)
            .one(self.db_conn.as_ref())
            .await
            .map_err(|e| AppError::persistence_error(format!("查询单品码 {} 失败: {}", item_id, e)))?
            .ok_or_else(|| AppError::not_found_error("Item", format!("单品码 {} 不存在", item_id)))?;

        let mut active: item::ActiveModel = existing.into();
        active.container_id = Set(Some(container_id));
        active.status = Set(ItemStatus::Aggregated.as_str().to_string());
        active
            .update(self.db_conn.as_ref())
            .await
            .map_err(|e| AppError::persistence_error(format!("单品码 {} 装箱失败: {}", item_id, e)))?;
        Ok(())
    }

    async fn commit_layer(&self, container_code: &str, serial_number: i64, task_id: i64, codes: &[String]) -> AppResult<i64> {
        let txn = self
            .db_conn
            .begin()
            .await
            .map_err(|e| AppError::persistence_error(format!("开启事务失败: {}", e)))?;

        // 数据库层面的最后一道唯一性检查
        let already_used = item::Entity::find()
            .filter(item::Column::TaskId.eq(task_id))
            .filter(item::Column::Code.is_in(codes.iter().cloned()))
            .one(&txn)
            .await
            .map_err(|e| AppError::persistence_error(format!("查询任务 {} 的单品码失败: {}", task_id, e)))?;
        if let Some(existing) = already_used {
            return Err(AppError::persistence_error(format!(
                "单品码 {} 已在任务 {} 中落库，整层未提交",
                existing.code, task_id
            )));
        }

        let now = Utc::now();
        let container_model = container::ActiveModel {
            id: NotSet,
            code: Set(container_code.to_string()),
            serial_number: Set(serial_number),
            task_id: Set(task_id),
            status: Set(ContainerStatus::Created.as_str().to_string()),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::persistence_error(format!("创建箱码 {} 失败: {}", container_code, e)))?;

        for code in codes {
            item::ActiveModel {
                id: NotSet,
                code: Set(code.clone()),
                task_id: Set(task_id),
                container_id: Set(Some(container_model.id)),
                status: Set(ItemStatus::Aggregated.as_str().to_string()),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| AppError::persistence_error(format!("创建单品码 {} 失败: {}", code, e)))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::persistence_error(format!("提交箱 {} 失败: {}", container_code, e)))?;
        Ok(container_model.id)
    }

    async fn get_items_by_task_id(&self, task_id: i64) -> AppResult<Vec<Item>> {
        let models = item::Entity::find()
            .filter(item::Column::TaskId.eq(task_id))
            .order_by_asc(item::Column::Id)
            .all(self.db_conn.as_ref())
            .await
            .map_err(|e| AppError::persistence_error(format!("查询任务 {} 的单品码失败: {}", task_id, e)))?;
        Ok(models.into_iter().map(Item::from).collect())
    }

    async fn get_last_serial_number(&self, task_id: i64) -> AppResult<i64> {
        let last = container::Entity::find()
            .filter(container::Column::TaskId.eq(task_id))
            .order_by_desc(container::Column::SerialNumber)
            .one(self.db_conn.as_ref())
            .await
            .map_err(|e| AppError::persistence_error(format!("查询任务 {} 的最大序列号失败: {}", task_id, e)))?;
        Ok(last.map(|c| c.serial_number).unwrap_or(0))
    }

    async fn get_containers_by_task_id(&self, task_id: i64) -> AppResult<Vec<Container>> {
        let models = container::Entity::find()
            .filter(container::Column::TaskId.eq(task_id))
            .order_by_asc(container::Column::SerialNumber)
            .all(self.db_conn.as_ref())
            .await
            .map_err(|e| AppError::persistence_error(format!("查询任务 {} 的箱码失败: {}", task_id, e)))?;
        Ok(models.into_iter().map(Container::from).collect())
    }

    async fn get_items_by_container_id(&self, container_id: i64) -> AppResult<Vec<Item>> {
        let models = item::Entity::find()
            .filter(item::Column::ContainerId.eq(container_id))
            .order_by_asc(item::Column::Id)
            .all(self.db_conn.as_ref())
            .await
            .map_err(|e| AppError::persistence_error(format!("查询箱 {} 的单品码失败: {}", container_id, e)))?;
        Ok(models.into_iter().map(Item::from).collect())
    }
}

#[async_trait]
impl SerialStore for SqliteOrmAggregationStore {
    fn strategy_name(&self) -> &'static str {
        "database"
    }

    /// 取计数器记录与已有箱码最大序列号中的较大者
    async fn load_last_serial(&self, task_id: i64) -> AppResult<i64> {
        let counter = serial_counter::Entity::find_by_id(task_id)
            .one(self.db_conn.as_ref())
            .await
            .map_err(|e| AppError::persistence_error(format!("查询任务 {} 的序列号计数器失败: {}", task_id, e)))?
            .map(|c| c.last_serial)
            .unwrap_or(0);
        let from_containers = self.get_last_serial_number(task_id).await?;
        Ok(counter.max(from_containers))
    }

    async fn persist_serial(&self, task_id: i64, serial: i64) -> AppResult<()> {
        let existing = serial_counter::Entity::find_by_id(task_id)
            .one(self.db_conn.as_ref())
            .await
            .map_err(|e| AppError::persistence_error(format!("查询任务 {} 的序列号计数器失败: {}", task_id, e)))?;

        let result = match existing {
            Some(model) => {
                let mut active: serial_counter::ActiveModel = model.into();
                active.last_serial = Set(serial);
                active.updated_at = Set(Utc::now());
                active.update(self.db_conn.as_ref()).await.map(|_| ())
            }
            None => serial_counter::ActiveModel {
                task_id: Set(task_id),
                last_serial: Set(serial),
                updated_at: Set(Utc::now()),
            }
            .insert(self.db_conn.as_ref())
            .await
            .map(|_| ()),
        };

        result.map_err(|e| AppError::persistence_error(format!("保存任务 {} 的序列号 {} 失败: {}", task_id, serial, e)))
    }
}
