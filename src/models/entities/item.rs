// 文件: src/models/entities/item.rs
// SeaORM 实体定义：单品码表 `items`

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::models::structs::Item;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub code: String,

    pub task_id: i64,

    /// 装箱后写入
    #[sea_orm(nullable)]
    pub container_id: Option<i64>,

    /// scanned / aggregated
    pub status: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Item {
    fn from(model: Model) -> Self {
        Item {
            id: model.id,
            code: model.code,
            task_id: model.task_id,
            container_id: model.container_id,
            status: model.status,
            created_at: model.created_at,
        }
    }
}
