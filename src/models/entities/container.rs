// 文件: src/models/entities/container.rs
// SeaORM 实体定义：箱码表 `containers`
// 每次成功提交一层即创建一条记录，创建后不再修改

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::models::structs::Container;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "containers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 箱码，GTIN + 批号 + 序列号
    pub code: String,

    /// 任务内单调递增的序列号
    pub serial_number: i64,

    pub task_id: i64,

    pub status: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Container {
    fn from(model: Model) -> Self {
        Container {
            id: model.id,
            code: model.code,
            serial_number: model.serial_number,
            task_id: model.task_id,
            status: model.status,
            created_at: model.created_at,
        }
    }
}
