//! 数据模型模块
//!
//! 包含任务/产品快照、箱码与单品码记录、标签数据以及数据库实体

pub mod enums;
pub mod structs;
pub mod label;
pub mod entities;

pub use enums::*;
pub use structs::*;
pub use label::{LabelData, LabelTemplateData, LabelTemplateDataBuilder};
