// 文件: src/models/entities/mod.rs
// 聚合数据的 SeaORM 实体

pub mod container;
pub mod item;
pub mod serial_counter;
