/// 数据持久化相关模块

pub mod sqlite_orm_aggregation_store;
pub mod memory_aggregation_store;
pub mod file_serial_store;


pub use sqlite_orm_aggregation_store::SqliteOrmAggregationStore;
pub use memory_aggregation_store::MemoryAggregationStore;
pub use file_serial_store::FileSerialStore;
