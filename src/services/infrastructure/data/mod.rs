/// 任务/产品数据来源

pub mod catalog_data_service;

pub use catalog_data_service::{Catalog, CatalogDataService};
