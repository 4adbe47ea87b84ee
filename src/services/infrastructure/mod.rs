/// 基础设施层
/// 与外部设备、数据库、文件交互的具体实现

pub mod scanner;
pub mod plc;
pub mod printer;
pub mod persistence;
pub mod data;

pub use scanner::{MockCodeReader, TcpScanner, TcpScannerConfig};
pub use plc::{MockPlc, ModbusPlc, ModbusPlcConfig};
pub use printer::{LabelService, MockLabelPrinter, MockPrinter, TcpPrinter};
pub use persistence::{FileSerialStore, MemoryAggregationStore, SqliteOrmAggregationStore};
pub use data::{Catalog, CatalogDataService};
