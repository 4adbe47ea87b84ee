/// 服务层模块
/// 包含所有业务逻辑和基础设施服务

/// 服务接口定义
pub mod traits;

/// 基础设施层服务 (外部系统交互)
pub mod infrastructure;

/// 领域服务层 (核心业务逻辑)
pub mod domain;

/// 应用层服务 (业务流程协调)
pub mod application;

// 重新导出常用类型
pub use traits::{AggregationStore, CodeReader, DataService, LabelPrinter, Plc, PrinterTransport, SerialStore, TaskProcessor};
pub use domain::{
    CodeValidator, LayerRejection, SerialGenerator, UniquenessValidator,
    SensorEdgeTrigger, TimerTrigger, TriggerSource,
};
pub use application::{build_processor, LayerAggregationProcessor, ProcessorDevices, ProcessorSettings};
