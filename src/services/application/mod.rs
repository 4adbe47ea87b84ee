/// 应用层服务模块
///
/// 应用层负责协调领域服务和基础设施服务，实现完整的扫码聚合流程

/// 层聚合任务处理器 - 扫码 → 校验 → 序列号 → 落库 → 打印
pub mod layer_aggregation_processor;

/// 处理器装配
pub mod processor_factory;

#[cfg(test)]
mod tests;

// 重新导出常用类型
pub use layer_aggregation_processor::{
    CommittedLayer, CycleOutcome, LayerAggregationProcessor, ProcessorDevices, ProcessorSettings,
};
pub use processor_factory::build_processor;
