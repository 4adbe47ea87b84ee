/// 按配置装配任务处理器
///
/// 设备、存储、触发源的具体实现都在这里选定，处理器本身只依赖trait

use std::sync::Arc;
use std::time::Duration;

use log::info;

use super::layer_aggregation_processor::{LayerAggregationProcessor, ProcessorDevices, ProcessorSettings};
use crate::services::domain::trigger::{SensorEdgeTrigger, TimerTrigger, TriggerSource};
use crate::services::infrastructure::{
    CatalogDataService, FileSerialStore, LabelService, MemoryAggregationStore, ModbusPlc, ModbusPlcConfig,
    SqliteOrmAggregationStore, TcpPrinter, TcpScanner, TcpScannerConfig,
};
use crate::services::traits::{AggregationStore, DataService, LabelPrinter, Plc, SerialStore};
use crate::utils::config::{validate_app_config, AppConfig};
use crate::utils::error::{AppError, AppResult};

/// 存储层：聚合数据存储与其自带的序列号存储
async fn build_stores(config: &AppConfig) -> AppResult<(Arc<dyn AggregationStore>, Arc<dyn SerialStore>)> {
    let (store, database_serial): (Arc<dyn AggregationStore>, Arc<dyn SerialStore>) =
        match config.persistence_config.persistence_type.as_str() {
            "memory" => {
                info!("[FACTORY] 使用内存存储，数据不会保留");
                let memory = Arc::new(MemoryAggregationStore::new());
                let store: Arc<dyn AggregationStore> = memory.clone();
                let serial: Arc<dyn SerialStore> = memory;
                (store, serial)
            }
            "sqlite" => {
                let sqlite = Arc::new(SqliteOrmAggregationStore::new(&config.persistence_config.db_path).await?);
                let store: Arc<dyn AggregationStore> = sqlite.clone();
                let serial: Arc<dyn SerialStore> = sqlite;
                (store, serial)
            }
            other => {
                return Err(AppError::configuration_error(format!("不支持的持久化类型: {}", other)));
            }
        };

    let serial_store: Arc<dyn SerialStore> = match config.line_config.serial_strategy.as_str() {
        "file" => Arc::new(FileSerialStore::new(config.line_config.serial_counter_dir.clone())),
        "database" => database_serial,
        other => {
            return Err(AppError::configuration_error(format!("不支持的序列号持久化方式: {}", other)));
        }
    };

    info!(
        "[FACTORY] 持久化类型: {}, 序列号策略: {}",
        config.persistence_config.persistence_type,
        serial_store.strategy_name()
    );
    Ok((store, serial_store))
}

/// 创建处理器，不连接任何设备
pub async fn build_processor(config: &AppConfig) -> AppResult<LayerAggregationProcessor> {
    validate_app_config(config)?;

    let data_service: Arc<dyn DataService> =
        Arc::new(CatalogDataService::from_file(config.persistence_config.catalog_path.clone()));

    let scanner = Arc::new(TcpScanner::new(TcpScannerConfig::from(&config.scanner_config)));

    let plc: Option<Arc<dyn Plc>> = if config.plc_config.enabled {
        Some(Arc::new(ModbusPlc::new(ModbusPlcConfig::from(&config.plc_config))))
    } else {
        None
    };

    let label_printer: Option<Arc<dyn LabelPrinter>> = if config.printer_config.enabled {
        let printer_config = &config.printer_config;
        let transport = Arc::new(TcpPrinter::new(
            printer_config.address.clone(),
            Duration::from_millis(printer_config.connect_timeout_ms),
        ));
        Some(Arc::new(LabelService::new(
            transport,
            printer_config.template_dir.clone(),
            printer_config.template_name.clone(),
            printer_config.packer.clone(),
        )))
    } else {
        None
    };

    let trigger: Arc<dyn TriggerSource> = match config.line_config.trigger_mode.as_str() {
        "sensor" => {
            let plc = plc
                .clone()
                .ok_or_else(|| AppError::configuration_error("传感器触发模式需要启用PLC"))?;
            Arc::new(SensorEdgeTrigger::new(plc))
        }
        _ => Arc::new(TimerTrigger::new(Duration::from_millis(config.line_config.timer_interval_ms))),
    };

    let (store, serial_store) = build_stores(config).await?;

    info!(
        "🔧 [FACTORY] 处理器已装配 - 扫码器: {}, PLC: {}, 打印机: {}, 触发源: {}",
        config.scanner_config.address,
        if plc.is_some() { "启用" } else { "禁用" },
        if label_printer.is_some() { "启用" } else { "禁用" },
        trigger.source_name()
    );

    Ok(LayerAggregationProcessor::new(
        ProcessorSettings::from(config),
        data_service,
        ProcessorDevices { scanner, plc, label_printer },
        trigger,
        store,
        serial_store,
    ))
}
