use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::utils::error::{AppError, AppResult};

/// 应用程序主配置结构
/// 包含一条产线运行所需的所有配置信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 应用程序基本设置
    #[serde(default)]
    pub app_settings: AppSettings,
    /// 扫码器（相机）配置
    #[serde(default)]
    pub scanner_config: ScannerConfig,
    /// PLC连接配置
    #[serde(default)]
    pub plc_config: PlcConfig,
    /// 标签打印机配置
    #[serde(default)]
    pub printer_config: PrinterConfig,
    /// 产线工艺配置（校验、触发、序列号）
    #[serde(default)]
    pub line_config: LineConfig,
    /// 日志配置
    #[serde(default)]
    pub logging_config: LoggingConfig,
    /// 数据存储配置
    #[serde(default)]
    pub persistence_config: PersistenceConfig,
}

/// 应用程序基本设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// 应用程序名称
    pub app_name: String,
    /// 运行环境 (development, testing, production)
    pub environment: String,
    /// 产线ID
    pub line_id: i64,
}

/// 扫码器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// 扫码器地址（host:port）
    pub address: String,
    /// 触发一次扫码的命令
    pub scan_command: String,
    /// 未读到码时扫码器的应答
    pub no_read_answer: String,
    /// 连接超时时间（毫秒）
    pub connect_timeout_ms: u64,
    /// 读取超时时间（毫秒）
    pub read_timeout_ms: u64,
    /// 写入超时时间（毫秒）
    pub write_timeout_ms: u64,
}

/// PLC连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcConfig {
    /// 是否启用PLC（传感器触发模式必须启用）
    pub enabled: bool,
    /// PLC IP地址
    pub host: String,
    /// PLC端口
    pub port: u16,
    /// Modbus从站ID
    pub slave_id: u8,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 产品到位传感器线圈地址（0基）
    pub product_sensor_coil: u16,
    /// 剔除器线圈地址（0基）
    pub rejector_coil: u16,
    /// 传感器轮询间隔（毫秒）
    pub sensor_scan_interval_ms: u64,
    /// 传感器信号缓冲区容量
    pub signal_buffer_size: usize,
}

/// 标签打印机配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// 是否启用打印
    pub enabled: bool,
    /// 打印机地址（host:port）
    pub address: String,
    /// 连接超时时间（毫秒）
    pub connect_timeout_ms: u64,
    /// 标签模板目录
    pub template_dir: PathBuf,
    /// 模板文件名
    pub template_name: String,
    /// 默认包装工
    pub packer: String,
}

/// 产线工艺配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// 单个标识码的固定长度
    pub code_length: usize,
    /// 触发方式 (timer, sensor)
    pub trigger_mode: String,
    /// 定时触发间隔（毫秒）
    pub timer_interval_ms: u64,
    /// 产品标签数据里没有容量时使用的层容量
    pub default_layer_size: Option<usize>,
    /// 箱码中批号的补零宽度
    pub batch_number_width: usize,
    /// 箱码中序列号的补零宽度
    pub serial_width: usize,
    /// 序列号持久化方式 (database, file)
    pub serial_strategy: String,
    /// 文件方式下计数器文件所在目录
    pub serial_counter_dir: PathBuf,
    /// 停止时等待扫码循环退出的最长时间（毫秒）
    pub stop_timeout_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 日志文件路径，为空时只输出到控制台
    pub log_file_path: Option<PathBuf>,
    /// 是否启用控制台输出
    pub console_output: bool,
}

/// 数据持久化配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// 持久化类型 (sqlite, memory)
    pub persistence_type: String,
    /// SQLite数据库文件路径
    pub db_path: PathBuf,
    /// 任务/产品目录文件（JSON）
    pub catalog_path: PathBuf,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: "PackingLine".to_string(),
            environment: "development".to_string(),
            line_id: 1,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:2001".to_string(),
            scan_command: "TRIGGER\r\n".to_string(),
            no_read_answer: "NoRead".to_string(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 200,
            write_timeout_ms: 200,
        }
    }
}

impl Default for PlcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 502,
            slave_id: 1,
            connection_timeout_ms: 5000,
            product_sensor_coil: 0,
            rejector_coil: 1,
            sensor_scan_interval_ms: 50,
            signal_buffer_size: 5,
        }
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9100".to_string(),
            connect_timeout_ms: 5000,
            template_dir: PathBuf::from("templates"),
            template_name: "standard.txt".to_string(),
            packer: String::new(),
        }
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            code_length: 31,
            trigger_mode: "timer".to_string(),
            timer_interval_ms: 1000,
            default_layer_size: None,
            batch_number_width: 4,
            serial_width: 6,
            serial_strategy: "database".to_string(),
            serial_counter_dir: PathBuf::from("data/serials"),
            stop_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file_path: Some(PathBuf::from("logs/packing_line.log")),
            console_output: true,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            persistence_type: "sqlite".to_string(),
            db_path: PathBuf::from("data/packing_line.sqlite"),
            catalog_path: PathBuf::from("data/catalog.json"),
        }
    }
}

/// 配置管理器
/// 负责加载、保存和管理应用程序配置
pub struct ConfigManager {
    config: AppConfig,
    config_file_path: PathBuf,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new(config_file_path: PathBuf) -> Self {
        Self {
            config: AppConfig::default(),
            config_file_path,
        }
    }

    /// 从文件加载配置
    pub async fn load_from_file(&mut self) -> AppResult<()> {
        if !self.config_file_path.exists() {
            // 如果配置文件不存在，创建默认配置文件
            self.save_to_file().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_file_path)
            .await
            .map_err(|e| AppError::io_error(format!("读取配置文件失败: {}", e), e.kind().to_string()))?;

        self.config = serde_json::from_str(&content)
            .map_err(|e| AppError::configuration_error(format!("解析配置文件失败: {}", e)))?;

        Ok(())
    }

    /// 将配置保存到文件
    pub async fn save_to_file(&self) -> AppResult<()> {
        // 确保目录存在
        if let Some(parent) = self.config_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await
                    .map_err(|e| AppError::io_error(format!("创建配置目录失败: {}", e), e.kind().to_string()))?;
            }
        }

        let content = serde_json::to_string_pretty(&self.config)
            .map_err(|e| AppError::json_error(format!("序列化配置失败: {}", e)))?;

        tokio::fs::write(&self.config_file_path, content)
            .await
            .map_err(|e| AppError::io_error(format!("写入配置文件失败: {}", e), e.kind().to_string()))?;

        Ok(())
    }

    /// 从环境变量覆盖配置
    pub fn override_from_env(&mut self) {
        if let Ok(address) = std::env::var("SCANNER_ADDRESS") {
            self.config.scanner_config.address = address;
        }

        // PLC 配置
        if let Ok(host) = std::env::var("PLC_HOST") {
            self.config.plc_config.host = host;
        }
        if let Ok(port) = std::env::var("PLC_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.config.plc_config.port = port;
            }
        }

        if let Ok(address) = std::env::var("PRINTER_ADDRESS") {
            self.config.printer_config.address = address;
        }

        // 产线工艺
        if let Ok(mode) = std::env::var("TRIGGER_MODE") {
            self.config.line_config.trigger_mode = mode.to_lowercase();
        }
        if let Ok(length) = std::env::var("CODE_LENGTH") {
            if let Ok(length) = length.parse::<usize>() {
                self.config.line_config.code_length = length;
            }
        }

        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            self.config.logging_config.log_level = log_level;
        }

        // 数据路径
        if let Ok(db_path) = std::env::var("DB_PATH") {
            self.config.persistence_config.db_path = PathBuf::from(db_path);
        }
        if let Ok(catalog_path) = std::env::var("CATALOG_PATH") {
            self.config.persistence_config.catalog_path = PathBuf::from(catalog_path);
        }
    }

    /// 获取配置的只读引用
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// 获取配置的可变引用
    pub fn get_config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// 取出最终配置
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// 验证配置的有效性
    pub fn validate_config(&self) -> AppResult<()> {
        validate_app_config(&self.config)
    }

    /// 重置为默认配置
    pub fn reset_to_default(&mut self) {
        self.config = AppConfig::default();
    }
}

/// 验证配置的有效性
pub fn validate_app_config(config: &AppConfig) -> AppResult<()> {
    if config.scanner_config.address.is_empty() {
        return Err(AppError::configuration_error("扫码器地址不能为空"));
    }

    if config.line_config.code_length == 0 {
        return Err(AppError::configuration_error("标识码长度必须大于0"));
    }

    let valid_trigger_modes = ["timer", "sensor"];
    if !valid_trigger_modes.contains(&config.line_config.trigger_mode.as_str()) {
        return Err(AppError::configuration_error(format!(
            "无效的触发方式: {}，有效值: {:?}",
            config.line_config.trigger_mode, valid_trigger_modes
        )));
    }

    if config.line_config.trigger_mode == "timer" && config.line_config.timer_interval_ms == 0 {
        return Err(AppError::configuration_error("定时触发间隔必须大于0"));
    }

    // 传感器触发依赖PLC
    if config.line_config.trigger_mode == "sensor" {
        if !config.plc_config.enabled {
            return Err(AppError::configuration_error("传感器触发模式需要启用PLC"));
        }
        if config.plc_config.sensor_scan_interval_ms == 0 {
            return Err(AppError::configuration_error("传感器轮询间隔必须大于0"));
        }
    }

    if config.plc_config.enabled {
        if config.plc_config.host.is_empty() {
            return Err(AppError::configuration_error("PLC主机地址不能为空"));
        }
        if config.plc_config.port == 0 {
            return Err(AppError::configuration_error("PLC端口号不能为0"));
        }
    }

    if config.printer_config.enabled && config.printer_config.address.is_empty() {
        return Err(AppError::configuration_error("打印机地址不能为空"));
    }

    if config.line_config.serial_width == 0 {
        return Err(AppError::configuration_error("序列号宽度必须大于0"));
    }

    let valid_serial_strategies = ["database", "file"];
    if !valid_serial_strategies.contains(&config.line_config.serial_strategy.as_str()) {
        return Err(AppError::configuration_error(format!(
            "无效的序列号持久化方式: {}，有效值: {:?}",
            config.line_config.serial_strategy, valid_serial_strategies
        )));
    }

    let valid_persistence_types = ["sqlite", "memory"];
    if !valid_persistence_types.contains(&config.persistence_config.persistence_type.as_str()) {
        return Err(AppError::configuration_error(format!(
            "无效的持久化类型: {}，有效值: {:?}",
            config.persistence_config.persistence_type, valid_persistence_types
        )));
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.logging_config.log_level.as_str()) {
        return Err(AppError::configuration_error(format!(
            "无效的日志级别: {}，有效值: {:?}",
            config.logging_config.log_level, valid_log_levels
        )));
    }

    Ok(())
}

/// 按标准流程加载配置：文件 → 环境变量覆盖 → 校验
pub async fn load_app_config(config_path: Option<PathBuf>) -> AppResult<AppConfig> {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from("config/app_config.json"));
    let mut config_manager = ConfigManager::new(config_path);

    config_manager.load_from_file().await?;
    config_manager.override_from_env();
    config_manager.validate_config()?;

    Ok(config_manager.into_config())
}
