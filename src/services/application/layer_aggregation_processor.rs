/// 层聚合任务处理器
///
/// 一个处理器绑定一个生产任务：
/// 1. 启动时加载任务/产品、连接设备、初始化校验器与序列号生成器、启动触发源
/// 2. 运行时每收到一个触发信号执行一次扫码周期
/// 3. 停止时取消扫码循环并等待其退出，再断开设备
///
/// 状态: Idle → Starting → Running → Stopping → Idle

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::enums::ProcessorState;
use crate::models::structs::{Product, ScanStatistics, Task};
use crate::services::domain::code_validator::{check_layer, parse_layer, CodeValidator, LayerRead, LayerRejection};
use crate::services::domain::serial_generator::{ContainerCodeFormat, SerialGenerator};
use crate::services::domain::trigger::{TriggerSignal, TriggerSource};
use crate::services::domain::uniqueness_validator::UniquenessValidator;
use crate::services::traits::{AggregationStore, CodeReader, DataService, LabelPrinter, Plc, SerialStore, TaskProcessor};
use crate::utils::config::AppConfig;
use crate::utils::error::{AppError, AppResult};

/// 处理器运行参数
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub code_length: usize,
    pub no_read_answer: String,
    /// 产品标签数据里没有容量时使用
    pub default_layer_size: Option<usize>,
    pub code_format: ContainerCodeFormat,
    /// 停止时等待扫码循环退出的上限
    pub stop_timeout: Duration,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            code_length: 31,
            no_read_answer: "NoRead".to_string(),
            default_layer_size: None,
            code_format: ContainerCodeFormat::default(),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&AppConfig> for ProcessorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            code_length: config.line_config.code_length,
            no_read_answer: config.scanner_config.no_read_answer.clone(),
            default_layer_size: config.line_config.default_layer_size,
            code_format: ContainerCodeFormat {
                batch_width: config.line_config.batch_number_width,
                serial_width: config.line_config.serial_width,
            },
            stop_timeout: Duration::from_millis(config.line_config.stop_timeout_ms),
        }
    }
}

/// 处理器使用的设备，PLC 与打印机可选
#[derive(Clone)]
pub struct ProcessorDevices {
    pub scanner: Arc<dyn CodeReader>,
    pub plc: Option<Arc<dyn Plc>>,
    pub label_printer: Option<Arc<dyn LabelPrinter>>,
}

/// 已连接的设备，用于回滚和停止时断开
#[derive(Clone)]
enum ConnectedDevice {
    Scanner(Arc<dyn CodeReader>),
    Plc(Arc<dyn Plc>),
    LabelPrinter(Arc<dyn LabelPrinter>),
}

impl ConnectedDevice {
    fn name(&self) -> String {
        match self {
            ConnectedDevice::Scanner(scanner) => scanner.device_name().to_string(),
            ConnectedDevice::Plc(plc) => plc.device_name().to_string(),
            ConnectedDevice::LabelPrinter(_) => "LabelPrinter".to_string(),
        }
    }

    async fn close(&self) -> AppResult<()> {
        match self {
            ConnectedDevice::Scanner(scanner) => scanner.close().await,
            ConnectedDevice::Plc(plc) => plc.close().await,
            ConnectedDevice::LabelPrinter(printer) => printer.close().await,
        }
    }
}

/// 断开设备（逆序），返回第一个错误
async fn disconnect_all(devices: &[ConnectedDevice]) -> Option<AppError> {
    let mut first_error = None;
    for device in devices.iter().rev() {
        if let Err(e) = device.close().await {
            crate::log_communication_failure!("断开 {} 失败: {}", device.name(), e);
            first_error.get_or_insert(e);
        }
    }
    first_error
}

/// 已提交的一层
#[derive(Debug, Clone)]
pub struct CommittedLayer {
    pub serial: i64,
    pub container_id: i64,
    pub container_code: String,
    pub codes: Vec<String>,
    /// 打印失败不影响已提交的数据
    pub print_error: Option<AppError>,
}

/// 一次扫码周期的结果
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    NoRead,
    ScanFailed(AppError),
    Rejected(LayerRejection),
    SerialFailed(AppError),
    /// 序列号已消耗，但箱码/单品码未能完整写入
    PersistFailed { serial: i64, error: AppError },
    Committed(CommittedLayer),
}

/// 扫码循环，一个运行中的任务一个
struct ScanCycleRunner {
    task: Task,
    product: Product,
    layer_size: usize,
    no_read_answer: String,
    validator: CodeValidator,
    scanner: Arc<dyn CodeReader>,
    label_printer: Option<Arc<dyn LabelPrinter>>,
    store: Arc<dyn AggregationStore>,
    uniqueness: Arc<UniquenessValidator>,
    serial_generator: Arc<SerialGenerator>,
    stats: Arc<Mutex<ScanStatistics>>,
}

impl ScanCycleRunner {
    /// 只在等待信号时响应取消，进行中的周期总是执行完
    async fn run(self, mut receiver: mpsc::Receiver<TriggerSignal>, cancel: CancellationToken) {
        info!("🚀 [SCAN_LOOP] 任务 {} 扫码循环已启动, 层容量: {}", self.task.id, self.layer_size);

        loop {
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                signal = receiver.recv() => signal,
            };

            match signal {
                Some(signal) => {
                    debug!("[SCAN_LOOP] 收到触发信号, 延迟 {:?}", signal.emitted_at.elapsed());
                    let outcome = self.run_cycle().await;
                    self.record(&outcome);
                }
                None => {
                    warn!("[SCAN_LOOP] 触发信号通道已关闭，等待停止");
                    cancel.cancelled().await;
                    break;
                }
            }
        }

        info!("🛑 [SCAN_LOOP] 任务 {} 扫码循环已退出", self.task.id);
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let response = match self.scanner.scan().await {
            Ok(response) => response,
            Err(e) => return CycleOutcome::ScanFailed(e),
        };

        let codes = match parse_layer(&response, &self.no_read_answer) {
            LayerRead::NoRead => return CycleOutcome::NoRead,
            LayerRead::Codes(codes) => codes,
        };

        if let Err(rejection) = check_layer(&codes, self.layer_size) {
            return CycleOutcome::Rejected(rejection);
        }
        if let Err(rejection) = self.validator.validate_codes(&codes) {
            return CycleOutcome::Rejected(rejection);
        }

        let (unique, duplicates) = self.uniqueness.is_codes_unique(&codes).await;
        if !unique {
            return CycleOutcome::Rejected(LayerRejection::AlreadyUsed { codes: duplicates });
        }

        let serial = match self.serial_generator.generate_serial().await {
            Ok(serial) => serial,
            Err(e) => return CycleOutcome::SerialFailed(e),
        };
        let container_code = match self.serial_generator.container_code(serial).await {
            Ok(code) => code,
            Err(error) => return CycleOutcome::PersistFailed { serial, error },
        };

        // 箱与单品码在同一次提交中落库，失败时整层不生效
        let container_id = match self.store.commit_layer(&container_code, serial, self.task.id, &codes).await {
            Ok(id) => id,
            Err(error) => return CycleOutcome::PersistFailed { serial, error },
        };

        self.uniqueness.mark_codes_as_used(&codes).await;

        let print_error = match &self.label_printer {
            Some(printer) => printer
                .print_label(&self.task, &self.product, serial, &container_code)
                .await
                .err(),
            None => None,
        };

        CycleOutcome::Committed(CommittedLayer {
            serial,
            container_id,
            container_code,
            codes,
            print_error,
        })
    }

    fn record(&self, outcome: &CycleOutcome) {
        let Ok(mut stats) = self.stats.lock() else {
            warn!("[SCAN_LOOP] 统计锁已损坏，跳过统计");
            return;
        };
        stats.cycles_total += 1;

        match outcome {
            CycleOutcome::NoRead => {
                stats.no_reads += 1;
                debug!("[SCAN_LOOP] NoRead");
            }
            CycleOutcome::ScanFailed(e) => {
                stats.scan_errors += 1;
                stats.last_error = Some(e.to_string());
                crate::log_communication_failure!("扫码失败: {}", e);
            }
            CycleOutcome::Rejected(rejection) => {
                match rejection {
                    LayerRejection::WrongCount { .. } => stats.rejected_wrong_count += 1,
                    LayerRejection::DuplicateInLayer { .. } => stats.rejected_duplicate_in_layer += 1,
                    LayerRejection::InvalidCode { .. } => stats.rejected_invalid_code += 1,
                    LayerRejection::AlreadyUsed { .. } => stats.rejected_already_used += 1,
                }
                stats.last_error = Some(rejection.to_string());
                crate::log_validation_rejection!("任务 {} 层被拒绝: {}", self.task.id, rejection);
            }
            CycleOutcome::SerialFailed(e) => {
                stats.serial_failures += 1;
                stats.last_error = Some(e.to_string());
                error!("[SCAN_LOOP] 生成序列号失败: {}", e);
            }
            CycleOutcome::PersistFailed { serial, error } => {
                stats.persistence_failures += 1;
                stats.last_error = Some(error.to_string());
                crate::log_persistence_failure!("任务 {} 序列号 {} 已消耗但未能写入: {}", self.task.id, serial, error);
            }
            CycleOutcome::Committed(layer) => {
                stats.committed_containers += 1;
                stats.committed_codes += layer.codes.len() as u64;
                stats.last_serial = Some(layer.serial);
                stats.last_container_code = Some(layer.container_code.clone());
                stats.push_recent_codes(&layer.codes);
                info!(
                    "📦 [SCAN_LOOP] 任务 {} 箱 {} 已提交 ({} 个码), 箱码: {}",
                    self.task.id,
                    layer.serial,
                    layer.codes.len(),
                    layer.container_code
                );
                if let Some(e) = &layer.print_error {
                    stats.print_failures += 1;
                    stats.last_error = Some(e.to_string());
                    crate::log_communication_failure!("箱 {} 标签打印失败: {}", layer.serial, e);
                }
            }
        }
    }
}

struct RunHandle {
    task: Task,
    cancel: CancellationToken,
    scan_loop: JoinHandle<()>,
    devices: Vec<ConnectedDevice>,
}

#[derive(Default)]
struct ProcessorInner {
    state: ProcessorState,
    run: Option<RunHandle>,
}

pub struct LayerAggregationProcessor {
    name: String,
    settings: ProcessorSettings,
    data_service: Arc<dyn DataService>,
    devices: ProcessorDevices,
    trigger: Arc<dyn TriggerSource>,
    store: Arc<dyn AggregationStore>,
    uniqueness: Arc<UniquenessValidator>,
    serial_generator: Arc<SerialGenerator>,
    stats: Arc<Mutex<ScanStatistics>>,
    /// 只在状态转换时持有，不跨越 I/O
    inner: Mutex<ProcessorInner>,
}

impl LayerAggregationProcessor {
    pub fn new(
        settings: ProcessorSettings,
        data_service: Arc<dyn DataService>,
        devices: ProcessorDevices,
        trigger: Arc<dyn TriggerSource>,
        store: Arc<dyn AggregationStore>,
        serial_store: Arc<dyn SerialStore>,
    ) -> Self {
        Self {
            name: "LayerAggregationProcessor".to_string(),
            uniqueness: Arc::new(UniquenessValidator::new(store.clone())),
            serial_generator: Arc::new(SerialGenerator::new(serial_store, settings.code_format)),
            settings,
            data_service,
            devices,
            trigger,
            store,
            stats: Arc::new(Mutex::new(ScanStatistics::default())),
            inner: Mutex::new(ProcessorInner::default()),
        }
    }

    fn lock_inner(&self) -> AppResult<std::sync::MutexGuard<'_, ProcessorInner>> {
        self.inner
            .lock()
            .map_err(|_| AppError::concurrency_error("处理器状态锁已损坏"))
    }

    pub fn state(&self) -> ProcessorState {
        self.inner.lock().map(|inner| inner.state).unwrap_or(ProcessorState::Idle)
    }

    /// 当前绑定的任务
    pub fn current_task(&self) -> Option<Task> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.run.as_ref().map(|run| run.task.clone()))
    }

    /// 扫码统计快照
    pub fn stats(&self) -> ScanStatistics {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// 层容量：标签数据中的每层数量 → 每箱数量 → 配置默认值
    fn resolve_layer_size(&self, product: &Product) -> AppResult<usize> {
        let label_capacity = match product.parse_label_data() {
            Ok(label) => label.and_then(|l| l.layer_capacity()),
            Err(e) => {
                warn!("[{}] 产品 {} 的标签数据解析失败，忽略: {}", self.name, product.id, e);
                None
            }
        };

        label_capacity
            .or(self.settings.default_layer_size)
            .filter(|size| *size > 0)
            .ok_or_else(|| {
                AppError::configuration_error(format!(
                    "产品 {} 未定义层容量，且没有配置默认层容量",
                    product.id
                ))
            })
    }

    /// 按 扫码器 → PLC → 打印机 的顺序连接，失败时断开已连接的设备
    async fn connect_devices(&self) -> AppResult<Vec<ConnectedDevice>> {
        let mut wanted = vec![ConnectedDevice::Scanner(self.devices.scanner.clone())];
        if let Some(plc) = &self.devices.plc {
            wanted.push(ConnectedDevice::Plc(plc.clone()));
        }
        if let Some(printer) = &self.devices.label_printer {
            wanted.push(ConnectedDevice::LabelPrinter(printer.clone()));
        }

        let mut connected = Vec::with_capacity(wanted.len());
        for device in wanted {
            let result = match &device {
                ConnectedDevice::Scanner(scanner) => scanner.connect().await,
                ConnectedDevice::Plc(plc) => plc.connect().await,
                ConnectedDevice::LabelPrinter(printer) => printer.connect().await,
            };
            if let Err(e) = result {
                crate::log_communication_failure!("连接 {} 失败: {}", device.name(), e);
                disconnect_all(&connected).await;
                return Err(e);
            }
            info!("[{}] {} 已连接", self.name, device.name());
            connected.push(device);
        }
        Ok(connected)
    }

    /// Starting 阶段的全部 I/O，失败时已经回滚
    async fn prepare_run(&self, task_id: i64) -> AppResult<RunHandle> {
        let task = self.data_service.get_task_by_id(task_id).await?;
        let product = self.data_service.get_product_by_id(task.product_id).await?;
        let layer_size = self.resolve_layer_size(&product)?;

        let devices = self.connect_devices().await?;

        let validator = CodeValidator::new(product.gtin.clone(), self.settings.code_length);

        let init_result = async {
            self.uniqueness.initialize(task.id).await?;
            self.serial_generator
                .initialize(task.id, &product.gtin, &task.date, &task.batch_number)
                .await
        }
        .await;
        if let Err(e) = init_result {
            error!("[{}] 任务 {} 初始化校验器失败: {}", self.name, task.id, e);
            self.uniqueness.reset().await;
            self.serial_generator.reset().await;
            disconnect_all(&devices).await;
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let receiver = match self.arm_trigger(cancel.clone()).await {
            Ok(receiver) => receiver,
            Err(e) => {
                error!("[{}] 启动触发源 {} 失败: {}", self.name, self.trigger.source_name(), e);
                cancel.cancel();
                self.uniqueness.reset().await;
                self.serial_generator.reset().await;
                disconnect_all(&devices).await;
                return Err(e);
            }
        };

        if let Ok(mut stats) = self.stats.lock() {
            *stats = ScanStatistics::default();
        }

        let runner = ScanCycleRunner {
            task: task.clone(),
            product,
            layer_size,
            no_read_answer: self.settings.no_read_answer.clone(),
            validator,
            scanner: self.devices.scanner.clone(),
            label_printer: self.devices.label_printer.clone(),
            store: self.store.clone(),
            uniqueness: self.uniqueness.clone(),
            serial_generator: self.serial_generator.clone(),
            stats: self.stats.clone(),
        };
        let scan_loop = tokio::spawn(runner.run(receiver, cancel.clone()));

        Ok(RunHandle { task, cancel, scan_loop, devices })
    }

    async fn arm_trigger(&self, cancel: CancellationToken) -> AppResult<mpsc::Receiver<TriggerSignal>> {
        self.trigger.wait_signal(cancel).await?;
        match self.trigger.take_signal_receiver().await {
            Some(receiver) => Ok(receiver),
            None => {
                let _ = self.trigger.stop().await;
                Err(AppError::concurrency_error(format!(
                    "触发源 {} 的信号通道已被占用",
                    self.trigger.source_name()
                )))
            }
        }
    }
}

#[async_trait]
impl TaskProcessor for LayerAggregationProcessor {
    async fn start(&self, task_id: i64) -> AppResult<()> {
        {
            let mut inner = self.lock_inner()?;
            match inner.state {
                ProcessorState::Running => {
                    let current = inner.run.as_ref().map(|run| run.task.id);
                    if current != Some(task_id) {
                        warn!("[{}] 已在运行任务 {:?}，忽略启动任务 {}", self.name, current, task_id);
                    }
                    return Ok(());
                }
                ProcessorState::Starting | ProcessorState::Stopping => {
                    return Err(AppError::state_transition_error(
                        inner.state.to_string(),
                        ProcessorState::Starting.to_string(),
                        "处理器正在切换状态，请稍后重试",
                    ));
                }
                ProcessorState::Idle => inner.state = ProcessorState::Starting,
            }
        }

        info!("🔧 [{}] 正在启动任务 {}", self.name, task_id);
        let prepared = self.prepare_run(task_id).await;

        let mut inner = self.lock_inner()?;
        match prepared {
            Ok(run) => {
                inner.state = ProcessorState::Running;
                inner.run = Some(run);
                crate::log_user_operation!("启动任务 {}", task_id);
                Ok(())
            }
            Err(e) => {
                inner.state = ProcessorState::Idle;
                error!("[{}] 启动任务 {} 失败: {}", self.name, task_id, e);
                Err(e)
            }
        }
    }

    async fn stop(&self) -> AppResult<()> {
        let run = {
            let mut inner = self.lock_inner()?;
            if inner.state != ProcessorState::Running {
                return Ok(());
            }
            inner.state = ProcessorState::Stopping;
            inner.run.take()
        };

        let mut first_error: Option<AppError> = None;

        if let Some(run) = run {
            info!("🔧 [{}] 正在停止任务 {}", self.name, run.task.id);
            run.cancel.cancel();

            let mut scan_loop = run.scan_loop;
            match tokio::time::timeout(self.settings.stop_timeout, &mut scan_loop).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("[{}] 扫码循环异常退出: {}", self.name, e);
                }
                Err(_) => {
                    scan_loop.abort();
                    error!(
                        "[{}] 扫码循环未在 {:?} 内退出，已强制中止",
                        self.name, self.settings.stop_timeout
                    );
                    first_error = Some(AppError::timeout_error(
                        "停止扫码循环",
                        format!("{:?} 内未退出", self.settings.stop_timeout),
                    ));
                }
            }

            if let Err(e) = self.trigger.stop().await {
                warn!("[{}] 停止触发源失败: {}", self.name, e);
                first_error.get_or_insert(e);
            }

            if let Some(e) = disconnect_all(&run.devices).await {
                first_error.get_or_insert(e);
            }

            self.uniqueness.reset().await;
            self.serial_generator.reset().await;
            crate::log_user_operation!("停止任务 {}", run.task.id);
        }

        {
            let mut inner = self.lock_inner()?;
            inner.state = ProcessorState::Idle;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn is_running(&self) -> bool {
        self.state() == ProcessorState::Running
    }
}
