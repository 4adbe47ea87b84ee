// 文件: src/services/application/tests.rs
// 层聚合处理器的单元测试

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::layer_aggregation_processor::{LayerAggregationProcessor, ProcessorDevices, ProcessorSettings};
use crate::models::enums::{ContainerStatus, ItemStatus, ProcessorState, TaskStatus};
use crate::models::structs::{Container, Item, Product, Task};
use crate::services::domain::trigger::{SensorEdgeTrigger, TimerTrigger, TriggerSource};
use crate::services::infrastructure::{Catalog, CatalogDataService, MemoryAggregationStore, MockCodeReader, MockLabelPrinter, MockPlc};
use crate::services::traits::{AggregationStore, DataService, MockAggregationStore, Plc, SerialStore, TaskProcessor};
use crate::utils::error::{AppError, AppResult};

const GTIN: &str = "04600000000017";
const TASK_ID: i64 = 1;
const PRODUCT_ID: i64 = 10;

fn code(n: u32) -> String {
    format!("01{}21{:0>13}", GTIN, n)
}

fn layer(numbers: &[u32]) -> String {
    numbers.iter().map(|n| code(*n)).collect::<Vec<_>>().join(" ")
}

fn catalog(label_data: &str) -> Catalog {
    Catalog {
        tasks: vec![Task {
            id: TASK_ID,
            product_id: PRODUCT_ID,
            product_name: "Молоко 3.2%".to_string(),
            line_id: 1,
            line_name: "Линия 1".to_string(),
            date: "15.03.2024".to_string(),
            batch_number: "17".to_string(),
            status: TaskStatus::InProgress,
            created_at: None,
        }],
        products: vec![Product {
            id: PRODUCT_ID,
            name: "Молоко 3.2%".to_string(),
            gtin: GTIN.to_string(),
            label_data: label_data.to_string(),
        }],
    }
}

fn test_settings() -> ProcessorSettings {
    ProcessorSettings {
        stop_timeout: Duration::from_secs(2),
        ..ProcessorSettings::default()
    }
}

struct Fixture {
    scanner: Arc<MockCodeReader>,
    printer: Arc<MockLabelPrinter>,
    store: Arc<MemoryAggregationStore>,
    processor: Arc<LayerAggregationProcessor>,
}

fn fixture_with(settings: ProcessorSettings, data_service: Arc<dyn DataService>) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let scanner = Arc::new(MockCodeReader::new_for_testing("TestScanner"));
    let printer = Arc::new(MockLabelPrinter::new_for_testing());
    let store = Arc::new(MemoryAggregationStore::new());

    let processor = LayerAggregationProcessor::new(
        settings,
        data_service,
        ProcessorDevices {
            scanner: scanner.clone(),
            plc: None,
            label_printer: Some(printer.clone()),
        },
        Arc::new(TimerTrigger::new(Duration::from_millis(10))),
        store.clone(),
        store.clone(),
    );

    Fixture { scanner, printer, store, processor: Arc::new(processor) }
}

/// 每层 3 个码的默认夹具
fn fixture() -> Fixture {
    fixture_with(
        test_settings(),
        Arc::new(CatalogDataService::in_memory(catalog(r#"{"box_quantity": "3"}"#))),
    )
}

/// 轮询等待条件成立，最多 2 秒
async fn wait_for(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// 正常层：箱码落库、单品码装箱、标签打印
#[tokio::test]
async fn test_valid_layer_is_committed_and_printed() {
    let f = fixture();
    f.scanner.push_response(layer(&[1, 2, 3]));

    f.processor.start(TASK_ID).await.unwrap();
    assert!(f.processor.is_running());
    assert_eq!(f.processor.current_task().map(|t| t.id), Some(TASK_ID));

    let processor = f.processor.clone();
    assert!(wait_for(|| processor.stats().committed_containers == 1).await);

    let containers = f.store.get_containers_by_task_id(TASK_ID).await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].serial_number, 1);
    assert_eq!(containers[0].code, format!("{}0017000001", GTIN));

    let items = f.store.get_items_by_container_id(containers[0].id).await.unwrap();
    let mut item_codes: Vec<String> = items.iter().map(|i| i.code.clone()).collect();
    item_codes.sort();
    assert_eq!(item_codes, vec![code(1), code(2), code(3)]);
    assert!(items.iter().all(|i| i.status == "aggregated"));

    let printer = f.printer.clone();
    assert!(wait_for(|| printer.printed().len() == 1).await);
    let printed = &f.printer.printed()[0];
    assert_eq!(printed.serial, 1);
    assert_eq!(printed.container_code, containers[0].code);

    let stats = f.processor.stats();
    assert_eq!(stats.committed_codes, 3);
    assert_eq!(stats.last_serial, Some(1));
    assert_eq!(stats.recent_codes.len(), 3);

    f.processor.stop().await.unwrap();
    assert_eq!(f.processor.state(), ProcessorState::Idle);
    assert!(f.processor.current_task().is_none());
}

/// 码数量不符的层被拒绝，不消耗序列号
#[tokio::test]
async fn test_wrong_count_rejected_without_consuming_serial() {
    let f = fixture();
    f.scanner.push_response(layer(&[1, 2]));
    f.scanner.push_response(layer(&[1, 2, 3, 4]));
    f.scanner.push_response(layer(&[5, 6, 7]));

    f.processor.start(TASK_ID).await.unwrap();
    let processor = f.processor.clone();
    assert!(wait_for(|| processor.stats().committed_containers == 1).await);
    f.processor.stop().await.unwrap();

    let stats = f.processor.stats();
    assert_eq!(stats.rejected_wrong_count, 2);
    assert_eq!(stats.last_serial, Some(1));
    assert_eq!(f.store.get_last_serial_number(TASK_ID).await.unwrap(), 1);
}

/// 层内重复与无效码
#[tokio::test]
async fn test_duplicate_and_invalid_codes_rejected() {
    let f = fixture();
    f.scanner.push_response(format!("{} {} {}", code(1), code(2), code(1)));
    f.scanner.push_response(format!("{} {} {}", code(1), code(2), "X".repeat(31)));
    f.scanner.push_response(format!("{} {} {}", code(1), code(2), "short"));

    f.processor.start(TASK_ID).await.unwrap();
    let scanner = f.scanner.clone();
    assert!(wait_for(|| scanner.pending_responses() == 0 && scanner.scan_calls() >= 4).await);
    f.processor.stop().await.unwrap();

    let stats = f.processor.stats();
    assert_eq!(stats.rejected_duplicate_in_layer, 1);
    assert_eq!(stats.rejected_invalid_code, 2);
    assert_eq!(stats.committed_containers, 0);
    assert!(f.store.get_containers_by_task_id(TASK_ID).await.unwrap().is_empty());
    // 被拒绝的层不消耗序列号
    assert_eq!(f.store.load_last_serial(TASK_ID).await.unwrap(), 0);
    assert!(f.printer.printed().is_empty());
}

/// 已经装箱的码再次出现时整层被拒绝
#[tokio::test]
async fn test_already_used_codes_rejected() {
    let f = fixture();
    f.scanner.push_response(layer(&[1, 2, 3]));
    f.scanner.push_response(layer(&[3, 4, 5]));
    f.scanner.push_response(layer(&[4, 5, 6]));

    f.processor.start(TASK_ID).await.unwrap();
    let processor = f.processor.clone();
    assert!(wait_for(|| processor.stats().committed_containers == 2).await);
    f.processor.stop().await.unwrap();

    let stats = f.processor.stats();
    assert_eq!(stats.rejected_already_used, 1);
    assert_eq!(stats.last_serial, Some(2));
    assert_eq!(f.store.get_items_by_task_id(TASK_ID).await.unwrap().len(), 6);
}

/// 重启后从落库数据恢复唯一性与序列号
#[tokio::test]
async fn test_restart_restores_used_codes_and_serial() {
    let f = fixture();
    f.scanner.push_response(layer(&[1, 2, 3]));
    f.processor.start(TASK_ID).await.unwrap();
    let processor = f.processor.clone();
    assert!(wait_for(|| processor.stats().committed_containers == 1).await);
    f.processor.stop().await.unwrap();

    f.scanner.push_response(layer(&[1, 2, 3]));
    f.scanner.push_response(layer(&[7, 8, 9]));
    f.processor.start(TASK_ID).await.unwrap();
    assert!(wait_for(|| processor.stats().committed_containers == 1).await);
    f.processor.stop().await.unwrap();

    let stats = f.processor.stats();
    assert_eq!(stats.rejected_already_used, 1);
    assert_eq!(stats.last_serial, Some(2));
}

/// 序列号从持久化的计数器之后继续
#[tokio::test]
async fn test_serial_continues_after_persisted_counter() {
    let f = fixture();
    f.store.persist_serial(TASK_ID, 41).await.unwrap();
    f.scanner.push_response(layer(&[1, 2, 3]));

    f.processor.start(TASK_ID).await.unwrap();
    let processor = f.processor.clone();
    assert!(wait_for(|| processor.stats().committed_containers == 1).await);
    f.processor.stop().await.unwrap();

    assert_eq!(f.processor.stats().last_serial, Some(42));
    assert_eq!(f.store.load_last_serial(TASK_ID).await.unwrap(), 42);
}

/// NoRead 与扫码错误只计数
#[tokio::test]
async fn test_no_read_and_scan_errors_are_counted() {
    let f = fixture();
    f.scanner.push_response("NoRead");
    f.scanner.push_error(AppError::timeout_error("扫码", "读取超时"));
    f.scanner.push_response(layer(&[1, 2, 3]));

    f.processor.start(TASK_ID).await.unwrap();
    let processor = f.processor.clone();
    assert!(wait_for(|| processor.stats().committed_containers == 1).await);
    f.processor.stop().await.unwrap();

    let stats = f.processor.stats();
    assert!(stats.no_reads >= 1);
    assert_eq!(stats.scan_errors, 1);
    assert_eq!(stats.rejected_layers(), 0);
}

/// 打印失败不回滚已提交的层
#[tokio::test]
async fn test_print_failure_is_not_fatal() {
    let f = fixture();
    f.printer.set_fail_print(true);
    f.scanner.push_response(layer(&[1, 2, 3]));
    f.scanner.push_response(layer(&[4, 5, 6]));

    f.processor.start(TASK_ID).await.unwrap();
    let processor = f.processor.clone();
    assert!(wait_for(|| processor.stats().committed_containers == 2).await);
    f.processor.stop().await.unwrap();

    let stats = f.processor.stats();
    assert_eq!(stats.print_failures, 2);
    assert_eq!(f.store.get_containers_by_task_id(TASK_ID).await.unwrap().len(), 2);
}

/// 箱码写库失败时序列号已消耗，码不标记为已使用
#[tokio::test]
async fn test_persist_failure_consumes_serial() {
    let scanner = Arc::new(MockCodeReader::new_for_testing("TestScanner"));
    let serial_store = Arc::new(MemoryAggregationStore::new());

    let mut store = MockAggregationStore::new();
    store.expect_get_items_by_task_id().returning(|_| Ok(Vec::new()));
    store
        .expect_commit_layer()
        .returning(|_, _, _, _| Err(AppError::persistence_error("数据库已锁定")));

    let processor = Arc::new(LayerAggregationProcessor::new(
        test_settings(),
        Arc::new(CatalogDataService::in_memory(catalog(r#"{"box_quantity": "3"}"#))),
        ProcessorDevices { scanner: scanner.clone(), plc: None, label_printer: None },
        Arc::new(TimerTrigger::new(Duration::from_millis(10))),
        Arc::new(store),
        serial_store.clone(),
    ));

    scanner.push_response(layer(&[1, 2, 3]));
    processor.start(TASK_ID).await.unwrap();
    let observed = processor.clone();
    assert!(wait_for(|| observed.stats().persistence_failures == 1).await);
    processor.stop().await.unwrap();

    let stats = processor.stats();
    assert_eq!(stats.committed_containers, 0);
    assert_eq!(serial_store.load_last_serial(TASK_ID).await.unwrap(), 1);
}

/// 整层提交：每个码都装入同一个箱
#[tokio::test]
async fn test_commit_layer_assigns_every_item() {
    let store = MemoryAggregationStore::new();
    let codes = vec![code(1), code(2)];
    let container_id = store.commit_layer("BOX-1", 1, TASK_ID, &codes).await.unwrap();

    let items: Vec<Item> = store.get_items_by_container_id(container_id).await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.container_id == Some(container_id)));
}

/// 前 N 次整层提交失败的存储，其余操作转发给内存存储
struct FailingCommitStore {
    inner: MemoryAggregationStore,
    failures_left: AtomicUsize,
}

#[async_trait]
impl AggregationStore for FailingCommitStore {
    async fn create_container(&self, code: &str, serial_number: i64, task_id: i64, status: ContainerStatus) -> AppResult<i64> {
        self.inner.create_container(code, serial_number, task_id, status).await
    }

    async fn create_item(&self, code: &str, task_id: i64, status: ItemStatus) -> AppResult<i64> {
        self.inner.create_item(code, task_id, status).await
    }

    async fn assign_item_to_container(&self, item_id: i64, container_id: i64) -> AppResult<()> {
        self.inner.assign_item_to_container(item_id, container_id).await
    }

    async fn commit_layer(&self, container_code: &str, serial_number: i64, task_id: i64, codes: &[String]) -> AppResult<i64> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AppError::persistence_error("写入第 3 个单品码时磁盘已满"));
        }
        self.inner.commit_layer(container_code, serial_number, task_id, codes).await
    }

    async fn get_items_by_task_id(&self, task_id: i64) -> AppResult<Vec<Item>> {
        self.inner.get_items_by_task_id(task_id).await
    }

    async fn get_last_serial_number(&self, task_id: i64) -> AppResult<i64> {
        self.inner.get_last_serial_number(task_id).await
    }

    async fn get_containers_by_task_id(&self, task_id: i64) -> AppResult<Vec<Container>> {
        self.inner.get_containers_by_task_id(task_id).await
    }

    async fn get_items_by_container_id(&self, container_id: i64) -> AppResult<Vec<Item>> {
        self.inner.get_items_by_container_id(container_id).await
    }
}

/// 提交失败后重扫同一层：每个码只落库一次，再次出现时按已使用拒绝
#[tokio::test]
async fn test_failed_commit_never_duplicates_codes_on_rescan() {
    let scanner = Arc::new(MockCodeReader::new_for_testing("TestScanner"));
    let serial_store = Arc::new(MemoryAggregationStore::new());
    let store = Arc::new(FailingCommitStore {
        inner: MemoryAggregationStore::new(),
        failures_left: AtomicUsize::new(1),
    });

    let processor = Arc::new(LayerAggregationProcessor::new(
        test_settings(),
        Arc::new(CatalogDataService::in_memory(catalog(r#"{"box_quantity": "3"}"#))),
        ProcessorDevices { scanner: scanner.clone(), plc: None, label_printer: None },
        Arc::new(TimerTrigger::new(Duration::from_millis(10))),
        store.clone(),
        serial_store.clone(),
    ));

    scanner.push_response(layer(&[1, 2, 3]));
    scanner.push_response(layer(&[1, 2, 3]));
    scanner.push_response(layer(&[1, 2, 3]));
    processor.start(TASK_ID).await.unwrap();
    let observed = scanner.clone();
    assert!(wait_for(|| observed.pending_responses() == 0 && observed.scan_calls() >= 4).await);
    processor.stop().await.unwrap();

    let stats = processor.stats();
    assert_eq!(stats.persistence_failures, 1);
    assert_eq!(stats.committed_containers, 1);
    assert_eq!(stats.rejected_already_used, 1);

    let items = store.get_items_by_task_id(TASK_ID).await.unwrap();
    assert_eq!(items.len(), 3);
    for n in [1, 2, 3] {
        assert_eq!(items.iter().filter(|i| i.code == code(n)).count(), 1);
    }
    let containers = store.get_containers_by_task_id(TASK_ID).await.unwrap();
    assert_eq!(containers.len(), 1);
    // 失败的那一层消耗了序列号 1
    assert_eq!(containers[0].serial_number, 2);
}

/// 任务不存在时启动失败，不连接任何设备
#[tokio::test]
async fn test_start_unknown_task_fails_before_device_io() {
    let f = fixture();
    let err = f.processor.start(999).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND_ERROR");
    assert_eq!(f.processor.state(), ProcessorState::Idle);
    assert_eq!(f.scanner.connect_calls(), 0);
}

/// 无法确定层容量时启动失败
#[tokio::test]
async fn test_start_without_layer_size_fails() {
    let f = fixture_with(test_settings(), Arc::new(CatalogDataService::in_memory(catalog(""))));
    let err = f.processor.start(TASK_ID).await.unwrap_err();
    assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    assert_eq!(f.scanner.connect_calls(), 0);
    assert!(!f.processor.is_running());
}

/// 标签数据缺失时使用配置的默认层容量
#[tokio::test]
async fn test_default_layer_size_is_used() {
    let settings = ProcessorSettings { default_layer_size: Some(2), ..test_settings() };
    let f = fixture_with(settings, Arc::new(CatalogDataService::in_memory(catalog(""))));
    f.scanner.push_response(layer(&[1, 2]));

    f.processor.start(TASK_ID).await.unwrap();
    let processor = f.processor.clone();
    assert!(wait_for(|| processor.stats().committed_containers == 1).await);
    f.processor.stop().await.unwrap();
}

/// 设备连接失败时断开已连接的设备
#[tokio::test]
async fn test_device_failure_rolls_back_connections() {
    let f = fixture();
    f.printer.set_fail_connect(true);

    let err = f.processor.start(TASK_ID).await.unwrap_err();
    assert_eq!(err.error_code(), "DEVICE_ERROR");
    assert_eq!(f.processor.state(), ProcessorState::Idle);
    assert_eq!(f.scanner.connect_calls(), 1);
    assert_eq!(f.scanner.close_calls(), 1);
    assert!(!f.scanner.is_connected());

    // 故障排除后可以再次启动
    f.printer.set_fail_connect(false);
    f.processor.start(TASK_ID).await.unwrap();
    f.processor.stop().await.unwrap();
}

/// 重复启动与空闲时停止都是无操作
#[tokio::test]
async fn test_idempotent_start_and_stop() {
    let f = fixture();
    f.processor.stop().await.unwrap();

    f.processor.start(TASK_ID).await.unwrap();
    f.processor.start(TASK_ID).await.unwrap();
    assert_eq!(f.scanner.connect_calls(), 1);

    f.processor.stop().await.unwrap();
    f.processor.stop().await.unwrap();
    assert_eq!(f.scanner.close_calls(), 1);
    assert_eq!(f.printer.close_calls(), 1);
}

/// 查询任务时故意放慢的数据服务
struct SlowDataService {
    inner: CatalogDataService,
    delay: Duration,
}

#[async_trait]
impl DataService for SlowDataService {
    async fn get_task_by_id(&self, task_id: i64) -> AppResult<Task> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_task_by_id(task_id).await
    }

    async fn get_product_by_id(&self, product_id: i64) -> AppResult<Product> {
        self.inner.get_product_by_id(product_id).await
    }
}

/// 启动过程中再次启动返回状态错误
#[tokio::test]
async fn test_start_while_starting_is_rejected() {
    let data_service = Arc::new(SlowDataService {
        inner: CatalogDataService::in_memory(catalog(r#"{"box_quantity": "3"}"#)),
        delay: Duration::from_millis(200),
    });
    let f = fixture_with(test_settings(), data_service);

    let processor = f.processor.clone();
    let first = tokio::spawn(async move { processor.start(TASK_ID).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.processor.state(), ProcessorState::Starting);
    let err = f.processor.start(TASK_ID).await.unwrap_err();
    assert_eq!(err.error_code(), "STATE_TRANSITION_ERROR");

    first.await.unwrap().unwrap();
    assert!(f.processor.is_running());
    f.processor.stop().await.unwrap();
}

/// 扫码周期超过停止超时：强制中止并返回超时错误，设备仍然断开
#[tokio::test]
async fn test_stop_timeout_aborts_scan_loop() {
    let settings = ProcessorSettings { stop_timeout: Duration::from_millis(50), ..test_settings() };
    let f = fixture_with(settings, Arc::new(CatalogDataService::in_memory(catalog(r#"{"box_quantity": "3"}"#))));
    f.scanner.set_scan_delay(Duration::from_millis(500));

    f.processor.start(TASK_ID).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let err = f.processor.stop().await.unwrap_err();
    assert_eq!(err.error_code(), "TIMEOUT_ERROR");
    assert_eq!(f.processor.state(), ProcessorState::Idle);
    assert_eq!(f.scanner.close_calls(), 1);
}

/// 传感器触发：每个上升沿一个扫码周期
#[tokio::test]
async fn test_sensor_trigger_drives_scan_cycles() {
    let scanner = Arc::new(MockCodeReader::new_for_testing("TestScanner"));
    let plc = Arc::new(MockPlc::new_for_testing("TestPLC"));
    let store = Arc::new(MemoryAggregationStore::new());
    let trigger: Arc<dyn TriggerSource> = Arc::new(SensorEdgeTrigger::new(plc.clone()));

    let processor = Arc::new(LayerAggregationProcessor::new(
        test_settings(),
        Arc::new(CatalogDataService::in_memory(catalog(r#"{"box_quantity": "3"}"#))),
        ProcessorDevices { scanner: scanner.clone(), plc: Some(plc.clone() as Arc<dyn Plc>), label_printer: None },
        trigger.clone(),
        store.clone(),
        store.clone(),
    ));

    scanner.push_response(layer(&[1, 2, 3]));
    processor.start(TASK_ID).await.unwrap();
    assert!(plc.is_connected());
    assert!(trigger.is_armed().await);

    // 传感器未触发时不扫码
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scanner.scan_calls(), 0);

    plc.set_sensor(true);
    let observed = processor.clone();
    assert!(wait_for(|| observed.stats().committed_containers == 1).await);

    // 保持高电平不再触发
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scanner.scan_calls(), 1);

    processor.stop().await.unwrap();
    assert!(!trigger.is_armed().await);
    assert!(!plc.is_connected());
    assert_eq!(plc.close_calls(), 1);
}

/// 任务切换后唯一性集合按新任务加载
#[tokio::test]
async fn test_uniqueness_is_scoped_to_task() {
    let mut catalog = catalog(r#"{"box_quantity": "3"}"#);
    let mut second = catalog.tasks[0].clone();
    second.id = 2;
    catalog.tasks.push(second);

    let f = fixture_with(test_settings(), Arc::new(CatalogDataService::in_memory(catalog)));
    f.store.create_item(&code(1), TASK_ID, crate::models::enums::ItemStatus::Scanned).await.unwrap();

    f.scanner.push_response(layer(&[1, 2, 3]));
    f.processor.start(2).await.unwrap();
    let processor = f.processor.clone();
    assert!(wait_for(|| processor.stats().committed_containers == 1).await);
    f.processor.stop().await.unwrap();

    let containers = f.store.get_containers_by_task_id(2).await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].serial_number, 1);
    assert!(containers[0].created_at <= Utc::now());
}
