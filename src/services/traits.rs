/// 服务层trait定义
/// 任务处理器只依赖这些接口，具体设备与存储实现在 infrastructure 层

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::enums::{ContainerStatus, ItemStatus};
use crate::models::structs::{Container, Item, Product, Task};
use crate::services::domain::trigger::SignalStream;
use crate::utils::error::AppResult;

/// 任务/产品数据服务
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataService: Send + Sync {
    /// 按ID获取任务
    async fn get_task_by_id(&self, task_id: i64) -> AppResult<Task>;

    /// 按ID获取产品
    async fn get_product_by_id(&self, product_id: i64) -> AppResult<Product>;
}

/// 扫码器
///
/// `scan` 返回 NoRead 应答或以空白分隔的码；超时作为普通错误返回
#[async_trait]
pub trait CodeReader: Send + Sync {
    fn device_name(&self) -> &str;

    async fn connect(&self) -> AppResult<()>;

    async fn scan(&self) -> AppResult<String>;

    async fn close(&self) -> AppResult<()>;
}

/// PLC（产品到位传感器 + 剔除器）
#[async_trait]
pub trait Plc: Send + Sync {
    fn device_name(&self) -> &str;

    async fn connect(&self) -> AppResult<()>;

    /// 读取一次产品到位传感器
    async fn read_product_sensor(&self) -> AppResult<bool>;

    /// 启动传感器轮询，每个上升沿发出一个信号
    ///
    /// 轮询任务在 `cancel` 触发后退出
    async fn handle_product_signal(&self, cancel: CancellationToken) -> AppResult<SignalStream>;

    async fn rejector_on(&self) -> AppResult<()>;

    async fn rejector_off(&self) -> AppResult<()>;

    async fn close(&self) -> AppResult<()>;
}

/// 打印机传输层
#[async_trait]
pub trait PrinterTransport: Send + Sync {
    async fn connect(&self) -> AppResult<()>;

    async fn send(&self, content: &str) -> AppResult<()>;

    async fn close(&self) -> AppResult<()>;

    async fn is_connected(&self) -> bool;
}

/// 标签服务
#[async_trait]
pub trait LabelPrinter: Send + Sync {
    async fn connect(&self) -> AppResult<()>;

    async fn close(&self) -> AppResult<()>;

    /// 渲染并打印一张箱标签
    async fn print_label(
        &self,
        task: &Task,
        product: &Product,
        serial: i64,
        container_code: &str,
    ) -> AppResult<()>;
}

/// 聚合数据存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AggregationStore: Send + Sync {
    /// 创建箱码记录，返回箱ID
    async fn create_container(
        &self,
        code: &str,
        serial_number: i64,
        task_id: i64,
        status: ContainerStatus,
    ) -> AppResult<i64>;

    /// 创建单品码记录，返回单品ID
    async fn create_item(&self, code: &str, task_id: i64, status: ItemStatus) -> AppResult<i64>;

    /// 将单品码装入箱，状态改为 aggregated
    async fn assign_item_to_container(&self, item_id: i64, container_id: i64) -> AppResult<()>;

    /// 一次性提交一层：创建箱、创建每个单品码并装箱
    ///
    /// 全部成功或全部不生效；任一码已在本任务中落库时整层失败。返回箱ID
    async fn commit_layer(
        &self,
        container_code: &str,
        serial_number: i64,
        task_id: i64,
        codes: &[String],
    ) -> AppResult<i64>;

    async fn get_items_by_task_id(&self, task_id: i64) -> AppResult<Vec<Item>>;

    /// 任务下最大的箱序列号，没有箱时为 0
    async fn get_last_serial_number(&self, task_id: i64) -> AppResult<i64>;

    async fn get_containers_by_task_id(&self, task_id: i64) -> AppResult<Vec<Container>>;

    async fn get_items_by_container_id(&self, container_id: i64) -> AppResult<Vec<Item>>;
}

/// 序列号计数器的持久化
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SerialStore: Send + Sync {
    fn strategy_name(&self) -> &'static str;

    /// 任务最后发放的序列号，从未发放时为 0
    async fn load_last_serial(&self, task_id: i64) -> AppResult<i64>;

    /// 持久化最后发放的序列号，返回前必须落盘
    async fn persist_serial(&self, task_id: i64, serial: i64) -> AppResult<()>;
}

/// 任务处理器对外接口
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn start(&self, task_id: i64) -> AppResult<()>;

    async fn stop(&self) -> AppResult<()>;

    fn is_running(&self) -> bool;
}
