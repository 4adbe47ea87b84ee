//! # 标签服务
//!
//! 根据任务、产品和序列号渲染箱标签（Tera 模板），再通过打印机传输层发送。
//! 模板文件不存在时使用内置模板。

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::{debug, info, warn};
use tera::{Context, Tera};

use crate::models::label::{LabelTemplateData, LabelTemplateDataBuilder};
use crate::models::structs::{Product, Task};
use crate::services::traits::{LabelPrinter, PrinterTransport};
use crate::utils::error::{AppError, AppResult};

/// 内置箱标签模板（ZPL）
pub const DEFAULT_LABEL_TEMPLATE: &str = r#"^XA
^CI28
^FO40,30^A0N,28,28^FD{{ header }}^FS
^FO40,70^A0N,36,36^FD{{ label_name }}^FS
^FO40,120^A0N,24,24^FDАрт. {{ article }}  {{ standard }}^FS
^FO40,150^A0N,24,24^FDВес ед.: {{ unit_weight }} г  Кол-во: {{ box_quantity }} шт  Вес короба: {{ box_weight }} кг^FS
^FO40,180^A0N,24,24^FDДата: {{ date }}  Партия: {{ batch_number }}  Упаковщик: {{ packer }}^FS
^FO40,210^A0N,24,24^FDКороб № {{ serial_number }}^FS
^FO40,250^BY2^BCN,80,N,N^FD>;>8{{ barcode128_data }}^FS
^FO40,340^A0N,22,22^FD{{ barcode128_text }}^FS
^FO480,230^BXN,5,200^FD{{ container_barcode }}^FS
^XZ
"#;

pub struct LabelService {
    transport: Arc<dyn PrinterTransport>,
    template_dir: PathBuf,
    template_name: String,
    packer: RwLock<String>,
}

impl LabelService {
    pub fn new(
        transport: Arc<dyn PrinterTransport>,
        template_dir: impl Into<PathBuf>,
        template_name: impl Into<String>,
        default_packer: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            template_dir: template_dir.into(),
            template_name: template_name.into(),
            packer: RwLock::new(default_packer.into()),
        }
    }

    /// 更换包装工
    pub fn change_packer(&self, packer: impl Into<String>) {
        let packer = packer.into();
        match self.packer.write() {
            Ok(mut current) => {
                info!("[LABEL] 包装工变更: {} → {}", current, packer);
                *current = packer;
            }
            Err(_) => warn!("[LABEL] 包装工锁已损坏，忽略变更"),
        }
    }

    pub fn packer(&self) -> String {
        self.packer.read().map(|p| p.clone()).unwrap_or_default()
    }

    async fn load_template(&self) -> AppResult<String> {
        let path = self.template_dir.join(&self.template_name);
        match tokio::fs::read_to_string(&path).await {
            Ok(template) => Ok(template),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("[LABEL] 模板 {} 不存在，使用内置模板", path.display());
                Ok(DEFAULT_LABEL_TEMPLATE.to_string())
            }
            Err(e) => Err(AppError::io_error(
                format!("读取标签模板 {} 失败: {}", path.display(), e),
                format!("{:?}", e.kind()),
            )),
        }
    }

    /// 渲染标签
    pub async fn render(&self, data: &LabelTemplateData) -> AppResult<String> {
        let template = self.load_template().await?;
        let context = Context::from_serialize(data)?;
        Ok(Tera::one_off(&template, &context, false)?)
    }

    /// 发送已渲染的内容，连接断开时先重连
    pub async fn print(&self, content: &str) -> AppResult<()> {
        if !self.transport.is_connected().await {
            self.transport.connect().await?;
        }
        self.transport.send(content).await
    }
}

#[async_trait]
impl LabelPrinter for LabelService {
    async fn connect(&self) -> AppResult<()> {
        self.transport.connect().await
    }

    async fn close(&self) -> AppResult<()> {
        self.transport.close().await
    }

    async fn print_label(&self, task: &Task, product: &Product, serial: i64, container_code: &str) -> AppResult<()> {
        let data = LabelTemplateDataBuilder::new()
            .with_product(product)
            .with_task(task)
            .with_packer(self.packer())
            .with_serial_number(serial, container_code)
            .build();

        let content = self.render(&data).await?;
        self.print(&content).await?;
        debug!("[LABEL] 任务 {} 箱 {} 标签已发送", task.id, serial);
        Ok(())
    }
}
