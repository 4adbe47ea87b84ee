//! 标签数据
//!
//! `LabelData` 是产品上携带的标签信息（JSON），`LabelTemplateData`
//! 是渲染模板时使用的扁平数据

use serde::{Deserialize, Serialize};

use crate::models::structs::{Product, Task};

/// 产品标签数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelData {
    /// 货号
    pub article: String,
    /// 每箱数量
    pub box_quantity: String,
    /// 箱重（kg）
    pub box_weight: String,
    /// 箱 GTIN
    pub gtin: String,
    /// 标签抬头
    pub header: String,
    /// 标签上的产品名称
    pub label_name: String,
    /// 执行标准
    pub standard: String,
    /// 单件重量（g）
    pub unit_weight: String,
    /// 每层数量，缺省时按每箱数量
    pub layer_quantity: Option<String>,
}

impl LabelData {
    /// 一次扫码应读到的码数量
    pub fn layer_capacity(&self) -> Option<usize> {
        let parse = |raw: &str| raw.trim().parse::<usize>().ok().filter(|n| *n > 0);
        self.layer_quantity
            .as_deref()
            .and_then(parse)
            .or_else(|| parse(&self.box_quantity))
    }
}

/// 模板渲染数据
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabelTemplateData {
    pub product_name: String,
    pub article: String,
    pub header: String,
    pub label_name: String,
    pub standard: String,
    pub unit_weight: String,
    pub box_quantity: String,
    pub box_weight: String,
    pub gtin: String,
    /// 生产日期 DD.MM.YYYY
    pub date: String,
    pub batch_number: String,
    pub packer: String,
    pub serial_number: String,
    /// 箱码（GTIN + 批号 + 序列号）
    pub container_barcode: String,
    /// GS1-128 条码数据
    pub barcode128_data: String,
    /// GS1-128 人读文本
    pub barcode128_text: String,
}

/// `LabelTemplateData` 构建器
#[derive(Debug, Default)]
pub struct LabelTemplateDataBuilder {
    data: LabelTemplateData,
}

impl LabelTemplateDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 填充产品信息，标签数据解析失败时只使用产品本身的字段
    pub fn with_product(mut self, product: &Product) -> Self {
        let label = match product.parse_label_data() {
            Ok(label) => label.unwrap_or_default(),
            Err(e) => {
                log::warn!("[LABEL] 产品 {} 的标签数据解析失败: {}", product.id, e);
                LabelData::default()
            }
        };

        self.data.product_name = product.name.clone();
        self.data.article = label.article;
        self.data.header = label.header;
        self.data.label_name = if label.label_name.is_empty() { product.name.clone() } else { label.label_name };
        self.data.standard = label.standard;
        self.data.unit_weight = label.unit_weight;
        self.data.box_quantity = label.box_quantity;
        self.data.box_weight = label.box_weight;
        self.data.gtin = if label.gtin.is_empty() { product.gtin.clone() } else { label.gtin };
        self
    }

    pub fn with_task(mut self, task: &Task) -> Self {
        self.data.date = task.date.clone();
        self.data.batch_number = task.batch_number.clone();
        self
    }

    pub fn with_packer(mut self, packer: impl Into<String>) -> Self {
        self.data.packer = packer.into();
        self
    }

    pub fn with_serial_number(mut self, serial: i64, container_code: impl Into<String>) -> Self {
        self.data.serial_number = serial.to_string();
        self.data.container_barcode = container_code.into();
        self
    }

    pub fn build(mut self) -> LabelTemplateData {
        self.data.barcode128_data = format!("01{}10{}", self.data.gtin, self.data.batch_number);
        self.data.barcode128_text = format!("(01){}(10){}", self.data.gtin, self.data.batch_number);
        self.data
    }
}
