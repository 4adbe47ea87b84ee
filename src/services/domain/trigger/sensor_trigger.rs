//! 传感器上升沿触发源
//!
//! 轮询由 PLC 适配器完成（见 [`Plc::handle_product_signal`]），
//! 这里只负责启动、转交信号通道和停止。

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{TriggerSignal, TriggerSlot, TriggerSource};
use crate::services::traits::Plc;
use crate::utils::error::AppResult;

pub struct SensorEdgeTrigger {
    name: String,
    plc: Arc<dyn Plc>,
    slot: TriggerSlot,
}

impl SensorEdgeTrigger {
    pub fn new(plc: Arc<dyn Plc>) -> Self {
        Self {
            name: format!("SENSOR_TRIGGER:{}", plc.device_name()),
            plc,
            slot: TriggerSlot::default(),
        }
    }
}

#[async_trait]
impl TriggerSource for SensorEdgeTrigger {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn wait_signal(&self, cancel: CancellationToken) -> AppResult<()> {
        let plc = self.plc.clone();
        self.slot
            .arm(&self.name, cancel, |token| async move { plc.handle_product_signal(token).await })
            .await?;

        info!("📡 [{}] 传感器触发已启动", self.name);
        Ok(())
    }

    async fn take_signal_receiver(&self) -> Option<mpsc::Receiver<TriggerSignal>> {
        self.slot.take_receiver().await
    }

    async fn stop(&self) -> AppResult<()> {
        self.slot.disarm(&self.name).await
    }

    async fn is_armed(&self) -> bool {
        self.slot.is_armed().await
    }
}
