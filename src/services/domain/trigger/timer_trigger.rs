//! 定时触发源
//!
//! 固定间隔发出扫码信号。通道容量为 1，消费者未就绪时丢弃本次节拍，
//! 不累积过期的扫码机会。

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{SignalStream, TriggerSignal, TriggerSlot, TriggerSource};
use crate::utils::error::{AppError, AppResult};

pub struct TimerTrigger {
    name: String,
    period: Duration,
    slot: TriggerSlot,
}

impl TimerTrigger {
    pub fn new(period: Duration) -> Self {
        Self {
            name: "TIMER_TRIGGER".to_string(),
            period,
            slot: TriggerSlot::default(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    fn spawn_ticker(name: String, period: Duration, cancel: CancellationToken) -> SignalStream {
        let (tx, receiver) = mpsc::channel(1);

        let worker = tokio::spawn(async move {
            // 第一次信号在一个周期之后
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match tx.try_send(TriggerSignal::now()) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                debug!("[{}] 上一个信号尚未处理，丢弃本次节拍", name);
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }

            info!("⏱️ [{}] 定时器已停止", name);
        });

        SignalStream { receiver, worker }
    }
}

#[async_trait]
impl TriggerSource for TimerTrigger {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn wait_signal(&self, cancel: CancellationToken) -> AppResult<()> {
        if self.period.is_zero() {
            return Err(AppError::configuration_error("定时触发间隔必须大于0"));
        }

        let name = self.name.clone();
        let period = self.period;
        self.slot
            .arm(&self.name, cancel, |token| async move { Ok(Self::spawn_ticker(name, period, token)) })
            .await?;

        info!("⏱️ [{}] 定时器已启动, 间隔: {:?}", self.name, self.period);
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
