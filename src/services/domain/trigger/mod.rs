//! # 扫码触发源
//!
//! 触发源决定何时执行一次扫码周期，有两种实现：
//! - [`TimerTrigger`]: 固定间隔触发
//! - [`SensorEdgeTrigger`]: PLC 产品到位传感器上升沿触发
//!
//! 信号通道都是有界的，发送端使用 `try_send`，通道满时丢弃信号，
//! 轮询/计时任务永远不会因为消费者慢而阻塞。

pub mod timer_trigger;
pub mod sensor_trigger;

pub use timer_trigger::TimerTrigger;
pub use sensor_trigger::SensorEdgeTrigger;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::utils::error::{AppError, AppResult};

/// 后台任务退出的最长等待时间
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 一次扫码机会
#[derive(Debug, Clone, Copy)]
pub struct TriggerSignal {
    pub emitted_at: Instant,
}

impl TriggerSignal {
    pub fn now() -> Self {
        Self { emitted_at: Instant::now() }
    }
}

/// 信号接收端及产生信号的后台任务
pub struct SignalStream {
    pub receiver: mpsc::Receiver<TriggerSignal>,
    pub worker: JoinHandle<()>,
}

/// 触发源
#[async_trait]
pub trait TriggerSource: Send + Sync {
    fn source_name(&self) -> &str;

    /// 启动触发源，后台任务在 `cancel` 或 `stop` 时退出
    ///
    /// 已启动时返回错误
    async fn wait_signal(&self, cancel: CancellationToken) -> AppResult<()>;

    /// 取出信号接收端，只能取一次
    async fn take_signal_receiver(&self) -> Option<mpsc::Receiver<TriggerSignal>>;

    /// 停止触发源并等待后台任务退出
    async fn stop(&self) -> AppResult<()>;

    async fn is_armed(&self) -> bool;
}

/// 上升沿检测器
#[derive(Debug, Default, Clone, Copy)]
pub struct RisingEdgeDetector {
    previous: bool,
}

impl RisingEdgeDetector {
    /// 输入一次采样，上一次为 false 且本次为 true 时返回 true
    pub fn observe(&mut self, current: bool) -> bool {
        let rising = !self.previous && current;
        self.previous = current;
        rising
    }
}

/// 启动传感器轮询任务
///
/// 每个 `poll_interval` 读取一次传感器，检测到上升沿时发送信号。
/// 读取失败只记录日志，轮询继续。
pub fn spawn_sensor_poller<F, Fut>(
    source: String,
    mut read: F,
    poll_interval: Duration,
    buffer_size: usize,
    cancel: CancellationToken,
) -> SignalStream
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = AppResult<bool>> + Send + 'static,
{
    let (tx, receiver) = mpsc::channel(buffer_size.max(1));

    let worker = tokio::spawn(async move {
        let mut detector = RisingEdgeDetector::default();
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut read_failing = false;

        info!("🔧 [{}] 传感器轮询已启动, 间隔: {:?}", source, poll_interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let reading = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                reading = read() => reading,
            };

            match reading {
                Ok(active) => {
                    if read_failing {
                        info!("[{}] 传感器读取已恢复", source);
                        read_failing = false;
                    }
                    if detector.observe(active) {
                        match tx.try_send(TriggerSignal::now()) {
                            Ok(()) => debug!("[{}] 检测到产品上升沿", source),
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                warn!("[{}] 信号通道已满，丢弃产品信号", source);
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                debug!("[{}] 信号接收端已关闭", source);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    if !read_failing {
                        crate::log_communication_failure!("[{}] 读取传感器失败: {}", source, e);
                        read_failing = true;
                    } else {
                        debug!("[{}] 读取传感器仍然失败: {}", source, e);
                    }
                }
            }
        }

        info!("🔧 [{}] 传感器轮询已停止", source);
    });

    SignalStream { receiver, worker }
}

/// 一个已启动触发源的运行时状态
struct ArmedState {
    cancel: CancellationToken,
    worker: JoinHandle<()>,
    receiver: Option<mpsc::Receiver<TriggerSignal>>,
}

/// 两种触发源共用的启动/停止逻辑
#[derive(Default)]
pub(crate) struct TriggerSlot {
    armed: Mutex<Option<ArmedState>>,
}

impl TriggerSlot {
    /// 通过 `spawn` 启动后台任务并保存其状态
    pub(crate) async fn arm<F, Fut>(&self, name: &str, cancel: CancellationToken, spawn: F) -> AppResult<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = AppResult<SignalStream>> + Send,
    {
        let mut armed = self.armed.lock().await;
        if armed.is_some() {
            return Err(AppError::state_transition_error(
                "Armed",
                "Armed",
                format!("触发源 {} 已在运行", name),
            ));
        }

        let token = cancel.child_token();
        let stream = spawn(token.clone()).await?;
        *armed = Some(ArmedState {
            cancel: token,
            worker: stream.worker,
            receiver: Some(stream.receiver),
        });
        Ok(())
    }

    pub(crate) async fn take_receiver(&self) -> Option<mpsc::Receiver<TriggerSignal>> {
        self.armed.lock().await.as_mut().and_then(|state| state.receiver.take())
    }

    pub(crate) async fn is_armed(&self) -> bool {
        self.armed.lock().await.is_some()
    }

    /// 取消后台任务并等待其退出，超时则强制中止
    pub(crate) async fn disarm(&self, name: &str) -> AppResult<()> {
        let state = match self.armed.lock().await.take() {
            Some(state) => state,
            None => return Ok(()),
        };

        state.cancel.cancel();
        let mut worker = state.worker;
        match tokio::time::timeout(WORKER_JOIN_TIMEOUT, &mut worker).await {
            Ok(Ok(())) => {
                debug!("[{}] 后台任务已退出", name);
                Ok(())
            }
            Ok(Err(e)) => Err(AppError::concurrency_error(format!("触发源 {} 后台任务异常退出: {}", name, e))),
            Err(_) => {
                worker.abort();
                Err(AppError::timeout_error(
                    format!("停止触发源 {}", name),
                    "后台任务未在规定时间内退出，已强制中止",
                ))
            }
        }
    }
}
