//! TCP 标签打印机传输层（原始端口，如 9100）

use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::services::traits::PrinterTransport;
use crate::utils::error::{AppError, AppResult};

const DEVICE: &str = "LabelPrinter";

pub struct TcpPrinter {
    address: String,
    connect_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpPrinter {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            stream: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PrinterTransport for TcpPrinter {
    async fn connect(&self) -> AppResult<()> {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => {
                *guard = Some(stream);
                info!("🖨️ [PRINTER] 已连接 {}", self.address);
                Ok(())
            }
            Ok(Err(e)) => Err(AppError::device_error(
                DEVICE,
                format!("无法连接打印机 {}: {}", self.address, e),
            )),
            Err(_) => Err(AppError::timeout_error("连接打印机", self.address.clone())),
        }
    }

    async fn send(&self, content: &str) -> AppResult<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| AppError::device_error(DEVICE, "打印机连接未建立"))?;

        let result = async {
            stream.write_all(content.as_bytes()).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = result {
            // 写失败后连接视为已关闭
            guard.take();
            return Err(AppError::device_error(DEVICE, format!("发送打印数据失败: {}", e)));
        }
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        if let Some(mut stream) = self.stream.lock().await.take() {
            if let Err(e) = stream.shutdown().await {
                warn!("[PRINTER] 关闭连接时出错: {}", e);
                return Err(AppError::device_error(DEVICE, format!("关闭打印机连接失败: {}", e)));
            }
            info!("[PRINTER] 已断开 {}", self.address);
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_reaches_printer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            socket.read_to_string(&mut received).await.unwrap();
            received
        });

        let printer = TcpPrinter::new(address, Duration::from_secs(1));
        assert!(printer.send("x").await.is_err());
        printer.connect().await.unwrap();
        assert!(printer.is_connected().await);
        printer.send("^XA^FDhello^FS^XZ").await.unwrap();
        printer.close().await.unwrap();
        assert!(!printer.is_connected().await);

        assert_eq!(server.await.unwrap(), "^XA^FDhello^FS^XZ");
    }
}
