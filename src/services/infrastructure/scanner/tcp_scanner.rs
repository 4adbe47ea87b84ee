//! TCP 扫码器（相机）
//!
//! 每次扫码发送一次扫码命令，读取一行以 `\n` 结尾的应答。
//! 通讯出错后丢弃连接，下一次扫码时自动重连。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::services::traits::CodeReader;
use crate::utils::config::ScannerConfig;
use crate::utils::error::{AppError, AppResult};

const RESPONSE_SUFFIX: u8 = b'\n';

#[derive(Debug, Clone)]
pub struct TcpScannerConfig {
    pub address: String,
    pub scan_command: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl From<&ScannerConfig> for TcpScannerConfig {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            address: config.address.clone(),
            scan_command: config.scan_command.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }
}

struct ScannerConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

pub struct TcpScanner {
    name: String,
    config: TcpScannerConfig,
    connection: Mutex<Option<ScannerConnection>>,
    /// 连接因通讯错误丢失，下一次扫码时重连
    connection_lost: AtomicBool,
}

impl TcpScanner {
    pub fn new(config: TcpScannerConfig) -> Self {
        Self {
            name: format!("Scanner@{}", config.address),
            config,
            connection: Mutex::new(None),
            connection_lost: AtomicBool::new(false),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    async fn open(&self) -> AppResult<ScannerConnection> {
        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(&self.config.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(AppError::device_error(&self.name, format!("连接失败: {}", e))),
            Err(_) => {
                return Err(AppError::timeout_error(
                    "连接扫码器",
                    format!("{} 在 {:?} 内无响应", self.config.address, self.config.connect_timeout),
                ))
            }
        };
        let _ = stream.set_nodelay(true);
        let (read_half, writer) = stream.into_split();
        Ok(ScannerConnection {
            reader: BufReader::new(read_half),
            writer,
        })
    }

    async fn exchange(&self, conn: &mut ScannerConnection) -> AppResult<String> {
        match timeout(self.config.write_timeout, conn.writer.write_all(self.config.scan_command.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(AppError::device_error(&self.name, format!("发送扫码命令失败: {}", e))),
            Err(_) => return Err(AppError::timeout_error("发送扫码命令", self.name.clone())),
        }

        let mut buffer = Vec::new();
        let read = match timeout(self.config.read_timeout, conn.reader.read_until(RESPONSE_SUFFIX, &mut buffer)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(AppError::device_error(&self.name, format!("读取应答失败: {}", e))),
            Err(_) => return Err(AppError::timeout_error("读取扫码应答", self.name.clone())),
        };

        if read == 0 {
            return Err(AppError::device_error(&self.name, "连接已被扫码器关闭"));
        }

        Ok(String::from_utf8_lossy(&buffer).trim().to_string())
    }
}

#[async_trait]
impl CodeReader for TcpScanner {
    fn device_name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> AppResult<()> {
        let mut guard = self.connection.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(self.open().await?);
        self.connection_lost.store(false, Ordering::SeqCst);
        info!("📷 [SCANNER] 已连接 {}", self.config.address);
        Ok(())
    }

    async fn scan(&self) -> AppResult<String> {
        let mut guard = self.connection.lock().await;

        if guard.is_none() && self.connection_lost.load(Ordering::SeqCst) {
            info!("[SCANNER] 尝试重连 {}", self.config.address);
            *guard = Some(self.open().await?);
            self.connection_lost.store(false, Ordering::SeqCst);
        }

        let conn = guard
            .as_mut()
            .ok_or_else(|| AppError::device_error(&self.name, "扫码器未连接"))?;

        match self.exchange(conn).await {
            Ok(response) => {
                debug!("[SCANNER] 应答: {}", response);
                Ok(response)
            }
            Err(e) => {
                // 应答可能滞后到达，丢弃连接以免下一次读到旧数据
                guard.take();
                self.connection_lost.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn close(&self) -> AppResult<()> {
        self.connection_lost.store(false, Ordering::SeqCst);
        if let Some(mut conn) = self.connection.lock().await.take() {
            if let Err(e) = conn.writer.shutdown().await {
                warn!("[SCANNER] 关闭连接时出错: {}", e);
                return Err(AppError::device_error(&self.name, format!("关闭连接失败: {}", e)));
            }
            info!("[SCANNER] 已断开 {}", self.config.address);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config_for(address: String) -> TcpScannerConfig {
        TcpScannerConfig {
            address,
            scan_command: "TRIGGER\r\n".to_string(),
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_millis(200),
        }
    }

    /// 启动一个模拟相机，对每条命令依次返回 `answers`
    async fn spawn_camera(answers: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            for answer in answers {
                if socket.read(&mut buf).await.unwrap_or(0) == 0 {
                    return;
                }
                if !answer.is_empty() {
                    socket.write_all(answer.as_bytes()).await.unwrap();
                }
            }
            // 保持连接直到客户端关闭
            let _ = socket.read(&mut buf).await;
        });
        address
    }

    #[tokio::test]
    async fn test_scan_reads_trimmed_line() {
        let address = spawn_camera(vec!["A B C\r\n", "NoRead\r\n"]).await;
        let scanner = TcpScanner::new(config_for(address));

        scanner.connect().await.unwrap();
        assert_eq!(scanner.scan().await.unwrap(), "A B C");
        assert_eq!(scanner.scan().await.unwrap(), "NoRead");
        scanner.close().await.unwrap();
        assert!(!scanner.is_connected().await);
    }

    #[tokio::test]
    async fn test_scan_timeout_is_an_error() {
        // 空应答：相机收到命令但不回复
        let address = spawn_camera(vec![""]).await;
        let scanner = TcpScanner::new(config_for(address));
        scanner.connect().await.unwrap();

        let err = scanner.scan().await.unwrap_err();
        assert_eq!(err.error_code(), "TIMEOUT_ERROR");
        assert!(!scanner.is_connected().await);
    }

    #[tokio::test]
    async fn test_scan_without_connect_fails() {
        let scanner = TcpScanner::new(config_for("127.0.0.1:1".to_string()));
        let err = scanner.scan().await.unwrap_err();
        assert_eq!(err.error_code(), "DEVICE_ERROR");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let scanner = TcpScanner::new(config_for(address));
        assert!(scanner.connect().await.is_err());
        assert!(!scanner.is_connected().await);
    }
}
