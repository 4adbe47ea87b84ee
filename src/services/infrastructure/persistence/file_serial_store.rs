//! 基于文件的序列号计数器
//!
//! 每个任务一个文件 `task_<id>.counter`，内容为最后发放的序列号。
//! 写入先落到临时文件并 fsync，再原子改名覆盖。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::io::AsyncWriteExt;

use crate::services::traits::SerialStore;
use crate::utils::error::{AppError, AppResult};

pub struct FileSerialStore {
    directory: PathBuf,
}

impl FileSerialStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    pub fn counter_path(&self, task_id: i64) -> PathBuf {
        self.directory.join(format!("task_{}.counter", task_id))
    }

    fn io_err(action: &str, path: &Path, e: std::io::Error) -> AppError {
        AppError::io_error(format!("{} {} 失败: {}", action, path.display(), e), format!("{:?}", e.kind()))
    }
}

#[async_trait]
impl SerialStore for FileSerialStore {
    fn strategy_name(&self) -> &'static str {
        "file"
    }

    async fn load_last_serial(&self, task_id: i64) -> AppResult<i64> {
        let path = self.counter_path(task_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Self::io_err("读取序列号文件", &path, e)),
        };

        content.trim().parse::<i64>().map_err(|e| {
            AppError::persistence_error(format!("序列号文件 {} 内容无效 ({:?}): {}", path.display(), content.trim(), e))
        })
    }

    async fn persist_serial(&self, task_id: i64, serial: i64) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| Self::io_err("创建序列号目录", &self.directory, e))?;

        let path = self.counter_path(task_id);
        let tmp_path = path.with_extension("counter.tmp");

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| Self::io_err("创建临时文件", &tmp_path, e))?;
        file.write_all(serial.to_string().as_bytes())
            .await
            .map_err(|e| Self::io_err("写入临时文件", &tmp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| Self::io_err("同步临时文件", &tmp_path, e))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| Self::io_err("替换序列号文件", &path, e))?;

        debug!("[FILE_SERIAL] 任务 {} 序列号 {} 已写入 {}", task_id, serial, path.display());
        Ok(())
    }
}
