/// 应用程序主入口函数
///
/// 用法: packing-line <任务ID> [--config <配置文件路径>]
/// 启动任务后持续扫码，收到 Ctrl+C 后停止并输出统计
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{error, info};

use packing_line_lib::logging::init_logging;
use packing_line_lib::services::{build_processor, TaskProcessor};
use packing_line_lib::utils::load_app_config;

#[derive(Parser, Debug)]
#[command(name = "packing-line", about = "包装产线扫码聚合服务")]
struct Cli {
    /// 要执行的任务ID
    task_id: i64,

    /// 配置文件路径，缺省时使用默认位置
    #[arg(short, long, env = "PACKING_LINE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let task_id = cli.task_id;

    let config = load_app_config(cli.config).await?;
    init_logging(&config.logging_config)?;

    info!("=== {} 启动 ({}) ===", config.app_settings.app_name, config.app_settings.environment);

    let processor = build_processor(&config).await?;
    processor.start(task_id).await?;

    tokio::signal::ctrl_c().await.context("等待退出信号失败")?;
    info!("收到退出信号，正在停止任务 {}", task_id);

    if let Err(e) = processor.stop().await {
        error!("停止任务时出错: {}", e);
    }

    let stats = processor.stats();
    info!(
        "任务 {} 统计 - 扫码周期: {}, 成箱: {}, 单品码: {}, 拒绝层: {}, NoRead: {}, 打印失败: {}",
        task_id,
        stats.cycles_total,
        stats.committed_containers,
        stats.committed_codes,
        stats.rejected_layers(),
        stats.no_reads,
        stats.print_failures
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_task_and_config() {
        let cli = Cli::try_parse_from(["packing-line", "7", "--config", "line/app_config.json"]).unwrap();
        assert_eq!(cli.task_id, 7);
        assert_eq!(cli.config, Some(PathBuf::from("line/app_config.json")));

        let cli = Cli::try_parse_from(["packing-line", "-c", "other.json", "12"]).unwrap();
        assert_eq!(cli.task_id, 12);
        assert_eq!(cli.config, Some(PathBuf::from("other.json")));
    }

    #[test]
    fn test_cli_rejects_missing_or_invalid_task_id() {
        assert!(Cli::try_parse_from(["packing-line"]).is_err());
        assert!(Cli::try_parse_from(["packing-line", "abc"]).is_err());
        assert!(Cli::try_parse_from(["packing-line", "1", "2"]).is_err());
    }
}
