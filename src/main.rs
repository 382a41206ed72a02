// ==========================================
// 车间执行追踪系统 - 服务主入口
// ==========================================
// 协议: stdin 每行一个 JSON 请求, stdout 每行一个 JSON 响应
// 说明: 同一次读取到的多行请求并发处理, 响应按请求顺序输出
// ==========================================

use shop_floor_tracker::app::{get_default_db_path, AppState};
use shop_floor_tracker::engine::TracingEventPublisher;
use shop_floor_tracker::logging;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// 单批最大并发请求数
const MAX_BATCH: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", shop_floor_tracker::APP_NAME);
    tracing::info!("系统版本: {}", shop_floor_tracker::VERSION);
    tracing::info!("==================================================");

    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::with_event_publisher(db_path, Arc::new(TracingEventPublisher))
        .map_err(anyhow::Error::msg)?;
    let service = state.tracker_service();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(first) = lines.next_line().await? {
        let mut batch = vec![first];
        // 读取缓冲区中已就绪的后续行, 合成一批
        while batch.len() < MAX_BATCH {
            match tokio::time::timeout(std::time::Duration::from_millis(2), lines.next_line()).await {
                Ok(Ok(Some(line))) => batch.push(line),
                Ok(Ok(None)) | Err(_) => break,
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        batch.retain(|line| !line.trim().is_empty());
        if batch.is_empty() {
            continue;
        }

        for response in service.handle_batch(batch).await {
            let mut payload = serde_json::to_vec(&response)?;
            payload.push(b'\n');
            stdout.write_all(&payload).await?;
        }
        stdout.flush().await?;
    }

    shop_floor_tracker::perf::log_summary();
    tracing::info!("输入结束, 服务退出");
    Ok(())
}
