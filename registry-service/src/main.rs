//! 图书馆注册服务入口
//!
//! 启动时先等待数据库就绪（最多 6 次，每次间隔 5 秒），无论结果如何都继续启动。
//! 数据库可达时执行迁移并创建默认管理员。

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use common::config::{load_dotenv, AppConfig};
use common::utils::{wait_for_database, WaitPolicy};
use registry_service::state::{pool_or_detached, AppState};
use registry_service::{create_router, init_tracing, SERVICE_NAME};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME);

    // 初始化日志追踪
    init_tracing(config.log_json);

    let outcome =
        wait_for_database(config.database_url.as_deref(), &WaitPolicy::from_config(&config)).await;

    // 创建应用状态（连接池延迟建立；未配置数据库时以降级模式运行）
    let pool = pool_or_detached(&config).await;
    let state = AppState::new(config.clone(), pool);

    if outcome.is_ready() {
        state.store.migrate().await?;
        state
            .store
            .seed_default_admin(&config.admin_username, &config.admin_password)
            .await?;
    } else {
        warn!(
            outcome = ?outcome,
            "数据库不可用，跳过迁移；数据库恢复后请运行 registry-cli migrate"
        );
    }

    let app = create_router(state);

    // 启动服务
    let addr = config.bind_address();
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败")?;

    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "无法监听 Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "无法监听 SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到 Ctrl+C，正在关闭"),
        _ = terminate => info!("收到终止信号，正在关闭"),
    }
}
