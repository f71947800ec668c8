use jazzcash_gateway::{
    api::routes,
    app_state::AppState,
    config::AppConfig,
    infrastructure::{database::init_database, logging::init_logging},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化配置
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    // 初始化日志
    init_logging(&config)?;

    info!(
        "Starting {} in {} mode",
        config.service_name, config.environment
    );
    info!("Gateway profile: {}", config.jazzcash.summary());

    // 初始化数据库连接
    let db_pool = init_database(&config).await?;

    // 创建应用状态
    let app_state = Arc::new(AppState::new(config.clone(), db_pool)?);

    // 初始化路由
    let app = routes::create_router(app_state);

    // 启动服务器
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
