// ==========================================
// 车间执行追踪系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 说明: 连接按请求打开, 这里只持有进程级共享资源
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{MasterDataApi, ShopFloorApi, TrackerService};
use crate::config::config_manager::ConfigManager;
use crate::db::{ensure_schema, open_sqlite_connection, read_schema_version};
use crate::engine::{EntityLockRegistry, OptionalEventPublisher, ShopFloorEventPublisher};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 车间执行API
    pub shop_floor_api: Arc<ShopFloorApi>,

    /// 主数据API
    pub master_data_api: Arc<MasterDataApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 实体锁注册表 (同一进程内的全部请求共享)
    pub locks: Arc<EntityLockRegistry>,

    /// 事件发布器
    pub event_publisher: OptionalEventPublisher,
}

impl AppState {
    /// 创建新的AppState实例 (不挂接事件发布者)
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_publisher(db_path, OptionalEventPublisher::none())
    }

    /// 创建AppState并挂接外部事件发布者
    pub fn with_event_publisher(
        db_path: String,
        publisher: Arc<dyn ShopFloorEventPublisher>,
    ) -> Result<Self, String> {
        Self::with_publisher(db_path, OptionalEventPublisher::with_publisher(publisher))
    }

    /// # 说明
    /// 该方法会：
    /// 1. 建表 (幂等) 并检查 schema 版本
    /// 2. 初始化配置管理器
    /// 3. 创建所有API实例
    fn with_publisher(db_path: String, publisher: OptionalEventPublisher) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("初始化数据库结构失败: {}", e))?;
        match read_schema_version(&conn) {
            Ok(version) => tracing::info!(schema_version = ?version, "数据库结构就绪"),
            Err(e) => tracing::warn!("读取 schema_version 失败(将继续启动): {}", e),
        }

        let config_manager = Arc::new(
            ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let locks = Arc::new(EntityLockRegistry::new());

        let shop_floor_api = Arc::new(ShopFloorApi::new(
            db_path.clone(),
            locks.clone(),
            config_manager.clone(),
            publisher.clone(),
        ));
        let master_data_api = Arc::new(MasterDataApi::new(
            db_path.clone(),
            locks.clone(),
            publisher.clone(),
        ));

        tracing::info!(
            event_publisher = publisher.is_configured(),
            "AppState初始化完成"
        );

        Ok(Self {
            db_path,
            shop_floor_api,
            master_data_api,
            config_manager,
            locks,
            event_publisher: publisher,
        })
    }

    /// 请求分发服务
    pub fn tracker_service(&self) -> TrackerService {
        TrackerService::new(self.shop_floor_api.clone(), self.master_data_api.clone())
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 SHOP_FLOOR_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("SHOP_FLOOR_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./shop_floor_tracker.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("shop-floor-tracker");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("shop_floor_tracker.db");
        }
    }

    path.to_string_lossy().to_string()
}
