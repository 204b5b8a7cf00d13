//! Application state wiring all chat components together.
//!
//! AppState holds the concrete component instances used by both the CLI
//! and the HTTP/WebSocket layer. The core components are generic over the
//! repository and assignment-policy traits, but AppState pins them to the
//! concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use hostdesk_core::chat::assign::ManualClaimPolicy;
use hostdesk_core::chat::lifecycle::SessionLifecycleManager;
use hostdesk_core::chat::registry::ConnectionRegistry;
use hostdesk_core::chat::router::MessageRouter;
use hostdesk_core::chat::typing::TypingTracker;
use hostdesk_core::event::EventBus;
use hostdesk_infra::config::{load_chat_config, resolve_data_dir};
use hostdesk_infra::sqlite::chat::SqliteChatRepository;
use hostdesk_infra::sqlite::identity::SqlitePortalDirectory;
use hostdesk_infra::sqlite::pool::DatabasePool;
use hostdesk_types::config::ChatConfig;

/// Concrete type aliases for the component generics pinned to infra
/// implementations.
pub type ConcretePolicy = ManualClaimPolicy<SqliteChatRepository>;
pub type ConcreteLifecycle = SessionLifecycleManager<SqliteChatRepository, ConcretePolicy>;
pub type ConcreteRouter = MessageRouter<SqliteChatRepository, ConcretePolicy>;

/// Shared application state holding all chat components.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<ConcreteLifecycle>,
    pub router: Arc<ConcreteRouter>,
    pub registry: Arc<ConnectionRegistry>,
    pub identity: Arc<SqlitePortalDirectory>,
    pub repo: Arc<SqliteChatRepository>,
    pub bus: EventBus,
    pub config: ChatConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: connect to DB, load config,
    /// wire components.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_chat_config(&data_dir).await;

        // Initialize database
        let db_url = format!(
            "sqlite://{}?mode=rwc",
            data_dir.join("hostdesk.db").display()
        );
        let db_pool = DatabasePool::new(&db_url).await?;

        Ok(Self::wire(db_pool, config, data_dir))
    }

    /// Wire components onto an existing pool.
    fn wire(db_pool: DatabasePool, config: ChatConfig, data_dir: PathBuf) -> Self {
        let repo = Arc::new(SqliteChatRepository::new(db_pool.clone()));
        let identity = Arc::new(SqlitePortalDirectory::new(db_pool));
        let registry = Arc::new(ConnectionRegistry::new());
        let typing = Arc::new(TypingTracker::new(config.typing_ceiling()));
        let bus = EventBus::new(config.event_capacity);

        let lifecycle = Arc::new(SessionLifecycleManager::new(
            repo.clone(),
            ManualClaimPolicy::new(repo.clone()),
            registry.clone(),
            typing.clone(),
            bus.clone(),
            config.clone(),
        ));
        let router = Arc::new(MessageRouter::new(
            repo.clone(),
            lifecycle.clone(),
            registry.clone(),
            typing,
        ));

        Self {
            lifecycle,
            router,
            registry,
            identity,
            repo,
            bus,
            config,
            data_dir,
        }
    }
}
