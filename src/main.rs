use std::sync::Arc;
use tracing::{error, info};

use book_service::models::storage::{BookStore, MemoryBackend, MongoBackend};
use book_service::routes;

type Store = Arc<dyn BookStore + Send + Sync>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("book_service=info,tower_http=info")
        .init();

    let backend_type = std::env::var("BACKEND_TYPE").unwrap_or_else(|_| "mongo".to_string());
    let store: Store = match backend_type.to_lowercase().as_str() {
        "memory" => {
            info!("Using in-memory backend");
            Arc::new(MemoryBackend::new())
        }
        "mongo" | _ => {
            let mongo_url = std::env::var("MONGO_URL")
                .unwrap_or_else(|_| "mongodb://mongo:27017".to_string());
            let mongo_db = std::env::var("MONGO_DB").unwrap_or_else(|_| "library_db".to_string());

            info!("Using MongoDB backend");
            let mongo_backend = MongoBackend::new(&mongo_url, &mongo_db)
                .await
                .expect("Failed to connect to MongoDB");

            Arc::new(mongo_backend)
        }
    };

    if let Err(e) = store.test_connection().await {
        error!("Failed to connect to storage backend: {}", e);
        std::process::exit(1);
    }
    info!("Storage backend connection successful");

    let app = routes::router(store);

    let port = std::env::var("PORT").unwrap_or_else(|_| "7004".to_string());
    let addr = format!("0.0.0.0:{}", port);

    info!("Book service starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
