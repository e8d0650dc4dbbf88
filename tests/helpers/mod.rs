use std::net::SocketAddr;
use std::sync::Arc;

use levelgate::access::{AdminBypass, ConfigStore, PolicyEvaluator};
use tokio::task::JoinHandle;

/// Access API served on an ephemeral port, aborted on drop
pub struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    evaluator: Arc<PolicyEvaluator>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_bypass(AdminBypass::default()).await
    }

    pub async fn with_bypass(bypass: AdminBypass) -> Self {
        Self::with_store(ConfigStore::in_memory(), bypass).await
    }

    pub async fn with_store(store: ConfigStore, bypass: AdminBypass) -> Self {
        let evaluator = Arc::new(PolicyEvaluator::new(store, bypass));
        let app = levelgate::web::app(evaluator.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local addr");
        let handle = tokio::spawn(async move {
            axum_serve(listener, app).await;
        });

        Self {
            addr,
            handle,
            evaluator,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn evaluator(&self) -> &PolicyEvaluator {
        &self.evaluator
    }
}

async fn axum_serve(listener: tokio::net::TcpListener, app: axum::Router) {
    axum::serve(listener, app).await.expect("Test server failed");
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
