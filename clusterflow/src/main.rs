use std::sync::Arc;

use anyhow::Context;
use clusterflow::api::{self, AppState};
use clusterflow::cluster::{EventStream, InMemoryCluster, ResourceStore};
use clusterflow::config::{Backend, ServiceConfig};
use clusterflow::telemetry::init_tracing;
use clusterflow::templates::{BuiltinTemplates, DirectoryTemplates, TemplateSource};
use tracing::{info, warn};

async fn backend(config: &ServiceConfig) -> anyhow::Result<(Arc<dyn ResourceStore>, Arc<dyn EventStream>)> {
    match config.backend {
        #[cfg(feature = "kube")]
        Backend::Kube => {
            let cluster = Arc::new(
                clusterflow::cluster::KubeCluster::connect()
                    .await
                    .context("connect to the Kubernetes API server failed")?,
            );
            Ok((cluster.clone(), cluster))
        }
        #[cfg(not(feature = "kube"))]
        Backend::Kube => anyhow::bail!("backend 'kube' requires the 'kube' feature"),
        Backend::Memory => {
            warn!("using the in-memory cluster; nothing will be scheduled");
            let cluster = Arc::new(InMemoryCluster::new());
            Ok((cluster.clone(), cluster))
        }
    }
}

fn templates(config: &ServiceConfig) -> anyhow::Result<Arc<dyn TemplateSource>> {
    match &config.templates_dir {
        Some(dir) => {
            let source = DirectoryTemplates::load(dir)
                .with_context(|| format!("load templates from {} failed", dir.display()))?;
            info!(dir = %dir.display(), templates = ?source.template_ids(), "loaded manifest templates");
            Ok(Arc::new(source))
        }
        None => Ok(Arc::new(BuiltinTemplates::new())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::load().context("load configuration failed")?;
    init_tracing(&config.logging);
    info!(
        version = clusterflow::VERSION,
        backend = ?config.backend,
        namespace = %config.default_namespace,
        "starting clusterflow"
    );

    let (store, events) = backend(&config).await?;
    let state = AppState::new(store, events, templates(&config)?, &config);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("bind {} failed", config.bind_address))?;
    api::serve(listener, state)
        .await
        .context("server terminated with error")
}
