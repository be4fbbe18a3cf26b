//! Engine bootstrap: environment -> roles -> metadata -> derived snapshot.

use std::sync::Arc;

use anyhow::Context;

use fieldops_auth::{RoleHierarchyProvider, RoleSource};
use fieldops_infra::{Engine, EngineConfig};
use fieldops_metadata::EntityRegistry;

/// Boot the engine as configured.
///
/// Roles are initialized before any metadata is read; booting the other way
/// round is a configuration error.
pub async fn bootstrap(config: &EngineConfig) -> anyhow::Result<Arc<Engine>> {
    let provider = Arc::new(if config.test_mode {
        RoleHierarchyProvider::for_tests()
    } else {
        RoleHierarchyProvider::new()
    });

    load_roles(&provider, config).await?;

    let registry = match &config.metadata_dir {
        Some(dir) => EntityRegistry::load_dir(dir)
            .with_context(|| format!("loading entity metadata from {}", dir.display()))?,
        None => EntityRegistry::builtin().context("loading embedded entity metadata")?,
    };

    let engine = Engine::boot(provider, registry).context("deriving access rules")?;
    Ok(Arc::new(engine))
}

async fn load_roles(provider: &RoleHierarchyProvider, config: &EngineConfig) -> anyhow::Result<()> {
    match config.role_source {
        RoleSource::Fallback => {
            provider.initialize_from_fallback()?;
            Ok(())
        }
        RoleSource::Store => load_roles_from_store(provider, config).await,
    }
}

#[cfg(feature = "postgres")]
async fn load_roles_from_store(provider: &RoleHierarchyProvider, config: &EngineConfig) -> anyhow::Result<()> {
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required for store-backed roles")?;
    let store = fieldops_infra::postgres::PostgresRoleStore::connect_lazy(url)?;
    provider
        .initialize_from_store(&store)
        .await
        .context("loading roles from the database")?;
    Ok(())
}

#[cfg(not(feature = "postgres"))]
async fn load_roles_from_store(_provider: &RoleHierarchyProvider, _config: &EngineConfig) -> anyhow::Result<()> {
    anyhow::bail!("store-backed roles need the `postgres` feature")
}
