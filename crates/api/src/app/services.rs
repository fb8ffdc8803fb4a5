use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use freightdesk_infra::{DocumentStore, InMemoryDocumentStore, PostgresDocumentStore};
use freightdesk_numbering::OrderNumberAllocator;
use freightdesk_orders::OrderService;

use crate::config::{AppConfig, NumberingConfig, StorageConfig};

/// Store shared by every service of the process.
pub type SharedStore = Arc<dyn DocumentStore>;

pub struct AppServices {
    orders: OrderService<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore, numbering: &NumberingConfig) -> Self {
        let allocator =
            OrderNumberAllocator::with_policies(store, numbering.retry.clone(), numbering.overflow);
        Self {
            orders: OrderService::with_allocator(allocator, numbering.retry.clone()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryDocumentStore::new()), &NumberingConfig::default())
    }

    pub fn orders(&self) -> &OrderService<SharedStore> {
        &self.orders
    }

    pub fn allocator(&self) -> &OrderNumberAllocator<SharedStore> {
        self.orders.allocator()
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: SharedStore = match &config.storage {
        StorageConfig::InMemory => {
            tracing::info!("using in-memory document store");
            Arc::new(InMemoryDocumentStore::new())
        }
        StorageConfig::Postgres { database_url } => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("failed to connect to Postgres")?;
            let store = PostgresDocumentStore::new(pool);
            store
                .ensure_schema()
                .await
                .context("failed to prepare document schema")?;
            tracing::info!("using Postgres document store");
            Arc::new(store)
        }
    };

    Ok(AppServices::new(store, &config.numbering))
}
