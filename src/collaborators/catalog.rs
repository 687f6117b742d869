//! Product catalog lookups.

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    collaborators::{CollaboratorError, HttpEndpoint, optional_json},
    domain::tenants::TenantId,
    ids::ProductId,
};

/// What the cart needs to know about a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    /// Unit price in minor units.
    pub price: u64,
    pub active: bool,
    pub primary_image_url: Option<String>,
}

#[automock]
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Look up `product` in `tenant`'s catalog. `None` when it does not exist.
    async fn lookup(
        &self,
        tenant: &TenantId,
        product: &ProductId,
    ) -> Result<Option<CatalogProduct>, CollaboratorError>;
}

/// Catalog service reached over HTTP at `GET {base}/products/{id}`.
#[derive(Debug, Clone)]
pub struct HttpProductCatalog {
    endpoint: HttpEndpoint,
}

impl HttpProductCatalog {
    #[must_use]
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    async fn lookup(
        &self,
        tenant: &TenantId,
        product: &ProductId,
    ) -> Result<Option<CatalogProduct>, CollaboratorError> {
        let response = self
            .endpoint
            .get(tenant, &format!("/products/{product}"))
            .send()
            .await?;

        optional_json(response, "catalog").await
    }
}

/// Catalog held in memory, keyed per tenant.
#[derive(Debug, Default)]
pub struct InMemoryProductCatalog {
    products: RwLock<FxHashMap<(TenantId, ProductId), CatalogProduct>>,
}

impl InMemoryProductCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a product for `tenant`.
    pub async fn insert(&self, tenant: TenantId, product: CatalogProduct) {
        self.products
            .write()
            .await
            .insert((tenant, product.id.clone()), product);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn lookup(
        &self,
        tenant: &TenantId,
        product: &ProductId,
    ) -> Result<Option<CatalogProduct>, CollaboratorError> {
        Ok(self
            .products
            .read()
            .await
            .get(&(tenant.clone(), product.clone()))
            .cloned())
    }
}
