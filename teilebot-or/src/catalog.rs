//! Vehicle catalog abstraction
//!
//! A structured parts catalog (TecDoc-style) that can enumerate part
//! categories for a vehicle and list articles with their OE numbers. The
//! trait keeps the catalog source testable; deployments plug in their
//! catalog provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::VehicleDescriptor;

/// Catalog error
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Vehicle could not be matched in the catalog
    #[error("Vehicle not found: {0}")]
    VehicleNotFound(String),

    /// Provider-side error
    #[error("Provider error: {0}")]
    Provider(String),
}

/// One article as listed in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogArticle {
    /// Aftermarket article number, e.g. "CUK 26 009"
    pub article_number: String,
    /// Article manufacturer, e.g. "MANN-FILTER"
    pub supplier: Option<String>,
    /// OE numbers the catalog cross-references for this article
    pub oe_numbers: Vec<String>,
    /// Model year restriction, when the catalog scopes the fitment
    pub year_hint: Option<i32>,
    /// Engine power restriction in kW
    pub kw_hint: Option<u32>,
}

/// Structured vehicle parts catalog.
#[async_trait]
pub trait VehicleCatalog: Send + Sync {
    /// Part category names available for this vehicle.
    ///
    /// # Errors
    /// Returns `CatalogError` when the vehicle cannot be matched or the
    /// provider fails.
    async fn categories(&self, vehicle: &VehicleDescriptor) -> Result<Vec<String>, CatalogError>;

    /// Articles listed for a vehicle in a category.
    ///
    /// # Errors
    /// Returns `CatalogError` on provider failure.
    async fn articles(
        &self,
        vehicle: &VehicleDescriptor,
        category: &str,
    ) -> Result<Vec<CatalogArticle>, CatalogError>;
}
