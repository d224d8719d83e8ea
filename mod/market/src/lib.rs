pub mod api;
pub mod model;
pub mod service;

use std::sync::Arc;

use agrimart_core::Module;
use axum::Router;

use service::MarketService;

/// Market Module — agricultural marketplace: listings, rentable
/// equipment, reservations.
pub struct MarketModule {
    service: Arc<MarketService>,
}

impl MarketModule {
    pub fn new(service: MarketService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

impl Module for MarketModule {
    fn name(&self) -> &str {
        "market"
    }

    fn routes(&self) -> Router {
        api::router(self.service.clone())
    }
}
