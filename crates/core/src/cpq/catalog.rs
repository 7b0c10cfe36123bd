use crate::domain::pricing_config::PricingConfiguration;
use crate::domain::promise::TenantId;
use crate::domain::service::{CatalogService, ServiceId};

pub trait CatalogLookup {
    fn get_service(&self, service_id: &ServiceId) -> Option<CatalogService>;
}

/// Read-through lookup of a tenant's active pricing configuration. Never memoized
/// across requests: operators may change markup mid-session.
pub trait PricingConfigLookup {
    fn active_pricing_config(&self, tenant_id: &TenantId) -> Option<PricingConfiguration>;
}

/// Point-in-time copy of catalog services.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    services: Vec<CatalogService>,
}

impl Catalog {
    pub fn new(services: Vec<CatalogService>) -> Self {
        Self { services }
    }

    pub fn find(&self, service_id: &ServiceId) -> Option<&CatalogService> {
        self.services.iter().find(|service| &service.id == service_id)
    }

    pub fn upsert(&mut self, service: CatalogService) {
        match self.services.iter_mut().find(|existing| existing.id == service.id) {
            Some(existing) => *existing = service,
            None => self.services.push(service),
        }
    }

    pub fn remove(&mut self, service_id: &ServiceId) -> Option<CatalogService> {
        let index = self.services.iter().position(|service| &service.id == service_id)?;
        Some(self.services.remove(index))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl CatalogLookup for Catalog {
    fn get_service(&self, service_id: &ServiceId) -> Option<CatalogService> {
        self.find(service_id).cloned()
    }
}

#[derive(Clone, Debug, Default)]
pub struct PricingConfigs {
    configs: Vec<PricingConfiguration>,
}

impl PricingConfigs {
    pub fn new(configs: Vec<PricingConfiguration>) -> Self {
        Self { configs }
    }

    pub fn single(config: PricingConfiguration) -> Self {
        Self::new(vec![config])
    }
}

impl PricingConfigLookup for PricingConfigs {
    fn active_pricing_config(&self, tenant_id: &TenantId) -> Option<PricingConfiguration> {
        self.configs
            .iter()
            .find(|config| config.active && &config.tenant_id == tenant_id)
            .cloned()
    }
}
