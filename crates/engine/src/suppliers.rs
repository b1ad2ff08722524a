//! Supplier directory port.
//!
//! Suppliers are master data owned outside the consignment engine; the engine
//! only needs to know that a supplier exists before an agreement names it.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use consignment_core::{DomainError, DomainResult, SupplierId, TenantId};
use consignment_infra::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Supplier {
    pub supplier_id: SupplierId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

pub trait SupplierDirectory: Send + Sync {
    fn get(&self, tenant_id: TenantId, supplier_id: SupplierId) -> Option<Supplier>;

    fn exists(&self, tenant_id: TenantId, supplier_id: SupplierId) -> bool {
        self.get(tenant_id, supplier_id).is_some()
    }

    /// Register a supplier under a name unique within the tenant.
    fn register(&self, tenant_id: TenantId, name: &str) -> DomainResult<Supplier>;

    /// Suppliers of the tenant ordered by name.
    fn list(&self, tenant_id: TenantId) -> Vec<Supplier>;
}

#[derive(Debug, Default)]
pub struct InMemorySupplierDirectory {
    suppliers: InMemoryTenantStore<SupplierId, Supplier>,
    // Serializes the name check with the insert.
    register_lock: Mutex<()>,
}

impl InMemorySupplierDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SupplierDirectory for InMemorySupplierDirectory {
    fn get(&self, tenant_id: TenantId, supplier_id: SupplierId) -> Option<Supplier> {
        self.suppliers.get(tenant_id, &supplier_id)
    }

    fn register(&self, tenant_id: TenantId, name: &str) -> DomainResult<Supplier> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }

        let _guard = self.register_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .suppliers
            .list(tenant_id)
            .iter()
            .any(|s| s.name.eq_ignore_ascii_case(name))
        {
            return Err(DomainError::duplicate(format!("supplier '{name}' already exists")));
        }

        let supplier = Supplier {
            supplier_id: SupplierId::new(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.suppliers.upsert(tenant_id, supplier.supplier_id, supplier.clone());
        Ok(supplier)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<Supplier> {
        let mut all = self.suppliers.list(tenant_id);
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_per_tenant() {
        let directory = InMemorySupplierDirectory::new();
        let tenant = TenantId::new();

        let acme = directory.register(tenant, "  Acme Textiles ").unwrap();
        assert_eq!(acme.name, "Acme Textiles");
        assert!(directory.exists(tenant, acme.supplier_id));

        let err = directory.register(tenant, "acme textiles").unwrap_err();
        assert!(matches!(err, DomainError::DuplicateKey(_)));

        // Another tenant may reuse the name and cannot see the first supplier.
        let other = TenantId::new();
        directory.register(other, "Acme Textiles").unwrap();
        assert!(!directory.exists(other, acme.supplier_id));
    }

    #[test]
    fn blank_names_are_rejected() {
        let directory = InMemorySupplierDirectory::new();
        let err = directory.register(TenantId::new(), "   ").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
