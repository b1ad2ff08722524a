//! Per-tenant folio counters.
//!
//! Numbers are handed out strictly increasing per `(tenant, kind)`. A number
//! drawn for a command that later fails is not reused, so gaps are possible.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use consignment_core::{Folio, FolioKind, TenantId};

use crate::event_store::EventStoreError;

pub trait FolioSequencer: Send + Sync {
    fn next(&self, tenant_id: TenantId, kind: FolioKind) -> Result<Folio, EventStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryFolioSequencer {
    counters: Mutex<HashMap<(TenantId, FolioKind), u64>>,
}

impl InMemoryFolioSequencer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FolioSequencer for InMemoryFolioSequencer {
    fn next(&self, tenant_id: TenantId, kind: FolioKind) -> Result<Folio, EventStoreError> {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = counters.entry((tenant_id, kind)).or_insert(0);
        *counter += 1;
        Ok(Folio::new(kind, *counter))
    }
}

#[cfg(feature = "postgres")]
pub use pg::PostgresFolioSequencer;

#[cfg(feature = "postgres")]
mod pg {
    use sqlx::{PgPool, Row};

    use super::*;

    pub const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS folio_counters (
        tenant_id UUID   NOT NULL,
        kind      TEXT   NOT NULL,
        last_used BIGINT NOT NULL,
        PRIMARY KEY (tenant_id, kind)
    );
    "#;

    /// Counter rows bumped with a single upsert, so concurrent callers serialize
    /// on the row lock.
    #[derive(Debug, Clone)]
    pub struct PostgresFolioSequencer {
        pool: PgPool,
    }

    impl PostgresFolioSequencer {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        pub async fn migrate(&self) -> Result<(), EventStoreError> {
            sqlx::raw_sql(SCHEMA)
                .execute(&self.pool)
                .await
                .map_err(|e| EventStoreError::Backend(format!("folio migrate: {e}")))?;
            Ok(())
        }

        pub async fn next_async(&self, tenant_id: TenantId, kind: FolioKind) -> Result<Folio, EventStoreError> {
            let row = sqlx::query(
                r#"
                INSERT INTO folio_counters (tenant_id, kind, last_used)
                VALUES ($1, $2, 1)
                ON CONFLICT (tenant_id, kind)
                DO UPDATE SET last_used = folio_counters.last_used + 1
                RETURNING last_used
                "#,
            )
            .bind(tenant_id.as_uuid())
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EventStoreError::Backend(format!("folio next: {e}")))?;

            let n: i64 = row
                .try_get("last_used")
                .map_err(|e| EventStoreError::Backend(format!("folio next: {e}")))?;
            Ok(Folio::new(kind, n as u64))
        }
    }

    impl FolioSequencer for PostgresFolioSequencer {
        fn next(&self, tenant_id: TenantId, kind: FolioKind) -> Result<Folio, EventStoreError> {
            let handle = tokio::runtime::Handle::try_current().map_err(|_| {
                EventStoreError::Backend("PostgresFolioSequencer requires a tokio runtime".to_string())
            })?;
            handle.block_on(self.next_async(tenant_id, kind))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_per_tenant_and_kind() {
        let seq = InMemoryFolioSequencer::new();
        let a = TenantId::new();
        let b = TenantId::new();

        assert_eq!(seq.next(a, FolioKind::Liquidation).unwrap().sequence(), 1);
        assert_eq!(seq.next(a, FolioKind::Liquidation).unwrap().sequence(), 2);
        assert_eq!(seq.next(a, FolioKind::Agreement).unwrap().sequence(), 1);
        assert_eq!(seq.next(b, FolioKind::Liquidation).unwrap().to_string(), "LIQ-000001");
    }
}
