use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use consignment_agreements::AgreementId;
use consignment_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, LocationId, ProductKey, SaleId, TenantId,
};
use consignment_events::Event;

pub const AGGREGATE_TYPE: &str = "consignment.stock";

/// Natural key of a stock record.
///
/// `location_id` is `None` when neither the agreement nor the caller names a
/// location.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockRecordKey {
    pub agreement_id: AgreementId,
    pub product: ProductKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
}

impl StockRecordKey {
    pub fn new(agreement_id: AgreementId, product: ProductKey, location_id: Option<LocationId>) -> Self {
        Self {
            agreement_id,
            product,
            location_id,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockRecordId(pub AggregateId);

impl StockRecordId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The stream id for a key. Stable, so concurrent writers to the same key
    /// always contend on the same stream.
    pub fn for_key(key: &StockRecordKey) -> Self {
        const NONE: &[u8] = b"-";
        let agreement = *key.agreement_id.0.as_uuid().as_bytes();
        let product = *key.product.product_id.as_uuid().as_bytes();
        let variant = key.product.variant_id.map(|v| *v.as_uuid().as_bytes());
        let location = key.location_id.map(|l| *l.as_uuid().as_bytes());
        Self(AggregateId::derived(
            AGGREGATE_TYPE,
            &[
                agreement.as_slice(),
                product.as_slice(),
                variant.as_ref().map_or(NONE, |b| b.as_slice()),
                location.as_ref().map_or(NONE, |b| b.as_slice()),
            ],
        ))
    }
}

impl core::fmt::Display for StockRecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Counters of a record. Adjustments are folded into `received`, so
/// `received - sold - returned == available` always holds; `adjusted` is the
/// net adjustment already included in `received`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    pub received: i64,
    pub sold: i64,
    pub returned: i64,
    pub adjusted: i64,
    pub available: i64,
}

impl StockBalance {
    pub fn merge(&mut self, other: &StockBalance) {
        self.received = self.received.saturating_add(other.received);
        self.sold = self.sold.saturating_add(other.sold);
        self.returned = self.returned.saturating_add(other.returned);
        self.adjusted = self.adjusted.saturating_add(other.adjusted);
        self.available = self.available.saturating_add(other.available);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsignmentStock {
    id: StockRecordId,
    tenant_id: Option<TenantId>,
    key: Option<StockRecordKey>,
    received: i64,
    sold: i64,
    returned: i64,
    adjusted: i64,
    version: u64,
    created: bool,
}

impl ConsignmentStock {
    pub fn empty(id: StockRecordId) -> Self {
        Self {
            id,
            tenant_id: None,
            key: None,
            received: 0,
            sold: 0,
            returned: 0,
            adjusted: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockRecordId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn key(&self) -> Option<&StockRecordKey> {
        self.key.as_ref()
    }

    pub fn available(&self) -> i64 {
        self.received - self.sold - self.returned
    }

    pub fn balance(&self) -> StockBalance {
        StockBalance {
            received: self.received,
            sold: self.sold,
            returned: self.returned,
            adjusted: self.adjusted,
            available: self.available(),
        }
    }
}

impl AggregateRoot for ConsignmentStock {
    type Id = StockRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ---------------------------------------------------------------------------
// Commands

/// Receive consigned units. Opens the record on first receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub tenant_id: TenantId,
    pub record_id: StockRecordId,
    pub key: StockRecordKey,
    pub quantity: i64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Record a consigned sale; `occurred_at` is the sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellStock {
    pub tenant_id: TenantId,
    pub record_id: StockRecordId,
    pub sale_id: SaleId,
    pub quantity: i64,
    pub sale_ref: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnStock {
    pub tenant_id: TenantId,
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub record_id: StockRecordId,
    pub delta: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    ReceiveStock(ReceiveStock),
    SellStock(SellStock),
    ReturnStock(ReturnStock),
    AdjustStock(AdjustStock),
}

// ---------------------------------------------------------------------------
// Events
//
// Every event carries the record key so read models never need the stream's
// first event to place a movement.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub tenant_id: TenantId,
    pub record_id: StockRecordId,
    pub key: StockRecordKey,
    pub quantity: i64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSold {
    pub tenant_id: TenantId,
    pub record_id: StockRecordId,
    pub key: StockRecordKey,
    pub sale_id: SaleId,
    pub quantity: i64,
    pub sale_ref: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReturned {
    pub tenant_id: TenantId,
    pub record_id: StockRecordId,
    pub key: StockRecordKey,
    pub quantity: i64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub tenant_id: TenantId,
    pub record_id: StockRecordId,
    pub key: StockRecordKey,
    pub delta: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    StockReceived(StockReceived),
    StockSold(StockSold),
    StockReturned(StockReturned),
    StockAdjusted(StockAdjusted),
}

impl StockEvent {
    pub fn key(&self) -> &StockRecordKey {
        match self {
            StockEvent::StockReceived(e) => &e.key,
            StockEvent::StockSold(e) => &e.key,
            StockEvent::StockReturned(e) => &e.key,
            StockEvent::StockAdjusted(e) => &e.key,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            StockEvent::StockReceived(e) => e.tenant_id,
            StockEvent::StockSold(e) => e.tenant_id,
            StockEvent::StockReturned(e) => e.tenant_id,
            StockEvent::StockAdjusted(e) => e.tenant_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockReceived(_) => "consignment.stock.received",
            StockEvent::StockSold(_) => "consignment.stock.sold",
            StockEvent::StockReturned(_) => "consignment.stock.returned",
            StockEvent::StockAdjusted(_) => "consignment.stock.adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockReceived(e) => e.occurred_at,
            StockEvent::StockSold(e) => e.occurred_at,
            StockEvent::StockReturned(e) => e.occurred_at,
            StockEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ConsignmentStock {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::StockReceived(e) => {
                if !self.created {
                    self.id = e.record_id;
                    self.tenant_id = Some(e.tenant_id);
                    self.key = Some(e.key);
                    self.created = true;
                }
                self.received = self.received.saturating_add(e.quantity);
            }
            StockEvent::StockSold(e) => {
                self.sold = self.sold.saturating_add(e.quantity);
            }
            StockEvent::StockReturned(e) => {
                self.returned = self.returned.saturating_add(e.quantity);
            }
            StockEvent::StockAdjusted(e) => {
                self.received = self.received.saturating_add(e.delta);
                self.adjusted = self.adjusted.saturating_add(e.delta);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            StockCommand::SellStock(cmd) => self.handle_sell(cmd),
            StockCommand::ReturnStock(cmd) => self.handle_return(cmd),
            StockCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
        }
    }
}

impl ConsignmentStock {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_record_id(&self, record_id: StockRecordId) -> Result<(), DomainError> {
        if self.id != record_id {
            return Err(DomainError::invariant("record_id mismatch"));
        }
        Ok(())
    }

    fn ensure_positive(quantity: i64) -> Result<(), DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be > 0 (got {quantity})"
            )));
        }
        Ok(())
    }

    fn ensure_available(&self, quantity: i64) -> Result<(), DomainError> {
        let available = self.available();
        if quantity > available {
            return Err(DomainError::insufficient_stock(quantity, available));
        }
        Ok(())
    }

    /// Counters must stay representable after `delta` lands on them.
    fn ensure_headroom(&self, delta: i64) -> Result<(), DomainError> {
        let fits = self.received.checked_add(delta).is_some()
            && self.adjusted.checked_add(delta).is_some();
        if !fits {
            return Err(DomainError::validation(format!(
                "quantity {delta} overflows the stock counters"
            )));
        }
        Ok(())
    }

    fn existing_key(&self) -> Result<StockRecordKey, DomainError> {
        self.key
            .ok_or_else(|| DomainError::invariant("created stock record without key"))
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_record_id(cmd.record_id)?;
        if StockRecordId::for_key(&cmd.key) != cmd.record_id {
            return Err(DomainError::invariant("record_id does not match record key"));
        }
        if self.created && self.key != Some(cmd.key) {
            return Err(DomainError::invariant("record key mismatch"));
        }
        Self::ensure_positive(cmd.quantity)?;
        if self.received.checked_add(cmd.quantity).is_none() {
            return Err(DomainError::validation(format!(
                "quantity {} overflows the stock counters",
                cmd.quantity
            )));
        }

        Ok(vec![StockEvent::StockReceived(StockReceived {
            tenant_id: cmd.tenant_id,
            record_id: cmd.record_id,
            key: cmd.key,
            quantity: cmd.quantity,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sell(&self, cmd: &SellStock) -> Result<Vec<StockEvent>, DomainError> {
        Self::ensure_positive(cmd.quantity)?;
        if cmd.sale_ref.trim().is_empty() {
            return Err(DomainError::validation("sale_ref is required"));
        }
        if !self.created {
            return Err(DomainError::insufficient_stock(cmd.quantity, 0));
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_record_id(cmd.record_id)?;
        self.ensure_available(cmd.quantity)?;

        Ok(vec![StockEvent::StockSold(StockSold {
            tenant_id: cmd.tenant_id,
            record_id: cmd.record_id,
            key: self.existing_key()?,
            sale_id: cmd.sale_id,
            quantity: cmd.quantity,
            sale_ref: cmd.sale_ref.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnStock) -> Result<Vec<StockEvent>, DomainError> {
        Self::ensure_positive(cmd.quantity)?;
        if !self.created {
            return Err(DomainError::insufficient_stock(cmd.quantity, 0));
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_record_id(cmd.record_id)?;
        self.ensure_available(cmd.quantity)?;

        Ok(vec![StockEvent::StockReturned(StockReturned {
            tenant_id: cmd.tenant_id,
            record_id: cmd.record_id,
            key: self.existing_key()?,
            quantity: cmd.quantity,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StockEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_record_id(cmd.record_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("adjustment delta must not be zero"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("adjustment reason is required"));
        }
        let shrink = cmd
            .delta
            .checked_neg()
            .ok_or_else(|| DomainError::validation("adjustment delta out of range"))?;
        if shrink > 0 {
            self.ensure_available(shrink)?;
        }
        self.ensure_headroom(cmd.delta)?;

        Ok(vec![StockEvent::StockAdjusted(StockAdjusted {
            tenant_id: cmd.tenant_id,
            record_id: cmd.record_id,
            key: self.existing_key()?,
            delta: cmd.delta,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
