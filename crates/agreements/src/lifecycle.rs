//! Agreement lifecycle state machine.

use serde::{Deserialize, Serialize};

use consignment_core::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgreementStatus {
    Draft,
    Active,
    Paused,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Activate,
    Pause,
    Terminate,
}

impl AgreementStatus {
    /// Transition table. Guards that need more than the status (products
    /// present, outstanding stock) are checked by the aggregate.
    pub fn on(self, event: LifecycleEvent) -> Result<AgreementStatus, DomainError> {
        use AgreementStatus::*;
        use LifecycleEvent::*;

        match (self, event) {
            (Draft, Activate) | (Paused, Activate) => Ok(Active),
            (Active, Pause) => Ok(Paused),
            (Active, Terminate) | (Paused, Terminate) => Ok(Terminated),
            (Draft, Pause)
            | (Draft, Terminate)
            | (Active, Activate)
            | (Paused, Pause)
            | (Terminated, Activate)
            | (Terminated, Pause)
            | (Terminated, Terminate) => Err(DomainError::invalid_transition(self, event)),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AgreementStatus::Terminated)
    }

    /// New consigned units may be received.
    pub fn accepts_receipts(self) -> bool {
        matches!(self, AgreementStatus::Active | AgreementStatus::Paused)
    }

    pub fn accepts_sales(self) -> bool {
        matches!(self, AgreementStatus::Active | AgreementStatus::Paused)
    }

    /// Units may go back to the supplier, including after termination.
    pub fn accepts_returns(self) -> bool {
        !matches!(self, AgreementStatus::Draft)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgreementStatus::Draft => "draft",
            AgreementStatus::Active => "active",
            AgreementStatus::Paused => "paused",
            AgreementStatus::Terminated => "terminated",
        }
    }
}

impl core::fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            LifecycleEvent::Activate => "activate",
            LifecycleEvent::Pause => "pause",
            LifecycleEvent::Terminate => "terminate",
        })
    }
}
