use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role name as carried in the token. Unknown roles grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn admin() -> Self {
        Self::new("admin")
    }

    /// Runs the shop floor: agreements, suppliers and stock movements.
    pub fn operator() -> Self {
        Self::new("operator")
    }

    /// Generates, confirms and pays liquidations.
    pub fn accountant() -> Self {
        Self::new("accountant")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn permissions(&self) -> Vec<Permission> {
        match self.as_str() {
            "admin" => vec![Permission::ALL],
            "operator" => vec![
                Permission::AGREEMENTS_WRITE,
                Permission::STOCK_WRITE,
                Permission::SUPPLIERS_WRITE,
            ],
            "accountant" => vec![Permission::LIQUIDATIONS_WRITE],
            _ => vec![],
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
