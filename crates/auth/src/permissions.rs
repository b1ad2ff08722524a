use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission name such as `"stock.write"`. `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ALL: Permission = Permission(Cow::Borrowed("*"));
    pub const AGREEMENTS_WRITE: Permission = Permission(Cow::Borrowed("agreements.write"));
    pub const STOCK_WRITE: Permission = Permission(Cow::Borrowed("stock.write"));
    pub const LIQUIDATIONS_WRITE: Permission = Permission(Cow::Borrowed("liquidations.write"));
    pub const SUPPLIERS_WRITE: Permission = Permission(Cow::Borrowed("suppliers.write"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
