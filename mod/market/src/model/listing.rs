use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a sold item reaches the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOption {
    Pickup,
    Delivery,
    Both,
}

impl FromStr for DeliveryOption {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pickup" => Ok(DeliveryOption::Pickup),
            "delivery" => Ok(DeliveryOption::Delivery),
            "both" => Ok(DeliveryOption::Both),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DeliveryOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryOption::Pickup => "pickup",
            DeliveryOption::Delivery => "delivery",
            DeliveryOption::Both => "both",
        };
        f.write_str(s)
    }
}

/// Listing — a sellable crop or good.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(default)]
    pub id: String,

    pub name: String,

    /// Free-form category label ("Seeds", "Grains", ...).
    pub category: String,

    /// Units on offer.
    pub quantity: u32,

    /// Price per unit.
    pub price: f64,

    pub location: String,

    pub description: String,

    pub delivery_option: DeliveryOption,

    /// Blob key of the attached photo, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Inactive listings are hidden from browse queries.
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Internal document revision, bumped on every update.
    #[serde(default)]
    pub rev: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn default_true() -> bool {
    true
}
