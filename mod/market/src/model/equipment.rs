use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agrimart_core::parse_timestamp;

/// Machine category. Closed set — creation and update validate against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipmentCategory {
    Tractor,
    Tiller,
    Harvester,
}

impl EquipmentCategory {
    pub const ALL: &'static [&'static str] = &["Tractor", "Tiller", "Harvester"];
}

impl FromStr for EquipmentCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Tractor" => Ok(EquipmentCategory::Tractor),
            "Tiller" => Ok(EquipmentCategory::Tiller),
            "Harvester" => Ok(EquipmentCategory::Harvester),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EquipmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EquipmentCategory::Tractor => "Tractor",
            EquipmentCategory::Tiller => "Tiller",
            EquipmentCategory::Harvester => "Harvester",
        };
        f.write_str(s)
    }
}

/// Rentable Equipment — a machine/tool offered for hourly rental within
/// an availability window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    #[serde(default)]
    pub id: String,

    /// Unique across all equipment.
    pub tool_name: String,

    pub category: EquipmentCategory,

    pub rental_price_per_hour: f64,

    /// Window start, RFC 3339. Always precedes `available_to`.
    pub available_from: String,

    /// Window end, RFC 3339.
    pub available_to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_option: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rental_terms: Option<String>,

    /// Blob key of the attached photo, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Internal document revision, bumped on every update.
    #[serde(default)]
    pub rev: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Equipment {
    /// Whether `now` falls inside the availability window.
    ///
    /// Unparseable stored bounds count as unavailable.
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        match (
            parse_timestamp(&self.available_from),
            parse_timestamp(&self.available_to),
        ) {
            (Some(from), Some(to)) => now >= from && now <= to,
            _ => false,
        }
    }
}

/// Read-side view of equipment with the derived `isAvailable` attribute.
///
/// Computed against the current instant on every read — never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentView {
    #[serde(flatten)]
    pub equipment: Equipment,
    pub is_available: bool,
}

impl EquipmentView {
    pub fn at(equipment: Equipment, now: DateTime<Utc>) -> Self {
        let is_available = equipment.is_available_at(now);
        Self {
            equipment,
            is_available,
        }
    }
}

impl From<Equipment> for EquipmentView {
    fn from(equipment: Equipment) -> Self {
        Self::at(equipment, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiller(from: &str, to: &str) -> Equipment {
        Equipment {
            id: "0123456789abcdef0123456789abcdef".into(),
            tool_name: "Tiller-X".into(),
            category: EquipmentCategory::Tiller,
            rental_price_per_hour: 50.0,
            available_from: from.into(),
            available_to: to.into(),
            pickup_option: None,
            rental_terms: None,
            image: None,
            rev: 0,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn availability_window() {
        let eq = tiller("2024-01-01", "2024-01-02");
        let inside = parse_timestamp("2024-01-01T12:00:00Z").unwrap();
        let before = parse_timestamp("2023-12-31T23:59:59Z").unwrap();
        let after = parse_timestamp("2024-01-03").unwrap();

        assert!(eq.is_available_at(inside));
        assert!(!eq.is_available_at(before));
        // Window in the past → unavailable.
        assert!(!eq.is_available_at(after));
    }

    #[test]
    fn unparseable_bounds_are_unavailable() {
        let eq = tiller("soon", "later");
        assert!(!eq.is_available_at(Utc::now()));
    }

    #[test]
    fn view_serializes_flat() {
        let eq = tiller("2024-01-01", "2024-01-02");
        let view = EquipmentView::at(eq, parse_timestamp("2024-01-01T06:00:00Z").unwrap());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["toolName"], "Tiller-X");
        assert_eq!(json["isAvailable"], true);
    }

    #[test]
    fn category_from_str() {
        assert_eq!("Tractor".parse(), Ok(EquipmentCategory::Tractor));
        assert!("tractor".parse::<EquipmentCategory>().is_err());
        assert!("Drone".parse::<EquipmentCategory>().is_err());
    }
}
