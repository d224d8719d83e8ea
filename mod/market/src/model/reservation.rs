use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What kind of item a reservation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    /// A listing (crop/good) — reserved by quantity for a preferred date.
    Crop,
    /// Rentable equipment — reserved by hours over a start/end range.
    Tool,
}

impl FromStr for ItemType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crop" => Ok(ItemType::Crop),
            "tool" => Ok(ItemType::Tool),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemType::Crop => "crop",
            ItemType::Tool => "tool",
        })
    }
}

/// Reservation lifecycle status.
///
/// Any enumerated status may follow any other — there is deliberately no
/// transition state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl FromStr for ReservationStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "completed" => Ok(ReservationStatus::Completed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        })
    }
}

/// Reservation — a user's request to obtain a listing or equipment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    #[serde(default)]
    pub id: String,

    pub user_id: String,

    pub item_id: String,

    pub item_type: ItemType,

    /// Units requested (crop path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,

    /// Hours requested (tool path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rental_hours: Option<u32>,

    /// Requested handover date (crop path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_date: Option<String>,

    /// Rental range (tool path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    pub status: ReservationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Internal document revision, bumped on every update.
    #[serde(default)]
    pub rev: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}
