use serde::Deserialize;

use agrimart_core::{new_id, now_rfc3339, parse_timestamp, valid_id, ServiceError};
use sql::Value;

use super::MarketService;
use crate::model::{Equipment, ItemType, Listing, Reservation, ReservationStatus};

/// Parameters for creating a reservation. Everything is optional at the
/// wire level so absence surfaces as a validation error with a usable
/// message instead of a deserialization failure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateReservationInput {
    pub user_id: Option<String>,
    pub item_id: Option<String>,
    pub item_type: Option<String>,
    /// Units requested (crop path). Must be strictly positive.
    pub quantity: Option<i64>,
    /// Hours requested (tool path). Must be strictly positive.
    pub rental_hours: Option<i64>,
    pub preferred_date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub notes: Option<String>,
}

impl MarketService {
    pub fn create_reservation(
        &self,
        input: CreateReservationInput,
    ) -> Result<Reservation, ServiceError> {
        let user_id = require_id("userId", input.user_id.as_deref())?;
        let item_id = require_id("itemId", input.item_id.as_deref())?;

        let item_type: ItemType = input
            .item_type
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|_| {
                ServiceError::Validation(
                    "itemType is required and must be 'crop' or 'tool'".into(),
                )
            })?;

        let (quantity, rental_hours) = match item_type {
            ItemType::Crop => (Some(require_positive("quantity", input.quantity)?), None),
            ItemType::Tool => (
                None,
                Some(require_positive("rentalHours", input.rental_hours)?),
            ),
        };

        let preferred_date = match item_type {
            // Crops default to "as soon as possible".
            ItemType::Crop => Some(match input.preferred_date.as_deref() {
                Some(raw) => parse_date("preferredDate", raw)?,
                None => now_rfc3339(),
            }),
            ItemType::Tool => None,
        };

        let (start_date, end_date) = match item_type {
            ItemType::Tool => {
                let start = input
                    .start_date
                    .as_deref()
                    .map(|raw| parse_date("startDate", raw))
                    .transpose()?;
                let end = input
                    .end_date
                    .as_deref()
                    .map(|raw| parse_date("endDate", raw))
                    .transpose()?;
                if let (Some(s), Some(e)) = (&start, &end) {
                    if s >= e {
                        return Err(ServiceError::Validation(
                            "endDate must be after startDate".into(),
                        ));
                    }
                }
                (start, end)
            }
            ItemType::Crop => (None, None),
        };

        // Cross-entity check: the referenced item must exist.
        match item_type {
            ItemType::Crop => {
                let _: Listing = self.get_record("listings", "listing", &item_id)?;
            }
            ItemType::Tool => {
                let _: Equipment = self.get_record("equipment", "equipment", &item_id)?;
            }
        }

        let id = new_id();
        let now = now_rfc3339();
        let record = Reservation {
            id: id.clone(),
            user_id,
            item_id,
            item_type,
            quantity,
            rental_hours,
            preferred_date,
            start_date,
            end_date,
            status: ReservationStatus::Pending,
            notes: input.notes,
            rev: 0,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        };

        self.insert_record(
            "reservations",
            &id,
            &record,
            &reservation_indexes(&record),
        )?;

        Ok(record)
    }

    /// All reservations for a user, newest first.
    ///
    /// Unfiltered and unpaginated; revisit if per-user volumes grow.
    pub fn list_user_reservations(
        &self,
        user_id: &str,
    ) -> Result<Vec<Reservation>, ServiceError> {
        Self::ensure_id("user", user_id)?;
        self.list_docs_where(
            "reservations",
            &[("user_id", Value::Text(user_id.to_string()))],
        )
    }

    /// Set a reservation's status. Any enumerated status may follow any
    /// other; there is no transition state machine.
    pub fn update_reservation_status(
        &self,
        id: &str,
        status: &str,
    ) -> Result<Reservation, ServiceError> {
        Self::ensure_id("reservation", id)?;

        let status: ReservationStatus = status.parse().map_err(|_| {
            ServiceError::Validation(format!(
                "invalid reservation status '{}'; must be one of: pending, confirmed, cancelled, completed",
                status
            ))
        })?;

        let current: Reservation = self.get_record("reservations", "reservation", id)?;

        let mut patch = serde_json::Map::new();
        patch.insert("status".into(), serde_json::json!(status));
        let updated: Reservation = Self::patch_doc(&current, patch)?;

        self.update_record(
            "reservations",
            "reservation",
            id,
            &updated,
            &reservation_indexes(&updated),
        )?;

        Ok(updated)
    }
}

fn reservation_indexes(r: &Reservation) -> Vec<(&'static str, Value)> {
    vec![
        ("user_id", Value::Text(r.user_id.clone())),
        ("item_id", Value::Text(r.item_id.clone())),
        ("item_type", Value::Text(r.item_type.to_string())),
        ("status", Value::Text(r.status.to_string())),
        ("created_at", Value::Text(r.created_at.clone().unwrap_or_default())),
        ("updated_at", Value::Text(r.updated_at.clone().unwrap_or_default())),
    ]
}

fn require_id(field: &str, value: Option<&str>) -> Result<String, ServiceError> {
    match value {
        Some(v) if valid_id(v) => Ok(v.to_string()),
        Some(_) => Err(ServiceError::Validation(format!(
            "invalid {} format",
            field
        ))),
        None => Err(ServiceError::Validation(format!("{} is required", field))),
    }
}

fn require_positive(field: &str, value: Option<i64>) -> Result<u32, ServiceError> {
    match value {
        Some(v) if v > 0 => u32::try_from(v).map_err(|_| {
            ServiceError::Validation(format!("{} is out of range", field))
        }),
        Some(_) => Err(ServiceError::Validation(format!(
            "{} must be greater than zero",
            field
        ))),
        None => Err(ServiceError::Validation(format!("{} is required", field))),
    }
}

fn parse_date(field: &str, raw: &str) -> Result<String, ServiceError> {
    parse_timestamp(raw)
        .map(|dt| dt.to_rfc3339())
        .ok_or_else(|| {
            ServiceError::Validation(format!(
                "{} must be an RFC 3339 timestamp or YYYY-MM-DD date",
                field
            ))
        })
}
