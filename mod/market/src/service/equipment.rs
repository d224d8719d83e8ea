use std::collections::BTreeMap;

use chrono::Utc;

use agrimart_core::{
    new_id, now_rfc3339, parse_timestamp, ListQuery, ListResult, QuerySchema, ServiceError,
};
use sql::Value;

use super::attachment::{discard, StagedBlob, Upload};
use super::MarketService;
use crate::model::{Equipment, EquipmentCategory, EquipmentView};

/// Queryable equipment fields: API name → indexed column.
pub const EQUIPMENT_QUERY_SCHEMA: QuerySchema = QuerySchema {
    fields: &[
        ("toolName", "tool_name"),
        ("category", "category"),
        ("rentalPricePerHour", "rental_price_per_hour"),
        ("availableFrom", "available_from"),
        ("availableTo", "available_to"),
        ("pickupOption", "pickup_option"),
        ("createdAt", "created_at"),
        ("updatedAt", "updated_at"),
    ],
    default_sort: "created_at",
};

const REQUIRED_FIELDS: &[&str] = &[
    "toolName",
    "category",
    "rentalPricePerHour",
    "availableFrom",
    "availableTo",
];

/// Fields a partial update may touch. Anything else rejects the whole
/// request.
const ALLOWED_UPDATES: &[&str] = &[
    "toolName",
    "category",
    "rentalPricePerHour",
    "availableFrom",
    "availableTo",
    "pickupOption",
    "rentalTerms",
];

/// Blob key prefix for equipment photos.
const IMAGE_PREFIX: &str = "equipment";

impl MarketService {
    pub fn create_equipment(
        &self,
        fields: &BTreeMap<String, String>,
        upload: Option<Upload>,
    ) -> Result<Equipment, ServiceError> {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| fields.get(*f).map_or(true, |v| v.trim().is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let category = parse_category(&fields["category"])?;
        let rental_price_per_hour = parse_rate(&fields["rentalPricePerHour"])?;
        let available_from = parse_bound("availableFrom", &fields["availableFrom"])?;
        let available_to = parse_bound("availableTo", &fields["availableTo"])?;
        if available_from >= available_to {
            return Err(ServiceError::Validation(
                "availableTo must be after availableFrom".into(),
            ));
        }

        let id = new_id();
        let now = now_rfc3339();

        let staged = match upload {
            Some(up) => Some(StagedBlob::stage(
                &self.blob,
                up.key_for(IMAGE_PREFIX, &id),
                &up.data,
            )?),
            None => None,
        };

        let record = Equipment {
            id: id.clone(),
            tool_name: fields["toolName"].clone(),
            category,
            rental_price_per_hour,
            available_from: available_from.to_rfc3339(),
            available_to: available_to.to_rfc3339(),
            pickup_option: fields.get("pickupOption").cloned(),
            rental_terms: fields.get("rentalTerms").cloned(),
            image: staged.as_ref().map(|s| s.key().to_string()),
            rev: 0,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        };

        // Creation runs inside a store transaction so a failure after the
        // write attempt leaves no partial record; related statements
        // would join this batch. The staged blob sits outside it and is
        // dropped (deleted) if the batch fails.
        let stmt = Self::insert_stmt("equipment", &id, &record, &equipment_indexes(&record))?;
        self.sql.exec_batch(&[stmt]).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE constraint") {
                ServiceError::Conflict("equipment with this tool name already exists".into())
            } else {
                ServiceError::Storage(msg)
            }
        })?;

        if let Some(staged) = staged {
            staged.commit();
        }
        Ok(record)
    }

    /// Fetch one machine with the derived `isAvailable` attribute.
    pub fn get_equipment(&self, id: &str) -> Result<EquipmentView, ServiceError> {
        Self::ensure_id("equipment", id)?;
        let record: Equipment = self.get_record("equipment", "equipment", id)?;
        Ok(EquipmentView::at(record, Utc::now()))
    }

    /// Browse equipment with filters, sort, projection, pagination.
    /// Each item carries the derived `isAvailable` attribute.
    pub fn list_equipment(
        &self,
        query: &ListQuery,
    ) -> Result<ListResult<serde_json::Value>, ServiceError> {
        let (docs, total) = self.query_docs("equipment", query, &[])?;
        let now = Utc::now();

        let mut items = Vec::with_capacity(docs.len());
        for doc in docs {
            let record: Equipment = serde_json::from_value(doc)
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            let mut doc = serde_json::to_value(EquipmentView::at(record, now))
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            agrimart_core::query::project(&mut doc, query.fields.as_deref());
            items.push(doc);
        }

        Ok(ListResult {
            items,
            total,
            page: query.page,
            limit: query.limit,
            pages: query.pages(total),
        })
    }

    pub fn update_equipment(
        &self,
        id: &str,
        fields: &BTreeMap<String, String>,
        upload: Option<Upload>,
    ) -> Result<Equipment, ServiceError> {
        Self::ensure_id("equipment", id)?;

        // All-or-nothing: a single disallowed field fails the request.
        let disallowed: Vec<&str> = fields
            .keys()
            .map(String::as_str)
            .filter(|k| !ALLOWED_UPDATES.contains(k))
            .collect();
        if !disallowed.is_empty() {
            return Err(ServiceError::Validation(format!(
                "update contains disallowed fields: {}",
                disallowed.join(", ")
            )));
        }

        let mut patch = equipment_patch(fields)?;

        let current: Equipment = self.get_record("equipment", "equipment", id)?;

        let staged = match upload {
            Some(up) => {
                let staged = StagedBlob::stage(
                    &self.blob,
                    up.key_for(IMAGE_PREFIX, id),
                    &up.data,
                )?;
                patch.insert("image".into(), serde_json::json!(staged.key()));
                Some(staged)
            }
            None => None,
        };

        let updated: Equipment = Self::patch_doc(&current, patch)?;
        self.update_record(
            "equipment",
            "equipment",
            id,
            &updated,
            &equipment_indexes(&updated),
        )?;

        if let Some(staged) = staged {
            let new_key = staged.commit();
            if let Some(old_key) = &current.image {
                if *old_key != new_key {
                    discard(&self.blob, old_key);
                }
            }
        }

        Ok(updated)
    }

    pub fn delete_equipment(&self, id: &str) -> Result<(), ServiceError> {
        Self::ensure_id("equipment", id)?;
        let current: Equipment = self.get_record("equipment", "equipment", id)?;
        self.delete_record("equipment", "equipment", id)?;
        if let Some(key) = &current.image {
            discard(&self.blob, key);
        }
        Ok(())
    }
}

fn equipment_indexes(e: &Equipment) -> Vec<(&'static str, Value)> {
    vec![
        ("tool_name", Value::Text(e.tool_name.clone())),
        ("category", Value::Text(e.category.to_string())),
        ("rental_price_per_hour", Value::Real(e.rental_price_per_hour)),
        ("available_from", Value::Text(e.available_from.clone())),
        ("available_to", Value::Text(e.available_to.clone())),
        (
            "pickup_option",
            match &e.pickup_option {
                Some(p) => Value::Text(p.clone()),
                None => Value::Null,
            },
        ),
        ("created_at", Value::Text(e.created_at.clone().unwrap_or_default())),
        ("updated_at", Value::Text(e.updated_at.clone().unwrap_or_default())),
    ]
}

/// Convert allow-listed update fields to a typed patch. The window
/// ordering is re-checked whenever both bounds are supplied.
fn equipment_patch(
    fields: &BTreeMap<String, String>,
) -> Result<serde_json::Map<String, serde_json::Value>, ServiceError> {
    let mut patch = serde_json::Map::new();
    for (key, value) in fields {
        match key.as_str() {
            "category" => {
                patch.insert(key.clone(), serde_json::json!(parse_category(value)?));
            }
            "rentalPricePerHour" => {
                patch.insert(key.clone(), serde_json::json!(parse_rate(value)?));
            }
            "availableFrom" | "availableTo" => {
                let bound = parse_bound(key, value)?;
                patch.insert(key.clone(), serde_json::json!(bound.to_rfc3339()));
            }
            _ => {
                if value.trim().is_empty() {
                    return Err(ServiceError::Validation(format!(
                        "field '{}' must not be empty",
                        key
                    )));
                }
                patch.insert(key.clone(), serde_json::json!(value));
            }
        }
    }

    if let (Some(from), Some(to)) = (
        fields.get("availableFrom"),
        fields.get("availableTo"),
    ) {
        let from = parse_bound("availableFrom", from)?;
        let to = parse_bound("availableTo", to)?;
        if from >= to {
            return Err(ServiceError::Validation(
                "availableTo must be after availableFrom".into(),
            ));
        }
    }

    Ok(patch)
}

fn parse_category(raw: &str) -> Result<EquipmentCategory, ServiceError> {
    raw.parse().map_err(|_| {
        ServiceError::Validation(format!(
            "invalid category '{}'; must be one of: {}",
            raw,
            EquipmentCategory::ALL.join(", ")
        ))
    })
}

fn parse_rate(raw: &str) -> Result<f64, ServiceError> {
    match raw.trim().parse::<f64>() {
        Ok(r) if r.is_finite() && r >= 0.0 => Ok(r),
        _ => Err(ServiceError::Validation(
            "rentalPricePerHour must be a non-negative number".into(),
        )),
    }
}

fn parse_bound(
    field: &str,
    raw: &str,
) -> Result<chrono::DateTime<Utc>, ServiceError> {
    parse_timestamp(raw).ok_or_else(|| {
        ServiceError::Validation(format!(
            "{} must be an RFC 3339 timestamp or YYYY-MM-DD date",
            field
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::super::testutil::market_service;
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn tiller_fields() -> BTreeMap<String, String> {
        fields(&[
            ("toolName", "Tiller-X"),
            ("category", "Tiller"),
            ("rentalPricePerHour", "50"),
            ("availableFrom", "2024-01-01"),
            ("availableTo", "2024-01-02"),
        ])
    }

    fn photo() -> Upload {
        Upload {
            file_name: "machine.jpg".into(),
            data: b"jpeg bytes".to_vec(),
        }
    }

    fn query(pairs: &[(&str, &str)]) -> ListQuery {
        let raw: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ListQuery::parse(&raw, &EQUIPMENT_QUERY_SCHEMA).unwrap()
    }

    #[test]
    fn create_and_read_back() {
        let (_dir, svc) = market_service();
        let created = svc.create_equipment(&tiller_fields(), None).unwrap();
        assert_eq!(created.tool_name, "Tiller-X");
        assert_eq!(created.category, EquipmentCategory::Tiller);
        assert_eq!(created.available_from, "2024-01-01T00:00:00+00:00");

        let view = svc.get_equipment(&created.id).unwrap();
        assert_eq!(view.equipment, created);
        // The window is in the past.
        assert!(!view.is_available);
    }

    #[test]
    fn create_rejects_inverted_window() {
        let (_dir, svc) = market_service();
        let mut f = tiller_fields();
        f.insert("availableFrom".into(), "2024-01-02".into());
        f.insert("availableTo".into(), "2024-01-01".into());
        assert!(matches!(
            svc.create_equipment(&f, None),
            Err(ServiceError::Validation(_))
        ));

        // Equal bounds fail too, and nothing was written.
        let mut f = tiller_fields();
        f.insert("availableTo".into(), "2024-01-01".into());
        assert!(matches!(
            svc.create_equipment(&f, None),
            Err(ServiceError::Validation(_))
        ));
        assert_eq!(svc.list_equipment(&query(&[])).unwrap().total, 0);
    }

    #[test]
    fn create_rejects_unknown_category() {
        let (_dir, svc) = market_service();
        let mut f = tiller_fields();
        f.insert("category".into(), "Drone".into());
        let err = svc.create_equipment(&f, None).unwrap_err();
        match err {
            ServiceError::Validation(msg) => assert!(msg.contains("Tractor")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    /// Count regular files under a directory, recursively.
    fn file_count(dir: &std::path::Path) -> usize {
        let mut count = 0;
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    count += file_count(&path);
                } else {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn duplicate_tool_name_is_conflict_and_cleans_upload() {
        let (dir, svc) = market_service();
        svc.create_equipment(&tiller_fields(), None).unwrap();

        let err = svc.create_equipment(&tiller_fields(), Some(photo())).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // The staged photo of the failed create was compensated away:
        // no file survives anywhere in blob storage.
        assert_eq!(file_count(dir.path()), 0);
        assert_eq!(svc.list_equipment(&query(&[])).unwrap().total, 1);
    }

    #[test]
    fn update_checks_window_only_when_both_bounds_given() {
        let (_dir, svc) = market_service();
        let created = svc.create_equipment(&tiller_fields(), None).unwrap();

        // Single bound: accepted without a combined check.
        let updated = svc
            .update_equipment(
                &created.id,
                &fields(&[("availableTo", "2024-02-01")]),
                None,
            )
            .unwrap();
        assert_eq!(updated.available_to, "2024-02-01T00:00:00+00:00");

        // Both bounds inverted: rejected.
        let err = svc
            .update_equipment(
                &created.id,
                &fields(&[
                    ("availableFrom", "2024-03-02"),
                    ("availableTo", "2024-03-01"),
                ]),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn update_rejects_disallowed_fields() {
        let (_dir, svc) = market_service();
        let created = svc.create_equipment(&tiller_fields(), None).unwrap();

        let err = svc
            .update_equipment(
                &created.id,
                &fields(&[("toolName", "Tiller-Y"), ("rev", "7")]),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let view = svc.get_equipment(&created.id).unwrap();
        assert_eq!(view.equipment.tool_name, "Tiller-X");
    }

    #[test]
    fn delete_removes_record_and_image() {
        let (_dir, svc) = market_service();
        let created = svc.create_equipment(&tiller_fields(), Some(photo())).unwrap();
        let key = created.image.clone().unwrap();
        assert!(svc.blob.exists(&key).unwrap());

        svc.delete_equipment(&created.id).unwrap();
        assert!(matches!(
            svc.get_equipment(&created.id),
            Err(ServiceError::NotFound(_))
        ));
        assert!(!svc.blob.exists(&key).unwrap());
    }

    #[test]
    fn list_injects_availability_and_projects() {
        let (_dir, svc) = market_service();
        svc.create_equipment(&tiller_fields(), None).unwrap();

        let result = svc.list_equipment(&query(&[])).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0]["isAvailable"], false);
        assert!(result.items[0].get("rev").is_none());

        let result = svc
            .list_equipment(&query(&[("fields", "toolName,isAvailable")]))
            .unwrap();
        let keys: Vec<&String> = result.items[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["isAvailable", "toolName"]);
    }

    #[test]
    fn list_filters_by_rate() {
        let (_dir, svc) = market_service();
        svc.create_equipment(&tiller_fields(), None).unwrap();
        let mut f = tiller_fields();
        f.insert("toolName".into(), "Harvester-9".into());
        f.insert("category".into(), "Harvester".into());
        f.insert("rentalPricePerHour".into(), "120".into());
        svc.create_equipment(&f, None).unwrap();

        let result = svc
            .list_equipment(&query(&[("rentalPricePerHour[gt]", "100")]))
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0]["toolName"], "Harvester-9");
    }
}
