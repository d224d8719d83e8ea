use std::collections::BTreeMap;

use agrimart_core::{new_id, now_rfc3339, ListQuery, ListResult, QuerySchema, ServiceError};
use sql::Value;

use super::attachment::{discard, StagedBlob, Upload};
use super::MarketService;
use crate::model::{DeliveryOption, Listing};

/// Queryable listing fields: API name → indexed column.
pub const LISTING_QUERY_SCHEMA: QuerySchema = QuerySchema {
    fields: &[
        ("name", "name"),
        ("category", "category"),
        ("quantity", "quantity"),
        ("price", "price"),
        ("location", "location"),
        ("deliveryOption", "delivery_option"),
        ("isActive", "is_active"),
        ("createdAt", "created_at"),
        ("updatedAt", "updated_at"),
    ],
    default_sort: "created_at",
};

const REQUIRED_FIELDS: &[&str] = &[
    "name",
    "category",
    "quantity",
    "price",
    "location",
    "description",
    "deliveryOption",
];

/// Fields a partial update may touch. Anything else rejects the whole
/// request.
const ALLOWED_UPDATES: &[&str] = &[
    "name",
    "category",
    "quantity",
    "price",
    "location",
    "description",
    "deliveryOption",
];

/// Blob key prefix for listing photos.
const IMAGE_PREFIX: &str = "listings";

impl MarketService {
    pub fn create_listing(
        &self,
        fields: &BTreeMap<String, String>,
        upload: Option<Upload>,
    ) -> Result<Listing, ServiceError> {
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

        let quantity = parse_quantity(&fields["quantity"])?;
        let price = parse_price(&fields["price"])?;
        let delivery_option = parse_delivery_option(&fields["deliveryOption"])?;

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

        let record = Listing {
            id: id.clone(),
            name: fields["name"].clone(),
            category: fields["category"].clone(),
            quantity,
            price,
            location: fields["location"].clone(),
            description: fields["description"].clone(),
            delivery_option,
            image: staged.as_ref().map(|s| s.key().to_string()),
            is_active: true,
            rev: 0,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        };

        // On failure the staged blob is dropped uncommitted and deleted.
        self.insert_record("listings", &id, &record, &listing_indexes(&record))?;

        if let Some(staged) = staged {
            staged.commit();
        }
        Ok(record)
    }

    pub fn get_listing(&self, id: &str) -> Result<Listing, ServiceError> {
        Self::ensure_id("listing", id)?;
        self.get_record("listings", "listing", id)
    }

    /// Browse active listings with filters, sort, projection, pagination.
    pub fn list_listings(
        &self,
        query: &ListQuery,
    ) -> Result<ListResult<serde_json::Value>, ServiceError> {
        let (mut docs, total) =
            self.query_docs("listings", query, &[("is_active", Value::Integer(1))])?;
        for doc in &mut docs {
            agrimart_core::query::project(doc, query.fields.as_deref());
        }
        Ok(ListResult {
            items: docs,
            total,
            page: query.page,
            limit: query.limit,
            pages: query.pages(total),
        })
    }

    /// All active listings in a category, newest first.
    pub fn list_listings_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<Listing>, ServiceError> {
        self.list_docs_where(
            "listings",
            &[
                ("category", Value::Text(category.to_string())),
                ("is_active", Value::Integer(1)),
            ],
        )
    }

    pub fn update_listing(
        &self,
        id: &str,
        fields: &BTreeMap<String, String>,
        upload: Option<Upload>,
    ) -> Result<Listing, ServiceError> {
        Self::ensure_id("listing", id)?;

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

        let mut patch = listing_patch(fields)?;

        let current: Listing = self.get_record("listings", "listing", id)?;

        // The previous file is only replaced after validation succeeded.
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

        let updated: Listing = Self::patch_doc(&current, patch)?;
        self.update_record("listings", "listing", id, &updated, &listing_indexes(&updated))?;

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

    pub fn delete_listing(&self, id: &str) -> Result<(), ServiceError> {
        Self::ensure_id("listing", id)?;
        let current: Listing = self.get_record("listings", "listing", id)?;
        self.delete_record("listings", "listing", id)?;
        // Record first, then file: a crash in between leaks the file,
        // never a dangling record.
        if let Some(key) = &current.image {
            discard(&self.blob, key);
        }
        Ok(())
    }
}

fn listing_indexes(l: &Listing) -> Vec<(&'static str, Value)> {
    vec![
        ("name", Value::Text(l.name.clone())),
        ("category", Value::Text(l.category.clone())),
        ("quantity", Value::Integer(l.quantity as i64)),
        ("price", Value::Real(l.price)),
        ("location", Value::Text(l.location.clone())),
        ("delivery_option", Value::Text(l.delivery_option.to_string())),
        ("is_active", Value::Integer(l.is_active as i64)),
        ("created_at", Value::Text(l.created_at.clone().unwrap_or_default())),
        ("updated_at", Value::Text(l.updated_at.clone().unwrap_or_default())),
    ]
}

/// Convert allow-listed update fields to a typed patch.
fn listing_patch(
    fields: &BTreeMap<String, String>,
) -> Result<serde_json::Map<String, serde_json::Value>, ServiceError> {
    let mut patch = serde_json::Map::new();
    for (key, value) in fields {
        match key.as_str() {
            "quantity" => {
                patch.insert(key.clone(), serde_json::json!(parse_quantity(value)?));
            }
            "price" => {
                patch.insert(key.clone(), serde_json::json!(parse_price(value)?));
            }
            "deliveryOption" => {
                patch.insert(
                    key.clone(),
                    serde_json::json!(parse_delivery_option(value)?),
                );
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
    Ok(patch)
}

fn parse_quantity(raw: &str) -> Result<u32, ServiceError> {
    raw.trim().parse::<u32>().map_err(|_| {
        ServiceError::Validation("quantity must be a non-negative integer".into())
    })
}

fn parse_price(raw: &str) -> Result<f64, ServiceError> {
    match raw.trim().parse::<f64>() {
        Ok(p) if p.is_finite() && p >= 0.0 => Ok(p),
        _ => Err(ServiceError::Validation("price must be a non-negative number".into())),
    }
}

fn parse_delivery_option(raw: &str) -> Result<DeliveryOption, ServiceError> {
    raw.parse().map_err(|_| {
        ServiceError::Validation(format!(
            "invalid delivery option '{}'; must be one of: pickup, delivery, both",
            raw
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

    fn rice_fields() -> BTreeMap<String, String> {
        fields(&[
            ("name", "Basmati Rice"),
            ("category", "Grains"),
            ("quantity", "200"),
            ("price", "45.5"),
            ("location", "Pune"),
            ("description", "Freshly harvested"),
            ("deliveryOption", "both"),
        ])
    }

    fn photo() -> Upload {
        Upload {
            file_name: "photo.jpg".into(),
            data: b"jpeg bytes".to_vec(),
        }
    }

    fn query(pairs: &[(&str, &str)]) -> ListQuery {
        let raw: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ListQuery::parse(&raw, &LISTING_QUERY_SCHEMA).unwrap()
    }

    #[test]
    fn create_and_get() {
        let (_dir, svc) = market_service();
        let created = svc.create_listing(&rice_fields(), None).unwrap();
        assert_eq!(created.quantity, 200);
        assert_eq!(created.price, 45.5);
        assert!(created.is_active);
        assert_eq!(created.rev, 0);
        assert!(created.created_at.is_some());

        let fetched = svc.get_listing(&created.id).unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn create_missing_fields_writes_nothing() {
        let (_dir, svc) = market_service();
        let mut f = rice_fields();
        f.remove("price");
        f.insert("description".into(), "  ".into()); // whitespace counts as missing

        let err = svc.create_listing(&f, None).unwrap_err();
        match err {
            ServiceError::Validation(msg) => {
                assert!(msg.contains("price"));
                assert!(msg.contains("description"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let result = svc.list_listings(&query(&[])).unwrap();
        assert_eq!(result.total, 0);
    }

    #[test]
    fn create_rejects_bad_numbers_and_enum() {
        let (_dir, svc) = market_service();

        let mut f = rice_fields();
        f.insert("quantity".into(), "many".into());
        assert!(matches!(
            svc.create_listing(&f, None),
            Err(ServiceError::Validation(_))
        ));

        let mut f = rice_fields();
        f.insert("deliveryOption".into(), "courier".into());
        assert!(matches!(
            svc.create_listing(&f, None),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn create_stores_image() {
        let (_dir, svc) = market_service();
        let created = svc.create_listing(&rice_fields(), Some(photo())).unwrap();
        let key = created.image.as_deref().unwrap();
        assert_eq!(key, format!("listings/{}.jpg", created.id));
        assert!(svc.blob.exists(key).unwrap());
    }

    #[test]
    fn get_rejects_malformed_id() {
        let (_dir, svc) = market_service();
        assert!(matches!(
            svc.get_listing("not-hex"),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn update_applies_only_provided_fields() {
        let (_dir, svc) = market_service();
        let created = svc.create_listing(&rice_fields(), None).unwrap();

        let updated = svc
            .update_listing(&created.id, &fields(&[("price", "60")]), None)
            .unwrap();
        assert_eq!(updated.price, 60.0);
        assert_eq!(updated.name, created.name);
        assert_eq!(updated.quantity, created.quantity);
        assert_eq!(updated.rev, 1);
        assert_ne!(updated.updated_at, created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn update_is_all_or_nothing() {
        let (_dir, svc) = market_service();
        let created = svc.create_listing(&rice_fields(), None).unwrap();

        let err = svc
            .update_listing(
                &created.id,
                &fields(&[("price", "60"), ("isActive", "false")]),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // The valid field was not applied either.
        let fetched = svc.get_listing(&created.id).unwrap();
        assert_eq!(fetched.price, 45.5);
        assert_eq!(fetched.rev, 0);
    }

    #[test]
    fn update_replaces_image_and_deletes_old() {
        let (_dir, svc) = market_service();
        let created = svc.create_listing(&rice_fields(), Some(photo())).unwrap();
        let old_key = created.image.clone().unwrap();

        let updated = svc
            .update_listing(
                &created.id,
                &BTreeMap::new(),
                Some(Upload {
                    file_name: "better.png".into(),
                    data: b"png bytes".to_vec(),
                }),
            )
            .unwrap();

        let new_key = updated.image.as_deref().unwrap();
        assert_eq!(new_key, format!("listings/{}.png", created.id));
        assert!(svc.blob.exists(new_key).unwrap());
        assert!(!svc.blob.exists(&old_key).unwrap());
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let (_dir, svc) = market_service();
        let err = svc
            .update_listing(
                "0123456789abcdef0123456789abcdef",
                &fields(&[("price", "60")]),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn delete_removes_record_and_image() {
        let (_dir, svc) = market_service();
        let created = svc.create_listing(&rice_fields(), Some(photo())).unwrap();
        let key = created.image.clone().unwrap();

        svc.delete_listing(&created.id).unwrap();
        assert!(matches!(
            svc.get_listing(&created.id),
            Err(ServiceError::NotFound(_))
        ));
        assert!(!svc.blob.exists(&key).unwrap());
    }

    #[test]
    fn list_filters_sorts_and_paginates() {
        let (_dir, svc) = market_service();
        for (name, price) in [
            ("Wheat", 20.0),
            ("Rice", 45.0),
            ("Maize", 30.0),
            ("Millet", 55.0),
            ("Barley", 25.0),
        ] {
            let mut f = rice_fields();
            f.insert("name".into(), name.into());
            f.insert("price".into(), price.to_string());
            svc.create_listing(&f, None).unwrap();
        }

        // price >= 25, descending by price, page 1 of 2.
        let result = svc
            .list_listings(&query(&[
                ("price[gte]", "25"),
                ("sort", "-price"),
                ("page", "1"),
                ("limit", "2"),
            ]))
            .unwrap();
        assert_eq!(result.total, 4);
        assert_eq!(result.pages, 2);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0]["name"], "Millet");
        assert_eq!(result.items[1]["name"], "Rice");

        // Page 2 skips the first limit items.
        let result = svc
            .list_listings(&query(&[
                ("price[gte]", "25"),
                ("sort", "-price"),
                ("page", "2"),
                ("limit", "2"),
            ]))
            .unwrap();
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0]["name"], "Maize");
        assert_eq!(result.items[1]["name"], "Barley");
    }

    #[test]
    fn list_hides_rev_unless_projected() {
        let (_dir, svc) = market_service();
        svc.create_listing(&rice_fields(), None).unwrap();

        let result = svc.list_listings(&query(&[])).unwrap();
        assert!(result.items[0].get("rev").is_none());
        assert!(result.items[0].get("name").is_some());

        let result = svc
            .list_listings(&query(&[("fields", "name,price")]))
            .unwrap();
        let keys: Vec<&String> = result.items[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["name", "price"]);
    }

    #[test]
    fn list_by_category_only_active() {
        let (_dir, svc) = market_service();
        let mut f = rice_fields();
        f.insert("category".into(), "Seeds".into());
        svc.create_listing(&f, None).unwrap();
        svc.create_listing(&rice_fields(), None).unwrap(); // Grains

        let seeds = svc.list_listings_by_category("Seeds").unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].category, "Seeds");

        assert!(svc.list_listings_by_category("Dairy").unwrap().is_empty());
    }
}
