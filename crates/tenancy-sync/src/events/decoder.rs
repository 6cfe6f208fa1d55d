//! Mapping-driven decoder from raw events pages to tenant and move records.
//!
//! Each event in a page is flattened before mapping: the fields of its details
//! object, its entity type, and its global account GUID (stored under
//! `global_account_key`) end up in one JSON object. Every lookup afterwards
//! goes through [`TenantFieldMapping`].
//!
//! Malformed events never fail the page: they are logged and skipped.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{MovedSubaccountFieldMapping, TenantFieldMapping};
use crate::error::{SyncError, SyncResult};
use crate::events::{lookup, EventKind, EventsPage};
use crate::model::{MoveRecord, TenantRecord, TenantType};

static GLOBAL_ACCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^GLOBALACCOUNT_.*|GlobalAccount").expect("GLOBAL_ACCOUNT_RE is a valid regex pattern")
});

/// Decodes events pages using a configurable field-name mapping.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    fields: TenantFieldMapping,
    moved_fields: MovedSubaccountFieldMapping,
    events_field: String,
    provider: String,
}

impl EventDecoder {
    /// Create a decoder for pages whose events array lives at `events_field`.
    pub fn new(
        fields: TenantFieldMapping,
        moved_fields: MovedSubaccountFieldMapping,
        events_field: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            fields,
            moved_fields,
            events_field: events_field.into(),
            provider: provider.into(),
        }
    }

    /// Provider name stamped on decoded tenants.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Decode all tenant records of a page, skipping malformed events.
    #[must_use]
    pub fn decode_tenants(&self, page: &EventsPage, kind: EventKind) -> Vec<TenantRecord> {
        let mut tenants = Vec::new();
        for details in self.flatten_events(page) {
            match self.event_to_tenants(kind, &details) {
                Ok(records) => tenants.extend(records),
                Err(e) => {
                    let event = Value::Object(details);
                    warn!(
                        event_kind = %kind,
                        error = %e,
                        event = %event,
                        "Could not convert event to tenant, skipping"
                    );
                }
            }
        }
        tenants
    }

    /// Decode all move records of a page, skipping malformed events.
    #[must_use]
    pub fn decode_moves(&self, page: &EventsPage) -> Vec<MoveRecord> {
        let mut moves = Vec::new();
        for details in self.flatten_events(page) {
            match self.event_to_move(&details) {
                Ok(record) => moves.push(record),
                Err(e) => {
                    let event = Value::Object(details);
                    warn!(
                        error = %e,
                        event = %event,
                        "Could not convert event to moved subaccount, skipping"
                    );
                }
            }
        }
        moves
    }

    fn flatten_events(&self, page: &EventsPage) -> Vec<Map<String, Value>> {
        let Some(Value::Array(events)) = page.get(&self.events_field) else {
            debug!(field = %self.events_field, "Page has no events array");
            return Vec::new();
        };

        events
            .iter()
            .map(|event| {
                let mut details = match lookup(event, &self.fields.details_field) {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Map::new(),
                };
                let entity_type = lookup(event, &self.fields.entity_type_field)
                    .cloned()
                    .unwrap_or(Value::Null);
                let global_account = lookup(event, &self.fields.global_account_guid_field)
                    .cloned()
                    .unwrap_or(Value::Null);
                details.insert(self.fields.entity_type_field.clone(), entity_type);
                details.insert(self.fields.global_account_key.clone(), global_account);
                details
            })
            .collect()
    }

    fn event_to_tenants(
        &self,
        kind: EventKind,
        details: &Map<String, Value>,
    ) -> SyncResult<Vec<TenantRecord>> {
        if kind.is_account_creation() {
            if let (Some(field), Some(expected)) = (
                &self.fields.discriminator_field,
                &self.fields.discriminator_value,
            ) {
                let actual = string_field(details, field)
                    .ok_or_else(|| invalid_field(field))?;
                if &actual != expected {
                    return Ok(Vec::new());
                }
            }
        }

        let id = self.tenant_id(details)?;
        let name = self.name(details, &id);
        let subdomain = self.subdomain(details, &id);

        let entity_type = string_field(details, &self.fields.entity_type_field)
            .ok_or_else(|| invalid_field(&self.fields.entity_type_field))?;
        let license_type = string_field(details, &self.fields.license_type_field);

        if GLOBAL_ACCOUNT_RE.is_match(&entity_type) {
            let mut account = TenantRecord::new(&id, name, TenantType::Account, &self.provider)
                .with_subdomain(subdomain);
            account.license_type = license_type.clone();

            match string_field(details, &self.fields.customer_id_field) {
                Some(customer) => account.parents.push(customer),
                None => debug!(tenant_id = %id, "Global account has no customer ID"),
            }

            let Some(cost_object_id) = string_field(details, &self.fields.cost_object_id_field)
            else {
                return Ok(vec![account]);
            };
            account.parents.push(cost_object_id.clone());
            let cost_object = self.cost_object(&cost_object_id, license_type);
            return Ok(vec![account, cost_object]);
        }

        let mut subaccount = self.subaccount(details, &id, name, subdomain)?;
        subaccount.license_type = license_type.clone();

        let Some(cost_object_id) =
            string_field(details, &self.fields.subaccount_cost_object_id_field)
        else {
            return Ok(vec![subaccount]);
        };
        subaccount.cost_object_id = Some(cost_object_id.clone());

        let mut cost_object = self.cost_object(&cost_object_id, license_type);
        cost_object.cost_object_type =
            string_field(details, &self.fields.subaccount_cost_object_type_field);
        Ok(vec![subaccount, cost_object])
    }

    fn event_to_move(&self, details: &Map<String, Value>) -> SyncResult<MoveRecord> {
        let moved = &self.moved_fields;
        let subaccount_id = string_field(details, &moved.subaccount_id_field)
            .ok_or_else(|| invalid_field(&moved.subaccount_id_field))?;
        let source_id = string_field(details, &moved.source_tenant_field)
            .ok_or_else(|| invalid_field(&moved.source_tenant_field))?;
        let target_id = string_field(details, &moved.target_tenant_field)
            .ok_or_else(|| invalid_field(&moved.target_tenant_field))?;

        let name = lookup_field(details, &self.fields.name_field)
            .map(value_to_string)
            .ok_or_else(|| invalid_field(&self.fields.name_field))?;
        let subdomain = self.subdomain(details, &subaccount_id);

        let mut tenant = self.subaccount(details, &subaccount_id, name, subdomain)?;
        tenant.license_type = string_field(details, &self.fields.license_type_field);

        Ok(MoveRecord {
            subaccount_id,
            source_id,
            target_id,
            tenant,
        })
    }

    fn subaccount(
        &self,
        details: &Map<String, Value>,
        id: &str,
        name: String,
        subdomain: String,
    ) -> SyncResult<TenantRecord> {
        let parent = string_field(details, &self.fields.global_account_key)
            .ok_or_else(|| invalid_field(&self.fields.global_account_key))?;

        let region = string_field(details, &self.fields.region_field).unwrap_or_else(|| {
            debug!(tenant_id = %id, field = %self.fields.region_field, "Subaccount has no region");
            String::new()
        });

        let mut record = TenantRecord::new(id, name, TenantType::Subaccount, &self.provider)
            .with_parent(parent)
            .with_subdomain(subdomain)
            .with_region(region);

        record.customer_id = lookup_field(details, &self.fields.labels_field)
            .and_then(|labels| lookup(labels, &self.fields.customer_id_field))
            .and_then(Value::as_array)
            .and_then(|values| values.first())
            .map(|v| trim_customer_id(&value_to_string(v)));

        Ok(record)
    }

    fn cost_object(&self, id: &str, license_type: Option<String>) -> TenantRecord {
        let mut record = TenantRecord::new(id, id, TenantType::CostObject, &self.provider);
        record.license_type = license_type;
        record
    }

    /// First non-empty of the ID, global account GUID and subaccount ID fields.
    fn tenant_id(&self, details: &Map<String, Value>) -> SyncResult<String> {
        [
            &self.fields.id_field,
            &self.fields.global_account_guid_field,
            &self.fields.subaccount_id_field,
        ]
        .into_iter()
        .find_map(|field| string_field(details, field))
        .ok_or_else(|| SyncError::decode("Missing or invalid format of the ID field"))
    }

    fn name(&self, details: &Map<String, Value>, id: &str) -> String {
        match lookup_field(details, &self.fields.name_field) {
            Some(value) => value_to_string(value),
            None => {
                warn!(tenant_id = %id, field = %self.fields.name_field, "Missing name field");
                String::new()
            }
        }
    }

    fn subdomain(&self, details: &Map<String, Value>, id: &str) -> String {
        match lookup_field(details, &self.fields.subdomain_field) {
            Some(value) => value_to_string(value),
            None => {
                debug!(tenant_id = %id, field = %self.fields.subdomain_field, "Missing subdomain field");
                String::new()
            }
        }
    }
}

fn lookup_field<'a>(details: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    if let Some(value) = details.get(field) {
        return Some(value).filter(|v| !v.is_null());
    }
    let (head, rest) = field.split_once('.')?;
    details
        .get(head)
        .and_then(|v| lookup(v, rest))
        .filter(|v| !v.is_null())
}

/// Non-empty string value of a field; numbers and booleans are stringified.
fn string_field(details: &Map<String, Value>, field: &str) -> Option<String> {
    lookup_field(details, field)
        .map(value_to_string)
        .filter(|s| !s.is_empty())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn trim_customer_id(id: &str) -> String {
    let trimmed = id.trim_start_matches('0');
    if trimmed.is_empty() && !id.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn invalid_field(field: &str) -> SyncError {
    SyncError::decode(format!("invalid format of {field} field"))
}
