use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::tenancy::{EntityKind, ScopedEntity, TenantId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    pub nom: String,
    /// `particulier` or `professionnel`.
    #[serde(rename = "type")]
    pub kind: String,
    pub adresse: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interventions_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScopedEntity for Client {
    const KIND: EntityKind = EntityKind::Client;
}

impl Client {
    pub fn new(nom: impl Into<String>, kind: impl Into<String>, adresse: impl Into<String>) -> Self {
        Self {
            id: None,
            tenant_id: None,
            nom: nom.into(),
            kind: kind.into(),
            adresse: adresse.into(),
            contact: None,
            lat: None,
            lng: None,
            evaluation: None,
            interventions_count: None,
            settings: None,
            created_at: None,
            updated_at: None,
        }
    }
}
