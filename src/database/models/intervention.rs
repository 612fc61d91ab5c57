use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::tenancy::{EntityKind, ScopedEntity, TenantId};

/// A field-service job for a client, optionally assigned to an artisan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    pub client_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artisan_id: Option<Uuid>,
    pub statut: String,
    pub description: String,
    pub adresse: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub montant: Option<f64>,
    pub echeance: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_debut: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScopedEntity for Intervention {
    const KIND: EntityKind = EntityKind::Intervention;
}

impl Intervention {
    pub fn new(client_id: Uuid, description: impl Into<String>, adresse: impl Into<String>, echeance: DateTime<Utc>) -> Self {
        Self {
            id: None,
            tenant_id: None,
            client_id,
            artisan_id: None,
            statut: "demande".to_string(),
            description: description.into(),
            adresse: adresse.into(),
            montant: None,
            echeance,
            date_debut: None,
            notes: None,
            documents: None,
            created_at: None,
            updated_at: None,
        }
    }
}
