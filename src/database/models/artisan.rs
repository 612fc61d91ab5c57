use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::tenancy::{EntityKind, ScopedEntity, TenantId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artisan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    pub nom: String,
    pub specialite: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statut: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activite_badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_mois: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_moyenne: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disponible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScopedEntity for Artisan {
    const KIND: EntityKind = EntityKind::Artisan;
}

impl Artisan {
    pub fn new(nom: impl Into<String>, specialite: impl Into<String>) -> Self {
        Self {
            id: None,
            tenant_id: None,
            nom: nom.into(),
            specialite: specialite.into(),
            statut: None,
            zone: None,
            activite_badge: None,
            ca_mois: None,
            note_moyenne: None,
            disponible: None,
            contact_info: None,
            created_at: None,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unset_fields_are_not_serialized() {
        let value = serde_json::to_value(Artisan::new("Jean Dupont", "Plomberie")).unwrap();
        assert_eq!(value, json!({ "nom": "Jean Dupont", "specialite": "Plomberie" }));
    }

    #[test]
    fn decodes_row_json() {
        let row = json!({
            "id": "7d5e4a1c-2f3b-4c6d-8e9f-0a1b2c3d4e5f",
            "tenant_id": "550e8400-e29b-41d4-a716-446655440000",
            "nom": "Marie Martin",
            "specialite": "Électricité",
            "statut": "expert",
            "zone": "Paris",
            "activite_badge": null,
            "ca_mois": 5500.0,
            "note_moyenne": 4.9,
            "disponible": true,
            "contact_info": { "phone": "+33987654321" },
            "created_at": "2024-07-18T14:00:00.123456+00:00",
            "updated_at": "2024-07-18T14:00:00.123456+00:00"
        });
        let artisan: Artisan = serde_json::from_value(row).unwrap();
        assert_eq!(artisan.tenant_id.unwrap().to_string(), "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(artisan.activite_badge, None);
        assert!(artisan.created_at.is_some());
    }
}
