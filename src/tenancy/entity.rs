use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column carrying the owning tenant on every scoped table.
pub const TENANT_COLUMN: &str = "tenant_id";

/// Payload spelling of the tenant column used by the web client.
pub const TENANT_FIELD_ALIAS: &str = "tenantId";

/// Every tenant-owned entity kind. Storage is only reachable through this
/// enum, so a new kind cannot be wired in without picking its table here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Client,
    Artisan,
    Intervention,
    Evaluation,
    MessageThread,
    Message,
    Task,
    Notification,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::User,
        EntityKind::Client,
        EntityKind::Artisan,
        EntityKind::Intervention,
        EntityKind::Evaluation,
        EntityKind::MessageThread,
        EntityKind::Message,
        EntityKind::Task,
        EntityKind::Notification,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Client => "clients",
            EntityKind::Artisan => "artisans",
            EntityKind::Intervention => "interventions",
            EntityKind::Evaluation => "evaluations",
            EntityKind::MessageThread => "message_threads",
            EntityKind::Message => "messages",
            EntityKind::Task => "tasks",
            EntityKind::Notification => "notifications",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown entity: {0}")]
pub struct UnknownEntity(pub String);

impl FromStr for EntityKind {
    type Err = UnknownEntity;

    /// Accepts table names (`message_threads`) and the web client's model
    /// names (`messageThread`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.chars().filter(|c| *c != '_' && *c != '-').collect::<String>().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| {
                let table = kind.table().replace('_', "");
                normalized == table || normalized == table.trim_end_matches('s')
            })
            .ok_or_else(|| UnknownEntity(s.to_string()))
    }
}

/// Compile-time marker for typed models stored in a scoped table.
pub trait ScopedEntity: Serialize + DeserializeOwned + Send + Unpin {
    const KIND: EntityKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_and_model_names() {
        assert_eq!("interventions".parse::<EntityKind>().unwrap(), EntityKind::Intervention);
        assert_eq!("intervention".parse::<EntityKind>().unwrap(), EntityKind::Intervention);
        assert_eq!("messageThread".parse::<EntityKind>().unwrap(), EntityKind::MessageThread);
        assert_eq!("message_threads".parse::<EntityKind>().unwrap(), EntityKind::MessageThread);
        assert_eq!("messages".parse::<EntityKind>().unwrap(), EntityKind::Message);
        assert!("tenants".parse::<EntityKind>().is_err());
        assert!("pg_catalog".parse::<EntityKind>().is_err());
    }

    #[test]
    fn every_table_name_is_an_identifier() {
        for kind in EntityKind::ALL {
            assert!(crate::filter::is_identifier(kind.table()), "{}", kind);
        }
    }
}
