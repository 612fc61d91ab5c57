mod common;

use std::collections::HashMap;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use sqlx::Row;
use uuid::Uuid;

use artisan_crm_api::config::BindingStrategy;
use artisan_crm_api::database::models::{Client, Intervention};
use artisan_crm_api::error::ApiError;
use artisan_crm_api::filter::FilterData;
use artisan_crm_api::tenancy::{DataError, EntityKind, Outcome, Record, TenancyError, TENANT_SETTING};

fn client_payload(nom: &str) -> Record {
    json!({ "nom": nom, "type": "particulier", "adresse": "123 Rue de la Paix, 75001 Paris" })
        .as_object()
        .cloned()
        .expect("object")
}

fn by_nom(nom: &str) -> FilterData {
    FilterData::with_where(json!({ "nom": nom }))
}

fn record(value: Value) -> Record {
    value.as_object().cloned().expect("object")
}

fn id_of(row: &Record) -> Uuid {
    row["id"].as_str().expect("id").parse().expect("uuid")
}

fn sqlstate(err: &DataError) -> Option<String> {
    match err {
        DataError::Sqlx(e) => e.as_database_error().and_then(|db| db.code()).map(|c| c.into_owned()),
        _ => None,
    }
}

/// Smallest valid row of `kind`, pointing at the parents seeded before it.
fn minimal_payload(kind: EntityKind, parents: &HashMap<EntityKind, Uuid>) -> Record {
    let parent = |k: EntityKind| parents[&k].to_string();
    record(match kind {
        EntityKind::User => json!({ "email": format!("{}@artisan.test", Uuid::new_v4().simple()) }),
        EntityKind::Client => Value::Object(client_payload("Bernard")),
        EntityKind::Artisan => json!({ "nom": "Petit", "specialite": "plomberie" }),
        EntityKind::Intervention => json!({
            "client_id": parent(EntityKind::Client),
            "description": "Fuite sous evier",
            "adresse": "4 Rue Oberkampf, Paris",
            "echeance": "2025-01-01T09:00:00Z"
        }),
        EntityKind::Evaluation => json!({ "intervention_id": parent(EntityKind::Intervention), "note": 4.5 }),
        EntityKind::MessageThread => json!({ "sujet": "Devis", "intervention_id": parent(EntityKind::Intervention) }),
        EntityKind::Message => json!({
            "thread_id": parent(EntityKind::MessageThread),
            "sender_id": parent(EntityKind::User),
            "contenu": "Bonjour"
        }),
        EntityKind::Task => json!({ "titre": "Rappeler le client", "assigned_to": parent(EntityKind::User) }),
        EntityKind::Notification => json!({
            "user_id": parent(EntityKind::User),
            "type": "rappel",
            "message": "Intervention demain"
        }),
    })
}

/// A nullable text column of `kind` to patch.
fn patch_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "first_name",
        EntityKind::Client => "contact",
        EntityKind::Artisan => "zone",
        EntityKind::Intervention => "notes",
        EntityKind::Evaluation => "commentaire",
        EntityKind::MessageThread => "sujet",
        EntityKind::Message => "contenu",
        EntityKind::Task => "description",
        EntityKind::Notification => "message",
    }
}

/// One row of every kind for the session's tenant, parents first.
async fn seed_every_kind(data: &artisan_crm_api::tenancy::ScopedDataAccess) -> Result<HashMap<EntityKind, Uuid>> {
    let mut ids = HashMap::new();
    for kind in EntityKind::ALL {
        let row = data.create(kind, minimal_payload(kind, &ids)).await?;
        ids.insert(kind, id_of(&row));
    }
    Ok(ids)
}

#[tokio::test]
async fn reused_connection_serves_each_tenant_its_own_rows() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "t1", true).await?;
    let t2 = common::insert_tenant(&pool, "t2", true).await?;
    let nom = format!("Durand {}", Uuid::new_v4());

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    data.create(EntityKind::Client, client_payload(&nom)).await?;
    session.release(Outcome::Commit).await?;

    let (data, session) = common::scoped(&pool, &config, t2).await?;
    {
        let mut bound = session.lock().await?;
        let marker: Option<String> = sqlx::query_scalar("SELECT current_setting($1, true)")
            .bind(TENANT_SETTING)
            .fetch_one(bound.connection()?)
            .await?;
        assert_eq!(marker, Some(t2.to_string()));
    }
    assert!(data.find_many(EntityKind::Client, by_nom(&nom)).await?.is_empty());
    assert_eq!(data.count(EntityKind::Client, by_nom(&nom)).await?, 0);
    session.release(Outcome::Rollback).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    assert_eq!(data.count(EntityKind::Client, by_nom(&nom)).await?, 1);
    session.release(Outcome::Rollback).await?;
    Ok(())
}

#[tokio::test]
async fn create_stamps_context_tenant() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "stamp", true).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let created = data.create(EntityKind::Client, client_payload("Leroy")).await?;
    assert_eq!(created["tenant_id"], json!(t1.to_string()));

    let typed = data.repository::<Client>().create(&Client::new("Martin", "professionnel", "Lyon")).await?;
    assert_eq!(typed.tenant_id, Some(t1));
    assert!(typed.id.is_some());
    session.release(Outcome::Rollback).await?;
    Ok(())
}

#[tokio::test]
async fn mismatched_tenant_writes_nothing() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "mine", true).await?;
    let t2 = common::insert_tenant(&pool, "theirs", true).await?;
    let nom = format!("Intrus {}", Uuid::new_v4());

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let mut payload = client_payload(&nom);
    payload.insert("tenantId".to_string(), Value::String(t2.to_string()));
    let err = data.create(EntityKind::Client, payload).await.unwrap_err();
    assert!(matches!(err, DataError::Tenancy(TenancyError::Mismatch { .. })), "{:?}", err);
    session.release(Outcome::Commit).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients WHERE nom = $1")
        .bind(&nom)
        .fetch_one(&pool)
        .await?;
    assert_eq!(total, 0);
    Ok(())
}

#[tokio::test]
async fn other_tenant_cannot_update_or_delete_by_primary_key() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "owner", true).await?;
    let t2 = common::insert_tenant(&pool, "intruder", true).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let created = data.create(EntityKind::Client, client_payload("Original")).await?;
    session.release(Outcome::Commit).await?;
    let id: Uuid = created["id"].as_str().expect("id").parse()?;

    let (data, session) = common::scoped(&pool, &config, t2).await?;
    let patch = json!({ "nom": "Hijacked" }).as_object().cloned().expect("object");
    assert!(data.update_by_id(EntityKind::Client, id, patch).await?.is_none());
    assert!(data.delete_by_id(EntityKind::Client, id).await?.is_none());
    assert!(data.find_by_id(EntityKind::Client, id).await?.is_none());
    session.release(Outcome::Commit).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let row = data.find_by_id(EntityKind::Client, id).await?.expect("row survives");
    assert_eq!(row["nom"], "Original");
    session.release(Outcome::Rollback).await?;
    Ok(())
}

#[tokio::test]
async fn update_cannot_move_rows_between_tenants() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "keep", true).await?;
    let t2 = common::insert_tenant(&pool, "steal", true).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let created = data.create(EntityKind::Client, client_payload("Fixe")).await?;
    let id: Uuid = created["id"].as_str().expect("id").parse()?;

    let patch = json!({ "tenant_id": t2.to_string(), "nom": "Moved" }).as_object().cloned().expect("object");
    let err = data.update_by_id(EntityKind::Client, id, patch).await.unwrap_err();
    assert!(matches!(err, DataError::Tenancy(TenancyError::Mismatch { .. })));

    let patch = json!({ "tenant_id": t1.to_string(), "nom": "Renamed" }).as_object().cloned().expect("object");
    let updated = data.update_by_id(EntityKind::Client, id, patch).await?.expect("updated");
    assert_eq!(updated["nom"], "Renamed");
    assert_eq!(updated["tenant_id"], json!(t1.to_string()));
    session.release(Outcome::Rollback).await?;
    Ok(())
}

#[tokio::test]
async fn dropped_session_rolls_back() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "abandon", true).await?;
    let nom = format!("Abandon {}", Uuid::new_v4());

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    data.create(EntityKind::Client, client_payload(&nom)).await?;
    drop(data);
    drop(session);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients WHERE nom = $1")
        .bind(&nom)
        .fetch_one(&pool)
        .await?;
    assert_eq!(total, 0);
    Ok(())
}

#[tokio::test]
async fn checkout_returns_connection_without_marker() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Checkout);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "checkout", true).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let created = data.create(EntityKind::Client, client_payload("Checkout")).await?;
    assert_eq!(created["tenant_id"], json!(t1.to_string()));
    drop(data);
    session.release(Outcome::Commit).await?;

    let row = sqlx::query("SELECT current_setting($1, true) AS marker")
        .bind(TENANT_SETTING)
        .fetch_one(&pool)
        .await?;
    let marker: Option<String> = row.try_get("marker")?;
    assert!(marker.unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn intervention_repository_is_scoped_to_its_tenant() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "plombier", true).await?;
    let t2 = common::insert_tenant(&pool, "electricien", true).await?;
    let echeance = Utc.with_ymd_and_hms(2025, 3, 14, 8, 30, 0).single().expect("date");

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let client = data.repository::<Client>().create(&Client::new("Moreau", "particulier", "Nantes")).await?;
    let client_id = client.id.expect("client id");
    let created = data
        .repository::<Intervention>()
        .create(&Intervention::new(client_id, "Remplacement chauffe-eau", "Nantes", echeance))
        .await?;
    assert_eq!(created.tenant_id, Some(t1));
    assert_eq!(created.client_id, client_id);
    assert_eq!(created.statut, "demande");
    let id = created.id.expect("intervention id");
    let fetched = data.repository::<Intervention>().get(id).await?;
    assert_eq!(fetched.echeance, echeance);
    session.release(Outcome::Commit).await?;

    let (data, session) = common::scoped(&pool, &config, t2).await?;
    let interventions = data.repository::<Intervention>();
    assert!(interventions.find_many(FilterData::default()).await?.is_empty());
    assert_eq!(interventions.count(FilterData::default()).await?, 0);
    assert!(matches!(interventions.get(id).await, Err(DataError::NotFound)));
    assert!(interventions.update_by_id(id, &json!({ "statut": "annulee" })).await?.is_none());
    assert!(interventions.delete_by_id(id).await?.is_none());
    session.release(Outcome::Commit).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    assert_eq!(data.repository::<Intervention>().get(id).await?.statut, "demande");
    session.release(Outcome::Rollback).await?;
    Ok(())
}

#[tokio::test]
async fn every_kind_is_confined_to_its_tenant() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "every-a", true).await?;
    let t2 = common::insert_tenant(&pool, "every-b", true).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let t1_ids = seed_every_kind(&data).await?;
    drop(data);
    session.release(Outcome::Commit).await?;

    let (data, session) = common::scoped(&pool, &config, t2).await?;
    let t2_ids = seed_every_kind(&data).await?;
    let t2_tenant = json!(t2.to_string());

    for kind in EntityKind::ALL {
        let rows = data.find_many(kind, FilterData::default()).await?;
        assert_eq!(rows.len(), 1, "{}", kind);
        assert_eq!(rows[0]["tenant_id"], t2_tenant, "{}", kind);
        assert_eq!(id_of(&rows[0]), t2_ids[&kind], "{}", kind);
        assert!(data.find_by_id(kind, t1_ids[&kind]).await?.is_none(), "{}", kind);
        assert_eq!(data.count(kind, FilterData::default()).await?, 1, "{}", kind);

        let patch = record(json!({ patch_column(kind): "modifie" }));
        let updated = data.update_many(kind, json!({}), patch).await?;
        assert_eq!(updated.len(), 1, "{}", kind);
        assert_eq!(updated[0]["tenant_id"], t2_tenant, "{}", kind);
    }

    for kind in EntityKind::ALL.into_iter().rev() {
        let deleted = data.delete_many(kind, json!({})).await?;
        assert_eq!(deleted.len(), 1, "{}", kind);
        assert_eq!(id_of(&deleted[0]), t2_ids[&kind], "{}", kind);
    }
    drop(data);
    session.release(Outcome::Rollback).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    for kind in EntityKind::ALL {
        let row = data.find_by_id(kind, t1_ids[&kind]).await?.expect("row survives");
        assert_ne!(row[patch_column(kind)], json!("modifie"), "{}", kind);
    }
    session.release(Outcome::Rollback).await?;
    Ok(())
}

#[tokio::test]
async fn references_cannot_cross_tenants() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "ref-owner", true).await?;
    let t2 = common::insert_tenant(&pool, "ref-other", true).await?;
    let echeance = Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).single().expect("date");

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let client = data.repository::<Client>().create(&Client::new("Garnier", "particulier", "Lille")).await?;
    let t1_client = client.id.expect("client id");
    drop(data);
    session.release(Outcome::Commit).await?;

    // A foreign client and a client that does not exist fail the same way
    let mut failures = Vec::new();
    for client_id in [t1_client, Uuid::new_v4()] {
        let (data, session) = common::scoped(&pool, &config, t2).await?;
        let err = data
            .repository::<Intervention>()
            .create(&Intervention::new(client_id, "Porte bloquee", "Lille", echeance))
            .await
            .unwrap_err();
        assert_eq!(sqlstate(&err).as_deref(), Some("23503"), "{:?}", err);
        let api = ApiError::from(err);
        failures.push((api.status_code(), api.message().to_string()));
        drop(data);
        session.release(Outcome::Rollback).await?;
    }
    assert_eq!(failures[0], failures[1]);
    assert_eq!(failures[0].0, 400);

    // The owner's row is untouched and still deletable
    let (data, session) = common::scoped(&pool, &config, t1).await?;
    assert!(data.repository::<Client>().delete_by_id(t1_client).await?.is_some());
    session.release(Outcome::Rollback).await?;
    Ok(())
}

#[tokio::test]
async fn create_rejects_caller_chosen_ids() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "id-owner", true).await?;
    let t2 = common::insert_tenant(&pool, "id-guess", true).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let existing = id_of(&data.create(EntityKind::Client, client_payload("Roux")).await?);
    drop(data);
    session.release(Outcome::Commit).await?;

    let (data, session) = common::scoped(&pool, &config, t2).await?;
    let mut messages = Vec::new();
    for id in [existing, Uuid::new_v4()] {
        let mut payload = client_payload("Copie");
        payload.insert("id".to_string(), Value::String(id.to_string()));
        let err = data.create(EntityKind::Client, payload).await.unwrap_err();
        assert!(matches!(err, DataError::InvalidPayload(_)), "{:?}", err);
        messages.push(err.to_string());
    }
    assert_eq!(messages[0], messages[1]);
    assert_eq!(data.count(EntityKind::Client, FilterData::default()).await?, 0);
    session.release(Outcome::Rollback).await?;
    Ok(())
}

#[tokio::test]
async fn filter_values_follow_column_types() -> Result<()> {
    let Some(url) = common::database_url() else { return Ok(()) };
    let config = common::db_config(&url, BindingStrategy::Transaction);
    let pool = common::single_connection_pool(&config).await?;
    let t1 = common::insert_tenant(&pool, "typed", true).await?;

    let (data, session) = common::scoped(&pool, &config, t1).await?;
    let mut payload = client_payload("Lambert");
    payload.insert("contact".to_string(), json!("2024-01-01"));
    let client = data.create(EntityKind::Client, payload).await?;

    // Date-shaped text against a text column
    let rows = data
        .find_many(EntityKind::Client, FilterData::with_where(json!({ "contact": "2024-01-01" })))
        .await?;
    assert_eq!(rows.len(), 1);

    let intervention = record(json!({
        "client_id": client["id"],
        "description": "Tableau electrique",
        "adresse": "Lille",
        "echeance": "2025-01-01T09:00:00Z",
        "montant": 180
    }));
    data.create(EntityKind::Intervention, intervention).await?;

    let typed = json!({
        "echeance": { "$gte": "2024-12-31T00:00:00Z" },
        "montant": { "$between": [100, 200] },
        "client_id": { "$in": [client["id"]] }
    });
    assert_eq!(data.count(EntityKind::Intervention, FilterData::with_where(typed)).await?, 1);
    session.release(Outcome::Rollback).await?;
    Ok(())
}
