#![cfg(feature = "firestore")]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use progain::catalog::CatalogResolver;
use progain::models::{CatalogKind, FixedIdGenerator, Identifier, TransferRequest};
use progain::store::{DocumentStore, FirestoreStore};
use progain::transactions::TransactionService;
use progain::{Error, Session};
use secrecy::SecretString;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT: &str = "/projects/demo/databases/(default)/documents";

fn store(server: &MockServer) -> Result<FirestoreStore> {
    Ok(FirestoreStore::new(
        "demo",
        "(default)",
        Some(SecretString::new("test-token".to_string().into())),
        Duration::from_secs(5),
    )?
    .with_base_url(server.uri()))
}

#[tokio::test]
async fn catalog_loads_over_rest_with_bearer_token() -> Result<()> {
    let server = MockServer::start().await;
    let body = r#"{
        "documents": [
            {
                "name": "projects/demo/databases/(default)/documents/categorias/a",
                "fields": { "id": { "integerValue": "1" }, "nombre": { "stringValue": "Materials" } }
            },
            {
                "name": "projects/demo/databases/(default)/documents/categorias/b",
                "fields": { "id": { "stringValue": "2" }, "nombre": { "stringValue": "Labor" } }
            }
        ]
    }"#;
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}/categorias")))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let session = Session::open(Arc::new(store(&server)?));
    let catalog = CatalogResolver::new(&session)
        .load_catalog(CatalogKind::Categories)
        .await?;

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.name_or_placeholder(&Identifier::from("2")), "Labor");
    assert_eq!(catalog.name_or_placeholder(&Identifier::Numeric(1)), "Materials");
    Ok(())
}

#[tokio::test]
async fn undecodable_documents_are_skipped_not_fatal() -> Result<()> {
    let server = MockServer::start().await;
    let body = r#"{
        "documents": [
            {
                "name": "projects/demo/databases/(default)/documents/categorias/a",
                "fields": { "id": { "integerValue": "1" }, "nombre": { "stringValue": "Materials" } }
            },
            {
                "name": "projects/demo/databases/(default)/documents/categorias/b",
                "fields": { "id": { "integerValue": "2" }, "emb": { "vectorValue": { "values": [0.1] } } }
            }
        ]
    }"#;
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}/categorias")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;
    let query_body = r#"[
        { "document": {
            "name": "projects/demo/databases/(default)/documents/proyectos/1/transacciones/bad",
            "fields": { "fecha": { "vectorValue": {} } }
        } },
        { "document": {
            "name": "projects/demo/databases/(default)/documents/proyectos/1/transacciones/ok",
            "fields": { "fecha": { "stringValue": "2025-01-01" } }
        } },
        { "readTime": "2025-01-02T00:00:00Z" }
    ]"#;
    Mock::given(method("POST"))
        .and(path(format!("{ROOT}:runQuery")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(query_body, "application/json"))
        .mount(&server)
        .await;

    let session = Session::open(Arc::new(store(&server)?));
    let catalog = CatalogResolver::new(&session)
        .load_catalog(CatalogKind::Categories)
        .await?;
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.name_or_placeholder(&Identifier::Numeric(1)), "Materials");

    let recent = TransactionService::new(&session).global_recent(10, false).await?;
    let ids: Vec<&str> = recent.iter().map(|tx| tx.id.as_str()).collect();
    assert_eq!(ids, vec!["ok"]);
    Ok(())
}

#[tokio::test]
async fn missing_documents_read_as_none() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}/proyectos/10")))
        .respond_with(ResponseTemplate::new(404).set_body_raw(
            r#"{"error":{"code":404,"message":"Document not found","status":"NOT_FOUND"}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let store = store(&server)?;
    assert!(store.get("proyectos/10").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn collection_group_without_index_is_a_missing_index_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{ROOT}:runQuery")))
        .respond_with(ResponseTemplate::new(400).set_body_raw(
            r#"{"error":{"code":400,"message":"The query requires an index. You can create it here: https://console.firebase.google.com/...","status":"FAILED_PRECONDITION"}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let session = Session::open(Arc::new(store(&server)?));
    let err = TransactionService::new(&session)
        .global_recent(10, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingIndex { .. }), "{err:?}");

    let requests = server.received_requests().await.unwrap_or_default();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    let query = &body["structuredQuery"];
    assert_eq!(query["from"][0]["collectionId"], "transacciones");
    assert_eq!(query["from"][0]["allDescendants"], true);
    assert_eq!(query["orderBy"][0]["direction"], "DESCENDING");
    assert_eq!(query["limit"], 10);
    Ok(())
}

#[tokio::test]
async fn transfer_is_one_commit_with_both_legs() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}/cuentas")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{}"#, "application/json"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{ROOT}:commit")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"writeResults":[{},{}]}"#, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server)?.with_id_generator(Arc::new(FixedIdGenerator::new(["out", "in"])));
    let session = Session::open(Arc::new(store));
    TransactionService::new(&session)
        .create_transfer(
            "10",
            &TransferRequest {
                date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
                from_account: Identifier::Numeric(1),
                to_account: Identifier::Numeric(2),
                amount: 250.0,
                note: None,
            },
        )
        .await?;

    let requests = server.received_requests().await.unwrap_or_default();
    let commit = requests
        .iter()
        .find(|request| request.url.path().ends_with(":commit"))
        .expect("commit request");
    let body: serde_json::Value = serde_json::from_slice(&commit.body)?;
    let writes = body["writes"].as_array().expect("writes array");
    assert_eq!(writes.len(), 2);

    let out = &writes[0]["update"];
    assert!(out["name"]
        .as_str()
        .unwrap_or_default()
        .ends_with("documents/proyectos/10/transacciones/out"));
    assert_eq!(out["fields"]["tipo"]["stringValue"], "Gasto");
    assert_eq!(out["fields"]["transferencia_vinculada_id"]["stringValue"], "in");
    assert_eq!(out["fields"]["descripcion"]["stringValue"], "Transferencia a Cuenta 2");
    assert_eq!(out["fields"]["categoria_id"]["integerValue"], "0");

    let incoming = &writes[1]["update"];
    assert_eq!(incoming["fields"]["tipo"]["stringValue"], "Ingreso");
    assert_eq!(incoming["fields"]["transferencia_vinculada_id"]["stringValue"], "out");
    assert_eq!(incoming["fields"]["es_transferencia"]["booleanValue"], true);

    Ok(())
}
