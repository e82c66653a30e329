use nosqllite::{content_hash, Database, Document, SyncOutcome};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_users_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("app-db");

    {
        let mut db = Database::create(&db_path).unwrap();
        let users = db.new_document("users").unwrap();
        users.set("alice", &json!({ "age": 30 })).unwrap();
        assert_eq!(users.sync().unwrap(), SyncOutcome::Written);
    }

    let db = Database::open(&db_path).unwrap();
    let users = db.get("users").unwrap();
    assert_eq!(users.get("alice").unwrap()["age"], json!(30));
    assert_eq!(users.metadata().datahash, content_hash(users.data()));
}

#[test]
fn test_bulk_sync_then_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("shop");

    let mut db = Database::create(&db_path).unwrap();
    db.new_document("orders")
        .unwrap()
        .set("o-1", &json!({ "items": ["apple", "pear"], "paid": false }))
        .unwrap();
    db.new_document("customers")
        .unwrap()
        .set("bob", &json!({ "city": "Zürich" }))
        .unwrap();

    let report = db.sync().unwrap();
    assert_eq!(report.written.len(), 2);

    let reopened = Database::open(&db_path).unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(
        reopened.get("customers").unwrap().get("bob").unwrap()["city"],
        json!("Zürich")
    );
    for doc in reopened.documents() {
        assert!(!doc.is_dirty(), "{} should be clean", doc.name());
    }
}

#[test]
fn test_document_opened_directly_matches_database_view() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("db");

    let mut db = Database::create(&db_path).unwrap();
    db.new_document("settings")
        .unwrap()
        .set("theme", "dark")
        .unwrap();
    db.sync().unwrap();

    let doc = Document::open(db_path.join("settings.json")).unwrap();
    assert_eq!(doc.get("theme").unwrap(), &json!("dark"));
    assert_eq!(doc.data(), db.get("settings").unwrap().data());
}
