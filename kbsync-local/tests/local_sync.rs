use std::path::Path;

use serde_json::json;
use tempfile::TempDir;

use kbsync_core::{AdapterConfig, Entity, SyncConfig};
use kbsync_engine::{FileContextRepository, PipeBuilder};
use kbsync_local::{destination_from_config, source_from_config, LocalDestination};

fn write_json(path: &Path, value: serde_json::Value) {
    std::fs::write(path, serde_json::to_string_pretty(&value).expect("json")).expect("write");
}

fn export_dir(tmp: &TempDir) -> std::path::PathBuf {
    let dir = tmp.path().join("export");
    std::fs::create_dir_all(&dir).expect("mkdir");
    write_json(
        &dir.join("categories.json"),
        json!([
            {"externalId": "c2", "name": "Refunds", "parentCategory": {"externalId": "c1"}},
            {"externalId": "c1", "name": "Billing"}
        ]),
    );
    write_json(
        &dir.join("labels.json"),
        json!([{"externalId": "l1", "name": "Urgent", "color": "GENERATED"}]),
    );
    write_json(
        &dir.join("documents.json"),
        json!([
            {
                "externalId": "d1",
                "externalVersionId": "v1",
                "published": {
                    "title": "How refunds work",
                    "category": {"externalId": "c2"},
                    "labels": [{"externalId": "l1"}],
                    "variations": [{"body": {"blocks": [{"type": "Paragraph", "text": "..."}]}}]
                }
            },
            {
                "externalId": "d2",
                "published": {"title": "Invoices", "category": {"externalId": "c1"}}
            }
        ]),
    );
    dir
}

fn config(tmp: &TempDir) -> SyncConfig {
    SyncConfig {
        external_id_prefix: Some("local-".to_string()),
        page_size: 1,
        source: Some(AdapterConfig::Local {
            path: export_dir(tmp),
        }),
        destination: Some(AdapterConfig::Local {
            path: tmp.path().join("kb"),
        }),
        context_path: Some(tmp.path().join("context.json")),
        ..SyncConfig::default()
    }
}

fn builder(config: &SyncConfig) -> PipeBuilder {
    let context_path = config.context_path().expect("context path");
    PipeBuilder::new(config.clone())
        .source(Box::new(source_from_config(config).expect("source")))
        .destination(Box::new(destination_from_config(config).expect("destination")))
        .repository(Box::new(FileContextRepository::new(context_path)))
}

#[tokio::test]
async fn sync_writes_knowledge_base_and_second_run_is_a_noop() {
    let tmp = TempDir::new().expect("tempdir");
    let config = config(&tmp);

    let outcome = builder(&config).build().expect("build").run().await.expect("first run");
    assert_eq!(outcome.contents.categories.created.len(), 2);
    assert_eq!(outcome.contents.labels.created.len(), 1);
    assert_eq!(outcome.contents.documents.created.len(), 2);
    assert!(!tmp.path().join("context.json").exists());

    let kb = LocalDestination::new(tmp.path().join("kb")).read().await.expect("read kb");
    let refunds = kb
        .categories
        .iter()
        .find(|c| c.external_id() == Some("local-c2"))
        .expect("prefixed category");
    let billing_id = kb
        .categories
        .iter()
        .find(|c| c.external_id() == Some("local-c1"))
        .and_then(|c| c.id().map(str::to_owned));
    let parent = refunds.parent_category.as_ref().expect("parent");
    assert_eq!(parent.id, billing_id);
    assert_ne!(kb.labels[0].color.as_deref(), Some("GENERATED"));

    let outcome = builder(&config).build().expect("build").run().await.expect("second run");
    assert!(outcome.contents.is_empty(), "{:#?}", outcome.contents);
    assert_eq!(outcome.upload.map(|u| u.skipped), Some(true));
}

#[tokio::test]
async fn removed_document_is_deleted_on_next_run() {
    let tmp = TempDir::new().expect("tempdir");
    let config = config(&tmp);
    builder(&config).build().expect("build").run().await.expect("first run");

    let documents = tmp.path().join("export").join("documents.json");
    write_json(
        &documents,
        json!([{
            "externalId": "d2",
            "published": {"title": "Invoices", "category": {"externalId": "c1"}}
        }]),
    );

    let outcome = builder(&config).build().expect("build").run().await.expect("second run");
    assert_eq!(outcome.contents.documents.deleted.len(), 1);
    assert_eq!(
        outcome.upload.map(|u| u.deleted.documents),
        Some(1)
    );

    let kb = LocalDestination::new(tmp.path().join("kb")).read().await.expect("read kb");
    let remaining: Vec<_> = kb.documents.iter().filter_map(|d| d.external_id()).collect();
    assert_eq!(remaining, vec!["local-d2"]);
}

#[tokio::test]
async fn edited_title_becomes_an_update() {
    let tmp = TempDir::new().expect("tempdir");
    let config = config(&tmp);
    builder(&config).build().expect("build").run().await.expect("first run");

    let documents = tmp.path().join("export").join("documents.json");
    write_json(
        &documents,
        json!([
            {
                "externalId": "d1",
                "externalVersionId": "v2",
                "published": {
                    "title": "How refunds work now",
                    "category": {"externalId": "c2"},
                    "labels": [{"externalId": "l1"}]
                }
            },
            {
                "externalId": "d2",
                "published": {"title": "Invoices", "category": {"externalId": "c1"}}
            }
        ]),
    );

    let outcome = builder(&config).build().expect("build").run().await.expect("second run");
    assert_eq!(outcome.contents.documents.updated.len(), 1);
    assert!(outcome.contents.documents.created.is_empty());
    let updated = &outcome.contents.documents.updated[0];
    assert!(updated.id().is_some(), "destination id carried over");
}
