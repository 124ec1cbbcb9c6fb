mod common;

use apt_repository::hash::hash_data;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{Harness, RecordingNotifier, RecordingStore};
use debian_repo_manager::models::{ControlDefaults, PackageRecord};
use debian_repo_manager::notify::Outcome;
use debian_repo_manager::pipeline::RunMode;
use debian_repo_manager::store::KeyValueTable;

const DEB: &[u8] = b"!<arch>\ndebian-binary   fake package contents";

fn nested_metadata(base: &str, version: &str) -> serde_json::Value {
    let entry = |file: &str| {
        json!({
            "version": version,
            "updateTo": {
                "version": version,
                "pub_date": "2025-03-01",
                "notes": "Bug fixes",
                "url": format!("{}/releases/{}/{}", base, version, file),
            }
        })
    };
    json!({
        "currentRelease": version,
        "releases": [
            entry(&format!("kiro_{}_amd64.deb", version)),
            entry("certificate.pem"),
            entry("signature.bin"),
        ]
    })
}

async fn mount_release(server: &MockServer, version: &str) {
    Mock::given(method("GET"))
        .and(path("/metadata.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nested_metadata(&server.uri(), version)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/releases/{}/kiro_{}_amd64.deb", version, version)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(DEB))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/releases/{}/certificate.pem", version)))
        .respond_with(ResponseTemplate::new(200).set_body_string("-----BEGIN CERTIFICATE-----\n"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/releases/{}/signature.bin", version)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
        .mount(server)
        .await;
}

fn stored_record(version: &str) -> PackageRecord {
    let mut record = PackageRecord::new(
        &ControlDefaults::default(),
        version,
        "2025-01-01",
        format!("https://cdn.example.com/kiro_{}_amd64.deb", version),
    );
    let (_, digests) = hash_data(version.as_bytes());
    record.attach_file_metadata(format!("kiro_{}_amd64.deb", version), 1234, digests);
    record
}

#[tokio::test]
async fn test_new_release_is_mirrored() {
    let server = MockServer::start().await;
    mount_release(&server, "1.2.3").await;
    let harness = Harness::new(&format!("{}/metadata.json", server.uri()));

    let outcome = harness.pipeline.run(RunMode::Normal).await;
    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.body, "Successfully processed version 1.2.3");

    let record = harness
        .pipeline
        .tracker()
        .latest("kiro")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.package_id(), "kiro#1.2.3");
    assert_eq!(record.file_size, DEB.len() as u64);
    assert_eq!(record.actual_filename, "kiro_1.2.3_amd64.deb");
    assert!(record.processed_timestamp.is_some());

    assert_eq!(
        harness.store.keys(),
        vec![
            "dists/stable/Release",
            "dists/stable/main/binary-amd64/Packages",
            "pool/main/k/kiro/certificate.pem",
            "pool/main/k/kiro/kiro_1.2.3_amd64.deb",
            "pool/main/k/kiro/signature.bin",
        ]
    );
    let packages = harness
        .store
        .text("dists/stable/main/binary-amd64/Packages")
        .unwrap();
    assert!(packages.contains("Version: 1.2.3\n"));
    assert!(packages.contains("Filename: pool/main/k/kiro/kiro_1.2.3_amd64.deb\n"));
    assert_eq!(
        harness
            .store
            .content_type("pool/main/k/kiro/kiro_1.2.3_amd64.deb")
            .as_deref(),
        Some("application/vnd.debian.binary-package")
    );

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].outcome, Outcome::Success);
    assert!(sent[0]
        .message
        .contains("https://repo.example.com/pool/main/k/kiro/kiro_1.2.3_amd64.deb"));

    // Downloads are gone once the run is over.
    assert_eq!(std::fs::read_dir(harness.downloads.path()).unwrap().count(), 0);
    // Permission checks leave nothing behind.
    assert_eq!(harness.table.len(), 1);
}

#[tokio::test]
async fn test_rejected_package_upload_keeps_index_offline() {
    let server = MockServer::start().await;
    mount_release(&server, "1.2.3").await;
    let harness = Harness::with_store(
        &format!("{}/metadata.json", server.uri()),
        RecordingNotifier::default(),
        RecordingStore::rejecting(".deb"),
    );

    let outcome = harness.pipeline.run(RunMode::Normal).await;
    assert_eq!(outcome.status_code, 500);
    assert!(outcome.body.starts_with("Error processing repository: "));
    assert!(harness
        .store
        .keys()
        .iter()
        .all(|key| !key.starts_with("dists/")));
}

#[tokio::test]
async fn test_processed_release_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(nested_metadata(&server.uri(), "1.2.3")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/releases/1.2.3/kiro_1.2.3_amd64.deb"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(DEB))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new(&format!("{}/metadata.json", server.uri()));
    harness
        .pipeline
        .tracker()
        .put(&mut stored_record("1.2.3"))
        .await
        .unwrap();

    let outcome = harness.pipeline.run(RunMode::Normal).await;
    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.body, "Version 1.2.3 already processed");
    assert!(harness.store.keys().is_empty());
    // Only the permission test object was uploaded.
    assert_eq!(harness.store.put_count(), 1);
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_force_rebuild_uses_stored_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new(&format!("{}/metadata.json", server.uri()));
    for version in ["1.0.0", "1.1.0", "2.0.0"] {
        harness
            .pipeline
            .tracker()
            .put(&mut stored_record(version))
            .await
            .unwrap();
    }

    let outcome = harness.pipeline.run(RunMode::ForceRebuild).await;
    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.body, "Successfully rebuilt repository with 3 packages");

    assert_eq!(
        harness.store.keys(),
        vec!["dists/stable/Release", "dists/stable/main/binary-amd64/Packages"]
    );
    let packages = harness
        .store
        .text("dists/stable/main/binary-amd64/Packages")
        .unwrap();
    assert_eq!(packages.matches("Package: kiro\n").count(), 3);
    for version in ["1.0.0", "1.1.0", "2.0.0"] {
        let (_, digests) = hash_data(version.as_bytes());
        assert!(packages.contains(&format!("Version: {}\n", version)));
        assert!(packages.contains(&format!(
            "Filename: pool/main/k/kiro/kiro_{}_amd64.deb\n",
            version
        )));
        assert!(packages.contains(&format!("SHA256: {}\n", digests.sha256)));
    }
    assert_eq!(packages.matches("Size: 1234\n").count(), 3);

    let release = harness.store.text("dists/stable/Release").unwrap();
    assert!(release.contains("Origin: Kiro\n"));
    assert!(!release.contains("PGP"));
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_failed_download_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(nested_metadata(&server.uri(), "1.2.3")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/releases/1.2.3/kiro_1.2.3_amd64.deb"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    // A broken notifier must not change the outcome.
    let notifier = RecordingNotifier {
        fail: true,
        ..Default::default()
    };
    let harness = Harness::with_notifier(&format!("{}/metadata.json", server.uri()), notifier);

    let outcome = harness.pipeline.run(RunMode::Normal).await;
    assert_eq!(outcome.status_code, 500);
    assert!(outcome.body.starts_with("Error processing repository: "));
    assert!(outcome.body.contains("HTTP 500"));

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].outcome, Outcome::Failure);
    assert!(sent[0].message.contains("Context: Downloading release files\n"));

    assert!(harness.pipeline.tracker().list_all().await.unwrap().is_empty());
    assert!(harness.store.keys().is_empty());
}

#[tokio::test]
async fn test_corrupt_record_does_not_block_rebuild() {
    let server = MockServer::start().await;
    let harness = Harness::new(&format!("{}/metadata.json", server.uri()));
    for version in ["1.0.0", "2.0.0"] {
        harness
            .pipeline
            .tracker()
            .put(&mut stored_record(version))
            .await
            .unwrap();
    }
    let mut corrupt = serde_json::Map::new();
    corrupt.insert("package_id".to_string(), json!("kiro#broken"));
    corrupt.insert("package_name".to_string(), json!("kiro"));
    harness.table.put_item("kiro#broken", corrupt).await.unwrap();
    let nameless = json!({"package_id": "#1.0", "package_name": "", "version": "1.0"});
    harness
        .table
        .put_item("#1.0", nameless.as_object().unwrap().clone())
        .await
        .unwrap();

    let records = harness.pipeline.tracker().list_all().await.unwrap();
    let mut versions: Vec<String> = records.into_iter().map(|r| r.version).collect();
    versions.sort();
    assert_eq!(versions, vec!["1.0.0", "2.0.0"]);

    let outcome = harness.pipeline.run(RunMode::ForceRebuild).await;
    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.body, "Successfully rebuilt repository with 2 packages");
}

#[tokio::test]
async fn test_bad_metadata_fails_before_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "1.2.3"})))
        .mount(&server)
        .await;

    let harness = Harness::new(&format!("{}/metadata.json", server.uri()));
    let outcome = harness.pipeline.run(RunMode::Normal).await;
    assert_eq!(outcome.status_code, 500);
    assert!(outcome
        .body
        .contains("Missing required fields in metadata: pub_date, url, certificate, signature"));

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].message.contains("Context: Fetching release metadata\n"));
}
