mod common;

use common::{CDN_BASE, fixture};
use darkroom_core::usage::UsageOp;
use darkroom_metadata::models::UsageEventRow;
use darkroom_recon::ReconError;
use time::OffsetDateTime;
use uuid::Uuid;

#[tokio::test]
async fn audit_classifies_mixed_state() {
    let f = fixture();
    let owner = Uuid::new_v4();

    // Referenced photo, shared hero image, an unreferenced leftover, and a
    // reference whose object is gone.
    f.blob.insert(&format!("photo/{owner}/2026/01/kept.jpg"), Some(100));
    f.blob.insert(&format!("photo/{owner}/2026/01/leftover.jpg"), Some(40));
    f.blob.insert("global/hero-images/h.jpg", Some(7));
    f.metadata
        .add_photo(owner, &format!("photo/{owner}/2026/01/kept.jpg"));
    f.metadata.add_hero_selection(owner, "global/hero-images/h.jpg");
    f.metadata
        .add_photo(owner, &format!("photo/{owner}/2026/01/gone.jpg"));

    let report = f.context.run_audit(None).await.unwrap();

    assert_eq!(report.orphaned.count, 1);
    assert_eq!(report.orphaned.known_bytes, 40);
    assert_eq!(
        report.orphaned.sample_keys[0].as_str(),
        format!("photo/{owner}/2026/01/leftover.jpg")
    );
    assert_eq!(report.matched.count, 2);
    assert_eq!(report.phantom.count, 1);
    assert_eq!(report.phantom.record_count, 1);
    assert_eq!(report.unparsable.count, 0);
    assert!(!report.is_clean());
    assert_eq!(report.recommendations.len(), 2);
}

#[tokio::test]
async fn url_and_encoded_references_match_raw_store_keys() {
    let f = fixture();
    let owner = Uuid::new_v4();
    let key = format!("photo/{owner}/2026/01/My Shot.jpg");

    f.blob.insert(&key, Some(10));
    // Same object referenced through the CDN URL with percent-encoding.
    f.metadata
        .add_photo(owner, &format!("{CDN_BASE}photo/{owner}/2026/01/My%20Shot.jpg"));

    let report = f.context.run_audit(None).await.unwrap();
    assert_eq!(report.orphaned.count, 0);
    assert_eq!(report.matched.count, 1);
    assert!(report.is_clean());
}

#[tokio::test]
async fn listing_failure_aborts_the_audit() {
    let f = fixture();
    f.blob.insert("photo/a/x.jpg", Some(1));
    f.blob.fail_listing();

    let err = f.context.run_audit(None).await.unwrap_err();
    assert!(matches!(err, ReconError::ScanFailure { .. }));
}

#[tokio::test]
async fn unparsable_reference_is_reported_not_dropped() {
    let f = fixture();
    let owner = Uuid::new_v4();
    f.metadata.add_photo(owner, "photo/%2e%2e/escape.jpg");

    let report = f.context.run_audit(None).await.unwrap();

    assert_eq!(report.unparsable.count, 1);
    let sample = &report.unparsable.samples[0];
    assert_eq!(sample.kind, "photo");
    assert_eq!(sample.raw_reference, "photo/%2e%2e/escape.jpg");
    assert!(
        report
            .recommendations
            .iter()
            .any(|r| r.contains("could not be parsed"))
    );
}

#[tokio::test]
async fn key_referenced_only_by_hero_selection_is_not_orphaned() {
    let f = fixture();
    f.blob.insert("global/hero-images/shared.jpg", Some(9));
    // Two users selected the same shared image; no photo row references it.
    f.metadata
        .add_hero_selection(Uuid::new_v4(), "global/hero-images/shared.jpg");
    f.metadata
        .add_hero_selection(Uuid::new_v4(), "global/hero-images/shared.jpg");

    let report = f.context.run_audit(None).await.unwrap();
    assert_eq!(report.orphaned.count, 0);
    assert_eq!(report.matched.count, 1);
}

#[tokio::test]
async fn scoped_audit_ignores_foreign_prefixes() {
    let f = fixture();
    let owner = Uuid::new_v4();
    f.blob.insert(&format!("photo/{owner}/2026/01/x.jpg"), Some(5));
    f.blob.insert("global/hero-images/unreferenced.jpg", Some(5));
    f.metadata
        .add_photo(owner, &format!("photo/{owner}/2026/01/x.jpg"));
    f.metadata
        .add_hero_selection(owner, "global/hero-images/gone.jpg");

    let report = f.context.run_audit(Some("photo/")).await.unwrap();

    // The global orphan and the global phantom are outside the scope.
    assert_eq!(report.orphaned.count, 0);
    assert_eq!(report.phantom.count, 0);
    assert_eq!(report.matched.count, 1);
}

#[tokio::test]
async fn usage_fold_with_cross_check_excludes_missing_objects() {
    let f = fixture();
    let owner = Uuid::new_v4();
    let kept = format!("photo/{owner}/2026/01/kept.jpg");
    let gone = format!("photo/{owner}/2026/01/gone.jpg");

    f.blob.insert(&kept, Some(100));
    for (key, size, minutes) in [(&kept, 100_i64, 0_i64), (&gone, 250, 1)] {
        f.metadata.add_event(UsageEventRow {
            event_id: Uuid::new_v4(),
            owner_id: Some(owner),
            object_key: key.to_string(),
            size_bytes: size,
            operation: UsageOp::Upload.as_str().to_string(),
            created_at: OffsetDateTime::now_utc() + time::Duration::minutes(minutes),
        });
    }

    let plain = f.context.current_usage(Some(owner), false).await.unwrap();
    assert_eq!(plain.total_files, 2);
    assert_eq!(plain.total_bytes, 350);

    let checked = f.context.current_usage(Some(owner), true).await.unwrap();
    assert_eq!(checked.total_files, 1);
    assert_eq!(checked.total_bytes, 100);
}

#[tokio::test]
async fn platform_usage_covers_all_owners_and_unattributed_keys() {
    let f = fixture();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let base = OffsetDateTime::now_utc();

    for (i, (owner, key, size)) in [
        (Some(first), format!("photo/{first}/2026/01/a.jpg"), 100_i64),
        (Some(second), format!("photo/{second}/2026/01/b.jpg"), 50),
        (None, "global/hero-images/h.jpg".to_string(), 7),
    ]
    .into_iter()
    .enumerate()
    {
        f.metadata.add_event(UsageEventRow {
            event_id: Uuid::new_v4(),
            owner_id: owner,
            object_key: key,
            size_bytes: size,
            operation: UsageOp::Upload.as_str().to_string(),
            created_at: base + time::Duration::minutes(i as i64),
        });
    }

    let platform = f.context.current_usage(None, false).await.unwrap();
    assert_eq!(platform.total_files, 3);
    assert_eq!(platform.total_bytes, 157);

    let single = f.context.current_usage(Some(first), false).await.unwrap();
    assert_eq!(single.total_files, 1);
    assert_eq!(single.total_bytes, 100);
}

#[tokio::test]
async fn audit_report_carries_cross_checked_usage() {
    let f = fixture();
    let owner = Uuid::new_v4();
    let kept = format!("photo/{owner}/2026/01/kept.jpg");
    let gone = format!("photo/{owner}/2026/01/gone.jpg");
    f.blob.insert(&kept, Some(100));
    f.metadata.add_photo(owner, &kept);

    let base = OffsetDateTime::now_utc();
    for (i, (key, size)) in [(&kept, 100_i64), (&gone, 250)].into_iter().enumerate() {
        f.metadata.add_event(UsageEventRow {
            event_id: Uuid::new_v4(),
            owner_id: Some(owner),
            object_key: key.to_string(),
            size_bytes: size,
            operation: UsageOp::Upload.as_str().to_string(),
            created_at: base + time::Duration::minutes(i as i64),
        });
    }

    let report = f.context.run_audit(None).await.unwrap();

    // The ledger claims 350 bytes, but the store only holds the kept object.
    assert_eq!(report.usage.total_files, 1);
    assert_eq!(report.usage.total_bytes, 100);
}

#[tokio::test]
async fn listed_keys_with_literal_percent_are_scanned_verbatim() {
    let f = fixture();
    f.blob.insert("photo/a/100%.jpg", Some(5));
    f.blob.insert("photo/a/My%20Shot.jpg", Some(6));

    let report = f.context.run_audit(None).await.unwrap();

    // The scan must neither abort nor decode the names.
    assert_eq!(report.orphaned.count, 2);
    let keys: Vec<&str> = report
        .orphaned
        .sample_keys
        .iter()
        .map(|k| k.as_str())
        .collect();
    assert_eq!(keys, vec!["photo/a/100%.jpg", "photo/a/My%20Shot.jpg"]);
}

#[tokio::test]
async fn empty_stores_produce_a_clean_report() {
    let f = fixture();
    let report = f.context.run_audit(None).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.recommendations.len(), 1);
    assert!(report.recommendations[0].contains("no action needed"));
}
