mod common;

use std::sync::Arc;

use action_locator::{rank, Category, HeuristicConfig, HeuristicResolver, LocatorError, RuleQuery};
use common::FakePage;
use perceiver_structural::{
    ExtractorConfig, RefreshPolicy, ResolveMode, ScriptSnapshotExtractor, Snapshot,
};
use serde_json::{json, Value};

fn save_buttons() -> Value {
    json!({
        "url": "https://app.test/",
        "elements": [
            { "domIndex": 1, "tag": "button", "semanticType": "button", "label": "Save",
              "visibleText": "Save", "cssSelector": "#save-top",
              "xpathSelector": "/html[1]/body[1]/button[1]" },
            { "domIndex": 2, "tag": "button", "semanticType": "button", "label": "Save Draft",
              "visibleText": "Save Draft", "cssSelector": "#save-draft",
              "xpathSelector": "/html[1]/body[1]/button[2]" },
            { "domIndex": 3, "tag": "button", "semanticType": "button", "label": "Save",
              "visibleText": "Save", "cssSelector": "form > button.primary",
              "xpathSelector": "/html[1]/body[1]/form[1]/button[1]" }
        ]
    })
}

fn resolver(page: Arc<FakePage>, config: HeuristicConfig) -> HeuristicResolver {
    let extractor = Arc::new(ScriptSnapshotExtractor::new(ExtractorConfig {
        settle_ms: 0,
        ..Default::default()
    }));
    HeuristicResolver::new(page, extractor, config)
}

fn unique_save_page() -> FakePage {
    FakePage::new()
        .with_snapshot(save_buttons())
        .with_count("#save-top", 1)
        .with_count("#save-draft", 1)
        .with_count("form > button.primary", 1)
}

#[tokio::test]
async fn exact_labels_rank_ahead_of_partial_match() {
    let page = Arc::new(unique_save_page());
    let resolver = resolver(page, HeuristicConfig::default());

    let first = resolver
        .resolve("button", "Save", RefreshPolicy::None)
        .await
        .unwrap();
    assert_eq!(first.chain_string(), "#save-top");

    let second = resolver
        .resolve("button", "Save[2]", RefreshPolicy::None)
        .await
        .unwrap();
    assert_eq!(second.chain_string(), "form > button.primary");

    let snapshot = Snapshot::from_value(save_buttons()).unwrap();
    let ranked = rank(&snapshot, Category::Button, &RuleQuery::new("Save", ""));
    let priorities: Vec<(usize, u16)> = ranked
        .iter()
        .map(|m| (m.record.dom_index, m.priority))
        .collect();
    assert_eq!(priorities, vec![(1, 10), (3, 10), (2, 30)]);
}

#[tokio::test]
async fn instance_past_matches_is_ambiguous() {
    let page = Arc::new(unique_save_page());
    let resolver = resolver(page, HeuristicConfig::default());

    let err = resolver
        .resolve("button", "Save Draft[2]", RefreshPolicy::None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LocatorError::AmbiguousInstance {
            instance: 2,
            found: 1
        }
    ));
}

#[tokio::test]
async fn no_rule_match_is_not_found() {
    let page = Arc::new(unique_save_page());
    let resolver = resolver(page, HeuristicConfig::default());

    let err = resolver
        .resolve("button", "Delete", RefreshPolicy::None)
        .await
        .unwrap_err();
    assert!(matches!(err, LocatorError::NotFound(selector) if selector == "Delete"));
}

#[tokio::test]
async fn duplicate_css_falls_back_to_xpath() {
    let page = Arc::new(
        FakePage::new()
            .with_snapshot(save_buttons())
            .with_count("#save-top", 2)
            .with_count("/html[1]/body[1]/button[1]", 1),
    );
    let resolver = resolver(page, HeuristicConfig::default());

    let handle = resolver
        .resolve("button", "Save", RefreshPolicy::None)
        .await
        .unwrap();
    assert_eq!(handle.chain_string(), "/html[1]/body[1]/button[1]");
    assert!(handle.links()[0].is_xpath());
}

#[tokio::test]
async fn neither_selector_unique_fails() {
    let page = Arc::new(
        FakePage::new()
            .with_snapshot(save_buttons())
            .with_count("#save-top", 2)
            .with_count("/html[1]/body[1]/button[1]", 0),
    );
    let resolver = resolver(page, HeuristicConfig::default());

    let err = resolver
        .resolve("button", "Save", RefreshPolicy::None)
        .await
        .unwrap_err();
    match err {
        LocatorError::NonUniqueSelector { css, xpath } => {
            assert_eq!(css, "#save-top");
            assert_eq!(xpath, "/html[1]/body[1]/button[1]");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn smart_mode_reuses_cache_until_told_otherwise() {
    let page = Arc::new(unique_save_page());
    let resolver = resolver(page.clone(), HeuristicConfig::default());

    for _ in 0..3 {
        resolver
            .resolve("button", "Save", RefreshPolicy::None)
            .await
            .unwrap();
    }
    assert_eq!(page.extraction_count(), 1);

    resolver
        .resolve("button", "Save", RefreshPolicy::Before)
        .await
        .unwrap();
    assert_eq!(page.extraction_count(), 2);

    // `After` clears even when resolution fails.
    resolver
        .resolve("button", "Missing", RefreshPolicy::After)
        .await
        .unwrap_err();
    assert!(resolver.cache().is_empty());

    resolver
        .resolve("button", "Save", RefreshPolicy::None)
        .await
        .unwrap();
    assert_eq!(page.extraction_count(), 3);
}

#[tokio::test]
async fn always_mode_extracts_every_call() {
    let page = Arc::new(unique_save_page());
    let resolver = resolver(
        page.clone(),
        HeuristicConfig {
            mode: ResolveMode::Always,
            ..Default::default()
        },
    );

    for _ in 0..2 {
        resolver
            .resolve("button", "Save", RefreshPolicy::None)
            .await
            .unwrap();
    }
    assert_eq!(page.extraction_count(), 2);
}

#[tokio::test]
async fn url_change_invalidates_when_enabled() {
    let page = Arc::new(unique_save_page());
    let resolver = resolver(
        page.clone(),
        HeuristicConfig {
            invalidate_on_url_change: true,
            ..Default::default()
        },
    );

    resolver
        .resolve("button", "Save", RefreshPolicy::None)
        .await
        .unwrap();
    resolver
        .resolve("button", "Save", RefreshPolicy::None)
        .await
        .unwrap();
    assert_eq!(page.extraction_count(), 1);

    page.navigate("https://app.test/next");
    resolver
        .resolve("button", "Save", RefreshPolicy::None)
        .await
        .unwrap();
    assert_eq!(page.extraction_count(), 2);
}

#[tokio::test]
async fn empty_snapshot_is_re_extracted_in_smart_mode() {
    let page = Arc::new(FakePage::new());
    let resolver = resolver(page.clone(), HeuristicConfig::default());

    for _ in 0..2 {
        let err = resolver
            .resolve("link", "Home", RefreshPolicy::None)
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::NotFound(_)));
    }
    assert_eq!(page.extraction_count(), 2);
}

#[tokio::test]
async fn unsupported_category_is_rejected() {
    let page = Arc::new(unique_save_page());
    let resolver = resolver(page.clone(), HeuristicConfig::default());

    let err = resolver
        .resolve("tab", "Save", RefreshPolicy::None)
        .await
        .unwrap_err();
    assert!(matches!(err, LocatorError::UnsupportedCategory(name) if name == "tab"));
    assert_eq!(page.extraction_count(), 0);
}

#[tokio::test]
async fn extracted_snapshots_are_archived() {
    let dir = tempfile::tempdir().unwrap();
    let page = Arc::new(unique_save_page());
    let resolver = resolver(
        page,
        HeuristicConfig {
            archive_dir: Some(dir.path().join("archive")),
            ..Default::default()
        },
    );

    resolver
        .resolve("button", "Save", RefreshPolicy::None)
        .await
        .unwrap();

    let files: Vec<_> = std::fs::read_dir(dir.path().join("archive"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("snapshot-"));
}
