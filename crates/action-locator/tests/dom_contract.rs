//! Extraction and chain scripts against a real Chromium. Ignored by default; they need a browser
//! on the host and `FIELDSCOPE_CDP_CONTRACT=1`.

use std::env;
use std::sync::Arc;

use action_locator::{
    rank, Category, ChainEvaluator, ChainQuery, HeuristicConfig, HeuristicResolver, RuleQuery,
};
use cdp_adapter::{CdpConfig, CdpPageProbe, PageProbe, ProbeErrorKind};
use fieldscope_core_types::LocatorCandidate;
use perceiver_structural::{
    ElementRecord, ExtractorConfig, HiddenPolicy, LabelDetection, RefreshPolicy,
    ScriptSnapshotExtractor, Snapshot, SnapshotExtractor,
};

fn contract_enabled() -> bool {
    env::var("FIELDSCOPE_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

macro_rules! require_browser {
    () => {
        if !contract_enabled() {
            eprintln!("skipping DOM contract test (FIELDSCOPE_CDP_CONTRACT not enabled)");
            return;
        }
    };
}

async fn page_with(body: &str) -> Arc<dyn PageProbe> {
    let probe = CdpPageProbe::launch(&CdpConfig::default())
        .await
        .expect("open chromium page");
    let literal = serde_json::to_string(body).unwrap();
    probe
        .evaluate(&format!("document.body.innerHTML = {literal}"))
        .await
        .expect("seed document");
    Arc::new(probe)
}

async fn extract(probe: &Arc<dyn PageProbe>, tune: impl FnOnce(&mut ExtractorConfig)) -> Snapshot {
    let mut config = ExtractorConfig {
        settle_ms: 0,
        ..ExtractorConfig::default()
    };
    tune(&mut config);
    ScriptSnapshotExtractor::new(config)
        .extract(probe.as_ref())
        .await
}

fn by_id<'s>(snapshot: &'s Snapshot, id: &str) -> Option<&'s ElementRecord> {
    snapshot.elements.iter().find(|r| r.attr("id") == Some(id))
}

fn by_text<'s>(snapshot: &'s Snapshot, text: &str) -> &'s ElementRecord {
    snapshot
        .elements
        .iter()
        .find(|r| r.visible_text == text)
        .unwrap_or_else(|| panic!("no record with text {text:?}"))
}

fn label_of(snapshot: &Snapshot, id: &str) -> (String, LabelDetection) {
    let record = by_id(snapshot, id).unwrap_or_else(|| panic!("no record #{id}"));
    (record.label.clone(), record.label_detection)
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set FIELDSCOPE_CDP_CONTRACT=1"]
async fn labels_follow_association_precedence() {
    require_browser!();
    let probe = page_with(
        r#"
        <div><label for="email">Email</label><input id="email" aria-label="Mail" placeholder="you@x.test"></div>
        <div><label><span>Phone</span><input id="phone" placeholder="555"></label></div>
        <div><input id="city" aria-label="City" placeholder="Town"></div>
        <div><input id="zip" placeholder="Postcode"></div>
        <div><label>Company</label><input id="company"></div>
        "#,
    )
    .await;

    let snapshot = extract(&probe, |_| {}).await;
    assert_eq!(label_of(&snapshot, "email"), ("Email".into(), LabelDetection::Safe));
    assert_eq!(label_of(&snapshot, "phone"), ("Phone".into(), LabelDetection::Proximity));
    assert_eq!(label_of(&snapshot, "city"), ("City".into(), LabelDetection::Safe));
    assert_eq!(label_of(&snapshot, "zip"), ("Postcode".into(), LabelDetection::Safe));
    assert_eq!(
        label_of(&snapshot, "company"),
        ("Company".into(), LabelDetection::Proximity)
    );
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set FIELDSCOPE_CDP_CONTRACT=1"]
async fn hidden_policy_decides_what_is_kept() {
    require_browser!();
    let probe = page_with(
        r#"
        <button id="shown">Shown</button>
        <button id="gone" style="display:none">Gone</button>
        <button id="ghost" style="visibility:hidden">Ghost</button>
        <button id="flat" style="display:block;width:0;height:0;padding:0;border:0;overflow:hidden">Flat</button>
        "#,
    )
    .await;

    let kept = |snapshot: &Snapshot| -> Vec<String> {
        ["shown", "gone", "ghost", "flat"]
            .into_iter()
            .filter(|id| by_id(snapshot, id).is_some())
            .map(String::from)
            .collect()
    };

    let off = extract(&probe, |c| c.hidden_policy = HiddenPolicy::Off).await;
    assert_eq!(kept(&off), ["shown", "gone", "ghost", "flat"]);

    let strict = extract(&probe, |c| c.hidden_policy = HiddenPolicy::Strict).await;
    assert_eq!(kept(&strict), ["shown", "ghost"]);

    let flexible = extract(&probe, |c| c.hidden_policy = HiddenPolicy::Flexible).await;
    assert_eq!(kept(&flexible), ["shown", "flat"]);
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set FIELDSCOPE_CDP_CONTRACT=1"]
async fn skip_empty_drops_blank_non_form_elements() {
    require_browser!();
    let probe = page_with(r#"<span id="blank"></span><span id="note">Hi</span><input id="bare">"#).await;

    let skipping = extract(&probe, |c| c.skip_empty = true).await;
    assert!(by_id(&skipping, "blank").is_none());
    assert!(by_id(&skipping, "note").is_some());
    assert!(by_id(&skipping, "bare").is_some());

    let keeping = extract(&probe, |c| c.skip_empty = false).await;
    assert!(by_id(&keeping, "blank").is_some());
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set FIELDSCOPE_CDP_CONTRACT=1"]
async fn fieldset_legend_scopes_choices() {
    require_browser!();
    let probe = page_with(
        r#"
        <fieldset><legend>Plan</legend>
          <label><input type="radio" id="basic" name="plan"><span>Basic</span></label>
        </fieldset>
        <fieldset><legend>  </legend>
          <label><input type="radio" id="yes" name="opt"><span>Yes</span></label>
        </fieldset>
        <label><input type="checkbox" id="terms"><span>Terms</span></label>
        "#,
    )
    .await;

    let snapshot = extract(&probe, |_| {}).await;
    let basic = by_id(&snapshot, "basic").expect("radio record");
    assert_eq!(basic.semantic_type, "radio");
    assert_eq!(basic.fieldset.as_deref(), Some("Plan"));
    assert_eq!(basic.label, "Basic");
    assert_eq!(by_id(&snapshot, "yes").expect("radio record").fieldset, None);
    assert_eq!(by_id(&snapshot, "terms").expect("checkbox record").fieldset, None);

    let scoped = rank(&snapshot, Category::Radio, &RuleQuery::new("Basic", "plan"));
    assert_eq!(scoped[0].priority, 10);
    let unscoped = rank(&snapshot, Category::Radio, &RuleQuery::new("Yes", ""));
    assert_eq!(unscoped[0].priority, 15);
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set FIELDSCOPE_CDP_CONTRACT=1"]
async fn generated_selectors_match_exactly_one_node() {
    require_browser!();
    let probe = page_with(
        r#"
        <div class="toolbar"><button class="a">One</button><button class="b">Two</button><button class="b">Three</button></div>
        <section id="main"><div><button>Go</button></div></section>
        "#,
    )
    .await;

    let snapshot = extract(&probe, |_| {}).await;
    assert_eq!(
        by_text(&snapshot, "Three").css_selector,
        "html > body > div.toolbar > button.b:nth-of-type(3)"
    );
    assert_eq!(
        by_text(&snapshot, "Two").css_selector,
        "html > body > div.toolbar > button.b:nth-of-type(2)"
    );
    assert_eq!(by_text(&snapshot, "Go").css_selector, "#main > div > button");

    for text in ["One", "Two", "Three", "Go"] {
        let record = by_text(&snapshot, text);
        let css = LocatorCandidate::css(record.css_selector.clone());
        assert_eq!(probe.count(&css).await.unwrap(), 1, "{css}");
        let xpath = LocatorCandidate::new(record.xpath_selector.clone());
        assert_eq!(probe.count(&xpath).await.unwrap(), 1, "{xpath}");

        let selector = serde_json::to_string(&record.css_selector).unwrap();
        let found = probe
            .evaluate(&format!("document.querySelector({selector}).textContent"))
            .await
            .unwrap();
        assert_eq!(found, text);
    }

    let resolver = HeuristicResolver::new(
        probe.clone(),
        Arc::new(ScriptSnapshotExtractor::new(ExtractorConfig {
            settle_ms: 0,
            ..ExtractorConfig::default()
        })),
        HeuristicConfig::default(),
    );
    let handle = resolver
        .resolve("button", "Three", RefreshPolicy::None)
        .await
        .unwrap();
    assert_eq!(
        handle.chain_string(),
        "html > body > div.toolbar > button.b:nth-of-type(3)"
    );
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set FIELDSCOPE_CDP_CONTRACT=1"]
async fn chains_scope_through_sections_frames_and_shadow_roots() {
    require_browser!();
    let probe = page_with(
        r##"
        <nav id="top"><a href="#">Home</a></nav>
        <section aria-label="Billing"><input name="city"></section>
        <section aria-label="Shipping"><input name="city"></section>
        <div id="host"></div>
        <iframe id="frame"></iframe>
        <label for="email">Email</label><input id="email">
        "##,
    )
    .await;
    probe
        .evaluate(
            "(() => {
                document.getElementById('host').attachShadow({ mode: 'open' }).innerHTML =
                    '<button class=\"deep\">Deep</button>';
                document.getElementById('frame').contentDocument.body.innerHTML =
                    '<form id=\"inner\"><input name=\"q\"></form>';
            })()",
        )
        .await
        .expect("seed shadow root and frame");

    let evaluator = ChainEvaluator::new(probe.clone());
    let find = |query: ChainQuery<'static>| {
        let evaluator = evaluator.clone();
        async move { evaluator.evaluate(&query).await }
    };

    let shipping = "//section[@aria-label='Shipping']";
    let city = find(ChainQuery {
        section: Some(shipping),
        ..ChainQuery::field("input[name='city']")
    })
    .await
    .unwrap()
    .expect("city inside shipping");
    assert_eq!(city.chain, "//section[@aria-label='Shipping'] >> input[name='city']");
    assert!(find(ChainQuery {
        section: Some(shipping),
        index: 1,
        ..ChainQuery::field("input[name='city']")
    })
    .await
    .unwrap()
    .is_none());
    assert!(find(ChainQuery {
        index: 1,
        ..ChainQuery::field("input[name='city']")
    })
    .await
    .unwrap()
    .is_some());

    assert!(find(ChainQuery {
        location: Some("#top"),
        ..ChainQuery::field("a")
    })
    .await
    .unwrap()
    .is_some());
    assert!(find(ChainQuery {
        location: Some("#top"),
        ..ChainQuery::field("input[name='city']")
    })
    .await
    .unwrap()
    .is_none());

    let framed = find(ChainQuery {
        location: Some("#frame"),
        ..ChainQuery::field("#inner >> input")
    })
    .await
    .unwrap()
    .expect("input inside frame");
    assert_eq!(framed.chain, "#frame >> #inner >> input");
    assert!(find(ChainQuery::field("input[name='q']"))
        .await
        .unwrap()
        .is_none());

    assert!(find(ChainQuery::field("#host >> button.deep"))
        .await
        .unwrap()
        .is_some());
    assert!(find(ChainQuery::field("button.deep"))
        .await
        .unwrap()
        .is_none());

    let label = find(ChainQuery {
        capture_for: true,
        ..ChainQuery::field("//label[text()='Email']")
    })
    .await
    .unwrap()
    .expect("email label");
    assert_eq!(label.for_attr.as_deref(), Some("email"));

    let err = find(ChainQuery::field("//button[@bad"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProbeErrorKind::InvalidSelector);
}
