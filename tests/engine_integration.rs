mod common;

use common::TestEnv;
use livefind::indexer::ProgressTracker;
use livefind::search::{parse_query, Layer};

const DOCX_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body><w:p><w:r><w:t>Procurement budget for the northern warehouse</w:t></w:r></w:p></w:body>
</w:document>"#;

fn populate(env: &TestEnv) {
    env.write("notes/meeting.txt", "Budget review meeting on Friday");
    env.write("jp/資料.txt", "テスト資料の説明");
    env.write_zip("letter.docx", &[("word/document.xml", DOCX_BODY)]);
    env.write_zip(
        "bundle.zip",
        &[("inner/readme.txt", "archived changelog entry"), ("logo.png", "binary")],
    );
    env.write("image.png", "not collected");
}

#[test]
fn test_index_directory_then_search_every_layer() {
    let env = TestEnv::new();
    populate(&env);
    let engine = env.open();

    let progress = ProgressTracker::new();
    let report = engine.index_directory(&env.docs(), &progress).unwrap();
    assert_eq!(report.total_files, 4);
    assert_eq!(report.success_count, 4);

    // Immediate layer answers before anything is persisted
    let hits = engine.quick_search("budget", 10);
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.layer == Layer::Immediate));

    engine.flush_pending().unwrap();
    let stats = engine.statistics();
    assert_eq!(stats.store.total_files, 4);
    assert_eq!(stats.cache.hot_entries, 4);
    assert_eq!(stats.pending_jobs, 0);

    let hits = engine.unified_search("budget", 10, "all");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| matches!(h.layer, Layer::Complete { .. })));

    let docx_only = engine.unified_search("budget", 10, "docx");
    assert_eq!(docx_only.len(), 1);
    assert!(docx_only[0].file_path.ends_with("letter.docx"));

    let archived = engine.unified_search("changelog", 10, "zip");
    assert_eq!(archived.len(), 1);
}

#[test]
fn test_kana_and_width_variants_match() {
    let env = TestEnv::new();
    let jp = env.write("jp.txt", "テスト資料の説明");
    let en = env.write("en.txt", "Quarterly REPORT draft");
    let engine = env.open();

    assert!(engine.index_file(&jp).unwrap());
    assert!(engine.index_file(&en).unwrap());

    let hiragana = engine.quick_search("てすと", 10);
    assert_eq!(hiragana.len(), 1);
    assert!(hiragana[0].file_path.ends_with("jp.txt"));

    let full_width = engine.quick_search("ｒｅｐｏｒｔ", 10);
    assert_eq!(full_width.len(), 1);
    assert!(full_width[0].file_path.ends_with("en.txt"));
}

#[test]
fn test_state_survives_restart() {
    let env = TestEnv::new();
    let doc = env.write("contract.txt", "Indemnification clause for subcontractors");

    {
        let engine = env.open();
        assert!(engine.index_file(&doc).unwrap());
        engine.shutdown().unwrap();
    }

    let engine = env.open();
    let stats = engine.statistics();
    assert_eq!(stats.store.total_files, 1);
    assert_eq!(stats.cache.hot_entries, 1);
    assert_eq!(stats.cache.immediate_entries, 0);

    let hits = engine.quick_search("indemnification", 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].layer, Layer::Hot);

    engine.clear_cache().unwrap();
    let hits = engine.quick_search("indemnification", 10);
    assert_eq!(hits.len(), 1);
    assert!(matches!(hits[0].layer, Layer::Complete { .. }));
}

#[test]
fn test_reindexing_unchanged_file_keeps_one_row() {
    let env = TestEnv::new();
    let doc = env.write("same.txt", "identical content every time");
    let engine = env.open();

    for _ in 0..3 {
        assert!(engine.index_file(&doc).unwrap());
        engine.flush_pending().unwrap();
    }

    assert_eq!(engine.statistics().store.total_files, 1);
    assert_eq!(engine.statistics().counters.indexed_files, 3);
}

#[test]
fn test_query_language_filters_results() {
    let env = TestEnv::new();
    env.write("alpha_dir/plan.txt", "migration plan alpha");
    env.write("beta_dir/plan.md", "migration plan beta");
    let engine = env.open();

    let progress = ProgressTracker::new();
    engine.index_directory(&env.docs(), &progress).unwrap();
    // Only .txt is collected by directory walks
    assert_eq!(progress.snapshot().total_files, 1);

    let md = env.docs().join("beta_dir/plan.md");
    assert!(engine.index_file(&md).unwrap());
    engine.flush_pending().unwrap();

    let parsed = parse_query("migration path:beta_dir").unwrap();
    let hits = parsed.apply(engine.unified_search(&parsed.text, 10, "all"));
    assert_eq!(hits.len(), 1);
    assert!(hits[0].file_path.ends_with("plan.md"));

    let parsed = parse_query("\"migration plan\" ext:txt").unwrap();
    let ext = parsed.extension().unwrap_or("all");
    let hits = engine.unified_search(&parsed.text, 10, ext);
    assert_eq!(hits.len(), 1);
    assert!(hits[0].file_path.ends_with("plan.txt"));
}
