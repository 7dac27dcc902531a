mod common;

use common::FakeFileSystem;
use pretty_assertions::assert_eq;
use xbundle_core::config::{BudgetConfig, ScanConfig};
use xbundle_core::{
    AppError, Bundle, CheckedSet, Config, EntryCatalog, FilterEngine, OutputFormat, ScanTicket,
    SkipReason, TokenEstimator, assemble,
};

fn budget(max_tokens: usize) -> BudgetConfig {
    BudgetConfig {
        max_tokens,
        header_overhead_tokens: 0,
        ..BudgetConfig::default()
    }
}

async fn scan(fs: &FakeFileSystem) -> EntryCatalog {
    EntryCatalog::scan(fs.root(), fs, &ScanConfig::default(), &ScanTicket::detached())
        .await
        .expect("scan should succeed")
}

/// 160 characters, 40 tokens under the character heuristic.
fn forty_tokens() -> String {
    "abcd".repeat(40)
}

#[tokio::test]
async fn stops_at_the_first_file_that_does_not_fit() {
    let fs = FakeFileSystem::new("/r")
        .file("a.txt", forty_tokens())
        .file("b.txt", forty_tokens())
        .file("c.txt", forty_tokens());
    let catalog = scan(&fs).await;
    let selected = vec![fs.uri("a.txt"), fs.uri("b.txt"), fs.uri("c.txt")];

    let result = assemble(
        &selected,
        &catalog,
        &fs,
        &TokenEstimator::heuristic_only(),
        &budget(100),
        0,
    )
    .await
    .unwrap();

    assert_eq!(result.processed_tokens, 80);
    assert!(result.limit_reached);
    assert_eq!(result.included, vec!["a.txt", "b.txt"]);
    assert!(result.content.starts_with("File: a.txt\n```txt\n"));
    assert!(!result.content.contains("File: c.txt"));
}

#[tokio::test]
async fn header_overhead_is_charged_per_file() {
    let fs = FakeFileSystem::new("/r")
        .file("a.txt", forty_tokens())
        .file("b.txt", forty_tokens());
    let catalog = scan(&fs).await;
    let selected = vec![fs.uri("a.txt"), fs.uri("b.txt")];
    let budget = BudgetConfig {
        header_overhead_tokens: 10,
        ..budget(100)
    };

    let result = assemble(
        &selected,
        &catalog,
        &fs,
        &TokenEstimator::heuristic_only(),
        &budget,
        0,
    )
    .await
    .unwrap();
    assert_eq!(result.processed_tokens, 100);
    assert!(!result.limit_reached);
}

#[tokio::test]
async fn unreadable_files_are_skipped_at_no_cost() {
    let fs = FakeFileSystem::new("/r")
        .file("a.txt", forty_tokens())
        .file("broken.txt", forty_tokens())
        .file("binary.bin", [0xffu8, 0xfe, 0x00])
        .file("c.txt", forty_tokens())
        .fail_read("broken.txt");
    let catalog = scan(&fs).await;
    let selected = vec![
        fs.uri("a.txt"),
        fs.uri("broken.txt"),
        fs.uri("binary.bin"),
        "file:///not/catalogued.txt".to_string(),
        fs.uri("c.txt"),
    ];

    let result = assemble(
        &selected,
        &catalog,
        &fs,
        &TokenEstimator::heuristic_only(),
        &budget(100),
        0,
    )
    .await
    .unwrap();

    assert_eq!(result.included, vec!["a.txt", "c.txt"]);
    assert_eq!(result.processed_tokens, 80);
    assert!(!result.limit_reached);
    let reasons: Vec<&SkipReason> = result.skipped.iter().map(|s| &s.reason).collect();
    assert!(matches!(reasons[0], SkipReason::Unreadable(_)));
    assert_eq!(reasons[1], &SkipReason::NotUtf8);
    assert_eq!(reasons[2], &SkipReason::NotInCatalog);
}

#[tokio::test]
async fn consumed_tokens_count_towards_the_budget() {
    let fs = FakeFileSystem::new("/r").file("a.txt", forty_tokens());
    let catalog = scan(&fs).await;
    let selected = vec![fs.uri("a.txt")];
    let estimator = TokenEstimator::heuristic_only();

    let result = assemble(&selected, &catalog, &fs, &estimator, &budget(100), 70)
        .await
        .unwrap();
    assert_eq!(result.processed_tokens, 70);
    assert!(result.limit_reached);
    assert!(result.content.is_empty());

    let err = assemble(&selected, &catalog, &fs, &estimator, &budget(100), 101)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));
}

#[tokio::test]
async fn bundle_charges_the_tree_and_respects_filters() {
    let fs = FakeFileSystem::new("/r")
        .file("src/lib.rs", "fn main(){}\n")
        .file("secret.key", "hunter2")
        .file("Cargo.lock", "# lock");
    let catalog = scan(&fs).await;
    let mut config = Config::default();
    config.budget = budget(1_000);
    config.output.include_timestamp = false;
    let engine = FilterEngine::new(config.effective_file_groups());
    let checked: CheckedSet = [fs.uri("src"), fs.uri("secret.key")].into_iter().collect();
    let estimator = TokenEstimator::heuristic_only();

    let bundle = Bundle::build(&catalog, &engine, &checked, &fs, &estimator, &config)
        .await
        .unwrap();

    let tree_text = bundle.tree_text.as_deref().expect("tree should be included");
    assert_eq!(tree_text, "r/\n└── src/\n    └── lib.rs (12 B)\n");
    assert_eq!(bundle.files_included, vec!["src/lib.rs"]);
    assert!(bundle.processed_tokens > 3, "tree cost must be charged");
    assert!(bundle.processed_tokens <= bundle.max_tokens);
    assert_eq!(bundle.project_name, "r");

    let text = bundle.to_text();
    assert!(text.starts_with("Directory tree:\n```text\nr/\n"));
    assert!(text.contains("File: src/lib.rs\n```rs\nfn main(){}\n```\n\n"));
    assert!(!text.contains("hunter2"));

    let json = bundle.render(OutputFormat::Json).unwrap();
    assert!(json.contains("\"processedTokens\""));
    assert!(!json.contains("generatedAt"));
}

#[tokio::test]
async fn oversized_tree_is_dropped() {
    let fs = FakeFileSystem::new("/r").file("src/lib.rs", "fn main(){}\n");
    let catalog = scan(&fs).await;
    let mut config = Config::default();
    config.budget = budget(5);
    let engine = FilterEngine::new(config.effective_file_groups());
    let checked: CheckedSet = [fs.uri("src/lib.rs")].into_iter().collect();

    let bundle = Bundle::build(
        &catalog,
        &engine,
        &checked,
        &fs,
        &TokenEstimator::heuristic_only(),
        &config,
    )
    .await
    .unwrap();

    assert!(bundle.tree.is_none());
    assert_eq!(bundle.files_included, vec!["src/lib.rs"]);
    assert_eq!(bundle.processed_tokens, 3);
    assert!(bundle.to_text().starts_with("File: src/lib.rs"));
}
