use anyhow::Result;
use couponscout::{
    search::{Decision, SearchTarget},
    CancellationToken, SearchConfig, SearchEngine, SearchError,
};
use std::fs::File;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn create_coupon_file(dir: &Path, name: &str, filler: usize, coupons: &[&str]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut file = File::create(&path)?;
    for i in 0..filler {
        writeln!(file, "{}{:06}", name.len(), i)?;
    }
    for coupon in coupons {
        writeln!(file, "{}", coupon)?;
    }
    Ok(path)
}

fn engine(files: Vec<PathBuf>, min: usize) -> Result<SearchEngine> {
    let mut config = SearchConfig::new(files, min);
    config.producers_per_file = NonZeroUsize::new(4).unwrap();
    config.consumers_per_file = NonZeroUsize::new(3).unwrap();
    config.queue_capacity_per_producer = NonZeroUsize::new(16).unwrap();
    Ok(SearchEngine::new(config)?)
}

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dummy_coupons")
}

#[test]
fn test_coupon_in_enough_files() -> Result<()> {
    init_logging();
    let dir = tempdir()?;
    let files = vec![
        create_coupon_file(dir.path(), "couponbase1", 500, &["HAPPYHRS"])?,
        create_coupon_file(dir.path(), "couponbase2", 500, &["SUPERSALE"])?,
        create_coupon_file(dir.path(), "couponbase3", 500, &["HAPPYHRS", "SUPERSALE"])?,
    ];
    let engine = engine(files.clone(), 2)?;

    let mut handle = engine.search("HAPPYHRS", &CancellationToken::new())?;
    let verdict = handle.evaluate_verdict()?;
    assert!(verdict.matched);
    assert_eq!(verdict.decision, Decision::ThresholdReached);
    assert_eq!(verdict.matched_files, vec![files[0].clone(), files[2].clone()]);
    assert!(verdict.errors.is_empty());

    assert!(engine.check_coupon("SUPERSALE", &CancellationToken::new())?);
    Ok(())
}

#[test]
fn test_coupon_in_too_few_files() -> Result<()> {
    let dir = tempdir()?;
    let files = vec![
        create_coupon_file(dir.path(), "couponbase1", 300, &[])?,
        create_coupon_file(dir.path(), "couponbase2", 300, &["ONLYHERE"])?,
        create_coupon_file(dir.path(), "couponbase3", 300, &[])?,
    ];
    let engine = engine(files, 2)?;

    let mut handle = engine.search("ONLYHERE", &CancellationToken::new())?;
    let verdict = handle.evaluate_verdict()?;
    assert!(!verdict.matched);
    assert_eq!(verdict.decision, Decision::Exhausted);
    assert_eq!(verdict.matched_files.len(), 1);
    assert!(handle.files().iter().all(|f| f.is_finished()));
    Ok(())
}

#[test]
fn test_fixture_coupons_across_chunk_boundaries() -> Result<()> {
    let coupons = [
        "112345678",
        "2123456789",
        "412345678",
        "6123456789",
        "712345678",
        "8123456789",
        "1012345678",
    ];
    for producers in 1..=8 {
        let mut config = SearchConfig::new(vec![fixture()], 1);
        config.producers_per_file = NonZeroUsize::new(producers).unwrap();
        config.consumers_per_file = NonZeroUsize::new(2).unwrap();
        let engine = SearchEngine::new(config)?;
        for coupon in coupons {
            assert!(
                engine.check_coupon(coupon, &CancellationToken::new())?,
                "{} not found with {} producers",
                coupon,
                producers
            );
        }
    }
    Ok(())
}

#[test]
fn test_last_line_without_newline() -> Result<()> {
    // The fixture ends with "12123456789" and no trailing newline; allow
    // 11-byte codes so it passes validation.
    let mut config = SearchConfig::new(vec![fixture()], 1);
    config.producers_per_file = NonZeroUsize::new(4).unwrap();
    config.max_token_len = 15;
    let engine = SearchEngine::new(config)?;

    assert!(engine.check_coupon("12123456789", &CancellationToken::new())?);
    assert!(engine.check_coupon("111234567891011", &CancellationToken::new())?);
    assert!(!engine.check_coupon("1212345678", &CancellationToken::new())?);
    Ok(())
}

#[test]
fn test_only_whole_lines_match() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("couponbase1");
    std::fs::write(&path, "HAPPYHRS1\nXHAPPYHRS\nHAPPYHR\n")?;
    let engine = engine(vec![path], 1)?;

    assert!(!engine.check_coupon("HAPPYHRS", &CancellationToken::new())?);
    Ok(())
}

#[test]
fn test_crlf_lines_match() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("couponbase1");
    std::fs::write(&path, "AAAAAAAA\r\nHAPPYHRS\r\nBBBBBBBB\r\n")?;
    let engine = engine(vec![path], 1)?;

    assert!(engine.check_coupon("HAPPYHRS", &CancellationToken::new())?);
    Ok(())
}

#[test]
fn test_cancel_before_evaluate() -> Result<()> {
    let dir = tempdir()?;
    let files = vec![
        create_coupon_file(dir.path(), "couponbase1", 1000, &["HAPPYHRS"])?,
        create_coupon_file(dir.path(), "couponbase2", 1000, &["HAPPYHRS"])?,
    ];
    let engine = engine(files, 2)?;

    let caller = CancellationToken::new();
    caller.cancel();
    let mut handle = engine.search("HAPPYHRS", &caller)?;
    let verdict = handle.evaluate_verdict()?;
    assert!(!verdict.matched);
    assert_eq!(verdict.decision, Decision::Cancelled);
    assert!(!verdict.into_result()?);
    Ok(())
}

#[test]
fn test_verdict_is_retrieved_once() -> Result<()> {
    let dir = tempdir()?;
    let files = vec![create_coupon_file(dir.path(), "couponbase1", 10, &["HAPPYHRS"])?];
    let engine = engine(files, 1)?;

    let mut handle = engine.search("HAPPYHRS", &CancellationToken::new())?;
    assert!(handle.evaluate()?);
    assert!(matches!(handle.evaluate(), Err(SearchError::AlreadyConsumed)));
    assert!(matches!(
        handle.evaluate_verdict(),
        Err(SearchError::AlreadyConsumed)
    ));
    Ok(())
}

#[test]
fn test_repeated_searches_agree() -> Result<()> {
    let dir = tempdir()?;
    let files = vec![
        create_coupon_file(dir.path(), "couponbase1", 200, &["HAPPYHRS"])?,
        create_coupon_file(dir.path(), "couponbase2", 200, &[])?,
        create_coupon_file(dir.path(), "couponbase3", 200, &["HAPPYHRS"])?,
    ];
    let engine = engine(files, 2)?;

    for _ in 0..10 {
        assert!(engine.check_coupon("HAPPYHRS", &CancellationToken::new())?);
        assert!(!engine.check_coupon("NOTACODE", &CancellationToken::new())?);
    }
    Ok(())
}

#[test]
fn test_concurrent_searches_share_an_engine() -> Result<()> {
    let dir = tempdir()?;
    let files = vec![
        create_coupon_file(dir.path(), "couponbase1", 200, &["CODEAAAA"])?,
        create_coupon_file(dir.path(), "couponbase2", 200, &["CODEAAAA", "CODEBBBB"])?,
    ];
    let engine = engine(files, 2)?;

    std::thread::scope(|s| {
        let accepted = s.spawn(|| engine.check_coupon("CODEAAAA", &CancellationToken::new()));
        let rejected = s.spawn(|| engine.check_coupon("CODEBBBB", &CancellationToken::new()));
        assert!(accepted.join().unwrap().unwrap());
        assert!(!rejected.join().unwrap().unwrap());
    });
    Ok(())
}

#[test]
fn test_missing_file_is_reported() -> Result<()> {
    let dir = tempdir()?;
    let present = create_coupon_file(dir.path(), "couponbase1", 50, &[])?;
    let engine = engine(vec![present.clone()], 1)?;

    let missing = dir.path().join("couponbase2");
    let target = SearchTarget::new("HAPPYHRS", vec![present, missing.clone()], 1)?;
    let mut handle = engine.start(&target, &CancellationToken::new())?;

    match handle.evaluate() {
        Err(SearchError::Files(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].path, missing);
            assert!(matches!(failures[0].error, SearchError::FileNotFound(_)));
        }
        other => panic!("expected a file error, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_match_despite_missing_sibling() -> Result<()> {
    let dir = tempdir()?;
    let present = create_coupon_file(dir.path(), "couponbase1", 50, &["HAPPYHRS"])?;
    let engine = engine(vec![present.clone()], 1)?;

    let target = SearchTarget::new(
        "HAPPYHRS",
        vec![dir.path().join("couponbase0"), present],
        1,
    )?;
    let mut handle = engine.start(&target, &CancellationToken::new())?;
    assert!(handle.evaluate()?);
    Ok(())
}

#[test]
fn test_large_file_many_chunks() -> Result<()> {
    let dir = tempdir()?;
    let path = create_coupon_file(dir.path(), "couponbase1", 50_000, &["LASTCODE"])?;

    let mut config = SearchConfig::new(vec![path], 1);
    config.producers_per_file = NonZeroUsize::new(32).unwrap();
    config.consumers_per_file = NonZeroUsize::new(8).unwrap();
    config.queue_capacity_per_producer = NonZeroUsize::new(4).unwrap();
    config.max_workers = NonZeroUsize::new(40).unwrap();
    let engine = SearchEngine::new(config)?;

    let mut handle = engine.search("LASTCODE", &CancellationToken::new())?;
    let verdict = handle.evaluate_verdict()?;
    assert!(verdict.matched);
    assert_eq!(verdict.stats.chunks_planned, 32);
    Ok(())
}

#[test]
fn test_default_layout_scaled_to_worker_cap() -> Result<()> {
    init_logging();
    let dir = tempdir()?;
    let files = vec![
        create_coupon_file(dir.path(), "couponbase1", 2_000, &[])?,
        create_coupon_file(dir.path(), "couponbase2", 2_000, &["HAPPYHRS"])?,
        create_coupon_file(dir.path(), "couponbase3", 2_000, &[])?,
        create_coupon_file(dir.path(), "couponbase4", 2_000, &["HAPPYHRS"])?,
    ];

    // 4 files x (10 + 10) workers asks for 80 threads.
    let mut config = SearchConfig::new(files.clone(), 2);
    config.max_workers = NonZeroUsize::new(64).unwrap();
    assert!(config.workers_per_search() > config.max_workers.get());
    let engine = SearchEngine::new(config)?;

    let mut handle = engine.search("HAPPYHRS", &CancellationToken::new())?;
    let verdict = handle.evaluate_verdict()?;
    assert!(verdict.matched);
    assert_eq!(verdict.decision, Decision::ThresholdReached);
    assert_eq!(verdict.matched_files, vec![files[1].clone(), files[3].clone()]);
    Ok(())
}

#[test]
fn test_timeout_rejects() -> Result<()> {
    let dir = tempdir()?;
    let path = create_coupon_file(dir.path(), "couponbase1", 10, &[])?;
    let engine = engine(vec![path], 1)?;

    let mut handle = engine.search("HAPPYHRS", &CancellationToken::new())?;
    // Either the file is exhausted first or the timeout fires; both reject.
    assert!(!handle.evaluate_timeout(Duration::from_secs(5))?);
    Ok(())
}
