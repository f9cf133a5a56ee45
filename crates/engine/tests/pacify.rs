mod common;

use common::{DEAD_URL, Fixture, every_byte, sample_input};
use opacify_engine::error::ErrorKind;
use opacify_engine::{PacifyOptions, pacify, satisfy, verify};
use opacify_manifest::{Compression, InputHash, MatchEntry};
use rstest::rstest;

fn entries(path: &std::path::Path) -> Vec<MatchEntry> {
    opacify_manifest::entries(path).unwrap().collect::<Result<_, _>>().unwrap()
}

#[tokio::test]
async fn test_single_fragment() {
    let fx = Fixture::new();
    let url = fx.resource("a.bin", b"xxabcdxx");
    let input = fx.file("input", b"abcd");
    let manifest = fx.path("out.manifest");

    let report = pacify(&fx.cache, &input, &[url.clone()], &manifest, &PacifyOptions::default()).await.unwrap();
    assert_eq!(report.length, 4);
    assert_eq!(report.hash, InputHash::of(b"abcd"));
    assert_eq!(report.entries, 1);
    assert_eq!(entries(&manifest), [MatchEntry::new(url, 2, 4)]);
    assert_eq!(opacify_manifest::read_header(&manifest).unwrap().length, 4);

    let output = fx.path("output");
    satisfy(&fx.cache, &manifest, &output, false).await.unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), b"abcd");
}

#[tokio::test]
async fn test_no_match_writes_nothing() {
    let fx = Fixture::new();
    let url = fx.resource("a.bin", b"xxabcdxx");
    let input = fx.file("input", b"abcz");
    let manifest = fx.path("out.manifest");

    let err = pacify(&fx.cache, &input, &[url], &manifest, &PacifyOptions::default()).await.unwrap_err();
    assert_eq!(*err, ErrorKind::NoMatchFound { offset: 3 });
    assert_eq!(err.code(), "E_NO_MATCH");
    assert!(!manifest.exists());
    // No partial manifest left lying around either.
    assert_eq!(fx.listing(), ["input"]);
}

#[tokio::test]
async fn test_existing_manifest_is_kept() {
    let fx = Fixture::new();
    let url = fx.resource("a.bin", b"xxabcdxx");
    let input = fx.file("input", b"abcd");
    let manifest = fx.file("out.manifest", b"keep me");

    let err = pacify(&fx.cache, &input, &[url.clone()], &manifest, &PacifyOptions::default()).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::PathConflict(path) if path == &manifest));
    assert_eq!(std::fs::read(&manifest).unwrap(), b"keep me");

    let options = PacifyOptions { overwrite: true, ..Default::default() };
    pacify(&fx.cache, &input, &[url], &manifest, &options).await.unwrap();
    assert_eq!(opacify_manifest::read_header(&manifest).unwrap().length, 4);
}

#[tokio::test]
async fn test_offset_zero_is_never_matched() {
    let fx = Fixture::new();
    let at_start = fx.resource("start.bin", b"abcd");
    let input = fx.file("input", b"abcd");

    let manifest = fx.path("one.manifest");
    let err = pacify(&fx.cache, &input, &[at_start.clone()], &manifest, &PacifyOptions::default()).await.unwrap_err();
    assert_eq!(*err, ErrorKind::NoMatchFound { offset: 0 });

    let later = fx.resource("later.bin", b"-abcd");
    let manifest = fx.path("two.manifest");
    pacify(&fx.cache, &input, &[at_start, later.clone()], &manifest, &PacifyOptions::default()).await.unwrap();
    assert_eq!(entries(&manifest), [MatchEntry::new(later, 1, 4)]);
}

#[tokio::test]
async fn test_first_candidate_wins() {
    let fx = Fixture::new();
    let first = fx.resource("first.bin", b"--abcd");
    let second = fx.resource("second.bin", b"-abcd");
    let input = fx.file("input", b"abcd");
    let manifest = fx.path("out.manifest");

    pacify(&fx.cache, &input, &[first.clone(), second.clone()], &manifest, &PacifyOptions::default()).await.unwrap();
    assert_eq!(entries(&manifest), [MatchEntry::new(first.clone(), 2, 4)]);

    pacify(&fx.cache, &input, &[second.clone(), first], &manifest, &PacifyOptions { overwrite: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(entries(&manifest), [MatchEntry::new(second, 1, 4)]);
}

#[tokio::test]
async fn test_remainder_is_not_reset() {
    let fx = Fixture::new();
    // "I" is followed by "#", so no match can span the I/J boundary.
    let url = fx.resource("alphabet.bin", b"-ABCDEFGHI#JKLMNOPQRSTUVWX");
    let input = fx.file("input", b"ABCDEFGHIJKLMNOPQRSTUVWX");
    let manifest = fx.path("out.manifest");

    pacify(&fx.cache, &input, &[url.clone()], &manifest, &PacifyOptions::default()).await.unwrap();
    // 24 and 16 miss, 8 hits. The 16 bytes left are tried at 16 (not 24),
    // shrink to a single "I", and the last 15 bytes then match whole.
    assert_eq!(
        entries(&manifest),
        [MatchEntry::new(url.clone(), 1, 8), MatchEntry::new(url.clone(), 9, 1), MatchEntry::new(url, 11, 15)]
    );
}

#[tokio::test]
async fn test_dead_candidate_is_skipped() {
    let fx = Fixture::new();
    let url = fx.resource("a.bin", b"xxabcdxx");
    let input = fx.file("input", b"abcd");
    let manifest = fx.path("out.manifest");

    let candidates = [DEAD_URL.to_string(), url.clone()];
    let report = pacify(&fx.cache, &input, &candidates, &manifest, &PacifyOptions::default()).await.unwrap();
    assert_eq!(entries(&manifest), [MatchEntry::new(url, 2, 4)]);
    assert!(report.unavailable.contains(DEAD_URL));
}

#[rstest]
#[case(1)]
#[case(4)]
#[tokio::test]
async fn test_sum_matches_header(#[case] workers: usize) {
    let fx = Fixture::new();
    let url = fx.resource("bytes.bin", &every_byte());
    let input = fx.file("input", &sample_input(100));
    let manifest = fx.path("out.manifest");

    let options = PacifyOptions { workers: Some(workers), ..Default::default() };
    let report = pacify(&fx.cache, &input, &[url], &manifest, &options).await.unwrap();
    assert_eq!(report.workers, workers);
    let covered: u64 = entries(&manifest).iter().map(|entry| entry.length).sum();
    assert_eq!(covered, 100);
    assert_eq!(report.length, 100);

    let verified = verify(&manifest, Some(&fx.cache)).await.unwrap();
    assert_eq!(verified.header.length, 100);
    assert!(verified.is_clean());
}

#[tokio::test]
async fn test_worker_counts_rebuild_identically() {
    let fx = Fixture::new();
    let input_bytes = sample_input(100);
    let mut body = b"#".to_vec();
    body.extend_from_slice(&input_bytes[..60]);
    body.extend(every_byte());
    let url = fx.resource("mixed.bin", &body);
    let input = fx.file("input", &input_bytes);

    let mut rebuilt = Vec::new();
    for workers in [1, 4] {
        let manifest = fx.path(&format!("w{workers}.manifest"));
        let output = fx.path(&format!("w{workers}.out"));
        let options = PacifyOptions { workers: Some(workers), ..Default::default() };
        let report = pacify(&fx.cache, &input, &[url.clone()], &manifest, &options).await.unwrap();
        assert_eq!(report.hash, InputHash::of(&input_bytes));
        let satisfied = satisfy(&fx.cache, &manifest, &output, false).await.unwrap();
        assert_eq!(satisfied.hash, report.hash);
        rebuilt.push(std::fs::read(&output).unwrap());
    }
    assert_eq!(rebuilt[0], input_bytes);
    assert_eq!(rebuilt[0], rebuilt[1]);
    // Shards are gone once merged.
    assert!(fx.listing().iter().all(|name| !name.contains(".shard-")));
}

#[tokio::test]
async fn test_small_input_stays_single() {
    let fx = Fixture::new();
    let url = fx.resource("bytes.bin", &every_byte());
    let input = fx.file("input", &sample_input(30));
    let manifest = fx.path("out.manifest");

    // 4 workers x 10 bytes > 30 bytes.
    let options = PacifyOptions { workers: Some(4), ..Default::default() };
    let report = pacify(&fx.cache, &input, &[url], &manifest, &options).await.unwrap();
    assert_eq!(report.workers, 1);
}

#[rstest]
#[case(None)]
#[case(Some(3))]
#[tokio::test]
async fn test_deterministic(#[case] workers: Option<usize>) {
    let fx = Fixture::new();
    let url = fx.resource("bytes.bin", &every_byte());
    let other = fx.resource("other.bin", &sample_input(500));
    let input = fx.file("input", &sample_input(240));
    let options = PacifyOptions { workers, ..Default::default() };

    let first = fx.path("first.manifest");
    let second = fx.path("second.manifest");
    pacify(&fx.cache, &input, &[other.clone(), url.clone()], &first, &options).await.unwrap();
    pacify(&fx.cache, &input, &[other, url], &second, &options).await.unwrap();
    assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
}

#[tokio::test]
async fn test_empty_input() {
    let fx = Fixture::new();
    let url = fx.resource("a.bin", b"xxabcdxx");
    let input = fx.file("input", b"");
    let manifest = fx.path("out.manifest");

    let report = pacify(&fx.cache, &input, &[url], &manifest, &PacifyOptions::default()).await.unwrap();
    assert_eq!((report.length, report.entries), (0, 0));
    let output = fx.path("output");
    satisfy(&fx.cache, &manifest, &output, false).await.unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), b"");
}

#[rstest]
#[case("out.manifest.gz", Compression::Gzip)]
#[case("out.manifest.bz2", Compression::Bzip2)]
#[tokio::test]
async fn test_compressed_manifest(#[case] name: &str, #[case] expected: Compression) {
    let fx = Fixture::new();
    let url = fx.resource("bytes.bin", &every_byte());
    let input_bytes = sample_input(64);
    let input = fx.file("input", &input_bytes);
    let manifest = fx.path(name);

    let options = PacifyOptions { workers: Some(2), ..Default::default() };
    pacify(&fx.cache, &input, &[url], &manifest, &options).await.unwrap();
    assert_eq!(Compression::from_magic_bytes(&std::fs::read(&manifest).unwrap()), expected);

    let output = fx.path("output");
    satisfy(&fx.cache, &manifest, &output, false).await.unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), input_bytes);
}
