use figment::Jail;
use opacify_compress::Compression;
use opacify_config::Config;
use opacify_config::error::ErrorKind;
use std::path::Path;

// Every test that loads goes through `Jail`, which serializes access to the
// process environment.

#[test]
fn test_defaults_only() {
    Jail::expect_with(|_| {
        assert_eq!(Config::load_layers(None, None).unwrap(), Config::default());
        Ok(())
    });
}

#[test]
fn test_layers_override_in_order() {
    Jail::expect_with(|jail| {
        jail.create_file("user.toml", "cache_dir = \"from-user\"\n[network]\ntimeout_secs = 7\nconcurrency = 2\n")?;
        jail.create_file("explicit.yaml", "network:\n  timeout_secs: 9\nmanifest:\n  compression: gzip\n")?;
        jail.set_env("OPACIFY_NETWORK__CONCURRENCY", 5);

        let config = Config::load_layers(Some(Path::new("user.toml")), Some(Path::new("explicit.yaml"))).unwrap();
        assert_eq!(config.cache_dir, Path::new("from-user"));
        assert_eq!(config.network.timeout_secs, 9);
        assert_eq!(config.network.concurrency, 5);
        assert_eq!(config.manifest.compression, Some(Compression::Gzip));
        // Untouched sections keep their defaults.
        assert_eq!(config.matching.chunk_size, 24);
        Ok(())
    });
}

#[test]
fn test_json_and_env_lists() {
    Jail::expect_with(|jail| {
        jail.create_file("opacify.json", r#"{"workers": {"count": 4}, "matching": {"backoff": [16, 4]}}"#)?;
        jail.set_env("OPACIFY_MATCHING__CHUNK_SIZE", 48);

        let config = Config::load_layers(None, Some(Path::new("opacify.json"))).unwrap();
        assert_eq!(config.workers.count, Some(4));
        let tuning = config.tuning().unwrap();
        assert_eq!(tuning.chunk_size, 48);
        assert_eq!(tuning.ladder.steps(), [16, 4]);
        Ok(())
    });
}

#[test]
fn test_missing_user_file_is_skipped() {
    Jail::expect_with(|_| {
        let config = Config::load_layers(Some(Path::new("nowhere.toml")), None).unwrap();
        assert_eq!(config, Config::default());
        Ok(())
    });
}

#[test]
fn test_missing_explicit_file() {
    Jail::expect_with(|_| {
        let err = Config::load_layers(None, Some(Path::new("nowhere.toml"))).unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound("nowhere.toml".into()));
        Ok(())
    });
}

#[test]
fn test_unsupported_extension() {
    Jail::expect_with(|jail| {
        jail.create_file("opacify.ini", "timeout = 3")?;
        let err = Config::load_layers(None, Some(Path::new("opacify.ini"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
        Ok(())
    });
}

#[test]
fn test_bad_values() {
    Jail::expect_with(|jail| {
        jail.create_file("typo.toml", "[network]\ntimeout_secs = \"soon\"\n")?;
        let err = Config::load_layers(None, Some(Path::new("typo.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Parse(_)));

        jail.create_file("unknown.toml", "[manifest]\ncompression = \"rar\"\n")?;
        let err = Config::load_layers(None, Some(Path::new("unknown.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Parse(_)));

        jail.set_env("OPACIFY_MATCHING__CHUNK_SIZE", 0);
        let err = Config::load_layers(None, None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
        Ok(())
    });
}
