use anyhow::Result;
use mkdb::cli::{App, StartArgs};
use mkdb::credentials::CredentialCipher;
use mkdb::infra::DataPaths;
use mkdb::services::Inventory;
use mkdb::test_support::MockRuntime;
use mkdb::{AdapterRegistry, DatabaseAdapter, Error};
use std::fs;
use std::sync::Arc;

#[test]
fn test_registry_resolves_aliases_case_insensitively() {
    let registry = AdapterRegistry::builtin();

    assert_eq!(registry.list(), vec!["mysql", "postgres", "redis"]);
    for (input, expected) in [
        ("PostgreSQL", "postgres"),
        (" pg ", "postgres"),
        ("MariaDB", "mysql"),
        ("REDIS", "redis"),
    ] {
        assert_eq!(registry.resolve(input).unwrap().name(), expected);
    }
    assert!(matches!(registry.resolve("sqlite"), Err(Error::NotFound(_))));
}

#[test]
fn test_encryption_key_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let key_path = dir.path().join(".encryption.key");

    let cipher = CredentialCipher::load_or_create(&key_path)?;
    let first = cipher.encrypt("s3cret")?;
    let second = cipher.encrypt("s3cret")?;
    assert_ne!(first, second, "nonce must differ per encryption");

    let reopened = CredentialCipher::load_or_create(&key_path)?;
    assert_eq!(reopened.decrypt(&first)?, "s3cret");
    assert_eq!(reopened.decrypt(&second)?, "s3cret");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&key_path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    Ok(())
}

#[test]
fn test_corrupt_key_is_never_replaced() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let key_path = dir.path().join(".encryption.key");
    fs::write(&key_path, "not-hex")?;

    assert!(matches!(
        CredentialCipher::load_or_create(&key_path),
        Err(Error::Integrity(_))
    ));
    assert_eq!(fs::read_to_string(&key_path)?, "not-hex");

    Ok(())
}

#[test]
fn test_state_persists_across_invocations() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mock = Arc::new(MockRuntime::new());

    let password = {
        let app = App::with_runtime(dir.path(), mock.clone())?;
        let outcome = app.start(&StartArgs {
            db: Some("mysql".into()),
            name: Some("shop".into()),
            ..Default::default()
        })?;
        outcome.password.expect("generated password")
    };

    let paths = DataPaths::new(dir.path());
    assert!(paths.database().is_file());
    assert!(paths.encryption_key().is_file());
    assert!(paths.last_settings().is_file());
    assert!(paths.container_config_dir("shop").join("my.cnf").is_file());

    let app = App::with_runtime(dir.path(), mock)?;
    let info = Inventory::new(app.context()).connection_info("shop")?;
    assert_eq!(info.password.as_deref(), Some(password.as_str()));
    assert_eq!(info.host, "localhost");

    Ok(())
}

#[test]
fn test_config_file_sets_host_and_default_ttl() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("mkdb.toml"),
        r#"
[defaults]
ttl_hours = 6
host = "db.local"
"#,
    )?;

    let app = App::with_runtime(dir.path(), Arc::new(MockRuntime::new()))?;
    let outcome = app.start(&StartArgs {
        db: Some("redis".into()),
        name: Some("cache".into()),
        no_auth: true,
        ..Default::default()
    })?;

    let c = &outcome.container;
    assert_eq!(c.expires_at - c.created_at, chrono::Duration::hours(6));
    assert_eq!(outcome.connection_string, "redis://db.local:6379/0");

    Ok(())
}
