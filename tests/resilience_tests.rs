use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use mkdb::Error;
use mkdb::credentials::CredentialCipher;
use mkdb::domain::EventKind;
use mkdb::infra::{DataPaths, Store};
use mkdb::services::{
    Context, CreateRequest, Disposition, ExpirationEngine, Orchestrator, UserService,
    VolumeRequest,
};
use mkdb::test_support::{ManualClock, MockRuntime, ScriptedPrompt, test_context};
use std::sync::Arc;

fn request(db_type: &str, name: &str) -> CreateRequest {
    CreateRequest {
        db_type: db_type.to_string(),
        display_name: name.to_string(),
        version: None,
        port: None,
        volume: VolumeRequest::None,
        ttl_hours: 1,
        no_auth: false,
    }
}

#[test]
fn test_remove_continues_when_runtime_stop_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);
    let container = orchestrator.create(&request("postgres", "devdb"))?.container;

    mock.set_fail_on("stop");
    let report = orchestrator.remove("devdb", false)?;

    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("parar devdb"));
    assert!(ctx.store.get_container(container.id)?.is_none());
    // Removal is still attempted after the failed stop.
    assert!(
        mock.get_commands()
            .contains(&format!("remove:{}", container.container_id))
    );

    Ok(())
}

#[test]
fn test_remove_succeeds_when_runtime_is_unreachable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);
    let mut req = request("redis", "cache");
    req.volume = VolumeRequest::Named;
    orchestrator.create(&req)?;

    mock.set_fail_on("exists");
    let report = orchestrator.remove("cache", false)?;
    assert!(!report.warnings.is_empty());
    assert!(ctx.store.list_containers()?.is_empty());

    mock.clear_fail();
    mock.set_fail_on("list_volumes");
    let container = orchestrator.create(&req)?.container;
    let report = orchestrator.remove("cache", false)?;
    assert!(report.warnings.iter().any(|w| w.contains("volumes cache")));
    assert!(ctx.store.get_container(container.id)?.is_none());

    Ok(())
}

#[test]
fn test_failed_start_discards_the_runtime_container() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());

    mock.set_fail_on("start");
    let err = Orchestrator::new(&ctx)
        .create(&request("mysql", "shop"))
        .unwrap_err();

    assert!(matches!(err, Error::Runtime { .. }));
    assert!(mock.spec_of("mkdb-shop").is_none());
    assert!(ctx.store.list_all_containers()?.is_empty());
    assert!(mock.get_commands().iter().any(|c| c.starts_with("remove:")));

    Ok(())
}

#[test]
fn test_failed_pull_leaves_nothing_behind() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());

    mock.set_fail_on("pull");
    assert!(Orchestrator::new(&ctx).create(&request("postgres", "devdb")).is_err());
    assert!(!mock.get_commands().iter().any(|c| c.starts_with("create:")));
    assert!(ctx.store.list_all_containers()?.is_empty());

    // The name is free again once the runtime recovers.
    mock.clear_fail();
    Orchestrator::new(&ctx).create(&request("postgres", "devdb"))?;

    Ok(())
}

#[test]
fn test_runtime_name_clash_is_compensated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);

    let first = orchestrator.create(&request("redis", "cache"))?.container;
    // Forget the record while the runtime container lives on.
    ctx.store.delete_container(first.id)?;

    assert!(orchestrator.create(&request("redis", "cache")).is_err());
    assert!(mock.is_running(&first.container_id));
    assert!(ctx.store.list_all_containers()?.is_empty());

    Ok(())
}

#[test]
fn test_store_write_failure_discards_the_started_container() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let paths = DataPaths::new(dir.path());
    paths.ensure()?;
    let db_path = paths.database();
    let mock = Arc::new(MockRuntime::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
    ));
    let ctx = Context::new(
        mock.clone(),
        Store::open(&db_path)?,
        CredentialCipher::from_key(&[7u8; 32]),
        paths,
        clock,
    );

    // Another handle on the same file makes every container insert fail.
    let other = rusqlite::Connection::open(&db_path)?;
    other.execute_batch(
        "CREATE TRIGGER reject_inserts BEFORE INSERT ON containers \
         BEGIN SELECT RAISE(ABORT, 'disco cheio'); END;",
    )?;

    let mut req = request("postgres", "devdb");
    req.volume = VolumeRequest::Named;
    assert!(Orchestrator::new(&ctx).create(&req).is_err());

    let commands = mock.get_commands();
    let started = commands
        .iter()
        .position(|c| c.starts_with("start:"))
        .expect("container was started");
    let runtime_id = commands[started].trim_start_matches("start:").to_string();
    assert!(commands[started..].contains(&format!("remove:{runtime_id}")));
    assert!(!mock.has_container(&runtime_id));

    assert!(ctx.store.list_all_containers()?.is_empty());
    assert!(!ctx.paths.volumes().join("devdb").exists());
    assert!(!ctx.paths.container_config_dir("devdb").exists());

    Ok(())
}

#[test]
fn test_stop_failure_keeps_the_record_running() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);
    let container = orchestrator.create(&request("postgres", "devdb"))?.container;

    mock.set_fail_on("stop");
    assert!(orchestrator.stop("devdb").is_err());

    let stored = ctx.store.get_container(container.id)?.expect("record kept");
    assert_eq!(stored.container_id, container.container_id);
    assert_eq!(stored.status, container.status);

    Ok(())
}

#[test]
fn test_sweep_skips_when_not_interactive() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, clock) = test_context(dir.path());
    Orchestrator::new(&ctx).create(&request("redis", "cache"))?;
    clock.advance(Duration::hours(2));

    let before = mock.get_commands().len();
    let prompt = ScriptedPrompt::non_interactive();
    let report = ExpirationEngine::new(&ctx).sweep(&prompt)?;

    assert_eq!(report.expired_found, 1);
    assert!(report.skipped_non_interactive);
    assert!(report.is_noop());
    assert_eq!(prompt.asked(), 0);
    assert_eq!(mock.get_commands().len(), before);
    assert_eq!(ctx.store.list_containers()?.len(), 1);

    Ok(())
}

#[test]
fn test_sweep_reports_expired_then_deleted_even_with_runtime_failures() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);
    orchestrator.create(&request("redis", "a"))?;
    orchestrator.create(&request("redis", "b"))?;
    clock.advance(Duration::hours(2));

    mock.set_fail_on("remove");
    let prompt =
        ScriptedPrompt::interactive(vec![Disposition::Remove, Disposition::Remove]);
    let report = ExpirationEngine::new(&ctx).sweep(&prompt)?;

    assert_eq!(report.removed.len(), 2);
    assert!(report.failures.is_empty());
    assert_eq!(report.warnings.len(), 2);
    assert!(ctx.store.list_all_containers()?.is_empty());

    Ok(())
}

#[test]
fn test_redis_user_management_is_unsupported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());
    Orchestrator::new(&ctx).create(&request("redis", "cache"))?;
    let before = mock.get_commands().len();

    let users = UserService::new(&ctx);
    assert!(matches!(
        users.create_user("cache", "app"),
        Err(Error::Unsupported { .. })
    ));
    assert!(matches!(
        users.delete_user("cache", "app"),
        Err(Error::Unsupported { .. })
    ));
    assert!(matches!(
        users.rotate_password("cache", None),
        Err(Error::Unsupported { .. })
    ));
    assert_eq!(mock.get_commands().len(), before);

    Ok(())
}

#[test]
fn test_tampered_password_fails_only_the_credential_read() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, _mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);
    let container = orchestrator.create(&request("postgres", "devdb"))?.container;

    let user = ctx
        .store
        .get_default_user(container.id)?
        .expect("default user");
    let mut tampered = user.password_hash.clone();
    let last = tampered.pop().expect("non-empty hash");
    tampered.push(if last == '0' { '1' } else { '0' });
    ctx.store.update_user_password(user.id, &tampered)?;

    assert!(matches!(
        orchestrator.default_credentials(&container),
        Err(Error::Integrity(_))
    ));
    // Lifecycle operations that do not need the password still work.
    orchestrator.extend("devdb", 1)?;
    let kinds: Vec<EventKind> = ctx
        .store
        .list_events(container.id)?
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds, vec![EventKind::Created, EventKind::TtlExtended]);

    Ok(())
}
