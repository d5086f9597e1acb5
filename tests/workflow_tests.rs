use anyhow::Result;
use chrono::Duration;
use mkdb::domain::{ContainerStatus, DisplayStatus, EventKind};
use mkdb::services::{
    CreateRequest, Disposition, ExpirationEngine, Inventory, ListFilter, Orchestrator,
    RestoreRequest, VolumeRequest,
};
use mkdb::test_support::{ScriptedPrompt, test_context};
use std::fs;

fn request(db_type: &str, name: &str, ttl_hours: i64) -> CreateRequest {
    CreateRequest {
        db_type: db_type.to_string(),
        display_name: name.to_string(),
        version: None,
        port: None,
        volume: VolumeRequest::Named,
        ttl_hours,
        no_auth: false,
    }
}

#[test]
fn test_postgres_lifecycle_until_expiration() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);
    let created_at = ctx.now();

    // 1. Create
    let outcome = orchestrator.create(&request("postgres", "devdb", 2))?;
    let container = outcome.container.clone();
    mock.add_volume("devdb");

    assert_eq!(container.status, ContainerStatus::Running);
    assert_eq!(container.port, 5432);
    assert_eq!(container.expires_at, created_at + Duration::hours(2));
    assert_eq!(outcome.username.as_deref(), Some("dbuser"));
    assert_eq!(outcome.password.as_ref().map(String::len), Some(12));
    assert!(
        outcome
            .connection_string
            .starts_with("postgresql://dbuser:")
    );
    assert!(mock.is_running(&container.container_id));

    let spec = mock.spec_of("mkdb-devdb").expect("runtime container");
    assert_eq!(spec.image, "postgres:18");
    assert_eq!(spec.ports, vec!["5432:5432".to_string()]);
    assert!(spec.env.iter().any(|e| e == "POSTGRES_DB=devdb"));
    assert_eq!(spec.restart_policy.as_deref(), Some("unless-stopped"));

    // 2. Still fresh after an hour
    clock.advance(Duration::hours(1));
    assert!(ExpirationEngine::new(&ctx).expired()?.is_empty());

    // 3. Past due at T+3h
    clock.advance(Duration::hours(2));
    let expired = ExpirationEngine::new(&ctx).expired()?;
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].display_name, "devdb");

    let views = Inventory::new(&ctx).list(&ListFilter::default())?;
    assert_eq!(views[0].status, DisplayStatus::Expired);

    // 4. Confirm removal
    let prompt = ScriptedPrompt::interactive(vec![Disposition::Remove]);
    let report = ExpirationEngine::new(&ctx).sweep(&prompt)?;

    assert_eq!(report.removed, vec!["devdb".to_string()]);
    assert!(report.failures.is_empty());
    assert!(ctx.store.get_container(container.id)?.is_none());
    assert!(ctx.store.list_events(container.id)?.is_empty());
    assert!(!mock.has_container(&container.container_id));
    assert!(mock.volumes().is_empty());

    let commands = mock.get_commands();
    let stop = commands
        .iter()
        .position(|c| *c == format!("stop:{}", container.container_id))
        .expect("stop issued");
    let remove = commands
        .iter()
        .position(|c| *c == format!("remove:{}", container.container_id))
        .expect("remove issued");
    assert!(stop < remove);
    assert!(commands.contains(&"remove_volume:devdb".to_string()));

    Ok(())
}

#[test]
fn test_extend_then_stop_and_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);

    let created = orchestrator.create(&request("mysql", "shop", 2))?.container;
    let extended = orchestrator.extend("shop", 3)?;
    assert_eq!(extended.expires_at, created.expires_at + Duration::hours(3));

    // Overdue extension counts from now.
    clock.advance(Duration::hours(10));
    let extended = orchestrator.extend("shop", 1)?;
    assert_eq!(extended.expires_at, ctx.now() + Duration::hours(1));

    let stopped = orchestrator.stop("shop")?;
    assert_eq!(stopped.status, ContainerStatus::Stopped);
    assert!(stopped.container_id.is_empty());
    assert!(!mock.has_container(&created.container_id));

    // Stopped records never show up as expired.
    clock.advance(Duration::hours(5));
    assert!(ExpirationEngine::new(&ctx).expired()?.is_empty());

    let restarted = orchestrator.restart("shop")?;
    assert_eq!(restarted.status, ContainerStatus::Running);
    assert!(mock.is_running(&restarted.container_id));
    assert_eq!(restarted.port, created.port);

    let kinds: Vec<EventKind> = ctx
        .store
        .list_events(created.id)?
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Created,
            EventKind::TtlExtended,
            EventKind::TtlExtended,
            EventKind::Stopped,
            EventKind::Restarted,
        ]
    );

    Ok(())
}

#[test]
fn test_duplicate_name_is_rejected_without_side_effects() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);

    orchestrator.create(&request("postgres", "devdb", 2))?;
    let before = mock.get_commands().len();

    let err = orchestrator
        .create(&request("redis", "devdb", 2))
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(mock.get_commands().len(), before);
    assert_eq!(ctx.store.list_containers()?.len(), 1);

    Ok(())
}

#[test]
fn test_busy_default_port_is_substituted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);

    mock.occupy_port(6379);
    let outcome = orchestrator.create(&request("redis", "cache", 2))?;
    assert_eq!(outcome.container.port, 6380);
    assert_eq!(outcome.port_notice, Some(6379));

    // A second instance skips the port the first one took.
    let second = orchestrator.create(&request("redis", "cache2", 2))?;
    assert_eq!(second.container.port, 6381);

    // An explicit busy port is an error, not a substitution.
    let mut explicit = request("redis", "cache3", 2);
    explicit.port = Some(6380);
    assert!(orchestrator.create(&explicit).unwrap_err().is_conflict());

    Ok(())
}

#[test]
fn test_unauthenticated_database() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);

    let mut req = request("postgres", "open", 2);
    req.no_auth = true;
    let outcome = orchestrator.create(&req)?;

    assert!(outcome.username.is_none());
    assert!(outcome.password.is_none());
    assert_eq!(outcome.connection_string, "postgresql://localhost:5432/open");

    let spec = mock.spec_of("mkdb-open").expect("runtime container");
    assert!(spec.env.iter().any(|e| e == "POSTGRES_HOST_AUTH_METHOD=trust"));

    let user = ctx
        .store
        .get_default_user(outcome.container.id)?
        .expect("default user row");
    assert!(user.username.is_empty());
    assert!(user.password_hash.is_empty());
    assert!(orchestrator.default_credentials(&outcome.container)?.is_none());

    Ok(())
}

#[test]
fn test_removed_volume_can_be_restored() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);

    let mut req = request("postgres", "legacy", 2);
    req.version = Some("16".to_string());
    orchestrator.create(&req)?;
    fs::write(ctx.paths.volumes().join("legacy").join("PG_VERSION"), "16")?;

    let report = orchestrator.remove("legacy", false)?;
    assert!(!report.purged);

    let inventory = Inventory::new(&ctx);
    let orphans = inventory.orphans()?;
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].name, "legacy");
    assert!(orphans[0].size_bytes > 0);

    let removed = inventory.list(&ListFilter {
        include_removed: true,
        ..Default::default()
    })?;
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].status, DisplayStatus::Removed);

    // Without history the type must be given explicitly.
    let outcome = orchestrator.restore(&RestoreRequest {
        volume_name: "legacy".to_string(),
        db_type: Some("pg".to_string()),
        version: Some("16".to_string()),
        port: None,
        ttl_hours: 2,
    })?;

    assert_eq!(outcome.container.db_type, "postgres");
    assert_eq!(outcome.password.as_deref(), Some("$uper$ecret"));
    let spec = mock.spec_of("mkdb-legacy").expect("runtime container");
    assert_eq!(spec.image, "postgres:16");
    assert!(spec.volumes.iter().any(|v| v.ends_with(":/var/lib/postgresql")));
    assert!(inventory.orphans()?.is_empty());

    let kinds: Vec<EventKind> = ctx
        .store
        .list_events(outcome.container.id)?
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds, vec![EventKind::Restored]);

    Ok(())
}

#[test]
fn test_purge_deletes_volume_directory() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, _mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);

    orchestrator.create(&request("redis", "scratch", 2))?;
    let volume = ctx.paths.volumes().join("scratch");
    assert!(volume.is_dir());

    let report = orchestrator.remove("scratch", true)?;
    assert!(report.purged);
    assert!(!volume.exists());
    assert!(!ctx.paths.container_config_dir("scratch").exists());
    assert!(Inventory::new(&ctx).orphans()?.is_empty());

    Ok(())
}

#[test]
fn test_remove_cascades_to_users_and_events() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (ctx, _mock, _clock) = test_context(dir.path());
    let orchestrator = Orchestrator::new(&ctx);

    let container = orchestrator.create(&request("postgres", "devdb", 2))?.container;
    mkdb::UserService::new(&ctx).create_user("devdb", "app")?;
    assert_eq!(ctx.store.list_users(container.id)?.len(), 2);

    orchestrator.remove("devdb", false)?;
    assert!(ctx.store.list_users(container.id)?.is_empty());
    assert!(ctx.store.list_events(container.id)?.is_empty());
    assert!(ctx.store.get_container_by_display_name("devdb")?.is_none());

    Ok(())
}
