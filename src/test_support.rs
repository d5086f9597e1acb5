use crate::credentials::CredentialCipher;
use crate::domain::{Container, ContainerRuntime, ContainerSpec};
use crate::infra::{DataPaths, Store};
use crate::services::{Clock, Context, Disposition, ExpiryPrompt};
use anyhow::{Result, bail};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
pub struct MockContainerSpec {
    pub image: String,
    pub ports: Vec<String>,
    pub env: Vec<String>,
    pub volumes: Vec<String>,
    pub labels: Vec<String>,
    pub command: Vec<String>,
    pub restart_policy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub name: String,
    pub running: bool,
    pub spec: MockContainerSpec,
}

/// In-memory runtime that records every call as `op:target`.
#[derive(Debug, Default)]
pub struct MockRuntime {
    containers: RwLock<HashMap<String, MockContainer>>,
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<Option<String>>,
    occupied_ports: RwLock<Vec<u16>>,
    volumes: RwLock<Vec<String>>,
    exec_output: RwLock<String>,
    next_id: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call of `operation` fail until cleared.
    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.write().unwrap() = Some(operation.to_string());
    }

    pub fn clear_fail(&self) {
        *self.fail_on.write().unwrap() = None;
    }

    /// Marks a host port as published by some container outside mkdb.
    pub fn occupy_port(&self, port: u16) {
        self.occupied_ports.write().unwrap().push(port);
    }

    pub fn add_volume(&self, name: &str) {
        self.volumes.write().unwrap().push(name.to_string());
    }

    pub fn volumes(&self) -> Vec<String> {
        self.volumes.read().unwrap().clone()
    }

    pub fn set_exec_output(&self, output: &str) {
        *self.exec_output.write().unwrap() = output.to_string();
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn has_container(&self, id: &str) -> bool {
        self.containers.read().unwrap().contains_key(id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.containers
            .read()
            .unwrap()
            .get(id)
            .is_some_and(|c| c.running)
    }

    /// Spec of the current container with this name.
    pub fn spec_of(&self, name: &str) -> Option<MockContainerSpec> {
        self.containers
            .read()
            .unwrap()
            .values()
            .find(|c| c.name == name)
            .map(|c| c.spec.clone())
    }

    fn record_command(&self, cmd: &str) {
        self.commands.write().unwrap().push(cmd.to_string());
    }

    fn check_fail(&self, operation: &str) -> Result<()> {
        if let Some(ref fail_on) = *self.fail_on.read().unwrap() {
            if fail_on == operation {
                bail!("Mock failure on: {}", operation);
            }
        }
        Ok(())
    }
}

impl ContainerRuntime for MockRuntime {
    fn pull_image(&self, image: &str) -> Result<()> {
        self.record_command(&format!("pull:{}", image));
        self.check_fail("pull")
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.record_command(&format!("create:{}", spec.name));
        self.check_fail("create")?;

        let mut containers = self.containers.write().unwrap();
        if containers.values().any(|c| c.name == spec.name) {
            bail!("name {} is already in use", spec.name);
        }

        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        containers.insert(
            id.clone(),
            MockContainer {
                name: spec.name.to_string(),
                running: false,
                spec: MockContainerSpec {
                    image: spec.image.to_string(),
                    ports: spec.ports.to_vec(),
                    env: spec.env.to_vec(),
                    volumes: spec.volumes.to_vec(),
                    labels: spec.labels.to_vec(),
                    command: spec.command.to_vec(),
                    restart_policy: spec.restart_policy.map(str::to_string),
                },
            },
        );
        Ok(id)
    }

    fn start_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("start:{}", id));
        self.check_fail("start")?;

        match self.containers.write().unwrap().get_mut(id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => bail!("no such container: {id}"),
        }
    }

    fn stop_container(&self, id: &str, _timeout: std::time::Duration) -> Result<()> {
        self.record_command(&format!("stop:{}", id));
        self.check_fail("stop")?;

        if let Some(container) = self.containers.write().unwrap().get_mut(id) {
            container.running = false;
        }
        Ok(())
    }

    fn remove_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("remove:{}", id));
        self.check_fail("remove")?;

        self.containers.write().unwrap().remove(id);
        Ok(())
    }

    fn restart_container(&self, id: &str, _timeout: std::time::Duration) -> Result<()> {
        self.record_command(&format!("restart:{}", id));
        self.check_fail("restart")?;

        match self.containers.write().unwrap().get_mut(id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => bail!("no such container: {id}"),
        }
    }

    fn container_exists(&self, id: &str) -> Result<bool> {
        self.record_command(&format!("exists:{}", id));
        self.check_fail("exists")?;
        Ok(self.has_container(id))
    }

    fn exec(&self, id: &str, cmd: &[String]) -> Result<String> {
        self.record_command(&format!("exec:{}:{}", id, cmd.join(" ")));
        self.check_fail("exec")?;

        if !self.is_running(id) {
            bail!("container {id} is not running");
        }
        Ok(self.exec_output.read().unwrap().clone())
    }

    fn published_ports(&self) -> Result<Vec<u16>> {
        self.record_command("ports");
        self.check_fail("ports")?;

        let mut ports = self.occupied_ports.read().unwrap().clone();
        for container in self.containers.read().unwrap().values() {
            if !container.running {
                continue;
            }
            ports.extend(
                container
                    .spec
                    .ports
                    .iter()
                    .filter_map(|p| p.split(':').next()?.parse::<u16>().ok()),
            );
        }
        Ok(ports)
    }

    fn list_volumes(&self, name_filter: &str) -> Result<Vec<String>> {
        self.record_command(&format!("list_volumes:{}", name_filter));
        self.check_fail("list_volumes")?;

        Ok(self
            .volumes
            .read()
            .unwrap()
            .iter()
            .filter(|v| v.contains(name_filter))
            .cloned()
            .collect())
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        self.record_command(&format!("remove_volume:{}", name));
        self.check_fail("remove_volume")?;

        self.volumes.write().unwrap().retain(|v| v != name);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.record_command("is_available");
        true
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(at),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write().unwrap() = at;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.write().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}

/// Prompt that answers with a fixed list of dispositions.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    interactive: bool,
    dispositions: Vec<Disposition>,
    asked: AtomicUsize,
}

impl ScriptedPrompt {
    pub fn interactive(dispositions: Vec<Disposition>) -> Self {
        Self {
            interactive: true,
            dispositions,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn non_interactive() -> Self {
        Self::default()
    }

    /// Number of times `decide` was called.
    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl ExpiryPrompt for ScriptedPrompt {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn decide(&self, _expired: &[Container], _now: DateTime<Utc>) -> io::Result<Vec<Disposition>> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.dispositions.clone())
    }
}

/// Context over `root` with a mock runtime, in-memory store, fixed key and a
/// manual clock set to 2026-01-01 12:00 UTC.
pub fn test_context(root: &Path) -> (Context, Arc<MockRuntime>, Arc<ManualClock>) {
    let paths = DataPaths::new(root);
    paths.ensure().unwrap();

    let mock = Arc::new(MockRuntime::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
    ));
    let ctx = Context::new(
        mock.clone(),
        Store::open_in_memory().unwrap(),
        CredentialCipher::from_key(&[42u8; 32]),
        paths,
        clock.clone(),
    );

    (ctx, mock, clock)
}
