use crate::domain::{ContainerRuntime, ContainerSpec};
use anyhow::{Context, Result, bail};
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_BINARY: &str = "podman";

const EXEC_TIMEOUT: Duration = Duration::from_secs(30);
const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runtime gateway driving the `podman` CLI, or any docker-compatible binary.
#[derive(Debug, Clone)]
pub struct PodmanAdapter {
    binary: String,
    exec_timeout: Duration,
}

impl PodmanAdapter {
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_BINARY)
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            exec_timeout: EXEC_TIMEOUT,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Runs the binary and returns trimmed stdout; non-zero exit is an error
    /// carrying stderr.
    fn run<I, S>(&self, args: I, context: &str) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.output(args, context)?;
        ensure_success(&self.binary, output.status, &output.stderr, context)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn output<I, S>(&self, args: I, context: &str) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args
            .into_iter()
            .map(|item| item.as_ref().to_os_string())
            .collect();
        debug!("{} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("{context} (executando {})", self.binary))
    }

    fn status<I, S>(&self, args: I, context: &str) -> Result<ExitStatus>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(&self.binary)
            .args(args.into_iter().map(|item| item.as_ref().to_os_string()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| context.to_string())
    }
}

impl Default for PodmanAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for PodmanAdapter {
    fn pull_image(&self, image: &str) -> Result<()> {
        let present = self
            .status(["image", "inspect", image], &format!("checando imagem {image}"))?
            .success();
        if present {
            debug!("Imagem {image} já presente, pulando pull");
            return Ok(());
        }

        self.run(["pull", image], &format!("baixando imagem {image}"))
            .map(|_| ())
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut args: Vec<String> = vec!["create".into(), "--name".into(), spec.name.into()];

        if let Some(policy) = spec.restart_policy {
            args.push("--restart".into());
            args.push(policy.into());
        }

        for label in spec.labels {
            args.push("--label".into());
            args.push(label.clone());
        }

        for port in spec.ports {
            args.push("-p".into());
            args.push(port.clone());
        }

        for env in spec.env {
            args.push("-e".into());
            args.push(env.clone());
        }

        for volume in spec.volumes {
            args.push("-v".into());
            args.push(volume.clone());
        }

        args.push(spec.image.into());
        args.extend(spec.command.iter().cloned());

        let id = self.run(args, &format!("criando container {}", spec.name))?;
        if id.is_empty() {
            bail!("{} não retornou o id do container {}", self.binary, spec.name);
        }
        Ok(id)
    }

    fn start_container(&self, id: &str) -> Result<()> {
        self.run(["start", id], &format!("iniciando container {id}"))
            .map(|_| ())
    }

    fn stop_container(&self, id: &str, timeout: Duration) -> Result<()> {
        let secs = timeout.as_secs().to_string();
        self.run(["stop", "-t", secs.as_str(), id], &format!("parando container {id}"))
            .map(|_| ())
    }

    fn remove_container(&self, id: &str) -> Result<()> {
        self.run(["rm", "-f", id], &format!("removendo container {id}"))
            .map(|_| ())
    }

    fn restart_container(&self, id: &str, timeout: Duration) -> Result<()> {
        let secs = timeout.as_secs().to_string();
        self.run(
            ["restart", "-t", secs.as_str(), id],
            &format!("reiniciando container {id}"),
        )
        .map(|_| ())
    }

    fn container_exists(&self, id: &str) -> Result<bool> {
        Ok(self
            .status(
                ["container", "inspect", id],
                &format!("checando existência do container {id}"),
            )?
            .success())
    }

    fn exec(&self, id: &str, cmd: &[String]) -> Result<String> {
        let context = format!("executando {:?} em {id}", cmd.first());
        let mut child = Command::new(&self.binary)
            .arg("exec")
            .arg(id)
            .args(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| context.clone())?;

        // Drain both pipes while polling so a chatty command cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.exec_timeout;
        let status = loop {
            if let Some(status) = child.try_wait().with_context(|| context.clone())? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                bail!(
                    "{context}: sem resposta após {}s",
                    self.exec_timeout.as_secs()
                );
            }
            thread::sleep(EXEC_POLL_INTERVAL);
        };

        let mut combined = stdout.join().unwrap_or_default();
        combined.push_str(&stderr.join().unwrap_or_default());

        if !status.success() {
            bail!("{context}: status {status}: {}", combined.trim());
        }
        Ok(combined)
    }

    fn published_ports(&self) -> Result<Vec<u16>> {
        let out = self.run(
            ["ps", "--format", "{{.Ports}}"],
            "listando portas publicadas",
        )?;
        Ok(parse_published_ports(&out))
    }

    fn list_volumes(&self, name_filter: &str) -> Result<Vec<String>> {
        let filter = format!("name={name_filter}");
        let out = self.run(
            ["volume", "ls", "--filter", filter.as_str(), "--format", "{{.Name}}"],
            &format!("listando volumes {name_filter}"),
        )?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        self.run(["volume", "rm", "-f", name], &format!("removendo volume {name}"))
            .map(|_| ())
    }

    fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Host ports from `ps --format {{.Ports}}` output.
///
/// Entries look like `0.0.0.0:5432->5432/tcp, :::5432->5432/tcp` or, for
/// ranges, `0.0.0.0:8000-8002->8000-8002/tcp`.
fn parse_published_ports(output: &str) -> Vec<u16> {
    let mut ports = Vec::new();

    for entry in output.lines().flat_map(|line| line.split(',')) {
        let Some((host, _)) = entry.trim().split_once("->") else {
            continue;
        };
        let host_ports = host.rsplit(':').next().unwrap_or(host);

        match host_ports.split_once('-') {
            Some((start, end)) => {
                if let (Ok(start), Ok(end)) = (start.parse::<u16>(), end.parse::<u16>()) {
                    ports.extend(start..=end);
                }
            }
            None => {
                if let Ok(port) = host_ports.parse::<u16>() {
                    ports.push(port);
                }
            }
        }
    }

    ports.sort_unstable();
    ports.dedup();
    ports
}

fn ensure_success(binary: &str, status: ExitStatus, stderr: &[u8], context: &str) -> Result<()> {
    if status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(stderr);
    bail!(
        "{binary} retornou status {:?} ({context}): {}",
        status.code(),
        stderr.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docker_style_port_listing() {
        let out = "0.0.0.0:5432->5432/tcp, :::5432->5432/tcp\n\n0.0.0.0:6380->6379/tcp\n";
        assert_eq!(parse_published_ports(out), vec![5432, 6380]);
    }

    #[test]
    fn parses_port_ranges_and_skips_unpublished() {
        let out = "0.0.0.0:8000-8002->8000-8002/tcp\n5432/tcp\n";
        assert_eq!(parse_published_ports(out), vec![8000, 8001, 8002]);
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let adapter = PodmanAdapter::with_binary("mkdb-definitely-not-a-runtime");
        assert!(!adapter.is_available());
        assert!(adapter.published_ports().is_err());
    }
}
