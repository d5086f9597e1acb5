use crate::domain::{Container, EventKind};
use crate::error::{Error, Result};
use crate::services::{Context, Orchestrator};
use chrono::{DateTime, Utc};
use std::io;
use tracing::{debug, error, info};

/// What to do with one expired container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Extend { hours: i64 },
    Remove,
    Keep,
}

/// Asks the user what to do with expired containers.
pub trait ExpiryPrompt {
    fn is_interactive(&self) -> bool;

    /// One disposition per container, in order. Missing entries mean `Keep`.
    fn decide(&self, expired: &[Container], now: DateTime<Utc>) -> io::Result<Vec<Disposition>>;
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub expired_found: usize,
    /// Expired records were left alone because nobody could be asked
    pub skipped_non_interactive: bool,
    pub extended: Vec<(String, DateTime<Utc>)>,
    pub removed: Vec<String>,
    pub kept: Vec<String>,
    /// Per-container failures; the sweep carries on past them
    pub failures: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

impl SweepReport {
    pub fn is_noop(&self) -> bool {
        self.expired_found == 0 || self.skipped_non_interactive
    }
}

/// Cooperative TTL sweep run at the start of each command.
pub struct ExpirationEngine<'a> {
    ctx: &'a Context,
}

impl<'a> ExpirationEngine<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub fn expired(&self) -> Result<Vec<Container>> {
        self.ctx.store.get_expired(self.ctx.now())
    }

    pub fn sweep(&self, prompt: &dyn ExpiryPrompt) -> Result<SweepReport> {
        let expired = self.expired()?;
        let mut report = SweepReport {
            expired_found: expired.len(),
            ..Default::default()
        };

        if expired.is_empty() {
            return Ok(report);
        }

        info!("⏳ {} banco(s) expirado(s)", expired.len());

        if !prompt.is_interactive() {
            debug!("Terminal não interativo, pulando a limpeza de expirados");
            report.skipped_non_interactive = true;
            return Ok(report);
        }

        let decisions = prompt
            .decide(&expired, self.ctx.now())
            .map_err(|e| Error::io("lendo decisões sobre bancos expirados", e))?;

        let orchestrator = Orchestrator::new(self.ctx);
        for (i, container) in expired.into_iter().enumerate() {
            let decision = decisions.get(i).copied().unwrap_or(Disposition::Keep);
            let name = container.display_name.clone();

            match decision {
                Disposition::Keep => report.kept.push(name),
                Disposition::Extend { hours } => match orchestrator.extend_record(container, hours) {
                    Ok(updated) => report.extended.push((name, updated.expires_at)),
                    Err(e) => {
                        error!("❌ Falha ao estender {name}: {e}");
                        report.failures.push((name, e.to_string()));
                    }
                },
                Disposition::Remove => {
                    match orchestrator.retire(&container, false, Some(EventKind::Expired)) {
                        Ok(removed) => {
                            report.warnings.extend(removed.warnings);
                            report.removed.push(name);
                        }
                        Err(e) => {
                            error!("❌ Falha ao remover {name}: {e}");
                            report.failures.push((name, e.to_string()));
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}
