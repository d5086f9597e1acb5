use crate::domain::Container;
use crate::services::{Disposition, ExpiryPrompt};
use chrono::{DateTime, Utc};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use std::io::{self, IsTerminal};

const CHOICES: [&str; 3] = ["Estender", "Remover", "Manter"];

/// Asks on the terminal; never interactive when stdin is piped.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    /// Lets the user pick one of `names` when no `--name` was given.
    pub fn select(&self, prompt: &str, names: &[String]) -> io::Result<Option<String>> {
        if names.is_empty() || !self.is_interactive() {
            return Ok(None);
        }

        let index = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(names)
            .default(0)
            .interact_opt()
            .map_err(to_io)?;

        Ok(index.map(|i| names[i].clone()))
    }

    fn ask_hours(&self, name: &str) -> io::Result<i64> {
        let hours: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Quantas horas a mais para {name}?"))
            .default("1".to_string())
            .validate_with(|input: &String| -> Result<(), &str> {
                match input.trim().parse::<i64>() {
                    Ok(h) if h >= 1 => Ok(()),
                    _ => Err("Informe um número inteiro de horas (>= 1)"),
                }
            })
            .interact_text()
            .map_err(to_io)?;

        hours
            .trim()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}

impl ExpiryPrompt for TerminalPrompt {
    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal()
    }

    fn decide(&self, expired: &[Container], now: DateTime<Utc>) -> io::Result<Vec<Disposition>> {
        let mut dispositions = Vec::with_capacity(expired.len());

        for container in expired {
            let overdue = now - container.expires_at;
            let prompt = format!(
                "{} ({}) expirou há {}h{:02}m. O que fazer?",
                container.display_name,
                container.db_type,
                overdue.num_hours(),
                overdue.num_minutes() % 60
            );

            let choice = Select::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .items(&CHOICES)
                .default(2)
                .interact_opt()
                .map_err(to_io)?;

            let disposition = match choice {
                Some(0) => Disposition::Extend {
                    hours: self.ask_hours(&container.display_name)?,
                },
                Some(1) => Disposition::Remove,
                _ => Disposition::Keep,
            };
            dispositions.push(disposition);
        }

        Ok(dispositions)
    }
}

fn to_io(err: dialoguer::Error) -> io::Error {
    io::Error::other(err.to_string())
}
