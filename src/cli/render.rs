use crate::domain::DisplayStatus;
use crate::services::{
    ConnectionInfo, ContainerInfo, ContainerView, CreateOutcome, IssuedCredentials, RemoveReport,
    SweepReport,
};
use chrono::{DateTime, Utc};

pub fn created(outcome: &CreateOutcome) {
    let c = &outcome.container;
    if let Some(requested) = outcome.port_notice {
        println!("⚠️  Porta {requested} ocupada, usando {}", c.port);
    }

    println!("✅ {} ({}:{}) rodando na porta {}", c.display_name, c.db_type, c.version, c.port);
    match (&outcome.username, &outcome.password) {
        (Some(user), Some(password)) => {
            println!("   Usuário: {user}");
            println!("   Senha:   {password}");
        }
        _ => println!("   Sem autenticação"),
    }
    println!("   Conexão: {}", outcome.connection_string);
    println!("   Expira:  {}", timestamp(c.expires_at));
}

pub fn list(views: &[ContainerView], now: DateTime<Utc>) {
    if views.is_empty() {
        println!("Nenhum banco encontrado. Crie um com 'mkdb start'.");
        return;
    }

    println!(
        "{:<20} {:<9} {:<10} {:<6} {:<8} {:<12} {}",
        "NOME", "TIPO", "VERSÃO", "PORTA", "STATUS", "EXPIRA", "VOLUME"
    );
    for view in views {
        let port = view.port.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let expires = match (view.status, view.expires_at) {
            (DisplayStatus::Running, Some(at)) => remaining(at, now),
            (DisplayStatus::Expired, _) => "expirado".to_string(),
            _ => "-".to_string(),
        };
        let volume = match view.size_bytes {
            Some(size) => format!("{} ({})", view.volume, human_size(size)),
            None => view.volume.clone(),
        };

        println!(
            "{:<20} {:<9} {:<10} {:<6} {:<8} {:<12} {}",
            view.display_name,
            or_dash(&view.db_type),
            or_dash(&view.version),
            port,
            view.status,
            expires,
            volume
        );
    }
}

pub fn info(info: &ContainerInfo, now: DateTime<Utc>) {
    let c = &info.container;
    println!("📦 {} ({})", c.display_name, c.name);
    println!("   Tipo:      {}", c.db_type);
    match &info.live_version {
        Some(live) => println!("   Versão:    {} (servidor: {live})", c.version),
        None => println!("   Versão:    {}", c.version),
    }
    println!("   Porta:     {}", c.port);
    println!("   Status:    {}", info.status);
    println!("   Criado:    {}", timestamp(c.created_at));
    println!(
        "   Expira:    {} ({})",
        timestamp(c.expires_at),
        remaining(c.expires_at, now)
    );
    if let Some(path) = &info.volume_path {
        println!("   Volume:    {}", path.display());
    } else {
        println!("   Volume:    {}", c.volume_kind.as_str());
    }
    println!("   Config:    {}", info.config_file.display());

    println!("👥 Usuários:");
    for user in &info.users {
        let name = if user.username.is_empty() {
            "(sem autenticação)"
        } else {
            user.username.as_str()
        };
        let marker = if user.is_default { " (padrão)" } else { "" };
        println!("   - {name}{marker} desde {}", timestamp(user.created_at));
    }

    println!("📜 Histórico:");
    for event in &info.events {
        if event.details.is_empty() {
            println!("   {} {}", timestamp(event.timestamp), event.kind.as_str());
        } else {
            println!(
                "   {} {} ({})",
                timestamp(event.timestamp),
                event.kind.as_str(),
                event.details
            );
        }
    }
}

pub fn connection(info: &ConnectionInfo) {
    println!("🔌 {} ({})", info.display_name, info.db_type);
    println!("   Host:    {}:{}", info.host, info.port);
    if let Some(user) = &info.username {
        println!("   Usuário: {user}");
    }
    if let Some(password) = &info.password {
        println!("   Senha:   {password}");
    }
    println!("   Conexão: {}", info.connection_string);
}

pub fn issued(creds: &IssuedCredentials) {
    println!("   Usuário: {}", creds.username);
    println!("   Senha:   {}", creds.password);
    println!("   Conexão: {}", creds.connection_string);
}

pub fn removed(report: &RemoveReport) {
    let c = &report.container;
    if report.warnings.is_empty() {
        println!("✅ {} removido", c.display_name);
    } else {
        println!(
            "⚠️  {} removido com {} aviso(s)",
            c.display_name,
            report.warnings.len()
        );
    }

    if report.purged {
        println!("   Volume apagado");
    } else if !c.volume_ref.is_empty() {
        println!("   Volume mantido; restaure com 'mkdb restore --volume {}'", c.volume_ref);
    }
}

pub fn sweep(report: &SweepReport) {
    for (name, until) in &report.extended {
        println!("⏰ {name} estendido até {}", timestamp(*until));
    }
    for name in &report.removed {
        println!("🗑️  {name} removido");
    }
    for name in &report.kept {
        println!("⏳ {name} mantido (continua expirado)");
    }
    for (name, reason) in &report.failures {
        println!("❌ {name}: {reason}");
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn remaining(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let left = at - now;
    if left.num_seconds() <= 0 {
        return "expirado".to_string();
    }
    format!("{}h{:02}m", left.num_hours(), left.num_minutes() % 60)
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}
