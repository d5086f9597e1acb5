use crate::adapters::DatabaseAdapter;
use crate::credentials::{Credentials, USER_PASSWORD_LENGTH, generate_password};
use crate::domain::{Container, ContainerStatus, NewUser, User};
use crate::error::{Error, Result};
use crate::services::{Context, Orchestrator};
use std::sync::Arc;
use tracing::info;

const MAX_USERNAME_LEN: usize = 63;

/// Plaintext credentials handed back to the caller once.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub username: String,
    pub password: String,
    pub connection_string: String,
}

/// Database users inside running containers.
///
/// The runtime command runs first; the store is updated only after it
/// succeeds. A store failure at that point is still reported as a failure.
pub struct UserService<'a> {
    ctx: &'a Context,
}

impl<'a> UserService<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub fn create_user(&self, name: &str, username: &str) -> Result<IssuedCredentials> {
        let (container, adapter) = self.target(name)?;
        validate_username(username)?;

        let password = generate_password(USER_PASSWORD_LENGTH);
        let cmd = adapter
            .create_user_command(username, &password, &container.display_name)
            .ok_or_else(|| unsupported("criação de usuário", adapter.as_ref()))?;
        self.ensure_running(&container)?;

        if self.ctx.store.find_user(container.id, username)?.is_some() {
            return Err(Error::Conflict(format!(
                "usuário '{username}' já existe em {}",
                container.display_name
            )));
        }

        self.ctx
            .containers
            .exec(&container.container_id, &container.display_name, &cmd)?;

        let user = NewUser {
            username: username.to_string(),
            password_hash: self.ctx.cipher.encrypt(&password)?,
            is_default: false,
            created_at: self.ctx.now(),
        };
        self.ctx.store.insert_user(container.id, &user)?;
        info!("👤 Usuário {username} criado em {}", container.display_name);

        Ok(self.issued(&container, adapter.as_ref(), username, password))
    }

    pub fn delete_user(&self, name: &str, username: &str) -> Result<()> {
        let (container, adapter) = self.target(name)?;

        let cmd = adapter
            .delete_user_command(username, &container.display_name)
            .ok_or_else(|| unsupported("remoção de usuário", adapter.as_ref()))?;
        self.ensure_running(&container)?;

        let user = self.existing_user(&container, username)?;
        if user.is_default {
            return Err(Error::Validation(format!(
                "o usuário padrão '{username}' não pode ser removido"
            )));
        }

        self.ctx
            .containers
            .exec(&container.container_id, &container.display_name, &cmd)?;
        self.ctx.store.delete_user(user.id)?;
        info!("👤 Usuário {username} removido de {}", container.display_name);

        Ok(())
    }

    /// Rotates `username`, or the default user when `None`.
    pub fn rotate_password(&self, name: &str, username: Option<&str>) -> Result<IssuedCredentials> {
        let (container, adapter) = self.target(name)?;
        self.ensure_running(&container)?;

        let user = match username {
            Some(username) => self.existing_user(&container, username)?,
            None => self.ctx.store.get_default_user(container.id)?.ok_or_else(|| {
                Error::NotFound(format!("usuário padrão de {}", container.display_name))
            })?,
        };
        if user.is_unauthenticated() {
            return Err(Error::Validation(format!(
                "{} roda sem autenticação; não há senha para trocar",
                container.display_name
            )));
        }

        let password = generate_password(USER_PASSWORD_LENGTH);
        let cmd = adapter
            .rotate_password_command(&user.username, &password, &container.display_name)
            .ok_or_else(|| unsupported("troca de senha", adapter.as_ref()))?;

        self.ctx
            .containers
            .exec(&container.container_id, &container.display_name, &cmd)?;
        self.ctx
            .store
            .update_user_password(user.id, &self.ctx.cipher.encrypt(&password)?)?;
        info!("🔑 Senha de {} trocada em {}", user.username, container.display_name);

        Ok(self.issued(&container, adapter.as_ref(), &user.username, password))
    }

    fn target(&self, name: &str) -> Result<(Container, Arc<dyn DatabaseAdapter>)> {
        let container = Orchestrator::new(self.ctx).find(name)?;
        let adapter = self.ctx.registry.resolve(&container.db_type)?;
        Ok((container, adapter))
    }

    fn ensure_running(&self, container: &Container) -> Result<()> {
        if container.status != ContainerStatus::Running || !container.has_runtime_instance() {
            return Err(Error::Validation(format!(
                "{} não está rodando; use 'mkdb restart {}'",
                container.display_name, container.display_name
            )));
        }
        Ok(())
    }

    fn existing_user(&self, container: &Container, username: &str) -> Result<User> {
        self.ctx
            .store
            .find_user(container.id, username)?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "usuário '{username}' em {}",
                    container.display_name
                ))
            })
    }

    fn issued(
        &self,
        container: &Container,
        adapter: &dyn DatabaseAdapter,
        username: &str,
        password: String,
    ) -> IssuedCredentials {
        let creds = Credentials::new(username, password);
        let connection_string = adapter.connection_string(
            Some(&creds),
            &self.ctx.host,
            container.port,
            &container.display_name,
        );
        IssuedCredentials {
            username: creds.username,
            password: creds.password,
            connection_string,
        }
    }
}

fn unsupported(operation: &'static str, adapter: &dyn DatabaseAdapter) -> Error {
    Error::Unsupported {
        operation,
        db_type: adapter.name().to_string(),
    }
}

/// Usernames are spliced into SQL, so only plain identifiers are accepted.
pub fn validate_username(username: &str) -> Result<()> {
    let mut chars = username.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || username.len() > MAX_USERNAME_LEN {
        return Err(Error::Validation(format!(
            "usuário '{username}' inválido: use letras, números e '_', começando por letra"
        )));
    }
    Ok(())
}
