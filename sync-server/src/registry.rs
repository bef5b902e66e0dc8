//! Resource and user registry.
//!
//! Built in one go from the configured lists and never mutated afterwards.
//! Reloading builds a new registry and swaps it in.

use crate::error::AppError;
use crate::models::resource::Resource;
use crate::models::user::User;
use std::collections::{HashMap, HashSet};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("resource '{0}' is defined more than once")]
    DuplicateResource(String),

    #[error("user '{0}' is defined more than once")]
    DuplicateLogin(String),

    #[error("user '{0}' reuses another user's token")]
    DuplicateToken(String),
}

#[derive(Debug, Default)]
pub struct Registry {
    resources: HashMap<String, Resource>,
    users_by_token: HashMap<String, User>,
}

impl Registry {
    pub fn build(resources: Vec<Resource>, users: Vec<User>) -> Result<Self, RegistryError> {
        let mut by_name = HashMap::with_capacity(resources.len());
        for resource in resources {
            if by_name.contains_key(&resource.name) {
                return Err(RegistryError::DuplicateResource(resource.name));
            }
            by_name.insert(resource.name.clone(), resource);
        }

        let mut logins = HashSet::with_capacity(users.len());
        let mut by_token = HashMap::with_capacity(users.len());
        for user in users {
            if !logins.insert(user.login.clone()) {
                return Err(RegistryError::DuplicateLogin(user.login));
            }
            if by_token.contains_key(&user.token) {
                return Err(RegistryError::DuplicateToken(user.login));
            }
            for name in &user.allowed_resources {
                if !by_name.contains_key(name) {
                    tracing::warn!(login = %user.login, resource = %name, "User is granted an unknown resource");
                }
            }
            by_token.insert(user.token.clone(), user);
        }

        Ok(Self {
            resources: by_name,
            users_by_token: by_token,
        })
    }

    pub fn resource_by_name(&self, name: &str) -> Result<&Resource, AppError> {
        self.resources
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("Unknown resource: {}", name)))
    }

    pub fn user_by_token(&self, token: &str) -> Result<&User, AppError> {
        self.users_by_token.get(token).ok_or(AppError::Unauthorized)
    }

    pub fn is_authorized(&self, user: &User, resource_name: &str) -> bool {
        user.may_access(resource_name) && self.resources.contains_key(resource_name)
    }

    /// Resolve `resource_name` for the holder of `token`. Every failure is the
    /// same `Unauthorized`, so callers cannot probe which resources exist.
    pub fn authorize(&self, token: &str, resource_name: &str) -> Result<&Resource, AppError> {
        let user = self.user_by_token(token)?;
        if !self.is_authorized(user, resource_name) {
            return Err(AppError::Unauthorized);
        }
        self.resource_by_name(resource_name)
            .map_err(|_| AppError::Unauthorized)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}
