use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::ports::UserRepository;
use crate::user::errors::UserError;

/// Process-local user store.
///
/// Enforces email uniqueness under the write lock, mirroring the unique
/// constraint of the Postgres schema. Ids start at 1.
#[derive(Default)]
pub struct InMemoryUserRepository {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    last_id: i64,
    users: HashMap<UserId, User>,
    by_email: HashMap<EmailAddress, UserId>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, UserError> {
        let mut state = self.state.write().await;

        if state.by_email.contains_key(&user.email) {
            return Err(UserError::EmailAlreadyExists(user.email.to_string()));
        }

        state.last_id += 1;
        let user = user.with_id(UserId(state.last_id));

        state.by_email.insert(user.email.clone(), user.id);
        state.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, UserError> {
        let state = self.state.read().await;

        Ok(state
            .by_email
            .get(email)
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, UserError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }
}
