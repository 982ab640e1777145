use std::sync::Arc;

use async_trait::async_trait;
use auth::AuthenticationError;
use auth::Authenticator;
use auth::Claims;
use chrono::Duration;
use chrono::Utc;

use crate::domain::user::models::LoginCommand;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::SignUpCommand;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::user::errors::UserError;
use crate::user::ports::AuthServicePort;
use crate::user::ports::UserRepository;

/// Domain service implementation for credential operations.
///
/// Concrete implementation of AuthServicePort with dependency injection.
pub struct AuthService<UR>
where
    UR: UserRepository,
{
    repository: Arc<UR>,
    authenticator: Arc<Authenticator>,
    token_ttl: Duration,
}

impl<UR> AuthService<UR>
where
    UR: UserRepository,
{
    /// Create a new auth service with injected dependencies.
    ///
    /// # Arguments
    /// * `repository` - User persistence implementation
    /// * `authenticator` - Hasher and token codec sharing the configured secret
    /// * `token_ttl` - Lifetime of issued access tokens
    pub fn new(
        repository: Arc<UR>,
        authenticator: Arc<Authenticator>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            authenticator,
            token_ttl,
        }
    }
}

#[async_trait]
impl<UR> AuthServicePort for AuthService<UR>
where
    UR: UserRepository,
{
    async fn sign_up(&self, command: SignUpCommand) -> Result<User, UserError> {
        // Fast path for a clear error; the store's unique constraint is the real guard.
        if self.repository.find_by_email(&command.email).await?.is_some() {
            tracing::debug!(email = %command.email, "Sign-up rejected, email already registered");
            return Err(UserError::EmailAlreadyExists(command.email.to_string()));
        }

        let password_hash = self
            .authenticator
            .hash_password(command.password.as_str())?;

        let now = Utc::now();
        let new_user = NewUser {
            username: command.username,
            email: command.email,
            password_hash,
            created_at: now,
            updated_at: now,
        };

        let user = self.repository.create(new_user).await?;
        tracing::info!(user_id = %user.id, "User signed up");

        Ok(user)
    }

    async fn login(&self, command: LoginCommand) -> Result<String, UserError> {
        let user = match self.repository.find_by_email(&command.email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::debug!("Login failed, unknown email");
                self.authenticator
                    .verify_unknown_user(command.password.as_str());
                return Err(UserError::InvalidCredentials);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Login failed, user lookup error");
                self.authenticator
                    .verify_unknown_user(command.password.as_str());
                return Err(UserError::InvalidCredentials);
            }
        };

        let claims = Claims::for_user(user.id, user.email.as_str(), self.token_ttl);

        let result = self
            .authenticator
            .authenticate(command.password.as_str(), &user.password_hash, &claims)
            .map_err(|e| match e {
                AuthenticationError::InvalidCredentials => {
                    tracing::debug!(user_id = %user.id, "Login failed, wrong password");
                    UserError::InvalidCredentials
                }
                AuthenticationError::JwtError(err) => UserError::Token(err),
            })?;

        tracing::info!(user_id = %user.id, "User logged in");

        Ok(result.access_token)
    }

    async fn get_user(&self, id: UserId) -> Result<User, UserError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(UserError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use mockall::mock;

    use super::*;
    use crate::domain::user::models::EmailAddress;
    use crate::domain::user::models::Password;
    use crate::domain::user::models::Username;

    const SECRET: &[u8] = b"test-secret-key-for-jwt-signing-at-least-32-bytes";

    mock! {
        pub TestUserRepository {}

        #[async_trait]
        impl UserRepository for TestUserRepository {
            async fn create(&self, user: NewUser) -> Result<User, UserError>;
            async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, UserError>;
            async fn find_by_id(&self, id: UserId) -> Result<Option<User>, UserError>;
        }
    }

    fn authenticator() -> Arc<Authenticator> {
        let hasher = auth::PasswordHasher::with_params(8 * 1024, 1, 1).unwrap();
        Arc::new(Authenticator::new(SECRET, hasher).unwrap())
    }

    fn service(repository: MockTestUserRepository) -> AuthService<MockTestUserRepository> {
        AuthService::new(Arc::new(repository), authenticator(), Duration::hours(24))
    }

    fn stored_user(id: i64, email: &str, password: &str) -> User {
        let now = Utc::now();
        User {
            id: UserId(id),
            username: Username::new("alice".to_string()).unwrap(),
            email: EmailAddress::new(email.to_string()).unwrap(),
            password_hash: authenticator().hash_password(password).unwrap(),
            created_at: now,
            updated_at: now,
        }
    }

    fn sign_up_command(email: &str) -> SignUpCommand {
        SignUpCommand::new(
            Username::new("alice".to_string()).unwrap(),
            EmailAddress::new(email.to_string()).unwrap(),
            Password::new("pw123".to_string()).unwrap(),
        )
    }

    fn login_command(email: &str, password: &str) -> LoginCommand {
        LoginCommand::new(
            EmailAddress::new(email.to_string()).unwrap(),
            Password::new(password.to_string()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_sign_up_success() {
        let mut repository = MockTestUserRepository::new();

        repository
            .expect_find_by_email()
            .times(1)
            .returning(|_| Ok(None));
        repository
            .expect_create()
            .withf(|user| {
                user.username.as_str() == "alice"
                    && user.email.as_str() == "a@x.com"
                    && user.password_hash.starts_with("$argon2id$")
                    && user.created_at == user.updated_at
            })
            .times(1)
            .returning(|user| Ok(user.with_id(UserId(1))));

        let user = service(repository)
            .sign_up(sign_up_command("a@x.com"))
            .await
            .expect("Sign-up failed");

        assert_eq!(user.id, UserId(1));
        assert_eq!(user.email.as_str(), "a@x.com");
        assert!(authenticator()
            .authenticate(
                "pw123",
                &user.password_hash,
                &Claims::for_user(1, "a@x.com", Duration::hours(1))
            )
            .is_ok());
    }

    #[tokio::test]
    async fn test_sign_up_existing_email_does_not_write() {
        let mut repository = MockTestUserRepository::new();

        repository
            .expect_find_by_email()
            .times(1)
            .returning(|_| Ok(Some(stored_user(1, "a@x.com", "pw123"))));
        repository.expect_create().times(0);

        let result = service(repository)
            .sign_up(sign_up_command("a@x.com"))
            .await;

        assert!(matches!(result, Err(UserError::EmailAlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_sign_up_storage_conflict_is_email_exists() {
        let mut repository = MockTestUserRepository::new();

        // Another sign-up won the race between pre-check and insert.
        repository
            .expect_find_by_email()
            .times(1)
            .returning(|_| Ok(None));
        repository
            .expect_create()
            .times(1)
            .returning(|user| Err(UserError::EmailAlreadyExists(user.email.to_string())));

        let result = service(repository)
            .sign_up(sign_up_command("a@x.com"))
            .await;

        assert!(matches!(result, Err(UserError::EmailAlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_sign_up_lookup_failure_is_surfaced() {
        let mut repository = MockTestUserRepository::new();

        repository
            .expect_find_by_email()
            .times(1)
            .returning(|_| Err(UserError::DatabaseError("connection refused".to_string())));
        repository.expect_create().times(0);

        let result = service(repository)
            .sign_up(sign_up_command("a@x.com"))
            .await;

        assert!(matches!(result, Err(UserError::DatabaseError(_))));
    }

    #[tokio::test]
    async fn test_login_success_issues_token() {
        let mut repository = MockTestUserRepository::new();

        repository
            .expect_find_by_email()
            .times(1)
            .returning(|_| Ok(Some(stored_user(7, "a@x.com", "pw123"))));

        let token = service(repository)
            .login(login_command("a@x.com", "pw123"))
            .await
            .expect("Login failed");

        let claims = authenticator()
            .validate_token(&token)
            .expect("Token validation failed");
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_unknown_email_are_identical() {
        let mut known = MockTestUserRepository::new();
        known
            .expect_find_by_email()
            .returning(|_| Ok(Some(stored_user(7, "a@x.com", "pw123"))));

        let mut unknown = MockTestUserRepository::new();
        unknown.expect_find_by_email().returning(|_| Ok(None));

        let wrong_password = service(known)
            .login(login_command("a@x.com", "nope"))
            .await
            .unwrap_err();
        let no_such_user = service(unknown)
            .login(login_command("b@x.com", "pw123"))
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, UserError::InvalidCredentials));
        assert!(matches!(no_such_user, UserError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), no_such_user.to_string());
    }

    #[tokio::test]
    async fn test_login_unknown_email_still_verifies_a_password() {
        // A work factor heavy enough that skipping the hash is obvious.
        let hasher = auth::PasswordHasher::with_params(32 * 1024, 3, 1).unwrap();
        let authenticator = Arc::new(Authenticator::new(SECRET, hasher).unwrap());
        let stored_hash = authenticator.hash_password("pw123").unwrap();

        let mut known = MockTestUserRepository::new();
        known.expect_find_by_email().returning(move |_| {
            let mut user = stored_user(7, "a@x.com", "unused");
            user.password_hash = stored_hash.clone();
            Ok(Some(user))
        });
        let mut unknown = MockTestUserRepository::new();
        unknown.expect_find_by_email().returning(|_| Ok(None));

        let known = AuthService::new(Arc::new(known), authenticator.clone(), Duration::hours(1));
        let unknown = AuthService::new(Arc::new(unknown), authenticator, Duration::hours(1));

        let started = std::time::Instant::now();
        let result = known.login(login_command("a@x.com", "nope")).await;
        let wrong_password = started.elapsed();
        assert!(matches!(result, Err(UserError::InvalidCredentials)));

        let started = std::time::Instant::now();
        let result = unknown.login(login_command("b@x.com", "nope")).await;
        let no_such_user = started.elapsed();
        assert!(matches!(result, Err(UserError::InvalidCredentials)));

        assert!(
            no_such_user * 4 >= wrong_password,
            "unknown email took {no_such_user:?}, wrong password took {wrong_password:?}"
        );
    }

    #[tokio::test]
    async fn test_login_lookup_failure_is_invalid_credentials() {
        let mut repository = MockTestUserRepository::new();
        repository
            .expect_find_by_email()
            .returning(|_| Err(UserError::DatabaseError("timeout".to_string())));

        let result = service(repository)
            .login(login_command("a@x.com", "pw123"))
            .await;

        assert!(matches!(result, Err(UserError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_get_user_success() {
        let mut repository = MockTestUserRepository::new();

        repository
            .expect_find_by_id()
            .withf(|id| *id == UserId(7))
            .times(1)
            .returning(|_| Ok(Some(stored_user(7, "a@x.com", "pw123"))));

        let user = service(repository)
            .get_user(UserId(7))
            .await
            .expect("Lookup failed");

        assert_eq!(user.id, UserId(7));
        assert_eq!(user.username.as_str(), "alice");
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let mut repository = MockTestUserRepository::new();

        repository
            .expect_find_by_id()
            .times(1)
            .returning(|_| Ok(None));

        let result = service(repository).get_user(UserId(99)).await;

        assert!(matches!(result, Err(UserError::NotFound(_))));
    }
}
