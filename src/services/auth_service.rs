use crate::error::{AppError, AppResult};
use crate::external::{NotificationEventType, NotificationService};
use crate::models::*;
use crate::utils::{hash_password, validate_password, verify_password, JwtService};
use regex::Regex;
use serde_json::json;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AuthService {
    pool: SqlitePool,
    jwt_service: JwtService,
    notification_service: NotificationService,
}

impl AuthService {
    pub fn new(
        pool: SqlitePool,
        jwt_service: JwtService,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            pool,
            jwt_service,
            notification_service,
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        log::info!("Registering user: {}", request.username);

        validate_email(&request.email)?;
        validate_password(&request.password)?;

        if request.username.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Username must not be empty".to_string(),
            ));
        }

        let role = match &request.role {
            Some(raw) => raw
                .parse::<UserRole>()
                .map_err(AppError::ValidationError)?,
            None => UserRole::Participant,
        };

        let username_taken = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE username = ?",
        )
        .bind(&request.username)
        .fetch_one(&self.pool)
        .await?;
        if username_taken > 0 {
            return Err(AppError::ValidationError(
                "Username is already taken".to_string(),
            ));
        }

        let email_taken = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE email = ?",
        )
        .bind(&request.email)
        .fetch_one(&self.pool)
        .await?;
        if email_taken > 0 {
            return Err(AppError::ValidationError(
                "Email is already registered".to_string(),
            ));
        }

        let password_hash = hash_password(&request.password)?;

        let user_id = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name, role, is_active)
            VALUES (?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&request.username)
        .bind(&request.email)
        .bind(&password_hash)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        log::info!("User registered: {user_id}");

        let user = self.get_user_by_id(user_id).await?;

        self.notification_service.notify(
            &user,
            NotificationEventType::UserRegistered,
            "Welcome to the tournament platform",
            json!({ "userId": user.id }),
        );

        self.build_auth_response(user)
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        log::info!("Authenticating user: {}", request.username);

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(&request.username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid username or password".to_string()))?;

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(AppError::AuthError(
                "Invalid username or password".to_string(),
            ));
        }

        if !user.is_active {
            return Err(AppError::AuthError("User is inactive".to_string()));
        }

        log::info!("User authenticated: {}", user.id);

        self.notification_service.notify(
            &user,
            NotificationEventType::UserLogin,
            "New login to your account",
            json!({ "userId": user.id }),
        );

        self.build_auth_response(user)
    }

    pub async fn refresh(&self, refresh_token: &str) -> AppResult<AuthResponse> {
        let claims = self
            .jwt_service
            .verify_refresh_token(refresh_token)
            .map_err(|_| AppError::AuthError("Invalid refresh token".to_string()))?;

        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;

        let user = self.get_user_by_id(user_id).await?;
        if !user.is_active {
            return Err(AppError::AuthError("User is inactive".to_string()));
        }

        self.build_auth_response(user)
    }

    pub async fn get_user_by_id(&self, id: i64) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    fn build_auth_response(&self, user: User) -> AppResult<AuthResponse> {
        let access_token =
            self.jwt_service
                .generate_access_token(user.id, &user.username, user.role.as_str())?;
        let refresh_token =
            self.jwt_service
                .generate_refresh_token(user.id, &user.username, user.role.as_str())?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            expires_in: self.jwt_service.get_access_token_expires_in(),
            user: user.into(),
        })
    }
}

fn validate_email(email: &str) -> AppResult<()> {
    let pattern = Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .map_err(|e| AppError::InternalError(format!("Invalid email regex: {e}")))?;

    if !pattern.is_match(email) {
        return Err(AppError::ValidationError(
            "Invalid email address".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;
    use crate::utils::JwtService;

    fn service(pool: &SqlitePool) -> AuthService {
        AuthService::new(
            pool.clone(),
            JwtService::new("test-secret", 3600, 86400),
            test_notification_service(),
        )
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            username: "player1".to_string(),
            email: "player1@example.com".to_string(),
            password: "Password123".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let pool = setup_pool().await;
        let svc = service(&pool);

        let registered = svc.register(register_request()).await.unwrap();
        assert_eq!(registered.user.role, UserRole::Participant);
        assert!(!registered.access_token.is_empty());

        let logged_in = svc
            .login(LoginRequest {
                username: "player1".to_string(),
                password: "Password123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);

        // 刷新令牌换新令牌对
        let refreshed = svc.refresh(&logged_in.refresh_token).await.unwrap();
        assert_eq!(refreshed.user.id, registered.user.id);
        // access 令牌不能用于刷新
        assert!(svc.refresh(&logged_in.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_input() {
        let pool = setup_pool().await;
        let svc = service(&pool);

        svc.register(register_request()).await.unwrap();

        // 重复用户名
        let mut dup_username = register_request();
        dup_username.email = "other@example.com".to_string();
        assert!(matches!(
            svc.register(dup_username).await,
            Err(AppError::ValidationError(_))
        ));

        // 重复邮箱
        let mut dup_email = register_request();
        dup_email.username = "player2".to_string();
        assert!(matches!(
            svc.register(dup_email).await,
            Err(AppError::ValidationError(_))
        ));

        let mut bad_email = register_request();
        bad_email.username = "player3".to_string();
        bad_email.email = "not-an-email".to_string();
        assert!(matches!(
            svc.register(bad_email).await,
            Err(AppError::ValidationError(_))
        ));

        let mut bad_role = register_request();
        bad_role.username = "player4".to_string();
        bad_role.email = "player4@example.com".to_string();
        bad_role.role = Some("WIZARD".to_string());
        assert!(matches!(
            svc.register(bad_role).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_login_failures() {
        let pool = setup_pool().await;
        let svc = service(&pool);
        svc.register(register_request()).await.unwrap();

        assert!(matches!(
            svc.login(LoginRequest {
                username: "player1".to_string(),
                password: "WrongPassword1".to_string(),
            })
            .await,
            Err(AppError::AuthError(_))
        ));

        assert!(matches!(
            svc.login(LoginRequest {
                username: "ghost".to_string(),
                password: "Password123".to_string(),
            })
            .await,
            Err(AppError::AuthError(_))
        ));

        // 停用账户
        sqlx::query("UPDATE users SET is_active = 0 WHERE username = 'player1'")
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            svc.login(LoginRequest {
                username: "player1".to_string(),
                password: "Password123".to_string(),
            })
            .await,
            Err(AppError::AuthError(_))
        ));
    }
}
