//! API handlers for Libris REST endpoints

pub mod auth;
pub mod books;
pub mod form;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod reports;
pub mod returns;
pub mod users;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::UserClaims, AppState};

/// Room for the text fields sent alongside an uploaded image
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        // Role and status may have changed since the token was issued
        let user = state
            .services
            .users
            .get_by_id(claims.user_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => {
                    AppError::Authentication("Account no longer exists".to_string())
                }
                other => other,
            })?;

        Ok(AuthenticatedUser(claims.refresh(&user)?))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.uploads.max_size_bytes + FORM_OVERHEAD_BYTES;
    let uploads = ServeDir::new(&state.config.uploads.dir);
    let uploads_prefix = state.config.uploads.url_prefix.trim_end_matches('/').to_string();

    let api = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/seed", get(auth::seed))
        // Catalog
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/categories", get(books::list_categories))
        .route(
            "/books/:id",
            get(books::get_book).put(books::update_book).delete(books::delete_book),
        )
        // Users
        .route("/users/profile", get(users::get_my_profile).put(users::update_my_profile))
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        // Loans
        .route(
            "/bookloans",
            get(loans::list_loans).post(loans::create_loan).patch(loans::decide_loan),
        )
        .route("/bookloans/return", post(loans::return_loan))
        .route("/bookloans/cancel", post(loans::cancel_loan))
        // Returns
        .route("/returns", get(returns::list_returns).patch(returns::verify_return))
        // Reports
        .route("/reports", get(reports::get_report))
        .route("/stats", get(reports::get_stats))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .nest_service(&uploads_prefix, uploads)
        .merge(openapi::create_openapi_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, repository::Repository, services::Services};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// State whose pool never connects; only routes that fail before
    /// touching the database can be exercised with it.
    fn state(environment: &str) -> AppState {
        let mut config = AppConfig::default();
        config.server.environment = environment.to_string();

        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        let services = Services::new(Repository::new(pool), &config);

        AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn get_with_token(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(router(state("development")), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (status, body) = send(router(state("development")), get("/api/bookloans")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_token_is_unauthorized() {
        let request = Request::builder()
            .uri("/api/me")
            .header(AUTHORIZATION, "Token abc")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(router(state("development")), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            router(state("development")),
            get_with_token("/api/me", "not-a-jwt"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_seed_refused_in_production() {
        let (status, body) = send(router(state("production")), get("/api/seed")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Seeding is disabled in production");
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let (status, body) = send(router(state("development")), get("/api-docs/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["info"]["title"], "Libris API");
    }
}
