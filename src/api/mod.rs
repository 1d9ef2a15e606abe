use crate::{auth::AuthService, session::SessionRegistry};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod handlers;
mod openapi;
mod session;

pub use openapi::openapi;
pub use session::{CookieConfig, SESSION_COOKIE_NAME};

/// Shared by every handler through an `Extension`.
#[derive(Debug)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub sessions: Arc<SessionRegistry>,
    pub cookies: CookieConfig,
}

impl ApiState {
    #[must_use]
    pub fn new(sessions: Arc<SessionRegistry>, cookies: CookieConfig) -> Self {
        Self {
            auth: Arc::clone(sessions.auth()),
            sessions,
            cookies,
        }
    }
}

/// Build the full application router, guard and middleware included.
pub fn router(state: Arc<ApiState>) -> Router {
    let protected = Router::new()
        .route("/app", get(handlers::app::root))
        .route("/app/", get(handlers::app::root))
        .route("/app/dashboard", get(handlers::app::dashboard))
        .route("/app/parent/dashboard", get(handlers::app::parent_dashboard))
        .route(
            "/app/teacher/dashboard",
            get(handlers::app::teacher_dashboard),
        )
        .route("/app/find-teachers", get(handlers::teachers::find_teachers))
        .route("/app/teacher/:id", get(handlers::teachers::teacher_detail))
        .route(
            "/app/parent/students",
            get(handlers::app::list_students).post(handlers::app::add_student),
        )
        .route("/app/profile", patch(handlers::app::update_profile))
        .route_layer(middleware::from_fn(session::require_session));

    Router::new()
        .route("/", get(handlers::pages::home))
        .route("/about", get(handlers::pages::about))
        .route("/how-it-works", get(handlers::pages::how_it_works))
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .route("/v1/auth/signup", post(handlers::auth::signup))
        .route("/v1/auth/signin", post(handlers::auth::signin))
        .route("/v1/auth/signout", post(handlers::auth::signout))
        .route("/v1/auth/session", get(handlers::auth::session))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<ApiState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Gracefully shutdown"),
                Err(err) => {
                    error!("Failed to listen for shutdown signal: {err}");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
