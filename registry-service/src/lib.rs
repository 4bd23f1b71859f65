//! 图书馆注册服务
//!
//! 提供图书馆注册与检索功能，包括：
//! - 按地名、邮编或馆名检索图书馆
//! - 按位置查找附近的图书馆
//! - 管理员登录与图书馆管理

pub mod handlers;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;

use axum::{middleware, routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use common::middleware::request_id_middleware;
use state::AppState;

pub const SERVICE_NAME: &str = "registry-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "图书馆注册服务 API",
        version = "0.1.0",
        description = "图书馆注册与地理检索服务"
    ),
    paths(
        handlers::health_check,
        handlers::search_libraries,
        handlers::nearby_libraries,
        handlers::get_library,
        handlers::sign_in,
        handlers::sign_out,
        handlers::list_libraries,
        handlers::create_library,
        handlers::update_stage,
        handlers::add_service_area,
        handlers::add_alias,
    ),
    components(schemas(
        common::models::Library,
        common::models::LibraryMatch,
        common::models::LibraryStage,
        common::models::ServiceArea,
        common::models::ServiceAreaKind,
        common::models::Place,
        common::models::PlaceAlias,
        common::models::PlaceType,
        common::models::CreateLibraryRequest,
        common::models::UpdateStageRequest,
        common::models::AddServiceAreaRequest,
        common::models::AddAliasRequest,
        common::models::SignInRequest,
        common::models::SignInResponse,
        common::response::Pagination,
        handlers::HealthResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "libraries", description = "图书馆检索端点"),
        (name = "admin", description = "管理端点"),
        (name = "health", description = "健康检查端点")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router(state.sessions.clone()))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// 初始化日志追踪，`json` 为真时输出 JSON 格式
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let (json_layer, text_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}
