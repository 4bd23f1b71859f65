//! 注册服务路由模块

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use common::middleware::{require_admin, AdminSessions};

use crate::handlers::{
    add_alias, add_service_area, create_library, get_library, health_check, list_libraries,
    nearby_libraries, search_libraries, sign_in, sign_out, update_stage,
};
use crate::state::AppState;

/// 创建路由，`/admin` 下除登录外均需管理员令牌
pub fn router(sessions: AdminSessions) -> Router<AppState> {
    let admin = Router::new()
        .route("/admin/libraries", get(list_libraries).post(create_library))
        .route("/admin/libraries/{id}/stage", put(update_stage))
        .route("/admin/libraries/{id}/service_areas", post(add_service_area))
        .route("/admin/libraries/{id}/aliases", post(add_alias))
        .route("/admin/sign_out", post(sign_out))
        .route_layer(middleware::from_fn_with_state(sessions, require_admin));

    Router::new()
        .route("/api/health", get(health_check))
        .route("/libraries/search", get(search_libraries))
        .route("/libraries/nearby", get(nearby_libraries))
        .route("/libraries/{id}", get(get_library))
        .route("/admin/sign_in", post(sign_in))
        .merge(admin)
}
