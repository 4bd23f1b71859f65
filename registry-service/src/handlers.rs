//! Handler模块

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use common::errors::AppError;
use common::middleware::{AuthenticatedAdmin, SessionToken};
use common::models::{
    AddAliasRequest, AddServiceAreaRequest, CreateLibraryRequest, Library, LibraryMatch, Location,
    SignInRequest, SignInResponse, UpdateStageRequest,
};
use common::response::{ApiResponse, PaginatedData};

use crate::service::{NearbyScope, RegistryService, RegistryServiceTrait};
use crate::state::AppState;
use crate::SERVICE_NAME;

/// 检索参数
#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchParams {
    /// 检索词，例如 "Springfield, IL" 或 "Boston Public Library"
    pub q: Option<String>,
    /// 用户位置，格式为 `纬度,经度`
    pub location: Option<String>,
}

/// 附近检索参数
#[derive(Debug, Deserialize, IntoParams)]
pub struct NearbyParams {
    /// 用户位置，格式为 `纬度,经度`
    pub location: Option<String>,
    /// 检索半径（公里）
    pub radius: Option<f64>,
    /// 服务区域范围，默认 `all`
    pub scope: Option<NearbyScope>,
}

/// 分页参数
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// 仅列出已上线的图书馆
    #[serde(default)]
    pub production_only: bool,
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 数据库是否可达
    pub database: bool,
}

fn parse_location(raw: Option<&str>) -> Result<Option<Location>, AppError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<Location>)
        .transpose()
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行中", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = state.store.ping(state.config.connect_timeout()).await;
    Json(HealthResponse {
        status: if database { "healthy" } else { "degraded" }.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        database,
    })
}

/// 检索图书馆
#[utoipa::path(
    get,
    path = "/libraries/search",
    tag = "libraries",
    params(SearchParams),
    responses(
        (status = 200, description = "检索结果", body = ApiResponse<Vec<LibraryMatch>>),
        (status = 400, description = "位置格式错误")
    )
)]
pub async fn search_libraries(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ApiResponse<Vec<LibraryMatch>>>, AppError> {
    let location = parse_location(params.location.as_deref())?;
    let service = RegistryService::new(&state);
    let data = service.search(params.q.as_deref(), location).await?;
    Ok(Json(ApiResponse::list(data, SERVICE_NAME)))
}

/// 查找附近的图书馆
#[utoipa::path(
    get,
    path = "/libraries/nearby",
    tag = "libraries",
    params(NearbyParams),
    responses(
        (status = 200, description = "附近的图书馆，由近到远", body = ApiResponse<Vec<LibraryMatch>>),
        (status = 400, description = "缺少位置或位置格式错误")
    )
)]
pub async fn nearby_libraries(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<ApiResponse<Vec<LibraryMatch>>>, AppError> {
    let location = parse_location(params.location.as_deref())?
        .ok_or_else(|| AppError::Validation("location is required".to_string()))?;
    let radius = params.radius.unwrap_or(state.config.nearby_radius_km);
    let service = RegistryService::new(&state);
    let data = service
        .nearby(location, radius, params.scope.unwrap_or_default())
        .await?;
    Ok(Json(ApiResponse::list(data, SERVICE_NAME)))
}

/// 根据 UUID 获取已上线的图书馆
#[utoipa::path(
    get,
    path = "/libraries/{id}",
    tag = "libraries",
    params(
        ("id" = String, Path, description = "图书馆 UUID 或 urn:uuid: 标识")
    ),
    responses(
        (status = 200, description = "图书馆详情", body = ApiResponse<Library>),
        (status = 400, description = "标识格式错误"),
        (status = 404, description = "图书馆未找到")
    )
)]
pub async fn get_library(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Library>>, AppError> {
    let service = RegistryService::new(&state);
    let data = service.get_library(&id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 管理员登录
#[utoipa::path(
    post,
    path = "/admin/sign_in",
    tag = "admin",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "登录成功", body = ApiResponse<SignInResponse>),
        (status = 400, description = "参数校验失败"),
        (status = 401, description = "用户名或密码错误")
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<ApiResponse<SignInResponse>>, AppError> {
    req.validate()?;
    let service = RegistryService::new(&state);
    let data = service.sign_in(req).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 管理员退出登录
#[utoipa::path(
    post,
    path = "/admin/sign_out",
    tag = "admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "已退出登录"),
        (status = 401, description = "未登录")
    )
)]
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthenticatedAdmin>,
    Extension(token): Extension<SessionToken>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let service = RegistryService::new(&state);
    service.sign_out(&token.0).await?;
    tracing::info!(admin = %admin.0, "管理员已退出登录");
    Ok(Json(ApiResponse::ok_with_service((), SERVICE_NAME)))
}

/// 列出所有图书馆（任意阶段）
#[utoipa::path(
    get,
    path = "/admin/libraries",
    tag = "admin",
    params(ListParams),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "图书馆列表", body = ApiResponse<PaginatedData<Library>>),
        (status = 401, description = "未登录")
    )
)]
pub async fn list_libraries(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<PaginatedData<Library>>>, AppError> {
    let service = RegistryService::new(&state);
    let (items, pagination) = service
        .list_libraries(
            params.production_only,
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(50),
        )
        .await?;
    Ok(Json(ApiResponse::ok_with_service(
        PaginatedData::new(items, pagination),
        SERVICE_NAME,
    )))
}

/// 注册新图书馆
#[utoipa::path(
    post,
    path = "/admin/libraries",
    tag = "admin",
    request_body = CreateLibraryRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "图书馆已注册", body = ApiResponse<Library>),
        (status = 400, description = "参数校验失败"),
        (status = 401, description = "未登录"),
        (status = 409, description = "简称或 OPDS 地址已存在")
    )
)]
pub async fn create_library(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthenticatedAdmin>,
    Json(req): Json<CreateLibraryRequest>,
) -> Result<Json<ApiResponse<Library>>, AppError> {
    req.validate()?;
    let service = RegistryService::new(&state);
    let data = service.create_library(req).await?;
    tracing::info!(admin = %admin.0, library = %data.uuid, "管理员注册了图书馆");
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 修改图书馆阶段
#[utoipa::path(
    put,
    path = "/admin/libraries/{id}/stage",
    tag = "admin",
    request_body = UpdateStageRequest,
    security(("bearer" = [])),
    params(
        ("id" = String, Path, description = "图书馆 UUID")
    ),
    responses(
        (status = 200, description = "阶段已更新", body = ApiResponse<Library>),
        (status = 401, description = "未登录"),
        (status = 404, description = "图书馆未找到"),
        (status = 409, description = "图书馆已上线，只能由注册方下线")
    )
)]
pub async fn update_stage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStageRequest>,
) -> Result<Json<ApiResponse<Library>>, AppError> {
    let service = RegistryService::new(&state);
    let data = service.update_stage(&id, req).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 为图书馆添加服务区域
#[utoipa::path(
    post,
    path = "/admin/libraries/{id}/service_areas",
    tag = "admin",
    request_body = AddServiceAreaRequest,
    security(("bearer" = [])),
    params(
        ("id" = String, Path, description = "图书馆 UUID")
    ),
    responses(
        (status = 200, description = "服务区域已添加", body = ApiResponse<Library>),
        (status = 401, description = "未登录"),
        (status = 404, description = "图书馆或地点未找到")
    )
)]
pub async fn add_service_area(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddServiceAreaRequest>,
) -> Result<Json<ApiResponse<Library>>, AppError> {
    req.validate()?;
    let service = RegistryService::new(&state);
    let data = service.add_service_area(&id, req).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 为图书馆添加别名
#[utoipa::path(
    post,
    path = "/admin/libraries/{id}/aliases",
    tag = "admin",
    request_body = AddAliasRequest,
    security(("bearer" = [])),
    params(
        ("id" = String, Path, description = "图书馆 UUID")
    ),
    responses(
        (status = 200, description = "别名已添加", body = ApiResponse<Library>),
        (status = 400, description = "参数校验失败"),
        (status = 401, description = "未登录"),
        (status = 404, description = "图书馆未找到")
    )
)]
pub async fn add_alias(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddAliasRequest>,
) -> Result<Json<ApiResponse<Library>>, AppError> {
    req.validate()?;
    let service = RegistryService::new(&state);
    let data = service.add_alias(&id, req).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        assert_eq!(parse_location(None).unwrap(), None);
        assert_eq!(parse_location(Some("  ")).unwrap(), None);

        let location = parse_location(Some("40.7,-73.9")).unwrap().unwrap();
        assert_eq!(location.latitude, 40.7);
        assert_eq!(location.longitude, -73.9);

        let err = parse_location(Some("91,0")).unwrap_err();
        assert!(matches!(err, AppError::InvalidLocation(_)));
    }
}
