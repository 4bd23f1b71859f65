//! 图书馆注册服务模块

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use common::errors::{AppError, AppResult};
use common::middleware::AdminSessions;
use common::models::library::parse_urn;
use common::models::{
    AddAliasRequest, AddServiceAreaRequest, CreateLibraryRequest, Library, LibraryMatch, Location,
    SignInRequest, SignInResponse, UpdateStageRequest,
};
use common::response::Pagination;
use common::search::{Query, SearchEngine};

use crate::state::AppState;
use crate::store::PgStore;

/// 附近检索返回的最大结果数
pub const NEARBY_LIMIT: usize = 20;

/// 附近检索考虑的服务区域
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NearbyScope {
    /// 任意服务区域
    #[default]
    All,
    /// 仅州、国家及全域重点区域
    Supralocal,
}

/// 注册服务 Trait
#[async_trait]
pub trait RegistryServiceTrait: Send + Sync {
    /// 按检索词和位置查找图书馆
    async fn search(
        &self,
        search: Option<&str>,
        location: Option<Location>,
    ) -> AppResult<Vec<LibraryMatch>>;

    /// 查找位置附近的图书馆
    async fn nearby(
        &self,
        location: Location,
        radius_km: f64,
        scope: NearbyScope,
    ) -> AppResult<Vec<LibraryMatch>>;

    /// 获取已上线的图书馆
    async fn get_library(&self, id: &str) -> AppResult<Library>;

    /// 管理员登录
    async fn sign_in(&self, req: SignInRequest) -> AppResult<SignInResponse>;

    /// 管理员退出登录，令牌立即失效
    async fn sign_out(&self, token: &str) -> AppResult<()>;

    /// 分页列出图书馆
    async fn list_libraries(
        &self,
        production_only: bool,
        page: u32,
        page_size: u32,
    ) -> AppResult<(Vec<Library>, Pagination)>;

    /// 注册新图书馆
    async fn create_library(&self, req: CreateLibraryRequest) -> AppResult<Library>;

    /// 修改图书馆阶段
    async fn update_stage(&self, id: &str, req: UpdateStageRequest) -> AppResult<Library>;

    /// 为图书馆添加服务区域
    async fn add_service_area(&self, id: &str, req: AddServiceAreaRequest) -> AppResult<Library>;

    /// 为图书馆添加别名
    async fn add_alias(&self, id: &str, req: AddAliasRequest) -> AppResult<Library>;
}

/// 图书馆注册服务
pub struct RegistryService {
    store: PgStore,
    engine: Arc<SearchEngine<PgStore>>,
    sessions: AdminSessions,
}

impl RegistryService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            engine: state.engine.clone(),
            sessions: state.sessions.clone(),
        }
    }
}

/// 解析图书馆标识，接受 UUID 或 `urn:uuid:` 形式
pub fn parse_library_id(id: &str) -> AppResult<Uuid> {
    parse_urn(id)
        .or_else(|| Uuid::parse_str(id).ok())
        .ok_or_else(|| AppError::Validation(format!("'{id}' is not a library UUID")))
}

#[async_trait]
impl RegistryServiceTrait for RegistryService {
    async fn search(
        &self,
        search: Option<&str>,
        location: Option<Location>,
    ) -> AppResult<Vec<LibraryMatch>> {
        let query = Query::new(search, location);
        self.engine.search(&query).await
    }

    async fn nearby(
        &self,
        location: Location,
        radius_km: f64,
        scope: NearbyScope,
    ) -> AppResult<Vec<LibraryMatch>> {
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(AppError::Validation(
                "radius must be a positive number of kilometres".into(),
            ));
        }
        match scope {
            NearbyScope::All => self.store.nearby(&location, radius_km, true, NEARBY_LIMIT).await,
            NearbyScope::Supralocal => {
                self.store
                    .nearest_supralocals(&location, radius_km, NEARBY_LIMIT)
                    .await
            }
        }
    }

    async fn get_library(&self, id: &str) -> AppResult<Library> {
        let uuid = parse_library_id(id)?;
        self.store
            .library_by_uuid(uuid)
            .await?
            .filter(Library::in_production)
            .ok_or_else(|| AppError::LibraryNotFound(id.to_string()))
    }

    async fn sign_in(&self, req: SignInRequest) -> AppResult<SignInResponse> {
        let admin = self
            .store
            .authenticate(&req.username, &req.password)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid username or password".to_string()))?;

        let (token, expires_at) = self.sessions.issue(&admin.username).await;
        Ok(SignInResponse {
            token,
            username: admin.username,
            expires_at,
        })
    }

    async fn sign_out(&self, token: &str) -> AppResult<()> {
        if !self.sessions.revoke(token).await {
            return Err(AppError::Unauthorized("invalid or expired token".to_string()));
        }
        Ok(())
    }

    async fn list_libraries(
        &self,
        production_only: bool,
        page: u32,
        page_size: u32,
    ) -> AppResult<(Vec<Library>, Pagination)> {
        self.store.list_libraries(production_only, page, page_size).await
    }

    async fn create_library(&self, req: CreateLibraryRequest) -> AppResult<Library> {
        self.store.create_library(&req).await
    }

    async fn update_stage(&self, id: &str, req: UpdateStageRequest) -> AppResult<Library> {
        let uuid = parse_library_id(id)?;
        self.store.update_stage(uuid, &req).await
    }

    async fn add_service_area(&self, id: &str, req: AddServiceAreaRequest) -> AppResult<Library> {
        let uuid = parse_library_id(id)?;
        let library = self
            .store
            .add_service_area(uuid, &req.place_external_id, req.kind)
            .await?;
        tracing::info!(
            library = %library.uuid,
            place = %req.place_external_id,
            kind = %req.kind.as_str(),
            "服务区域已添加"
        );
        Ok(library)
    }

    async fn add_alias(&self, id: &str, req: AddAliasRequest) -> AppResult<Library> {
        let uuid = parse_library_id(id)?;
        self.store.add_library_alias(uuid, req.name.trim()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_library_id_accepts_uuid_and_urn() {
        let uuid = Uuid::new_v4();
        assert_eq!(parse_library_id(&uuid.to_string()).unwrap(), uuid);
        assert_eq!(parse_library_id(&format!("urn:uuid:{uuid}")).unwrap(), uuid);
    }

    #[test]
    fn test_parse_library_id_rejects_garbage() {
        let err = parse_library_id("not-a-uuid").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(parse_library_id("urn:uuid:nope").is_err());
    }

    #[test]
    fn test_nearby_scope_deserializes() {
        let scope: NearbyScope = serde_json::from_str("\"supralocal\"").unwrap();
        assert_eq!(scope, NearbyScope::Supralocal);
        assert_eq!(NearbyScope::default(), NearbyScope::All);
        assert!(serde_json::from_str::<NearbyScope>("\"local\"").is_err());
    }
}
