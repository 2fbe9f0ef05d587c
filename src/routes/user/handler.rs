use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde_json::Value;

use crate::{
    AppState,
    cache::keys::{USERS_COLLECTION, collection_list_key},
    database::{NewUser, User, UserChanges, normalize_email},
    error::AppError,
    metrics::SecurityEvent,
    middleware::ClientKey,
    utils::{parse_id, sanitize_input, validate_email, validate_name},
};

use super::model::{DataSource, UserListResponse, UserPayload};

/// 列表接口在缓存指标中的端点标签
pub const LIST_ENDPOINT: &str = "list_users";

const INVALID_NAME: &str = "Invalid name format. Use 2-100 characters, letters only";
const INVALID_EMAIL: &str = "Invalid email format";

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

fn report(state: &AppState, event: SecurityEvent, client: &ClientKey, route: &str) {
    tracing::warn!(
        event = event.as_str(),
        client = %client,
        route,
        "Security event"
    );
    state.metrics.record_security_event(event);
}

fn checked_name(
    state: &AppState,
    client: &ClientKey,
    route: &str,
    value: &Value,
) -> Result<String, AppError> {
    // 原值和清洗后的值都要合法，清洗可能删到不足两个字符
    let sanitized = value
        .as_str()
        .filter(|name| validate_name(name))
        .map(sanitize_input);
    match sanitized {
        Some(name) if validate_name(&name) => Ok(name),
        _ => {
            report(state, SecurityEvent::InvalidInput, client, route);
            Err(AppError::validation(INVALID_NAME))
        }
    }
}

fn checked_email(
    state: &AppState,
    client: &ClientKey,
    route: &str,
    value: &Value,
) -> Result<String, AppError> {
    match value.as_str().map(str::trim) {
        Some(email) if validate_email(email) => Ok(normalize_email(email)),
        _ => {
            report(state, SecurityEvent::InvalidEmail, client, route);
            Err(AppError::validation(INVALID_EMAIL))
        }
    }
}

/// 写操作之后列表缓存失效并刷新用户数指标
async fn after_write(state: &AppState) {
    state
        .cache
        .invalidate(&collection_list_key(USERS_COLLECTION))
        .await;
    refresh_user_count(state).await;
}

pub async fn refresh_user_count(state: &AppState) {
    match state.users.count().await {
        Ok(count) => state.metrics.set_entity_count(count),
        Err(e) => tracing::debug!("Skipping user count refresh: {}", e),
    }
}

#[axum::debug_handler]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UserListResponse>, AppError> {
    let key = collection_list_key(USERS_COLLECTION);

    if let Some(data) = state.cache.get_json::<Vec<User>>(&key).await {
        state.metrics.record_cache_hit(LIST_ENDPOINT);
        return Ok(Json(UserListResponse {
            data,
            source: DataSource::Cache,
        }));
    }
    state.metrics.record_cache_miss(LIST_ENDPOINT);

    // 代数要在读库之前取，读库期间发生的写操作会让这次写回失效
    let generation = state.cache.generation(&key).await;
    let data = state.users.list().await?;
    if let Some(generation) = generation {
        state
            .cache
            .set_json(&key, generation, &data, state.config.cache_ttl())
            .await;
    }
    refresh_user_count(&state).await;

    Ok(Json(UserListResponse {
        data,
        source: DataSource::Database,
    }))
}

#[axum::debug_handler]
pub async fn get_user(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<User>, AppError> {
    let id = parse_id(&raw_id)?;
    let user = state.users.find_by_id(id).await?.ok_or_else(user_not_found)?;
    Ok(Json(user))
}

#[axum::debug_handler]
pub async fn create_user(
    State(state): State<AppState>,
    client: ClientKey,
    body: Bytes,
) -> Result<(StatusCode, Json<User>), AppError> {
    const ROUTE: &str = "POST /users";

    let payload = UserPayload::from_body(&body)?;
    let (Some(name), Some(email)) = (payload.name.as_ref(), payload.email.as_ref()) else {
        return Err(AppError::validation("name and email are required"));
    };

    let name = checked_name(&state, &client, ROUTE, name)?;
    let email = checked_email(&state, &client, ROUTE, email)?;

    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already exists".to_string()));
    }

    // 并发创建时仍由存储层的唯一约束兜底
    let user = state.users.create(NewUser { name, email }).await?;
    after_write(&state).await;

    Ok((StatusCode::CREATED, Json(user)))
}

#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    client: ClientKey,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Result<Json<User>, AppError> {
    const ROUTE: &str = "PUT /users/{id}";

    let id = parse_id(&raw_id)?;
    let payload = UserPayload::from_body(&body)?;

    let mut changes = UserChanges::default();
    if let Some(name) = &payload.name {
        changes.name = Some(checked_name(&state, &client, ROUTE, name)?);
    }
    if let Some(email) = &payload.email {
        let email = checked_email(&state, &client, ROUTE, email)?;
        if let Some(existing) = state.users.find_by_email(&email).await? {
            if existing.id != id {
                return Err(AppError::Conflict("Email already exists".to_string()));
            }
        }
        changes.email = Some(email);
    }

    // 没有可识别的字段时不写库，缓存也保持有效
    if changes.is_empty() {
        let user = state.users.find_by_id(id).await?.ok_or_else(user_not_found)?;
        return Ok(Json(user));
    }

    let user = state
        .users
        .update(id, changes)
        .await?
        .ok_or_else(user_not_found)?;
    after_write(&state).await;

    Ok(Json(user))
}

#[axum::debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&raw_id)?;
    if !state.users.delete(id).await? {
        return Err(user_not_found());
    }
    after_write(&state).await;

    Ok(StatusCode::NO_CONTENT)
}
