use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    auth::session_token,
    credentials,
    error::ApiError,
    session::SessionToken,
    store::{AlbumFields, Store},
    AppState,
};

// ── Store access ─────────────────────────────────────────────────────────────

/// Run a blocking store operation off the async runtime, bounded by the
/// configured store timeout.
async fn with_store<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Store) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    let task = tokio::task::spawn_blocking(move || op(&store));
    match tokio::time::timeout(state.store_timeout, task).await {
        Ok(Ok(result)) => result.map_err(ApiError::Internal),
        Ok(Err(e)) => {
            error!(error = %e, "store task failed");
            Err(ApiError::UpstreamUnavailable)
        }
        Err(_) => {
            warn!(timeout = ?state.store_timeout, "store operation timed out");
            Err(ApiError::UpstreamUnavailable)
        }
    }
}

fn with_token(status: StatusCode, token: SessionToken) -> Result<Response, ApiError> {
    let value = HeaderValue::from_str(token.as_str())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("token is not a valid header: {e}")))?;
    Ok((status, [(AUTHORIZATION, value)]).into_response())
}

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Albums ────────────────────────────────────────────────────────────────────

pub async fn list_albums(State(state): State<AppState>) -> Result<Response, ApiError> {
    let albums = with_store(&state, |store| store.list_albums()).await?;
    Ok(Json(json!({ "data": albums })).into_response())
}

/// An unknown id is not an error: the payload is `null`.
pub async fn get_album(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let album = with_store(&state, move |store| store.get_album(&id)).await?;
    Ok(Json(json!({ "data": album })).into_response())
}

pub async fn create_album(
    State(state): State<AppState>,
    body: Result<Json<AlbumFields>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(fields) = body?;
    let album = with_store(&state, move |store| store.create_album(fields)).await?;
    info!(album_id = %album.id, "album created");
    Ok(Json(json!({ "data": album })).into_response())
}

/// Full replace: fields missing from the body are cleared.
pub async fn replace_album(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<AlbumFields>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(fields) = body?;
    let album = with_store(&state, move |store| store.replace_album(&id, fields)).await?;
    if let Some(ref album) = album {
        info!(album_id = %album.id, "album replaced");
    }
    Ok(Json(json!({ "data": album })).into_response())
}

pub async fn delete_album(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let album_id = id.clone();
    let existed = with_store(&state, move |store| store.delete_album(&id)).await?;
    info!(album_id = %album_id, existed, "album deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ── Purchases ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
}

fn required(field: Option<String>, name: &str) -> Result<String, ApiError> {
    field
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{name} field is required!")))
}

pub async fn create_purchase(
    State(state): State<AppState>,
    body: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let user = required(body.user, "user")?;
    let album = required(body.album, "album")?;

    let purchase = with_store(&state, move |store| {
        let record = store.create_purchase(&user, &album)?;
        store.get_purchase_populated(&record.id)
    })
    .await?;

    if let Some(ref purchase) = purchase {
        info!(
            purchase_id = %purchase.id,
            user_found = purchase.user.is_some(),
            album_found = purchase.album.is_some(),
            "purchase created"
        );
    }
    Ok(Json(json!({ "data": purchase })).into_response())
}

// ── Signup / login / logout ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn signup(
    State(state): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    if body.email.is_empty() {
        return Err(ApiError::Validation("email field is required!".into()));
    }
    if body.password.is_empty() {
        return Err(ApiError::Validation("password field is required!".into()));
    }

    let created = with_store(&state, move |store| {
        let password_hash = credentials::hash_password(&body.password)?;
        store.create_user(body.name, &body.email, password_hash)
    })
    .await?;

    let Some(user) = created else {
        return Err(ApiError::Conflict("email is already registered".into()));
    };

    let token = state.sessions.issue()?;
    info!(user_id = %user.id, sessions = state.sessions.len(), "user signed up");
    with_token(StatusCode::CREATED, token)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;

    let user = with_store(&state, move |store| {
        let Some(user) = store.find_user_by_email(&body.email)? else {
            credentials::verify_nothing(&body.password);
            return Ok(None);
        };
        Ok(credentials::verify_password(&body.password, &user.password_hash).then_some(user))
    })
    .await?;

    let Some(user) = user else {
        info!("login rejected");
        return Err(ApiError::Unauthorized);
    };

    let token = state.sessions.issue()?;
    info!(user_id = %user.id, sessions = state.sessions.len(), "user logged in");
    with_token(StatusCode::NO_CONTENT, token)
}

/// Always `204`, whether or not the token was live.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = session_token(&headers) {
        let revoked = state.sessions.revoke(token);
        info!(revoked, sessions = state.sessions.len(), "logout");
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
        Router,
    };
    use serde_json::Value;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use super::*;
    use crate::{server::app, session::SessionRegistry};

    const EMAIL: &str = "nodejs-is-awesome@gmail.com";
    const PASSWORD: &str = "iamnotsecure";

    struct TestApp {
        router: Router,
        state: AppState,
        _dir: tempfile::TempDir,
    }

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
    }

    impl Reply {
        fn token(&self) -> Option<String> {
            session_token(&self.headers).map(str::to_owned)
        }
    }

    fn test_app() -> TestApp {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        let state = AppState {
            store,
            sessions: SessionRegistry::default(),
            store_timeout: Duration::from_secs(5),
        };
        TestApp {
            router: app(state.clone(), None),
            state,
            _dir: dir,
        }
    }

    impl TestApp {
        async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> Reply {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(AUTHORIZATION, token);
            }
            let request = match body {
                Some(body) => request
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            Reply {
                status,
                headers,
                body,
            }
        }

        async fn signup(&self) -> String {
            let reply = self
                .send(
                    Method::POST,
                    "/signup",
                    None,
                    Some(json!({"name": "Developer", "email": EMAIL, "password": PASSWORD})),
                )
                .await;
            assert_eq!(reply.status, StatusCode::CREATED);
            reply.token().unwrap()
        }

        async fn login(&self) -> Reply {
            self.send(
                Method::POST,
                "/login",
                None,
                Some(json!({"email": EMAIL, "password": PASSWORD})),
            )
            .await
        }
    }

    #[tokio::test]
    async fn health_ok() {
        let t = test_app();
        let reply = t.send(Method::GET, "/health", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["status"], "ok");
    }

    #[tokio::test]
    async fn login_unknown_user_is_unauthorized() {
        let t = test_app();
        let reply = t.login().await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert!(reply.token().is_none());
        assert!(t.state.sessions.is_empty());
    }

    #[tokio::test]
    async fn signup_login_logout() {
        let t = test_app();
        let reply = t
            .send(
                Method::POST,
                "/signup",
                None,
                Some(json!({"name": "Developer", "email": EMAIL, "password": PASSWORD})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.body, Value::Null);
        let signup_token = reply.token().unwrap();

        let reply = t.login().await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        let login_token = reply.token().unwrap();

        assert_ne!(signup_token, login_token);
        assert!(t.state.sessions.is_valid(&signup_token));
        assert!(t.state.sessions.is_valid(&login_token));

        let reply = t
            .send(Method::POST, "/logout", Some(login_token.as_str()), None)
            .await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        assert!(reply.token().is_none());
        assert!(!t.state.sessions.is_valid(&login_token));
        assert!(t.state.sessions.is_valid(&signup_token));
    }

    #[tokio::test]
    async fn password_is_stored_hashed() {
        let t = test_app();
        t.signup().await;
        let user = t.state.store.find_user_by_email(EMAIL).unwrap().unwrap();
        assert_ne!(user.password_hash, PASSWORD);
        assert!(credentials::verify_password(PASSWORD, &user.password_hash));
    }

    #[tokio::test]
    async fn login_wrong_password_is_unauthorized() {
        let t = test_app();
        t.signup().await;
        let reply = t
            .send(
                Method::POST,
                "/login",
                None,
                Some(json!({"email": EMAIL, "password": "guess"})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert!(reply.token().is_none());
    }

    #[tokio::test]
    async fn logout_without_token_is_no_content() {
        let t = test_app();
        let reply = t.send(Method::POST, "/logout", None, None).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        let reply = t
            .send(Method::POST, "/logout", Some("Bearer 0000000000000000"), None)
            .await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn signup_validation() {
        let t = test_app();
        let reply = t
            .send(
                Method::POST,
                "/signup",
                None,
                Some(json!({"name": "No Email", "password": PASSWORD})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["err"], "email field is required!");

        let reply = t
            .send(Method::POST, "/signup", None, Some(json!({"email": EMAIL})))
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["err"], "password field is required!");
        assert!(t.state.sessions.is_empty());
    }

    #[tokio::test]
    async fn signup_duplicate_email_conflicts() {
        let t = test_app();
        t.signup().await;
        let reply = t
            .send(
                Method::POST,
                "/signup",
                None,
                Some(json!({"email": EMAIL, "password": "other"})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CONFLICT);
        assert!(reply.body["err"].is_string());
        assert!(reply.token().is_none());
    }

    #[tokio::test]
    async fn album_lifecycle() {
        let t = test_app();
        let token = t.signup().await;
        let album = json!({"title": "X", "performer": "Y", "cost": 20});

        let reply = t
            .send(Method::POST, "/albums", None, Some(album.clone()))
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body, Value::Null);

        let reply = t
            .send(Method::POST, "/albums", Some(token.as_str()), Some(album))
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["data"]["title"], "X");
        let id = reply.body["data"]["_id"].as_str().unwrap().to_owned();

        let reply = t.send(Method::GET, &format!("/albums/{id}"), None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["data"]["title"], "X");
        assert_eq!(reply.body["data"]["cost"], 20.0);

        let reply = t
            .send(
                Method::PUT,
                &format!("/albums/{id}"),
                None,
                Some(json!({"title": "Z"})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

        let reply = t
            .send(
                Method::PUT,
                &format!("/albums/{id}"),
                Some(token.as_str()),
                Some(json!({"title": "Z"})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["data"]["title"], "Z");

        let reply = t.send(Method::GET, &format!("/albums/{id}"), None, None).await;
        assert_eq!(reply.body["data"]["title"], "Z");
        assert!(reply.body["data"]["performer"].is_null());
        assert!(reply.body["data"]["cost"].is_null());

        let reply = t
            .send(Method::DELETE, &format!("/albums/{id}"), None, None)
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

        let reply = t
            .send(Method::DELETE, &format!("/albums/{id}"), Some(token.as_str()), None)
            .await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        assert_eq!(reply.body, Value::Null);

        let reply = t.send(Method::GET, "/albums", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["data"], json!([]));
    }

    #[tokio::test]
    async fn unauthorized_request_does_not_write() {
        let t = test_app();
        t.send(
            Method::POST,
            "/albums",
            Some("Bearer forged"),
            Some(json!({"title": "X"})),
        )
        .await;
        assert!(t.state.store.list_albums().unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_unknown_album_is_null() {
        let t = test_app();
        let reply = t
            .send(Method::GET, "/albums/ffffffffffffffffffffffff", None, None)
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body["data"].is_null());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let t = test_app();
        let token = t.signup().await;
        let reply = t
            .send(
                Method::POST,
                "/albums",
                Some(token.as_str()),
                Some(json!({"title": "X", "cost": "twenty"})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.body["err"].is_string());
    }

    #[tokio::test]
    async fn purchase_populates_references() {
        let t = test_app();
        let token = t.signup().await;
        let user = t.state.store.find_user_by_email(EMAIL).unwrap().unwrap();

        let reply = t
            .send(
                Method::POST,
                "/albums",
                Some(token.as_str()),
                Some(json!({"title": "Buy Me Now", "performer": "Tester", "cost": 100})),
            )
            .await;
        let album_id = reply.body["data"]["_id"].as_str().unwrap().to_owned();
        let purchase = json!({"user": user.id, "album": album_id});

        let reply = t
            .send(Method::POST, "/purchases", None, Some(purchase.clone()))
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

        let reply = t
            .send(Method::POST, "/purchases", Some(token.as_str()), Some(purchase.clone()))
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        let data = &reply.body["data"];
        assert_eq!(data["album"]["title"], "Buy Me Now");
        assert_eq!(data["album"]["_id"], album_id.as_str());
        assert_eq!(data["user"]["email"], EMAIL);
        assert!(data["user"].get("password_hash").is_none());

        t.send(Method::POST, "/logout", Some(token.as_str()), None).await;
        let reply = t
            .send(Method::POST, "/purchases", Some(token.as_str()), Some(purchase))
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn purchase_with_unknown_user_keeps_null() {
        let t = test_app();
        let token = t.signup().await;
        let album = t
            .state
            .store
            .create_album(AlbumFields {
                title: Some("Lonely".into()),
                ..Default::default()
            })
            .unwrap();

        let reply = t
            .send(
                Method::POST,
                "/purchases",
                Some(token.as_str()),
                Some(json!({"user": "41224d776a326fb40f000001", "album": album.id})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body["data"]["user"].is_null());
        assert_eq!(reply.body["data"]["album"]["title"], "Lonely");
    }

    #[tokio::test]
    async fn purchase_requires_both_references() {
        let t = test_app();
        let token = t.signup().await;

        let reply = t
            .send(
                Method::POST,
                "/purchases",
                Some(token.as_str()),
                Some(json!({"album": "a"})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["err"], "user field is required!");

        let reply = t
            .send(
                Method::POST,
                "/purchases",
                Some(token.as_str()),
                Some(json!({"user": "u", "album": ""})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["err"], "album field is required!");
    }

    #[tokio::test]
    async fn store_timeout_is_upstream_unavailable() {
        let mut t = test_app();
        t.state.store_timeout = Duration::ZERO;
        t.router = app(t.state.clone(), None);

        let reply = t.send(Method::GET, "/albums", None, None).await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body, json!({"error": "upstream unavailable"}));
    }

    #[tokio::test]
    async fn failed_store_task_is_upstream_unavailable() {
        let t = test_app();
        let result: Result<(), ApiError> =
            with_store(&t.state, |_store| panic!("store task blew up")).await;
        assert!(matches!(result, Err(ApiError::UpstreamUnavailable)));
    }

    #[tokio::test]
    async fn unsupported_method_on_guarded_path_is_not_allowed() {
        let t = test_app();
        let reply = t.send(Method::PATCH, "/albums/abc", None, None).await;
        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);

        let reply = t.send(Method::PUT, "/albums/abc", None, Some(json!({}))).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn legacy_tokens_authenticate() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        let state = AppState {
            store,
            sessions: SessionRegistry::new(crate::session::TokenFormat::Legacy),
            store_timeout: Duration::from_secs(5),
        };
        let t = TestApp {
            router: app(state.clone(), None),
            state,
            _dir: dir,
        };

        let token = t.signup().await;
        let digits = token.strip_prefix("Bearer ").unwrap();
        assert_eq!(digits.len(), 16);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));

        let reply = t
            .send(Method::POST, "/albums", Some(token.as_str()), Some(json!({"title": "L"})))
            .await;
        assert_eq!(reply.status, StatusCode::OK);
    }
}
