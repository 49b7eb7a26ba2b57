//! Movies-related HTTP API.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::routing::{MethodRouter, get};
use axum::{Json, Router, middleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, ServerError};
use crate::movie::{Filters, Metadata, Movie, MovieDraft, MoviePatch};
use crate::router::{RecordId, Valid, read_json};
use crate::user::{MOVIES_READ, MOVIES_WRITE};
use crate::{AppState, middleware as guard};

/// Optional header carrying the version the client last saw.
pub const EXPECTED_VERSION: &str = "x-expected-version";

#[derive(Debug, Serialize, Deserialize)]
pub struct MovieEnvelope {
    pub movie: Movie,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MovieList {
    pub metadata: Metadata,
    pub movies: Vec<Movie>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

/// Wrap a method router in a permission check when authentication is on.
fn guarded(
    state: &AppState,
    route: MethodRouter<AppState>,
    permission: &'static str,
) -> MethodRouter<AppState> {
    if state.config.require_authentication {
        route.route_layer(middleware::from_fn_with_state(
            (state.clone(), permission),
            guard::require_permission,
        ))
    } else {
        route
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/v1/movies",
            guarded(state, get(list), MOVIES_READ)
                .merge(guarded(state, axum::routing::post(create), MOVIES_WRITE)),
        )
        .route(
            "/v1/movies/{id}",
            guarded(state, get(show), MOVIES_READ).merge(guarded(
                state,
                axum::routing::patch(update).delete(delete),
                MOVIES_WRITE,
            )),
        )
}

/// `GET /v1/movies`.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<MovieList>> {
    let filters = Filters::parse(&query, &state.config.limits)?;
    let (movies, metadata) = state.db.movies.list(&filters).await?;

    Ok(Json(MovieList { metadata, movies }))
}

/// `POST /v1/movies`.
pub async fn create(
    State(state): State<AppState>,
    Valid(draft): Valid<MovieDraft>,
) -> Result<(StatusCode, HeaderMap, Json<MovieEnvelope>)> {
    let movie = state.db.movies.insert(&draft.into_new()?).await?;

    let mut headers = HeaderMap::new();
    let location = HeaderValue::try_from(format!("/v1/movies/{}", movie.id))
        .map_err(|err| ServerError::internal(err.to_string()))?;
    headers.insert(header::LOCATION, location);

    tracing::debug!(movie_id = movie.id, "movie created");
    Ok((StatusCode::CREATED, headers, Json(MovieEnvelope { movie })))
}

/// `GET /v1/movies/{id}`.
pub async fn show(
    State(state): State<AppState>,
    RecordId(id): RecordId,
) -> Result<Json<MovieEnvelope>> {
    let movie = state.db.movies.get(id).await?;

    Ok(Json(MovieEnvelope { movie }))
}

/// `PATCH /v1/movies/{id}`.
pub async fn update(
    State(state): State<AppState>,
    RecordId(id): RecordId,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<MovieEnvelope>> {
    let mut movie = state.db.movies.get(id).await?;

    if let Some(expected) = headers.get(EXPECTED_VERSION) {
        if expected.to_str().ok() != Some(movie.version.to_string().as_str()) {
            return Err(ServerError::EditConflict);
        }
    }

    let patch: MoviePatch = read_json(&body?)?;
    let draft = patch.merge(&movie)?;
    draft.validate()?;
    movie.apply(draft)?;

    let movie = state.db.movies.update(&movie).await?;

    tracing::debug!(movie_id = movie.id, version = movie.version, "movie updated");
    Ok(Json(MovieEnvelope { movie }))
}

/// `DELETE /v1/movies/{id}`.
pub async fn delete(
    State(state): State<AppState>,
    RecordId(id): RecordId,
) -> Result<Json<Message>> {
    state.db.movies.delete(id).await?;

    Ok(Json(Message {
        message: "movie successfully deleted".into(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::{Value, json};

    use super::*;
    use crate::config::Configuration;
    use crate::router::tests::{json as body, seed, state};
    use crate::{app, make_request};

    async fn seeded() -> (AppState, Router) {
        let (state, _) = state(Configuration::default());
        seed(&state).await;
        let app = app(state.clone());
        (state, app)
    }

    #[tokio::test]
    async fn test_list_movies() {
        let (_, app) = seeded().await;
        let response = make_request(app, Method::GET, "/v1/movies", None, String::new()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let list: MovieList = body(response).await;
        assert_eq!(list.metadata.total_records, 3);
        assert_eq!(list.metadata.last_page, 1);
        assert_eq!(list.metadata.first_page, 1);
        assert_eq!(list.movies[0].title, "Fight Club");
    }

    #[tokio::test]
    async fn test_list_is_idempotent() {
        let (_, app) = seeded().await;
        let uri = "/v1/movies?sort=-runtime&page_size=2";

        let first = make_request(app.clone(), Method::GET, uri, None, String::new()).await;
        let second = make_request(app, Method::GET, uri, None, String::new()).await;

        let first: Value = body(first).await;
        let second: Value = body(second).await;
        assert_eq!(first, second);
        assert_eq!(first["movies"][0]["title"], "BladeRunner 2049");
        assert_eq!(first["metadata"]["last_page"], 2);
    }

    #[tokio::test]
    async fn test_list_validation() {
        let (_, app) = seeded().await;

        for (uri, field, message) in [
            ("/v1/movies?sort=23", "sort", "invalid sort value"),
            ("/v1/movies?page=l", "page", "must be an integer value"),
            ("/v1/movies?page_size=1000", "page_size", "must be a maximum of 100"),
        ] {
            let response =
                make_request(app.clone(), Method::GET, uri, None, String::new()).await;
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");

            let error: Value = body(response).await;
            assert_eq!(error["error"][field], message, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_list_empty_parameters() {
        let (_, app) = seeded().await;
        let response = make_request(
            app,
            Method::GET,
            "/v1/movies?page=&page_size=&sort=",
            None,
            String::new(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let list: MovieList = body(response).await;
        assert_eq!(list.metadata.current_page, 1);
        assert_eq!(list.metadata.page_size, 20);
        assert_eq!(list.movies[0].id, 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_beyond_last_page() {
        let (_, app) = seeded().await;

        let response = make_request(
            app.clone(),
            Method::GET,
            "/v1/movies?genres=Ryan,Gosling&title=dri",
            None,
            String::new(),
        )
        .await;
        let list: MovieList = body(response).await;
        assert_eq!(list.movies.len(), 1);
        assert_eq!(list.movies[0].title, "Drive");

        let response =
            make_request(app, Method::GET, "/v1/movies?page=5", None, String::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let list: MovieList = body(response).await;
        assert!(list.movies.is_empty());
        assert_eq!(list.metadata.current_page, 5);
        assert_eq!(list.metadata.total_records, 3);
    }

    #[tokio::test]
    async fn test_show_movie() {
        let (_, app) = seeded().await;

        let response =
            make_request(app.clone(), Method::GET, "/v1/movies/2", None, String::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let envelope: MovieEnvelope = body(response).await;
        assert_eq!(envelope.movie.title, "Drive");
        assert_eq!(envelope.movie.version, 0);

        for id in ["42", "-1", "1.23", "foo", "0", "%FF"] {
            let uri = format!("/v1/movies/{id}");
            let response =
                make_request(app.clone(), Method::GET, &uri, None, String::new()).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");

            let error: Value = body(response).await;
            assert_eq!(error["error"], "the requested resource could not be found");
        }
    }

    #[tokio::test]
    async fn test_create_movie() {
        let (state, app) = seeded().await;
        let payload = json!({
            "title": "Moana",
            "year": 2016,
            "runtime": "107 mins",
            "genres": ["animation", "adventure"],
        });

        let response =
            make_request(app, Method::POST, "/v1/movies", None, payload.to_string()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::LOCATION], "/v1/movies/4");

        let envelope: MovieEnvelope = body(response).await;
        assert_eq!(envelope.movie.id, 4);
        assert_eq!(envelope.movie.version, 0);
        assert_eq!(state.db.movies.get(4).await.unwrap().title, "Moana");
    }

    #[tokio::test]
    async fn test_create_movie_failures() {
        let (_, app) = seeded().await;

        let cases = [
            (r#"{"title":"Moana","year":2016,"runtime":"107 mins","genres":["a"]} x"#, StatusCode::BAD_REQUEST),
            (r#"{"title":"Moana","year":"2016"}"#, StatusCode::BAD_REQUEST),
            (r#"{"title":"Moana","rating":5}"#, StatusCode::BAD_REQUEST),
            ("", StatusCode::BAD_REQUEST),
            (r#"{"title":"","year":2016,"runtime":"107 mins","genres":["a"]}"#, StatusCode::UNPROCESSABLE_ENTITY),
            (r#"{"title":"Moana","year":1500,"runtime":"107 mins","genres":["a"]}"#, StatusCode::UNPROCESSABLE_ENTITY),
            (r#"{"title":"Moana","year":2016,"runtime":"107","genres":["a"]}"#, StatusCode::UNPROCESSABLE_ENTITY),
            (r#"{"title":"Moana","year":2016,"runtime":"107 mins","genres":[]}"#, StatusCode::UNPROCESSABLE_ENTITY),
            ("{}", StatusCode::UNPROCESSABLE_ENTITY),
        ];

        for (payload, status) in cases {
            let response =
                make_request(app.clone(), Method::POST, "/v1/movies", None, payload.into()).await;
            assert_eq!(response.status(), status, "{payload}");
        }
    }

    #[tokio::test]
    async fn test_update_movie() {
        let (_, app) = seeded().await;

        let response = make_request(
            app.clone(),
            Method::PATCH,
            "/v1/movies/1",
            None,
            json!({ "title": "Fight Club 2", "runtime": "140 mins" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let envelope: MovieEnvelope = body(response).await;
        assert_eq!(envelope.movie.title, "Fight Club 2");
        assert_eq!(envelope.movie.runtime.to_string(), "140 mins");
        assert_eq!(envelope.movie.year, 1994);
        assert_eq!(envelope.movie.version, 1);
    }

    #[tokio::test]
    async fn test_update_movie_failures() {
        let (_, app) = seeded().await;

        let cases = [
            ("/v1/movies/1", r#"{"runtime":"140"}"#, StatusCode::UNPROCESSABLE_ENTITY),
            ("/v1/movies/1", r#"{"year":234245}"#, StatusCode::UNPROCESSABLE_ENTITY),
            ("/v1/movies/1", r#"{"title":null}"#, StatusCode::UNPROCESSABLE_ENTITY),
            ("/v1/movies/1", r#"{"title":"x"#, StatusCode::BAD_REQUEST),
            ("/v1/movies/1", r#"{"title":1}"#, StatusCode::BAD_REQUEST),
            ("/v1/movies/42", r#"{"title":"x"}"#, StatusCode::NOT_FOUND),
            ("/v1/movies/1.23", r#"{"title":"x"}"#, StatusCode::NOT_FOUND),
            ("/v1/movies/-1", r#"{"title":"x"}"#, StatusCode::NOT_FOUND),
            ("/v1/movies/%FF", r#"{"title":"x"}"#, StatusCode::NOT_FOUND),
        ];

        for (uri, payload, status) in cases {
            let response =
                make_request(app.clone(), Method::PATCH, uri, None, payload.into()).await;
            assert_eq!(response.status(), status, "{uri} {payload}");
        }
    }

    #[tokio::test]
    async fn test_update_conflicts() {
        let (state, app) = seeded().await;

        // a client that read version 0 loses against a newer write.
        let stale = state.db.movies.get(1).await.unwrap();
        make_request(
            app.clone(),
            Method::PATCH,
            "/v1/movies/1",
            None,
            json!({ "year": 1999 }).to_string(),
        )
        .await;
        assert!(matches!(
            state.db.movies.update(&stale).await,
            Err(crate::database::StoreError::EditConflict)
        ));

        let request = axum::http::Request::builder()
            .method(Method::PATCH)
            .uri("/v1/movies/1")
            .header(header::CONTENT_TYPE, "application/json")
            .header(EXPECTED_VERSION, "0")
            .body(axum::body::Body::from(json!({ "year": 2000 }).to_string()))
            .unwrap();
        let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let error: Value = body(response).await;
        assert_eq!(
            error["error"],
            "unable to update the record due to an edit conflict, please try again"
        );
    }

    #[tokio::test]
    async fn test_delete_movie_twice() {
        let (_, app) = seeded().await;

        let response =
            make_request(app.clone(), Method::DELETE, "/v1/movies/1", None, String::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let message: Message = body(response).await;
        assert_eq!(message.message, "movie successfully deleted");

        let response =
            make_request(app.clone(), Method::DELETE, "/v1/movies/1", None, String::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response =
            make_request(app, Method::DELETE, "/v1/movies/%FF", None, String::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
    }
}
