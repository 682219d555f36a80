use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth::{AuthenticatedUser, Gateway};
use crate::error::PlatformError;
use crate::questions::QuestionFilter;
use crate::rooms::store::Room;
use crate::rooms::{Coordinator, Matchmaker};

use super::websocket;

/// Rejection wrapper so platform errors surface as structured JSON replies.
#[derive(Debug)]
struct ApiRejection(PlatformError);

impl warp::reject::Reject for ApiRejection {}

fn reject(err: PlatformError) -> Rejection {
    warp::reject::custom(ApiRejection(err))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateInterviewRequest {
    question_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HandshakeQuery {
    token: Option<String>,
}

/// All interview REST routes plus the realtime upgrade endpoint.
pub fn interview_routes(
    gateway: Arc<Gateway>,
    matchmaker: Arc<Matchmaker>,
    coordinator: Arc<Coordinator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let create = warp::path!("api" / "interviews")
        .and(warp::post())
        .and(authenticated(gateway.clone()))
        .and(json_body::<CreateInterviewRequest>())
        .and(with_matchmaker(matchmaker.clone()))
        .and_then(create_interview);

    // Declared before the room-id route so "match" is not read as a room id.
    let match_route = warp::path!("api" / "interviews" / "match")
        .and(warp::get())
        .and(authenticated(gateway.clone()))
        .and(warp::query::<QuestionFilter>())
        .and(with_matchmaker(matchmaker.clone()))
        .and_then(match_interview);

    let join = warp::path!("api" / "interviews" / "join" / String)
        .and(warp::post())
        .and(authenticated(gateway.clone()))
        .and(with_matchmaker(matchmaker.clone()))
        .and_then(join_interview);

    let complete = warp::path!("api" / "interviews" / String / "complete")
        .and(warp::post())
        .and(authenticated(gateway.clone()))
        .and(with_matchmaker(matchmaker.clone()))
        .and_then(complete_interview);

    let get = warp::path!("api" / "interviews" / String)
        .and(warp::get())
        .and(authenticated(gateway.clone()))
        .and(with_matchmaker(matchmaker))
        .and_then(get_interview);

    let ws = websocket_route(gateway, coordinator);

    create
        .or(match_route)
        .or(join)
        .or(complete)
        .or(get)
        .or(ws)
}

pub fn health_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("health").and(warp::get()).map(|| {
        warp::reply::json(&json!({
            "status": "healthy",
            "service": "CodePair Server",
            "version": env!("CARGO_PKG_VERSION"),
        }))
    })
}

/// Realtime endpoint. The gateway runs before the upgrade is accepted, so
/// unauthenticated sockets never reach the coordinator.
fn websocket_route(
    gateway: Arc<Gateway>,
    coordinator: Arc<Coordinator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("ws")
        .and(warp::ws())
        .and(warp::header::optional::<String>("origin"))
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::query::<HandshakeQuery>())
        .and(with_gateway(gateway))
        .and(with_coordinator(coordinator))
        .and_then(
            |ws: warp::ws::Ws,
             origin: Option<String>,
             auth_header: Option<String>,
             query: HandshakeQuery,
             gateway: Arc<Gateway>,
             coordinator: Arc<Coordinator>| async move {
                // Token comes from the query string on the handshake; a
                // bearer header is accepted as a fallback.
                let token = query.token.or_else(|| {
                    auth_header
                        .as_deref()
                        .map(|h| h.strip_prefix("Bearer ").unwrap_or(h).to_string())
                });

                let user = gateway
                    .authenticate_handshake(origin.as_deref(), token.as_deref())
                    .await
                    .map_err(reject)?;

                Ok::<_, Rejection>(ws.on_upgrade(move |socket| {
                    websocket::handle_connection(socket, user, coordinator)
                }))
            },
        )
}

async fn create_interview(
    user: AuthenticatedUser,
    body: CreateInterviewRequest,
    matchmaker: Arc<Matchmaker>,
) -> Result<impl Reply, Rejection> {
    let room = matchmaker
        .create_room(&user.user_id, body.question_id.as_deref())
        .await
        .map_err(reject)?;
    Ok(room_reply(&room, StatusCode::CREATED))
}

async fn match_interview(
    user: AuthenticatedUser,
    filter: QuestionFilter,
    matchmaker: Arc<Matchmaker>,
) -> Result<impl Reply, Rejection> {
    let room = matchmaker
        .find_or_create_room(&user.user_id, &filter)
        .await
        .map_err(reject)?;
    Ok(room_reply(&room, StatusCode::OK))
}

async fn join_interview(
    room_id: String,
    user: AuthenticatedUser,
    matchmaker: Arc<Matchmaker>,
) -> Result<impl Reply, Rejection> {
    let room = matchmaker
        .join_room(&room_id, &user.user_id)
        .await
        .map_err(reject)?;
    Ok(room_reply(&room, StatusCode::OK))
}

async fn get_interview(
    room_id: String,
    user: AuthenticatedUser,
    matchmaker: Arc<Matchmaker>,
) -> Result<impl Reply, Rejection> {
    let room = matchmaker
        .get_room(&room_id, &user.user_id)
        .await
        .map_err(reject)?;
    Ok(room_reply(&room, StatusCode::OK))
}

async fn complete_interview(
    room_id: String,
    user: AuthenticatedUser,
    matchmaker: Arc<Matchmaker>,
) -> Result<impl Reply, Rejection> {
    let room = matchmaker
        .complete_room(&room_id, &user.user_id)
        .await
        .map_err(reject)?;
    Ok(room_reply(&room, StatusCode::OK))
}

fn room_reply(room: &Room, status: StatusCode) -> impl Reply {
    warp::reply::with_status(
        warp::reply::json(&json!({ "success": true, "data": room })),
        status,
    )
}

/// Map platform errors (and warp's own rejections) to the REST envelope.
pub async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(ApiRejection(err)) = rejection.find::<ApiRejection>() {
        (
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            err.to_string(),
        )
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if rejection.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid request body".to_string())
    } else if rejection.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query parameters".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        tracing::error!(?rejection, "Unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "success": false, "message": message })),
        status,
    ))
}

/// Bearer authentication for the REST surface.
fn authenticated(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (AuthenticatedUser,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_gateway(gateway))
        .and_then(
            |header: Option<String>, gateway: Arc<Gateway>| async move {
                gateway
                    .authenticate_bearer(header.as_deref())
                    .await
                    .map_err(reject)
            },
        )
}

/// Accept a JSON body, treating an absent body as the default request.
fn json_body<T: serde::de::DeserializeOwned + Default + Send>(
) -> impl Filter<Extract = (T,), Error = Infallible> + Clone {
    warp::body::json()
        .or(warp::any().map(T::default))
        .unify()
}

fn with_gateway(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (Arc<Gateway>,), Error = Infallible> + Clone {
    warp::any().map(move || gateway.clone())
}

fn with_matchmaker(
    matchmaker: Arc<Matchmaker>,
) -> impl Filter<Extract = (Arc<Matchmaker>,), Error = Infallible> + Clone {
    warp::any().map(move || matchmaker.clone())
}

fn with_coordinator(
    coordinator: Arc<Coordinator>,
) -> impl Filter<Extract = (Arc<Coordinator>,), Error = Infallible> + Clone {
    warp::any().map(move || coordinator.clone())
}
