use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Arena Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::matches::list_matches,
        crate::routes::matches::get_match,
        crate::routes::matches::get_match_by_code,
        crate::routes::matches::create_friend_match,
        crate::routes::matches::list_opponents,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::matches::MatchSummary,
            crate::dto::matches::CreateFriendMatchRequest,
            crate::dto::matches::CreateFriendMatchResponse,
            crate::dto::matches::OpponentView,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::AuthPayload,
            crate::dto::ws::DirectIdentity,
            crate::dto::ws::UserView,
            crate::dto::ws::PlayerView,
            crate::dto::ws::QuestionView,
            crate::dto::ws::OptionView,
            crate::dto::ws::PlayerResultView,
            crate::state::session::MatchKind,
            crate::state::session::MatchStatus,
            crate::state::session::Difficulty,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "matches", description = "Read-only match listings and friend match creation"),
        (name = "realtime", description = "WebSocket operations for match clients"),
    )
)]
pub struct ApiDoc;
