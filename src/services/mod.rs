/// Scripted AI opponent scheduling.
pub mod ai_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Match coordinator: session lifecycle, scoring, and round advancement.
pub mod match_service;
/// Session store connection supervision.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
