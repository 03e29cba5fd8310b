/// OpenAPI documentation generation.
pub mod documentation;
/// Language-model question drafting.
#[cfg(feature = "ai-generation")]
pub mod generation_service;
/// Health check service.
pub mod health_service;
/// Access PIN generation and normalisation.
pub mod pin;
/// Quiz import and lookup.
pub mod quiz_service;
/// Answer gating, recording and scoring.
pub mod response_service;
/// Leaderboard and statistics.
pub mod results_service;
/// Lobby membership and progress.
pub mod roster_service;
/// Points and per-participant tallies.
pub mod scoring;
/// Session row with its quiz, roster and responses.
pub mod session_board;
/// Session creation and lifecycle commands.
pub mod session_service;
/// Per-client live session views.
pub mod session_view;
/// Server-Sent Events encoding.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
