/// Answer ingestion and scoring.
pub mod answer_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Joining sessions and live standings.
pub mod participant_service;
/// Quiz import and question lookup.
pub mod quiz_service;
/// Final ranking computation and persistence.
pub mod ranking_service;
/// Player-facing question view, answer tallies and post-game reports.
pub mod report_service;
/// Session lifecycle driven by the controller.
pub mod session_service;
/// Server-Sent Events forwarding of the store change feed.
pub mod sse_service;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
