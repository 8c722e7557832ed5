/// OpenAPI documentation generation.
pub mod documentation;
/// Year correction and trivia lookups.
pub mod enrichment;
/// Health check service.
pub mod health_service;
/// Match operations: load, apply a rule, write back fenced on the version read.
pub mod match_service;
/// Background poller that reveals pending guesses.
pub mod reveal_watcher;
/// Store connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Playable track sources.
pub mod track_supply;
