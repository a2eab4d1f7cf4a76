//! Integration tests for the guardian core, driven through the public API

mod agent_rehydration;
mod coalescing;
mod fail_open;
mod mutual_exclusion;
mod quota_safety;
mod support;
