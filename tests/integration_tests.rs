//! Integration tests for the guardian core

mod integration;
