//! End-to-end integration tests for the Perch alerting engine.
//!
//! These tests drive the real bus, engine and dispatcher together:
//! - Event-triggered rules, conditions and cooldowns
//! - Sustained metric thresholds and the built-in resource rules
//! - Bus delivery, handler isolation and shutdown draining
//! - Rule refresh, test fires and history retention

#![cfg(test)]
