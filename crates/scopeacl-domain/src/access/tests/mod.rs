//! Tests for the access control service.
//!
//! Organized by functionality:
//! - Hierarchy walk and role checks
//! - Super-admin handling
//! - Cache coherency, invalidation and concurrent misses
//! - Policy dispatch

mod mocks;

mod cache_tests;
mod policy_tests;
