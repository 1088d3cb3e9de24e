//! skillpay - LemonSqueezy webhook ingestion and subscription reconciliation
//!
//! Verifies and audits provider webhooks, keeps local users, plans and
//! subscriptions in step with the billing provider, and exposes the
//! provider's pricing and customer portal.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod payments;
