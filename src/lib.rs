//! Documentation healing: near-duplicate consolidation, broken-link repair and
//! stale timestamp or command detection.
//!
//! Markdown trees are split into content blocks, fingerprinted with SimHash and
//! banded into candidate buckets; only bucketed pairs are compared exactly. Broken
//! local links are matched against a filename index. Every fix becomes a
//! [`edit::ProposedEdit`] scored by the confidence policy, and the
//! [`apply::MutationApplier`] writes them back by locating each edit's text again
//! rather than trusting its recorded line.

pub mod apply;
pub mod blocks;
pub mod bucket;
pub mod cache;
pub mod confidence;
pub mod config;
pub mod duplicates;
pub mod edit;
pub mod error;
pub mod fingerprint;
pub mod git;
pub mod healer;
pub mod index;
pub mod links;
pub mod logging;
pub mod orchestrator;
pub mod persist;
pub mod report;
pub mod similarity;
pub mod staleness;
pub mod walk;

pub use error::{DocHealError, Result};
