//! # journey-agent-core
//!
//! Shared, I/O-free logic for journey-agent: the journey record model and
//! validator, the layered text extractor (heuristic → fallback → LLM
//! refinement), the character-window chunker used by ingestion, and the
//! typed search criteria for the remote strategy backend.
//!
//! This crate contains no tokio, HTTP, filesystem, or database
//! dependencies. The extraction pipeline is a pure function of its input
//! text; the only external touch point is the optional [`extract::Complete`]
//! callable supplied by the caller for refinement.

pub mod chunk;
pub mod criteria;
pub mod extract;
pub mod record;
