//! Plan validation and execution.
//!
//! Data flows leaf-first: [`validator`] produces a typed
//! [`specification::Specification`], [`coordinator`] sequences its steps
//! through [`operations`], which compose SQL only via [`query`] and the
//! [`filters`] whitelist, and [`enricher`] writes the final text.

pub mod coordinator;
pub mod enricher;
pub mod filters;
pub mod operations;
pub mod planner;
pub mod query;
pub mod session;
pub mod specification;
pub mod validator;
