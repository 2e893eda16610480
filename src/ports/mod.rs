//! Ports Layer - Trait definitions for external collaborators
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Trade execution (entry and exit orders against a venue)
//! - Audit event publication

pub mod execution;
pub mod audit;
pub mod mocks;

pub use execution::{ExecutionPort, ExecutionError, execute_or_fail};
pub use audit::{AuditEvent, AuditSink, TracingAuditSink, NullAuditSink};
