//! Gradsniper - Graduation Signal Scoring and Position Lifecycle Engine
//!
//! Scores tokens approaching bonding-curve graduation and runs each entered
//! position through a momentum-adaptive exit state machine.
//!
//! # Modules
//!
//! - `domain`: Core types (MarketSnapshot, Position, intents, risk presets)
//! - `strategy`: Scoring, sizing, momentum classification, exit rules, slippage
//! - `ports`: Trait abstractions (ExecutionPort, AuditSink)
//! - `application`: Lifecycle manager, retry policy and intent dispatcher
//! - `adapters`: Paper execution venue and CLI
//! - `config`: Configuration loading and validation

pub mod domain;
pub mod strategy;
pub mod ports;
pub mod application;
pub mod adapters;
pub mod config;
