//! Match clock, event generation, and repository ports for Matchday.
//!
//! This crate owns the per-minute simulation of a single match. It knows
//! nothing about transports: updates leave through a [`MinuteCallback`],
//! usually a [`ChannelSink`] drained by the broadcast layer.
//!
//! # Modules
//!
//! - [`config`] -- Simulation settings from the `simulation` section of
//!   `matchday-config.yaml`.
//! - [`generator`] -- Strength sampling, event decisions, and their
//!   effect on score and statistics.
//! - [`clock`] -- Batch and paced drivers, cancellation, minute callbacks.
//! - [`repository`] -- [`MatchRepository`] and [`StandingsUpdater`] ports
//!   with in-memory implementations.
//!
//! [`MinuteCallback`]: clock::MinuteCallback
//! [`ChannelSink`]: clock::ChannelSink
//! [`MatchRepository`]: repository::MatchRepository
//! [`StandingsUpdater`]: repository::StandingsUpdater

pub mod clock;
pub mod config;
pub mod generator;
pub mod repository;
