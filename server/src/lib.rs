//! todolist server - GitHub-backed task API with reminder delivery.
//!
//! This crate provides the HTTP side of todolist, responsible for:
//! - Storing tasks as YAML files in a GitHub repository
//! - Filtering, sorting and paginating task listings
//! - Feeding task reminders into the in-process reminder engine
//!
//! # Architecture
//!
//! Requests are handled by [`routes`] on top of a [`store::TaskStore`],
//! which pairs the pure task operations in [`tasks`] with the repository
//! calls of [`github::GitHubClient`]. Every task write re-ingests that
//! task's reminders; the queue itself lives in `todolist_reminders`.

pub mod auth;
pub mod config;
pub mod error;
pub mod github;
pub mod routes;
pub mod store;
pub mod tasks;
