// src/engine/mod.rs

//! Assessment submission and grading engine.
//!
//! `gate` decides whether an attempt may start or be submitted, `grading` scores responses,
//! `analytics` rolls up finalized attempts and `lifecycle` drives an attempt through the store.

pub mod analytics;
pub mod gate;
pub mod grading;
pub mod lifecycle;
