// src/handlers/mod.rs

pub mod assessment;
pub mod attempt;
pub mod auth;
pub mod course;
pub mod enrollment;
