// src/models/mod.rs

pub mod assessment;
pub mod attempt;
pub mod course;
pub mod enrollment;
pub mod user;
