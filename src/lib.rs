//! Reporting over course-enrollment and discipline-progress exports:
//! enrollment and completion views, plus the engagement segmentation that
//! separates not-started, viewed-only and abandoned disciplines.

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod data;
pub mod errors;
pub mod export;
pub mod filter;
pub mod models;
pub mod report;
pub mod segmentation;
pub mod views;
