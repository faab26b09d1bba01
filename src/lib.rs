//! ClipForge
//!
//! Core of a video frame workbench: capture stills from a video, keep them in
//! an ordered gallery, and run analysis, image generation and video
//! generation jobs against the Gemini / Veo API.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
