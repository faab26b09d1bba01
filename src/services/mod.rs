pub mod backend;
pub mod capture;
pub mod credential;
pub mod gallery;
pub mod gemini;
pub mod generation;
pub mod jobs;
pub mod video_store;
