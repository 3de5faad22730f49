//! Route handlers

pub mod camera;
pub mod media;
pub mod pages;
pub mod signaling;
pub mod status;
