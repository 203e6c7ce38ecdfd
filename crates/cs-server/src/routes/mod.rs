//! Route handlers for the HTTP API.

pub mod health;
pub mod images;
pub mod playback;
pub mod proxy;
pub mod stream;
pub mod timeline;
pub mod transcode;
pub mod watched;
