//! Adaptive transcoding core for slide-deck media.
//!
//! Takes media streams extracted from presentation documents and turns
//! each into a single web-playable artifact: probe with ffprobe, bound
//! oversized sources with a fast pre-resize, optionally scale, then run
//! a hardware-first encode cascade that degrades to software and finally
//! to keeping the source encoding. Everything a run writes lives under
//! one media directory, and exactly one file per item survives.

pub mod config;
pub mod media;
pub mod transcode;
