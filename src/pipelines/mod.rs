// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines for photo and video capture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ JPEG buffer  │ ──▶ │  Photo Pipeline   │ ──▶ │  JPEG File   │
//! │              │     │  - Mirroring      │     │  + thumbnail │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Session      │ ──▶ │  Video Pipeline   │ ──▶ │   MP4 File   │
//! │ surface      │     │  - Media recorder │     │  + thumbnail │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`photo`]: Picture saving and thumbnail encoding
//! - [`video`]: Media recorder lifecycle

pub mod photo;
pub mod video;
