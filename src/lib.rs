// SPDX-License-Identifier: GPL-3.0-only

//! Camera Engine - picture and video capture over two camera APIs
//!
//! This library drives a camera through either a synchronous legacy API or an
//! asynchronous session-based API behind one facade, and hands the resulting
//! files to the host application.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera session backends and the orientation sensor
//! - [`flow`]: Capture screen controller (buttons, gestures, product list)
//! - [`pipelines`]: Picture encoding and video recording
//! - [`config`]: User configuration handling
//! - [`storage`]: Output file naming and thumbnail paths
//!
//! # Example
//!
//! ```ignore
//! let sim = SimPlatform::standard();
//! let engine = CameraEngine::new(sim.full_platform(), Config::default(), listener)?;
//! engine.resume()?;
//! engine.open(1920, 1080);
//! engine.take_picture();
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flow;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{CameraEngine, CameraListener};
pub use config::{CameraMode, CaptureOptions, Config};
pub use errors::{CameraError, CameraResult};
pub use flow::{CaptureFlow, FlowResult, Product};
