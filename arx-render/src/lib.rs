//! # Capability negotiation and render-state reconciliation
//!
//! This crate is the backend-agnostic half of a fixed-function OpenGL renderer. Fixed-function
//! OpenGL comes in many flavours: desktop contexts from 1.4 to 4.6, OpenGL ES 1.x contexts, and a
//! long tail of extensions, driver bugs and platform quirks in between. Rather than sprinkling
//! version checks all over the rendering code, the crate splits the problem in layers:
//!
//! - **Probe** ([`gl_info`]): read the version, vendor, renderer and extension list of the
//!   current context, then apply built-in quirks and user-provided overrides (`+GL_X`, `-GL_X`,
//!   version tokens) on top of them.
//! - **Feature matrix** ([`features`]): derive, once per context, a flat set of booleans from
//!   the probe. Every optional code path is gated by one of them.
//! - **Buffer strategies** ([`buffer`]): pick how each vertex buffer uploads its data, from
//!   persistent mappings down to client-side shadow copies.
//! - **State cache** ([`state`]): keep the render state requested by draw-call producers apart
//!   from the one the driver has, and only send the difference. Alpha cutouts interact with
//!   blending and multisampling; [`alpha_cutout`] holds the decision table.
//! - **Transform cache** ([`transform`]) and **texture stages** ([`texture_stage`]): avoid
//!   redundant matrix uploads, combiner and binding changes.
//! - **Lifecycle** ([`renderer`]): initialization, re-initialization after a context loss and
//!   shutdown, with listeners recreating their resources.
//!
//! The graphics API itself sits behind the [`driver::Driver`] trait. The `arx-render-gl` crate
//! implements it for real contexts; [`driver::headless`] implements it without a GPU, recording
//! every call, which is what the tests of this crate run against.
//!
//! # Feature flags
//!
//! - `serde`: `Serialize` / `Deserialize` implementations for the configuration types.
//!
//! # Threading
//!
//! Nothing in here is thread-safe. A renderer must stay on the thread owning its context.

pub mod alpha_cutout;
pub mod blending;
pub mod buffer;
pub mod config;
pub mod driver;
pub mod features;
pub mod gl_info;
pub mod image;
pub mod platform;
pub mod render_state;
pub mod renderer;
pub mod state;
pub mod texture;
pub mod texture_stage;
pub mod transform;
pub mod vertex;

pub use crate::config::RendererConfig;
pub use crate::renderer::{Rect, Renderer, RendererError, RendererListener};
