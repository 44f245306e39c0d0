//! OpenGL driver.
//!
//! This crate implements [`arx_render::driver::Driver`] on top of a desktop OpenGL context,
//! compatibility profile, from 1.4 to 4.6. Bindings are generated at build time and loaded at
//! runtime with [`GLDriver::load_with`], using whatever procedure loader the windowing layer
//! provides.
//!
//! The driver does not check versions or extensions before issuing a call: the renderer only asks
//! for what its feature matrix allows.

mod driver;

#[allow(
  clippy::all,
  dead_code,
  missing_docs,
  non_camel_case_types,
  non_snake_case,
  non_upper_case_globals
)]
mod gl {
  include!(concat!(env!("OUT_DIR"), "/gl_bindings.rs"));
}

pub use crate::driver::{GLDriver, GLDriverError};
