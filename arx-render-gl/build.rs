use gl_generator::*;
use std::env;
use std::fs::File;
use std::path::*;

fn main() {
  let dest = env::var("OUT_DIR").unwrap();
  let mut output = File::create(&Path::new(&dest).join("gl_bindings.rs")).unwrap();

  // fixed-function entry points only live in the compatibility profile
  Registry::new(
    Api::Gl,
    (4, 6),
    Profile::Compatibility,
    Fallbacks::All,
    [
      "GL_ARB_buffer_storage",
      "GL_ARB_map_buffer_range",
      "GL_ARB_sample_shading",
      "GL_ATI_meminfo",
      "GL_EXT_texture_filter_anisotropic",
      "GL_NV_fog_distance",
      "GL_NVX_gpu_memory_info",
    ],
  )
  .write_bindings(GlobalGenerator, &mut output)
  .unwrap();
}
