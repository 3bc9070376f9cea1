//! IMG.LY Inpainting CLI Tool
//!
//! Command-line interface for removing masked objects from images with the
//! imgly-inpaint library, using ONNX Runtime or Tract backends.

#[cfg(feature = "cli")]
use imgly_inpaint::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
