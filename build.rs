//! Generates the `ModelDiscovery` gRPC client from `proto/model_discovery.proto`.
//!
//! The generated code is vendored into `src/compute/generated.rs` so that a
//! checkout builds without `protoc` installed (CI and contributor machines
//! both skip the toolchain). To regenerate after editing the proto:
//! - Uncomment the `tonic_build` call below.
//! - Run `cargo build`.
//! - Comment the call back out and commit the regenerated file.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // tonic_build::configure()
    //     .build_server(false)
    //     .out_dir("src/compute")
    //     .compile_protos(&["proto/model_discovery.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/model_discovery.proto");
    Ok(())
}
