use prost::Message;
use std::env::var;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto");

    // Services
    let proto_files = &[
        "echo/echo.proto",
        "counter/counter.proto",
        "greet/greet.proto",
    ];

    // protox keeps the fixture buildable without a system `protoc`.
    let mut compiler = protox::Compiler::new(["proto"])?;
    compiler.include_imports(true);
    for file in proto_files {
        compiler.open_file(file)?;
    }
    let fds = compiler.file_descriptor_set();

    let out_dir = PathBuf::from(var("OUT_DIR")?);
    std::fs::write(out_dir.join("descriptors.bin"), fds.encode_to_vec())?;

    tonic_prost_build::configure()
        .build_client(false)
        .build_server(true)
        .compile_fds(fds)?;

    Ok(())
}
