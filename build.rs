fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Vendored protoc so the build does not depend on a system toolchain.
    let protoc = protoc_bin_vendored::protoc_bin_path()?;
    unsafe {
        std::env::set_var("PROTOC", protoc);
    }

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["proto/route_guide.proto", "proto/helloworld.proto"],
            &["proto/"],
        )?;
    Ok(())
}
