fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true) // Enable clients for integration tests
        .compile_protos(
            &[
                "proto/envoy/service/ext_proc/v3/external_processor.proto",
                "proto/directory/v1/directory.proto",
            ],
            &["proto"],
        )?;
    Ok(())
}
