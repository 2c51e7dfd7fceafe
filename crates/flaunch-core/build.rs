/// flaunch-core build script
///
/// Generates the `flaunch.ScriptEngine` messages and service stubs from
/// proto/flaunch.proto. protoc comes from protoc-bin-vendored, together with
/// the well-known types that `google/protobuf/empty.proto` lives in.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protoc = protoc_bin_vendored::protoc_bin_path().map_err(|e| e.to_string())?;
    let well_known = protoc_bin_vendored::include_path().map_err(|e| e.to_string())?;
    std::env::set_var("PROTOC", protoc);

    tonic_build::configure().compile_protos(
        &["proto/flaunch.proto"],
        &[std::path::PathBuf::from("proto"), well_known],
    )?;
    Ok(())
}
