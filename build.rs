fn main() {
  prost_build::compile_protos(&["wire/control.proto"], &["wire/"])
    .expect("failed to compile control-plane protobuf schema");
}
