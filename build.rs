use std::io::ErrorKind;
use std::path::Path;
use std::{fs, io};

const GENERATED_DIR: &str = "./generated/";
const ROUTE_PROTO: &str = "./protos/route.proto";

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed={}", ROUTE_PROTO);
    compile_route_proto()
}

// Emits `generated/route.rs`, included by `lib.rs`.
fn compile_route_proto() -> io::Result<()> {
    create_dir_if_missing(GENERATED_DIR)?;
    tonic_build::configure()
        .out_dir(GENERATED_DIR)
        .compile(&[ROUTE_PROTO], &["./protos/"])
}

fn create_dir_if_missing<P: AsRef<Path>>(path: P) -> io::Result<()> {
    match fs::create_dir(path) {
        Err(e) if e.kind() != ErrorKind::AlreadyExists => Err(e),
        _ => Ok(()),
    }
}
