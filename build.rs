//! Build script for harbor-mcp.
//!
//! Only handles what is necessary for the crate build process.

fn main() {
    // Tell Cargo to rerun if important files change
    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=Cargo.toml");

    // Only print version information during build
    println!(
        "cargo:rustc-env=HARBOR_MCP_VERSION={}",
        env!("CARGO_PKG_VERSION")
    );
}
