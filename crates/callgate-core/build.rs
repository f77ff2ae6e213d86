//! Build script for callgate-core
//!
//! Checks the toolchain before compilation:
//! - Minimum Rust version (1.76.0, for `Result::inspect_err`)
//! - Targets without a native call dispatcher get a warning

fn main()
{
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 76, 0);

        if rustc_version < min_rust_version {
            panic!(
                "callgate-core requires Rust {} or newer, found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    check_dispatch_support();
}

fn check_dispatch_support()
{
    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    let supported = match arch.as_str() {
        "x86_64" => os != "windows",
        "aarch64" | "x86" => true,
        _ => false,
    };
    if !supported {
        println!("cargo:warning=callgate-core has no native call dispatcher for {arch}-{os}; calls will fail with UnsupportedSignature");
    }
}
