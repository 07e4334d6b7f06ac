use std::env;

const LIB_NAME: &str = "stackswap";

fn main() {
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap();
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap();

    let asm_file = match (arch.as_str(), os.as_str()) {
        ("x86_64", "windows") => "src/asm/x86_64_win.S",
        ("x86_64", _) => "src/asm/x86_64_sysv.S",
        _ => panic!("no context switch routine for target arch `{}`", arch),
    };

    let mut build = cc::Build::new();
    build.file(asm_file);
    if env::var_os("CARGO_FEATURE_UNWIND_FRAMES").is_some() {
        build.define("UNWIND_FRAMES", None);
    }
    build.compile(LIB_NAME);

    println!("cargo:rerun-if-changed={}", asm_file);
}
