use std::{env, fs, path::PathBuf};

// Ship settings.json next to the compiled binary so `cargo run` and the
// release artifact both find their config in the working directory.
fn main() {
    println!("cargo:rerun-if-changed=settings.json");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let target_dir = out_dir.ancestors().nth(3).unwrap();

    if let Err(e) = fs::copy("settings.json", target_dir.join("settings.json")) {
        println!("cargo:warning=settings.json not copied: {e}");
    }
}
