fn main() {
    // Emits built.rs (version, profile, git commit) into OUT_DIR for `built_info`.
    if let Err(err) = built::write_built_file() {
        panic!("Failed to acquire build-time information: {err}");
    }
}
