use std::fs;
use std::path::PathBuf;

fn dockerfile() -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../Dockerfile");
    fs::read_to_string(&path).expect("read Dockerfile")
}

#[test]
fn image_builds_against_the_lock_file() {
    let dockerfile = dockerfile();
    let lines: Vec<&str> = dockerfile.lines().map(str::trim).collect();

    assert!(
        lines.contains(&"COPY Cargo.toml Cargo.lock ./"),
        "Cargo.lock must be copied into the build stage:\n{dockerfile}"
    );
    let build = lines
        .iter()
        .find(|line| line.starts_with("RUN cargo build"))
        .expect("cargo build step");
    assert!(build.contains("--locked"), "build must not re-resolve: {build}");
    assert!(build.contains("-p xetra"), "build must target the job: {build}");
}

#[test]
fn image_runs_the_job_with_the_bundled_config() {
    let dockerfile = dockerfile();
    assert!(dockerfile.contains("ENV XETRA_CONFIG=/app/config/xetra_report1.toml"));
    assert!(
        dockerfile.contains("COPY xetra/config/xetra_report1.toml ./config/xetra_report1.toml")
    );
    assert!(dockerfile.contains(r#"ENTRYPOINT ["xetra"]"#));
}
