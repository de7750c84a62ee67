use std::process::Command;

fn main() {
    // get git commit
    let command = Command::new("git").args(["rev-parse", "HEAD"]).output();
    let commit = match command {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        // e.g. build from a source tarball, just show empty string
        _ => "".to_string(),
    };
    println!("cargo:rustc-env=GIT_COMMIT={commit}");
}
