//! mobile_release - Android and iOS release lanes.
//!
//! This binary validates the environment, materializes signing credentials,
//! builds, signs and uploads an app for one platform, or runs the read-only
//! pre-flight checks over the project tree.

use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match mobile_release::cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };

    process::exit(exit_code);
}
