use std::env;
use std::path::PathBuf;

use tradedesk::generate_openapi_json;

fn main() {
    let output_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("openapi.json"));

    if let Err(e) = generate_openapi_json(&output_path) {
        eprintln!("✗ Failed to write the OpenAPI document: {}", e);
        std::process::exit(1);
    }

    println!("✓ Config API description written to {}", output_path.display());
    println!("  Import it into an API client or feed it to a client generator.");
}
