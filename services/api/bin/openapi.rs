use atc_api::router::ApiDoc;
use utoipa::OpenApi;

/// Writes the OpenAPI document to the path given as the first argument,
/// or `openapi.json` in the current directory.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    std::fs::write(&path, ApiDoc::openapi().to_pretty_json()?)?;
    println!("OpenAPI document written to {}", path);
    Ok(())
}
