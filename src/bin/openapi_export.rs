// Prints the OpenAPI document to stdout
// Usage: cargo run --bin openapi_export > openapi.json

use api_error::api::openapi::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let doc = ApiDoc::openapi()
        .to_pretty_json()
        .map_err(|e| anyhow::anyhow!("Failed to render OpenAPI document: {}", e))?;
    println!("{}", doc);
    Ok(())
}
