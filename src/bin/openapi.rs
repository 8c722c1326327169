use anyhow::Result;

/// Print the `OpenAPI` document for the served routes.
fn main() -> Result<()> {
    let doc = reelgate::api::openapi();
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
