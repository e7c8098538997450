//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document of the catalog API to the path given as the
//! first argument, or to `openapi.json` in the current directory.

use std::path::{Path, PathBuf};

use api_lib::error::ApiError;
use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn write_document(doc: &utoipa::openapi::OpenApi, path: &Path) -> Result<(), ApiError> {
    let json = doc
        .to_pretty_json()
        .map_err(|e| ApiError::Internal(format!("Failed to serialize OpenAPI document: {}", e)))?;
    std::fs::write(path, json)?;
    Ok(())
}

fn main() -> Result<(), ApiError> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let doc = ApiDoc::openapi();
    write_document(&doc, &path)?;
    println!(
        "Wrote OpenAPI document with {} paths to {}",
        doc.paths.paths.len(),
        path.display()
    );
    Ok(())
}
