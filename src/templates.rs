use rust_embed::RustEmbed;
use spin_sdk::http::{Request, Response};

use crate::core::errors::{ApiError, ApiResult};
use crate::core::query_params::{get_string, parse_query_params};
use crate::filters::apply_filter;

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

fn load_template(name: &str) -> Result<String, ApiError> {
    let file = Templates::get(name)
        .ok_or_else(|| ApiError::InternalError(format!("Template {} not found", name)))?;
    String::from_utf8(file.data.to_vec())
        .map_err(|e| ApiError::InternalError(format!("Template {} is not UTF-8: {}", name, e)))
}

/// Renders `text` into the postcard template: escaped, then digits localized.
pub fn render_postcard(text: &str) -> Result<String, ApiError> {
    let template = load_template("postcard.html")?;
    let escaped = html_escape::encode_text(text);
    let localized = apply_filter("topersian", &escaped)
        .ok_or_else(|| ApiError::InternalError("topersian filter missing".to_string()))?;
    Ok(template.replace("POSTCARD_TEXT", &localized))
}

/// `GET /postcard?text=...`
pub fn handle_postcard(req: &Request) -> ApiResult {
    let params = parse_query_params(&req.uri());
    let text = get_string(&params, "text", Some("")).unwrap_or_default();

    let html = render_postcard(&text)?;
    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.into_bytes())
        .build())
}
