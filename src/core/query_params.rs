use std::collections::HashMap;

/// Parse query parameters from a URI string
///
/// Values are URL-decoded (`+` counts as a space). Repeated keys keep the
/// last value.
///
/// # Example
/// ```
/// use trellis::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/postcard?text=Order%20%2342");
/// assert_eq!(params.get("text"), Some(&"Order #42".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query_start) = uri.find('?') {
        let query = &uri[query_start + 1..];
        for param in query.split('&').filter(|p| !p.is_empty()) {
            if let Some(eq_idx) = param.find('=') {
                let key = &param[..eq_idx];
                let encoded_value = param[eq_idx + 1..].replace('+', " ");
                let decoded = urlencoding::decode(&encoded_value)
                    .map(|v| v.into_owned())
                    .unwrap_or(encoded_value.clone());
                params.insert(key.to_string(), decoded);
            } else {
                // Flag parameter without value
                params.insert(param.to_string(), String::new());
            }
        }
    }

    params
}

/// Get a string parameter from parsed query params with optional default
pub fn get_string(params: &HashMap<String, String>, key: &str, default: Option<&str>) -> Option<String> {
    params
        .get(key)
        .cloned()
        .or_else(|| default.map(|d| d.to_string()))
}
