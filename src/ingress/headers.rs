use axum::http::HeaderMap;

/// Extract client IP from headers (supports common proxy headers)
pub fn get_client_ip(headers: &HeaderMap) -> Option<String> {
    // X-Forwarded-For lists the client first in a proxy chain
    if let Some(first) = header_str(headers, "x-forwarded-for")
        .and_then(|xff| xff.split(',').next().map(str::trim))
        .filter(|ip| !ip.is_empty())
    {
        return Some(first.to_string());
    }

    ["x-real-ip", "cf-connecting-ip", "true-client-ip"]
        .into_iter()
        .filter_map(|name| header_str(headers, name))
        .map(str::trim)
        .find(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Get the user agent string from headers
pub fn get_user_agent(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "user-agent")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Get the referrer URL from headers
pub fn get_referrer(headers: &HeaderMap) -> String {
    header_str(headers, "referer")
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
