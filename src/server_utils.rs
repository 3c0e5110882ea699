const MAX_USER_ID_LEN: usize = 128;

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn parse_bearer_token(header: Option<&str>) -> Option<String> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Accepts ids made of ASCII letters, digits, `-` and `_`.
pub fn sanitize_user_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_USER_ID_LEN {
        return None;
    }
    let valid = trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    valid.then(|| trimmed.to_string())
}
