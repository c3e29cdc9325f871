//! Sanitize vendor error bodies before they enter error values: scrub
//! credential-like tokens and truncate to a bounded length.

const MAX_ERROR_BODY_CHARS: usize = 300;

/// Prefixes of credential formats used by the supported vendors.
const SECRET_PREFIXES: [&str; 5] =
    ["sk-", "xai-", "AIza", "access_token=", "client_secret="];

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn secret_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Replace credential-like tokens with `[REDACTED]`.
pub fn scrub_secrets(input: &str) -> String {
    let mut scrubbed = input.to_string();
    for prefix in SECRET_PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };
            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = secret_end(&scrubbed, content_start);

            // A bare prefix carries nothing worth hiding.
            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }
    scrubbed
}

/// Scrub and truncate a vendor error body.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secrets(input);
    if scrubbed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return scrubbed;
    }
    let mut end = MAX_ERROR_BODY_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &scrubbed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubs_openai_style_keys() {
        let out = scrub_secrets("invalid key sk-proj-abc123 supplied");
        assert_eq!(out, "invalid key [REDACTED] supplied");
    }

    #[test]
    fn scrubs_query_embedded_tokens() {
        let out = scrub_secrets("url was /chat?access_token=24.abcDEF123 rejected");
        assert_eq!(out, "url was /chat?[REDACTED] rejected");
    }

    #[test]
    fn scrubs_client_secrets_in_query_strings() {
        let out = scrub_secrets("token url ?client_id=k&client_secret=s3cr3t failed");
        assert_eq!(out, "token url ?client_id=k&[REDACTED] failed");
    }

    #[test]
    fn scrubs_multiple_tokens() {
        let out = scrub_secrets("sk-one two sk-three");
        assert_eq!(out, "[REDACTED] two [REDACTED]");
    }

    #[test]
    fn bare_prefix_is_left_alone() {
        assert_eq!(scrub_secrets("ends with sk-"), "ends with sk-");
    }

    #[test]
    fn truncates_long_bodies() {
        let long = "x".repeat(500);
        let out = sanitize_api_error(&long);
        assert!(out.ends_with("..."));
        assert!(out.chars().count() <= MAX_ERROR_BODY_CHARS + 3);
    }

    #[test]
    fn short_bodies_pass_through() {
        assert_eq!(sanitize_api_error("quota exceeded"), "quota exceeded");
    }
}
