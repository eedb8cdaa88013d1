//! Small string helpers shared across modules.

/// Percent-encode each `/`-separated segment of `path` on its own, so
/// embedded slashes stay path separators.
pub fn encode_path_segments(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Text content of the first `<name>...</name>` element in an XML body.
pub fn extract_xml_element(body: &str, name: &str) -> Option<String> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    let value = body[start..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse a boolean flag as written in environment variables.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Strip the surrounding quotes S3 puts around ETags.
pub fn unquote(value: &str) -> String {
    value.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_segments_but_keeps_separators() {
        assert_eq!(encode_path_segments("a.txt"), "a.txt");
        assert_eq!(
            encode_path_segments("photos/my file#1.png"),
            "photos/my%20file%231.png"
        );
    }

    #[test]
    fn parses_flags() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn extracts_xml_text() {
        let body = "<Error><Code>NoSuchKey</Code><Message></Message></Error>";
        assert_eq!(extract_xml_element(body, "Code").as_deref(), Some("NoSuchKey"));
        assert_eq!(extract_xml_element(body, "Message"), None);
        assert_eq!(extract_xml_element(body, "Missing"), None);
    }
}
