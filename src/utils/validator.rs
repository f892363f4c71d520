use url::Url;

/// 只接受 http/https
pub fn is_valid_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// 从URL路径的最后一段推断文件名
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let name = sanitize_file_name(name);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// 替换文件系统不接受的字符
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == ' ')
        .to_string()
}
