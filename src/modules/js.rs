//! Page-side helpers shared by the extraction scripts.

/// `parseNumber` for engagement counters: strips `,` and expands the
/// `万`, `亿`, `K` and `M` suffixes.
pub const PARSE_NUMBER: &str = r#"
    const parseNumber = (str) => {
        if (!str) return 0;
        str = String(str).trim().replace(/,/g, '');
        if (str.includes('亿')) return parseFloat(str) * 100000000;
        if (str.includes('万')) return parseFloat(str) * 10000;
        if (str.includes('K')) return parseFloat(str) * 1000;
        if (str.includes('M')) return parseFloat(str) * 1000000;
        return parseInt(str) || 0;
    };
"#;

/// Wrap a function body into an evaluable `() => {...}` with the shared
/// helpers in scope.
pub fn extraction_script(body: &str) -> String {
    format!("() => {{\n{}\n{}\n}}", PARSE_NUMBER, body)
}
