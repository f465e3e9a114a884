//! Output hygiene (§4.5): strip embedded image references before a report
//! is emitted, and collapse excess blank lines.

use regex::Regex;

/// Remove `![...](...)`, `<img .../>`, and raw `data:image/...;base64,...`
/// substrings, then collapse runs of ≥3 blank lines to two.
pub fn strip_images(markdown: &str) -> String {
    let markdown_image = Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("static regex is valid");
    let html_image = Regex::new(r"(?i)<img[^>]*/?>").expect("static regex is valid");
    let data_uri = Regex::new(r"data:image/[a-zA-Z0-9.+-]+;base64,[A-Za-z0-9+/=]+")
        .expect("static regex is valid");
    let blank_run = Regex::new(r"\n{3,}").expect("static regex is valid");

    let stripped = markdown_image.replace_all(markdown, "");
    let stripped = html_image.replace_all(&stripped, "");
    let stripped = data_uri.replace_all(&stripped, "");
    blank_run.replace_all(&stripped, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_and_html_images_and_data_uris() {
        let input = "Summary\n\n![mask](data:image/png;base64,AAAA)\n<img src=\"x.png\"/>\nraw: data:image/jpeg;base64,BBBB more text\n\n\n\nDone";
        let out = strip_images(input);
        assert!(!out.contains("data:image"));
        assert!(!out.contains("![mask]"));
        assert!(!out.contains("<img"));
        assert!(!out.contains("\n\n\n"));
    }
}
