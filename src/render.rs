use std::fmt::Write;

use serde_json::Value;

use crate::types::{value_type, Match};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A one-shot message shown above the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }
}

#[derive(Debug, Default)]
pub struct PageView<'a> {
    pub notices: &'a [Notice],
    pub files: &'a [String],
    pub key_term: &'a str,
    pub filename: &'a str,
    /// `None` before any search has run; `Some(&[])` for a search with no hits.
    pub results: Option<&'a [Match]>,
}

pub fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn index_page(view: &PageView<'_>) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>JSON key search</title>\n<style>\n\
         body{font-family:sans-serif;max-width:60rem;margin:2rem auto;padding:0 1rem}\n\
         .notice{padding:.5rem 1rem;margin:.5rem 0;border-radius:4px}\n\
         .notice.info{background:#e7f3fe}.notice.error{background:#fdecea}\n\
         table{border-collapse:collapse;width:100%}td,th{border:1px solid #ccc;padding:.3rem;vertical-align:top;text-align:left}\n\
         pre{margin:0;white-space:pre-wrap}.kind{color:#666;font-size:.8em}\n\
         </style>\n</head>\n<body>\n<h1>JSON key search</h1>\n",
    );

    for notice in view.notices {
        let class = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Error => "error",
        };
        let _ = writeln!(out, "<div class=\"notice {class}\">{}</div>", html_escape(&notice.text));
    }

    out.push_str("<form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n");
    out.push_str("<p><label>Upload JSON: <input type=\"file\" name=\"json_file\" accept=\".json\"></label></p>\n");
    out.push_str("<p><label>or use a stored file: <select name=\"existing_file\">\n<option value=\"\">--</option>\n");
    for file in view.files {
        let escaped = html_escape(file);
        let selected = if file == view.filename { " selected" } else { "" };
        let _ = writeln!(out, "<option value=\"{escaped}\"{selected}>{escaped}</option>");
    }
    out.push_str("</select></label></p>\n");
    let _ = writeln!(
        out,
        "<p><label>Key contains: <input type=\"text\" name=\"key_term\" value=\"{}\"></label></p>",
        html_escape(view.key_term)
    );
    out.push_str("<p><button type=\"submit\">Search</button></p>\n</form>\n");

    if let Some(results) = view.results {
        render_results(&mut out, view, results);
    }

    out.push_str("<h2>Stored files</h2>\n");
    if view.files.is_empty() {
        out.push_str("<p>No files uploaded yet.</p>\n");
    } else {
        out.push_str("<ul>\n");
        for file in view.files {
            let _ = writeln!(
                out,
                "<li>{} <form method=\"post\" action=\"/delete/{}\" style=\"display:inline\">\
                 <button type=\"submit\">Delete</button></form></li>",
                html_escape(file),
                urlencoding::encode(file)
            );
        }
        out.push_str("</ul>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn render_results(out: &mut String, view: &PageView<'_>, results: &[Match]) {
    let _ = writeln!(
        out,
        "<h2>{} match(es) for &quot;{}&quot; in {}</h2>",
        results.len(),
        html_escape(view.key_term),
        html_escape(view.filename)
    );
    if results.is_empty() {
        out.push_str("<p>No keys matched.</p>\n");
        return;
    }
    out.push_str("<table>\n<tr><th>Path</th><th>Value</th></tr>\n");
    for m in results {
        let _ = writeln!(
            out,
            "<tr><td><code>{}</code></td><td><span class=\"kind\">{}</span><pre>{}</pre></td></tr>",
            html_escape(&m.path.to_string()),
            value_type(&m.value),
            html_escape(&pretty(&m.value))
        );
    }
    out.push_str("</table>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::KeyPath;
    use serde_json::json;

    #[test]
    fn escapes_markup() {
        assert_eq!(html_escape("<a href='x'>&</a>"), "&lt;a href=&#x27;x&#x27;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn renders_notices_and_files() {
        let notices = [Notice::error("Please enter a key to search.")];
        let files = ["a b.json".to_string()];
        let html = index_page(&PageView { notices: &notices, files: &files, ..Default::default() });
        assert!(html.contains("<div class=\"notice error\">Please enter a key to search.</div>"));
        assert!(html.contains("action=\"/delete/a%20b.json\""));
        assert!(!html.contains("<table>"));
    }

    #[test]
    fn renders_structured_values() {
        let results = [Match {
            path: KeyPath::root().child_key("user"),
            value: json!({"name": "<ada>"}),
        }];
        let html = index_page(&PageView {
            key_term: "user",
            filename: "people.json",
            results: Some(&results),
            ..Default::default()
        });
        assert!(html.contains("1 match(es) for &quot;user&quot; in people.json"));
        assert!(html.contains("<code>.user</code>"));
        assert!(html.contains("<span class=\"kind\">object</span>"));
        assert!(html.contains("&quot;name&quot;: &quot;&lt;ada&gt;&quot;"));
    }

    #[test]
    fn empty_result_set_says_so() {
        let html = index_page(&PageView { results: Some(&[]), ..Default::default() });
        assert!(html.contains("No keys matched."));
    }
}
