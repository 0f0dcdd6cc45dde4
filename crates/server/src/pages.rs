//! Server-rendered HTML for the admin and upload-test pages.

use extguard_core::{Policy, UploadRecord};
use std::fmt::Write;

const STYLE: &str = "body{font-family:sans-serif;margin:2rem}\
.chip{display:inline-block;border:1px solid #999;border-radius:1rem;padding:.1rem .6rem;margin:.2rem}\
.badge--allow{color:#17752b}.badge--block{color:#b3261e}\
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:.3rem .6rem}";

/// Escape text for HTML element and attribute content.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{}</title><style>{}</style></head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        STYLE,
        body
    )
}

pub fn render_index() -> String {
    layout(
        "Extension Guard",
        "<h1>Extension Guard</h1>\n<ul>\n<li><a href=\"/block\">File extension blocking</a></li>\n<li><a href=\"/upload-test\">Upload test</a></li>\n</ul>",
    )
}

pub fn render_block_page(policy: &Policy) -> String {
    let mut body = String::from("<h1>File extension blocking</h1>\n<section class=\"fixed\">\n<h2>Fixed extensions</h2>\n");
    for fixed in &policy.fixed {
        let name = escape(&fixed.extension);
        let _ = writeln!(
            body,
            "<label><input type=\"checkbox\" name=\"fixedExt\" value=\"{}\"{}> {}</label>",
            name,
            if fixed.blocked { " checked" } else { "" },
            name
        );
    }
    body.push_str("</section>\n<section class=\"custom\">\n<h2>Custom extensions</h2>\n");
    let _ = writeln!(
        body,
        "<input id=\"customExtInput\" maxlength=\"{}\" placeholder=\"extension\"> <button id=\"btnAddCustom\" type=\"button\">+ Add</button>",
        policy.limits.max_extension_length
    );
    let _ = writeln!(
        body,
        "<p class=\"counter\"><span id=\"chipCount\">{}/{}</span></p>",
        policy.custom.len(),
        policy.limits.max_custom_extensions
    );
    body.push_str("<div id=\"chipArea\" role=\"list\">\n");
    for ext in &policy.custom {
        let ext = escape(ext);
        let _ = writeln!(
            body,
            "<div class=\"chip\" role=\"listitem\" data-ext=\"{ext}\"><span class=\"chip__text\">{ext}</span> <button type=\"button\" class=\"chip__close\" aria-label=\"remove {ext}\">&times;</button></div>"
        );
    }
    body.push_str("</div>\n</section>");
    layout("File extension blocking", &body)
}

pub fn render_upload_page(recent: &[UploadRecord]) -> String {
    let mut body = String::from(
        "<h1>Upload test</h1>\n<form id=\"uploadForm\" method=\"post\" action=\"/api/upload-test\" enctype=\"multipart/form-data\">\n\
<label>Title <input name=\"title\"></label>\n<input type=\"file\" name=\"file\" id=\"file\">\n\
<button type=\"submit\">Upload</button>\n</form>\n<h2>Recent uploads</h2>\n\
<table class=\"data-table\">\n<thead><tr><th>File</th><th>Extension</th><th>Result</th><th>Time</th></tr></thead>\n<tbody id=\"recentTbody\">\n",
    );
    for record in recent {
        let badge = if record.allowed {
            "<span class=\"badge badge--allow\">allowed</span>"
        } else {
            "<span class=\"badge badge--block\">blocked</span>"
        };
        let ext = if record.extension.is_empty() {
            "-"
        } else {
            record.extension.as_str()
        };
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&record.file_name),
            escape(ext),
            badge,
            record.upload_time.format("%Y-%m-%d %H:%M")
        );
    }
    body.push_str("</tbody>\n</table>");
    layout("Upload test", &body)
}
