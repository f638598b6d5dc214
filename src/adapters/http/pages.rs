//! Server-rendered HTML for the three pages of the front-end.

use crate::application::dto::PredictionResponse;
use crate::domain::media::MediaKind;

const STYLE: &str = "body{font-family:sans-serif;max-width:860px;margin:2rem auto;padding:0 1rem}\
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:.3rem .6rem}\
img,video{max-width:100%;border:1px solid #ddd}";

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n\
         <style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

pub fn landing(model_name: &str) -> String {
    layout(
        "Traffic sign detection",
        &format!(
            "<h1>Traffic sign detection</h1>\n\
             <p>Upload a photo or a short clip. Model <code>{}</code> finds traffic lights, \
             speed-limit signs and stop signs and returns the annotated media.</p>\n\
             <p><a href=\"/upload\">Upload a file</a></p>",
            escape_html(model_name)
        ),
    )
}

pub fn upload_form() -> String {
    layout(
        "Upload",
        "<h1>Upload an image or video</h1>\n\
         <form action=\"/predict\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"file\" accept=\"image/*,video/*\" required>\n\
         <button type=\"submit\">Detect</button>\n\
         </form>",
    )
}

pub fn prediction(result: &PredictionResponse) -> String {
    let mut body = String::from("<h1>Result</h1>\n");
    body.push_str(&format!("<p>File type: <code>{}</code></p>\n", escape_html(&result.file_type)));

    match (&result.file_url, result.media_kind) {
        (Some(url), MediaKind::Video) => body.push_str(&format!(
            "<video src=\"{0}\" controls></video>\n\
             <p><a href=\"{0}\">Download annotated video</a></p>\n",
            escape_html(url)
        )),
        (Some(url), _) => body.push_str(&format!(
            "<img src=\"{}\" alt=\"annotated upload\">\n",
            escape_html(url)
        )),
        (None, _) => {}
    }
    if let Some(path) = &result.file_path {
        body.push_str(&format!("<p>Output: <code>{}</code></p>\n", escape_html(path)));
    }

    if result.predictions.is_empty() {
        body.push_str("<p>No objects detected.</p>\n");
    } else {
        body.push_str("<table>\n<tr><th>Class</th><th>Confidence</th></tr>\n");
        for p in &result.predictions {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{:.2}</td></tr>\n",
                escape_html(&p.class_id),
                p.confidence
            ));
        }
        body.push_str("</table>\n");
    }
    body.push_str("<p><a href=\"/upload\">Upload another file</a></p>");

    layout("Result", &body)
}

pub fn escape_html(s: &str) -> String {
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
