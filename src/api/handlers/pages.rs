//! Public marketing pages. The markup is a bare shell; the content lives
//! with the frontend.

use axum::response::Html;

fn shell(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>{title} | Lessonhub</title></head><body><main>{body}</main></body></html>"
    ))
}

pub async fn home() -> Html<String> {
    shell(
        "Find your music teacher",
        "<h1>Find your music teacher</h1>\
         <p>Connect with experienced teachers for private lessons online or in person.</p>\
         <a href=\"/how-it-works\">How it works</a>",
    )
}

pub async fn about() -> Html<String> {
    shell(
        "About",
        "<h1>About</h1><p>Lessonhub connects families with independent music teachers.</p>",
    )
}

pub async fn how_it_works() -> Html<String> {
    shell(
        "How it works",
        "<h1>How it works</h1><ol><li>Create a parent or teacher account.</li>\
         <li>Browse teachers by instrument, price and lesson type.</li>\
         <li>Book and manage lessons from your dashboard.</li></ol>",
    )
}
