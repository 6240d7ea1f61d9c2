// Structural extraction of embedded media from feed markup. Patterns are
// compiled once and every function here is pure.

use std::sync::LazyLock;

use regex::Regex;

use xsync_common::PendingMedia;

static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<img[^>]+\bsrc=["']([^"']+)["'][^>]*>"#).unwrap());

static VIDEO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<video[^>]+\bsrc=["']([^"']+)["'].*?</video>"#).unwrap()
});

static POSTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"poster="(.+?)""#).unwrap());

static SOURCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"<source src="(.+?)""#).unwrap());

static TRAILING_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((<br\s*?/?>)|\s)+$").unwrap());

/// `src` of every `<img>`, in document order. The markup is left in place.
pub fn image_sources(html: &str) -> Vec<PendingMedia> {
    IMAGE
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| PendingMedia::image(m.as_str()))
        .collect()
}

/// Remove every `<img>` tag and return its source.
pub fn strip_images(html: &str) -> (String, Vec<PendingMedia>) {
    strip(html, &IMAGE, |src| PendingMedia::image(src))
}

/// Remove every `<video src=...>...</video>` block and return its source.
pub fn strip_videos(html: &str) -> (String, Vec<PendingMedia>) {
    strip(html, &VIDEO, |src| PendingMedia::video(src))
}

fn strip(
    html: &str,
    pattern: &Regex,
    make: impl Fn(&str) -> PendingMedia,
) -> (String, Vec<PendingMedia>) {
    let media = pattern
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| make(m.as_str()))
        .collect();
    let text = pattern.replace_all(html, "").into_owned();
    (text, media)
}

/// Poster image and video source of a TikTok player snippet.
pub fn player_media(description: &str) -> Vec<PendingMedia> {
    let mut media = Vec::new();
    if let Some(poster) = POSTER.captures(description).and_then(|c| c.get(1)) {
        media.push(PendingMedia::image(poster.as_str()));
    }
    if let Some(source) = SOURCE.captures(description).and_then(|c| c.get(1)) {
        media.push(PendingMedia::video(source.as_str()));
    }
    media
}

/// Drop trailing whitespace and `<br>` runs left behind after stripping media.
pub fn trim_trailing_breaks(html: &str) -> String {
    TRAILING_BREAKS.replace(html, "").into_owned()
}

/// Undo the HTML entity escaping feeds apply to attribute values.
pub fn unescape_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_sources_keeps_order_and_duplicates() {
        let html = r#"<p>a</p><img alt="x" src="https://cdn/a.png"><img src='https://cdn/b.png' /><img src="https://cdn/a.png">"#;
        let uris: Vec<_> = image_sources(html).into_iter().map(|m| m.uri).collect();
        assert_eq!(uris, ["https://cdn/a.png", "https://cdn/b.png", "https://cdn/a.png"]);
    }

    #[test]
    fn strip_images_removes_whole_tag() {
        let (text, media) = strip_images(r#"hello<img src="https://pbs/1.jpg" referrerpolicy="no-referrer"> world"#);
        assert_eq!(text, "hello world");
        assert_eq!(media, vec![PendingMedia::image("https://pbs/1.jpg")]);
    }

    #[test]
    fn strip_images_returns_every_source_in_order() {
        let (text, media) = strip_images(r#"<img src="https://pbs/1.jpg">a<img src="https://pbs/2.jpg">b"#);
        assert_eq!(text, "ab");
        assert_eq!(
            media,
            vec![PendingMedia::image("https://pbs/1.jpg"), PendingMedia::image("https://pbs/2.jpg")]
        );
    }

    #[test]
    fn strip_videos_spans_lines_and_flags_video() {
        let html = "clip:<video src=\"https://video/1.mp4\" controls>\n<source src=\"x\"></video>";
        let (text, media) = strip_videos(html);
        assert_eq!(text, "clip:");
        assert_eq!(media, vec![PendingMedia::video("https://video/1.mp4")]);
    }

    #[test]
    fn player_media_finds_poster_and_source() {
        let html = r#"<video controls poster="https://p16/cover.jpg"><source src="https://v16/play.mp4" type="video/mp4"></video>"#;
        assert_eq!(
            player_media(html),
            vec![
                PendingMedia::image("https://p16/cover.jpg"),
                PendingMedia::video("https://v16/play.mp4"),
            ]
        );
        assert!(player_media("<p>no player</p>").is_empty());
    }

    #[test]
    fn trailing_breaks_are_trimmed() {
        assert_eq!(trim_trailing_breaks("text<br><br/> \n<br />"), "text");
        assert_eq!(trim_trailing_breaks("a<br>b"), "a<br>b");
    }

    #[test]
    fn entities_are_unescaped_once() {
        assert_eq!(
            unescape_entities("https://x/img?a=1&amp;b=2"),
            "https://x/img?a=1&b=2"
        );
        assert_eq!(unescape_entities("&amp;lt;"), "&lt;");
    }
}
