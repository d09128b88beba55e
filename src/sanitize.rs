//! Clipboard HTML filtering.
//!
//! Reduces arbitrary pasted markup to text, `b/strong/i/em/u`, and colour
//! spans. Everything else is unwrapped so nested formatting and text survive.

use scraper::{ElementRef, Html, Node};

use crate::rich::{FontWeight, Rgb};

/// Larger clipboard payloads are refused and pasted as plain text instead.
pub const MAX_HTML_BYTES: usize = 1 << 20;
pub const MAX_DEPTH: usize = 512;

/// Elements whose content is never rendered text; dropped with their subtree.
const DROPPED: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    B,
    Strong,
    I,
    Em,
    U,
}

impl FormatTag {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "b" => Some(FormatTag::B),
            "strong" => Some(FormatTag::Strong),
            "i" => Some(FormatTag::I),
            "em" => Some(FormatTag::Em),
            "u" => Some(FormatTag::U),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Format {
        tag: FormatTag,
        children: Vec<Inline>,
    },
    Color {
        color: Rgb,
        weight: Option<FontWeight>,
        children: Vec<Inline>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    #[error("clipboard html is {0} bytes, over the {MAX_HTML_BYTES} byte limit")]
    TooLarge(usize),

    #[error("clipboard html nests deeper than {MAX_DEPTH} elements")]
    TooDeep,
}

/// Parse `html` as a fragment and keep only the allow-listed inline subset.
///
/// An empty result means the markup carried no usable content; callers fall
/// back to the plain-text flavour in that case.
pub fn sanitize_html(html: &str) -> Result<Vec<Inline>, SanitizeError> {
    if html.len() > MAX_HTML_BYTES {
        return Err(SanitizeError::TooLarge(html.len()));
    }
    let fragment = Html::parse_fragment(html);
    let mut out = Vec::new();
    walk(fragment.root_element(), 0, &mut out)?;
    Ok(out)
}

/// All text in `html`, tags stripped.
pub fn text_content(html: &str) -> String {
    Html::parse_fragment(html).root_element().text().collect()
}

fn walk(parent: ElementRef<'_>, depth: usize, out: &mut Vec<Inline>) -> Result<(), SanitizeError> {
    if depth > MAX_DEPTH {
        return Err(SanitizeError::TooDeep);
    }
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => {
                let text: &str = text;
                out.push(Inline::Text(text.to_owned()));
            }
            Node::Element(_) => {
                let Some(element) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = element.value().name();
                if DROPPED.contains(&name) {
                    continue;
                }
                if name == "span"
                    && let Some((color, weight)) = span_color(element)
                {
                    let mut children = Vec::new();
                    walk(element, depth + 1, &mut children)?;
                    out.push(Inline::Color {
                        color,
                        weight,
                        children,
                    });
                } else if let Some(tag) = FormatTag::from_name(name) {
                    let mut children = Vec::new();
                    walk(element, depth + 1, &mut children)?;
                    out.push(Inline::Format { tag, children });
                } else {
                    walk(element, depth + 1, out)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn span_color(element: ElementRef<'_>) -> Option<(Rgb, Option<FontWeight>)> {
    let style = element.value().attr("style")?;
    let mut color = None;
    let mut weight = None;
    for decl in style.split(';') {
        let Some((prop, value)) = decl.split_once(':') else {
            continue;
        };
        match prop.trim().to_ascii_lowercase().as_str() {
            "color" => color = Rgb::parse_css(value),
            "font-weight" => weight = FontWeight::parse_css(value),
            _ => {}
        }
    }
    color.map(|c| (c, weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Inline {
        Inline::Text(s.into())
    }

    #[test]
    fn bold_kept_and_script_dropped() {
        let out = sanitize_html("<b>x</b><script>evil</script>").unwrap();
        assert_eq!(
            out,
            vec![Inline::Format {
                tag: FormatTag::B,
                children: vec![text("x")],
            }]
        );
    }

    #[test]
    fn wrappers_are_unwrapped_in_document_order() {
        let out = sanitize_html("<div><p>Mon <a href=\"x\">Math</a></p><p>101</p></div>")
            .unwrap();
        let joined: String = out
            .iter()
            .map(|n| match n {
                Inline::Text(t) => t.as_str(),
                _ => panic!("unexpected formatted node: {n:?}"),
            })
            .collect();
        assert_eq!(joined, "Mon Math101");
    }

    #[test]
    fn nested_formatting_survives_inside_wrappers() {
        let out = sanitize_html("<div class=\"x\"><em>Lab <u>B</u></em></div>").unwrap();
        assert_eq!(
            out,
            vec![Inline::Format {
                tag: FormatTag::Em,
                children: vec![
                    text("Lab "),
                    Inline::Format {
                        tag: FormatTag::U,
                        children: vec![text("B")],
                    },
                ],
            }]
        );
    }

    #[test]
    fn color_span_keeps_color_and_weight_only() {
        let out =
            sanitize_html("<span style=\"font-size: 40px; color: rgb(255, 0, 0); font-weight: 700\">Art</span>")
                .unwrap();
        assert_eq!(
            out,
            vec![Inline::Color {
                color: Rgb(255, 0, 0),
                weight: Some(FontWeight::Bold),
                children: vec![text("Art")],
            }]
        );
    }

    #[test]
    fn nested_color_spans_stay_nested() {
        let out = sanitize_html(
            "<span style=\"color: red; font-weight: bold\"><span style=\"color: blue\">x</span></span>",
        )
        .unwrap();
        assert_eq!(
            out,
            vec![Inline::Color {
                color: Rgb(255, 0, 0),
                weight: Some(FontWeight::Bold),
                children: vec![Inline::Color {
                    color: Rgb(0, 0, 255),
                    weight: None,
                    children: vec![text("x")],
                }],
            }]
        );
    }

    #[test]
    fn span_without_resolvable_color_is_unwrapped() {
        let out = sanitize_html("<span style=\"color: inherit\"><strong>Gym</strong></span>").unwrap();
        assert_eq!(
            out,
            vec![Inline::Format {
                tag: FormatTag::Strong,
                children: vec![text("Gym")],
            }]
        );
    }

    #[test]
    fn comments_and_styles_vanish() {
        let out = sanitize_html("<!--StartFragment--><style>p{}</style>Hi<!--EndFragment-->").unwrap();
        assert_eq!(out, vec![text("Hi")]);
    }

    #[test]
    fn contentless_markup_yields_empty_fragment() {
        assert!(sanitize_html("<div></div><br>").unwrap().is_empty());
    }

    #[test]
    fn deep_wrappers_flatten_to_text() {
        let html = format!("{}deep{}", "<div>".repeat(100), "</div>".repeat(100));
        assert_eq!(sanitize_html(&html).unwrap(), vec![text("deep")]);
    }

    #[test]
    fn oversized_payload_is_refused() {
        let html = "a".repeat(MAX_HTML_BYTES + 1);
        assert!(matches!(sanitize_html(&html), Err(SanitizeError::TooLarge(_))));
    }

    #[test]
    fn text_content_strips_tags() {
        assert_eq!(text_content("<b>Bio</b> <i>lab</i>"), "Bio lab");
    }
}
