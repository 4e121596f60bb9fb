//! Conversion of indentation-prefix list markup to tag form.
//!
//! Wikitext lists are line-oriented: `:`/`;` lines form definition lists,
//! `*` bullet lists, `#` numbered lists, nesting by repeating characters.
//! Inside tag-wrapped content (and in numbered-list continuations) that
//! markup stops working, so the synthesizer converts affected regions to
//! `<dl>`/`<ul>`/`<ol>` form with this module.

/// List and item tag for a line's first character.
fn list_kind(line: &str) -> Option<(&'static str, &'static str)> {
    match line.chars().next()? {
        ':' => Some(("dl", "dd")),
        ';' => Some(("dl", "dt")),
        '*' => Some(("ul", "li")),
        '#' => Some(("ol", "li")),
        _ => None,
    }
}

/// Whether a line starts with a list marker.
#[must_use]
pub fn is_list_line(line: &str) -> bool {
    list_kind(line).is_some()
}

/// Convert indentation-prefix list markup to tag form.
///
/// Consecutive lines of the same list type form one group; a type change or
/// an unmarked line closes the group. Unmarked lines are preserved verbatim,
/// never wrapped. Nested items are trimmed to keep inline flow; a top-level
/// item keeps its text as written, minus the conventional space after the
/// marker.
#[must_use]
pub fn indentation_to_tags(code: &str) -> String {
    let lines: Vec<&str> = code.split('\n').collect();
    convert_lines(&lines, false)
}

fn convert_lines(lines: &[&str], nested: bool) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some((tag, _)) = list_kind(lines[i]) else {
            let text = if nested {
                lines[i].trim().to_owned()
            } else {
                (*lines[i]).to_owned()
            };
            parts.push(text);
            i += 1;
            continue;
        };
        let mut j = i;
        while j < lines.len() && list_kind(lines[j]).is_some_and(|(t, _)| t == tag) {
            j += 1;
        }
        parts.push(render_group(tag, &lines[i..j], nested));
        i = j;
    }
    // Nested fragments stay inline; top-level fragments keep their lines.
    parts.join(if nested { "" } else { "\n" })
}

fn render_group(tag: &str, lines: &[&str], nested: bool) -> String {
    // Peel one level: a stripped line that itself starts with a list marker
    // nests under the current item.
    let mut items: Vec<(&'static str, Vec<&str>)> = Vec::new();
    for line in lines {
        let (_, item_tag) = list_kind(line).expect("group contains only list lines");
        let stripped = &line[1..];
        match items.last_mut() {
            Some(last) if is_list_line(stripped) => last.1.push(stripped),
            _ => items.push((item_tag, vec![stripped])),
        }
    }

    let mut out = format!("<{tag}>");
    for (item_tag, item_lines) in items {
        out.push_str(&format!("<{item_tag}>"));
        out.push_str(&render_item(&item_lines, nested));
        out.push_str(&format!("</{item_tag}>"));
    }
    out.push_str(&format!("</{tag}>"));
    out
}

fn render_item(lines: &[&str], nested: bool) -> String {
    let (head, rest) = if is_list_line(lines[0]) {
        (None, lines)
    } else {
        (Some(lines[0]), &lines[1..])
    };

    let mut out = String::new();
    if let Some(head) = head {
        if nested || !rest.is_empty() {
            out.push_str(head.trim());
        } else {
            // Top-level single-line item: keep the text as written, minus
            // the conventional space after the marker.
            out.push_str(head.strip_prefix(' ').unwrap_or(head));
        }
    }
    if !rest.is_empty() {
        out.push_str(&convert_lines(rest, true));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_level_bullet_list() {
        assert_eq!(
            indentation_to_tags("* Item1\n* Item2"),
            "<ul><li>Item1</li><li>Item2</li></ul>"
        );
    }

    #[test]
    fn test_trailing_text_left_outside() {
        assert_eq!(
            indentation_to_tags("* Item1\n* Item2\nEnd"),
            "<ul><li>Item1</li><li>Item2</li></ul>\nEnd"
        );
    }

    #[test]
    fn test_definition_list_terms() {
        assert_eq!(
            indentation_to_tags("; Term\n: Definition"),
            "<dl><dt>Term</dt><dd>Definition</dd></dl>"
        );
    }

    #[test]
    fn test_numbered_list() {
        assert_eq!(
            indentation_to_tags("# one\n# two"),
            "<ol><li>one</li><li>two</li></ol>"
        );
    }

    #[test]
    fn test_nested_bullets() {
        assert_eq!(
            indentation_to_tags("* A\n** A1\n* B"),
            "<ul><li>A<ul><li>A1</li></ul></li><li>B</li></ul>"
        );
    }

    #[test]
    fn test_mixed_nesting_under_definition_item() {
        assert_eq!(
            indentation_to_tags("* Item1\n* Item2"),
            "<ul><li>Item1</li><li>Item2</li></ul>"
        );
        assert_eq!(
            indentation_to_tags(":* Item1\n:* Item2"),
            "<dl><dd><ul><li>Item1</li><li>Item2</li></ul></dd></dl>"
        );
    }

    #[test]
    fn test_type_change_closes_group() {
        assert_eq!(
            indentation_to_tags("* A\n# B"),
            "<ul><li>A</li></ul>\n<ol><li>B</li></ol>"
        );
    }

    #[test]
    fn test_unmarked_lines_verbatim() {
        assert_eq!(indentation_to_tags("plain text"), "plain text");
        assert_eq!(indentation_to_tags("  spaced  "), "  spaced  ");
    }

    #[test]
    fn test_nested_item_text_trimmed() {
        assert_eq!(
            indentation_to_tags("* A\n**  padded  "),
            "<ul><li>A<ul><li>padded</li></ul></li></ul>"
        );
    }

    #[test]
    fn test_roundtrip_item_texts_survive() {
        let original = ["alpha", "beta", "gamma"];
        let code = original
            .iter()
            .map(|t| format!("* {t}"))
            .collect::<Vec<_>>()
            .join("\n");
        let tagged = indentation_to_tags(&code);
        let extracted: Vec<&str> = tagged
            .split("<li>")
            .skip(1)
            .filter_map(|part| part.split("</li>").next())
            .collect();
        assert_eq!(extracted, original);
    }
}
