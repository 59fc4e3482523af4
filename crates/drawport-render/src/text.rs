//! Label text helpers: HTML-ish labels to plain lines, and XML escaping for SVG output.

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn decode_entity_at(s: &str, amp_index: usize) -> Option<(char, usize)> {
    let rest = &s[amp_index + 1..];
    let semi_rel = rest.find(';')?;
    let entity = &rest[..semi_rel];

    let ch = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        _ => {
            if let Some(num) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                let v = u32::from_str_radix(num, 16).ok()?;
                char::from_u32(v)?
            } else if let Some(num) = entity.strip_prefix('#') {
                let v = num.parse::<u32>().ok()?;
                char::from_u32(v)?
            } else {
                return None;
            }
        }
    };

    Some((ch, amp_index + 1 + semi_rel + 1))
}

/// Flattens an `html=1` label into display lines: tags are dropped, `<br>` and block boundaries
/// become line breaks, entities are decoded and whitespace is collapsed.
pub(crate) fn html_label_lines(s: &str) -> Vec<String> {
    let mut out = String::with_capacity(s.len());
    let mut i = 0usize;

    while i < s.len() {
        let Some(ch) = s[i..].chars().next() else {
            break;
        };
        match ch {
            '<' => {
                if let Some(end_rel) = s[i..].find('>') {
                    let tag = s[i + 1..i + end_rel].trim().to_ascii_lowercase();
                    let name = tag
                        .trim_start_matches('/')
                        .split(|c: char| c.is_whitespace() || c == '/')
                        .next()
                        .unwrap_or_default();
                    if matches!(name, "br" | "p" | "div" | "li") && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    i += end_rel + 1;
                } else {
                    out.push('<');
                    i += 1;
                }
            }
            '&' => {
                if let Some((decoded, next)) = decode_entity_at(s, i) {
                    out.push(decoded);
                    i = next;
                } else {
                    out.push('&');
                    i += 1;
                }
            }
            _ => {
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    collapse_lines(&out)
}

pub(crate) fn plain_label_lines(s: &str) -> Vec<String> {
    collapse_lines(s)
}

fn collapse_lines(s: &str) -> Vec<String> {
    s.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}
