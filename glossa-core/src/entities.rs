//! HTML character reference decoding
//!
//! Wikitext keeps entities such as `&nbsp;` and `&#769;` verbatim. Token
//! parameters and expanded text carry the decoded characters instead.

const NAMED: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", "\u{a0}"),
    ("shy", "\u{ad}"),
    ("ensp", "\u{2002}"),
    ("emsp", "\u{2003}"),
    ("thinsp", "\u{2009}"),
    ("zwnj", "\u{200c}"),
    ("zwj", "\u{200d}"),
    ("lrm", "\u{200e}"),
    ("rlm", "\u{200f}"),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("sbquo", "\u{201a}"),
    ("ldquo", "\u{201c}"),
    ("rdquo", "\u{201d}"),
    ("bdquo", "\u{201e}"),
    ("laquo", "\u{ab}"),
    ("raquo", "\u{bb}"),
    ("hellip", "\u{2026}"),
    ("bull", "\u{2022}"),
    ("middot", "\u{b7}"),
    ("prime", "\u{2032}"),
    ("acute", "\u{b4}"),
    ("deg", "\u{b0}"),
    ("plusmn", "\u{b1}"),
    ("times", "\u{d7}"),
    ("divide", "\u{f7}"),
    ("minus", "\u{2212}"),
    ("sect", "\u{a7}"),
    ("para", "\u{b6}"),
    ("copy", "\u{a9}"),
    ("reg", "\u{ae}"),
    ("trade", "\u{2122}"),
    ("euro", "\u{20ac}"),
    ("cent", "\u{a2}"),
    ("pound", "\u{a3}"),
    ("yen", "\u{a5}"),
    ("sup1", "\u{b9}"),
    ("sup2", "\u{b2}"),
    ("sup3", "\u{b3}"),
    ("frac12", "\u{bd}"),
    ("frac14", "\u{bc}"),
    ("frac34", "\u{be}"),
    ("larr", "\u{2190}"),
    ("uarr", "\u{2191}"),
    ("rarr", "\u{2192}"),
    ("darr", "\u{2193}"),
    ("harr", "\u{2194}"),
    ("rArr", "\u{21d2}"),
    ("loz", "\u{25ca}"),
    ("iexcl", "\u{a1}"),
    ("iquest", "\u{bf}"),
    ("not", "\u{ac}"),
    ("micro", "\u{b5}"),
    ("alpha", "\u{3b1}"),
    ("beta", "\u{3b2}"),
    ("gamma", "\u{3b3}"),
    ("delta", "\u{3b4}"),
    ("lambda", "\u{3bb}"),
    ("mu", "\u{3bc}"),
    ("pi", "\u{3c0}"),
    ("sigma", "\u{3c3}"),
    ("omega", "\u{3c9}"),
];

/// Decode the body of one character reference (the part between `&` and
/// `;`). Returns `None` for unknown names and invalid code points.
pub fn decode_entity(body: &str) -> Option<String> {
    if let Some(numeric) = body.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    NAMED
        .iter()
        .find(|(name, _)| *name == body)
        .map(|(_, value)| (*value).to_string())
}

/// Whether `body` is a syntactically valid reference body, known or not.
pub fn is_entity_body(body: &str) -> bool {
    if let Some(numeric) = body.strip_prefix('#') {
        match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !numeric.is_empty() && numeric.chars().all(|c| c.is_ascii_digit()),
        }
    } else {
        !body.is_empty() && body.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

/// Replace every decodable `&...;` reference in `text`.
pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 32)
            .and_then(|end| decode_entity(&tail[..end]).map(|value| (end, value)));
        match decoded {
            Some((end, value)) => {
                out.push_str(&value);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_and_numeric_references() {
        assert_eq!(decode_entity("nbsp").as_deref(), Some("\u{a0}"));
        assert_eq!(decode_entity("#769").as_deref(), Some("\u{301}"));
        assert_eq!(decode_entity("#x2014").as_deref(), Some("—"));
        assert_eq!(decode_entity("bogus"), None);
        assert_eq!(decode_entity("#xD800"), None);
    }

    #[test]
    fn test_unescape_mixed_text() {
        assert_eq!(unescape("ко&#769;шка &amp; пёс"), "ко\u{301}шка & пёс");
        assert_eq!(unescape("a & b"), "a & b");
        assert_eq!(unescape("&unknown; &lt;"), "&unknown; <");
        assert_eq!(unescape("trailing &"), "trailing &");
    }

    #[test]
    fn test_entity_body_shape() {
        assert!(is_entity_body("mdash"));
        assert!(is_entity_body("#160"));
        assert!(is_entity_body("#xA0"));
        assert!(!is_entity_body("#x"));
        assert!(!is_entity_body("a b"));
        assert!(!is_entity_body(""));
    }
}
