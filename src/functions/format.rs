//! Printing and escaping helpers behind `print`, `printf` and the escapers

use std::fmt::Write;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::value::Value;

/// Concatenate values, adding a space between operands when neither is a
/// string
pub fn sprint(values: &[Value]) -> String {
    let mut out = String::new();
    for (i, value) in values.iter().enumerate() {
        let is_string = matches!(value, Value::String(_));
        if i > 0 && !is_string && !matches!(values[i - 1], Value::String(_)) {
            out.push(' ');
        }
        out.push_str(&value.to_string());
    }
    out
}

/// Space separated values followed by a newline
pub fn sprintln(values: &[Value]) -> String {
    let mut out = values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    out.push('\n');
    out
}

/// Parsed `%[-][width][.precision]verb` directive
struct Directive {
    left: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
    verb: char,
}

/// Format `values` according to a printf-style `format`
///
/// Supports `%v %s %d %f %t %q %%` with optional width, precision and the
/// `-` and `0` flags.
/// Mismatches are reported inline (`%!d(string=x)`) instead of failing.
pub fn sprintf(format: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut directive = Directive {
            left: false,
            zero: false,
            width: None,
            precision: None,
            verb: '%',
        };
        while let Some(flag) = chars.next_if(|c| *c == '-' || *c == '0') {
            match flag {
                '-' => directive.left = true,
                _ => directive.zero = true,
            }
        }
        directive.width = read_number(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            directive.precision = Some(read_number(&mut chars).unwrap_or(0));
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        directive.verb = verb;

        if verb == '%' {
            out.push('%');
            continue;
        }
        match values.get(next_arg) {
            Some(value) => {
                let text = format_one(&directive, value);
                pad(&mut out, &text, &directive);
            }
            None => {
                let _ = write!(out, "%!{}(MISSING)", verb);
            }
        }
        next_arg += 1;
    }

    if next_arg < values.len() {
        let extra = values[next_arg..]
            .iter()
            .map(|v| format!("{}={}", v.kind(), v))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(out, "%!(EXTRA {})", extra);
    }
    out
}

fn read_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut number: Option<usize> = None;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        number = Some(number.unwrap_or(0).saturating_mul(10) + digit as usize);
        chars.next();
    }
    number
}

fn format_one(directive: &Directive, value: &Value) -> String {
    let bad = || format!("%!{}({}={})", directive.verb, value.kind(), value);
    match (directive.verb, value) {
        ('v', _) => value.to_string(),
        ('s', Value::String(s)) => match directive.precision {
            Some(p) => s.chars().take(p).collect(),
            None => s.clone(),
        },
        ('s', _) => value.to_string(),
        ('d', _) => match value.as_integer() {
            Some(n) => n.to_string(),
            None => bad(),
        },
        ('f', Value::Number(n)) => format!("{:.*}", directive.precision.unwrap_or(6), n),
        ('t', Value::Bool(b)) => b.to_string(),
        ('q', Value::String(s)) => format!("{:?}", s),
        _ => bad(),
    }
}

fn pad(out: &mut String, text: &str, directive: &Directive) {
    let len = text.chars().count();
    let fill = directive.width.map_or(0, |w| w.saturating_sub(len));
    let numeric = matches!(directive.verb, 'd' | 'f') && !text.starts_with("%!");
    if directive.left {
        out.push_str(text);
        out.extend(std::iter::repeat(' ').take(fill));
    } else if directive.zero && numeric {
        let digits = match text.strip_prefix('-') {
            Some(rest) => {
                out.push('-');
                rest
            }
            None => text,
        };
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(digits);
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(text);
    }
}

/// Text used by the escapers: a lone string as is, otherwise `sprint`
pub fn escaper_input(values: &[Value]) -> String {
    match values {
        [Value::String(s)] => s.clone(),
        _ => sprint(values),
    }
}

/// Escape text for inclusion in HTML
pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '\0' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

/// Escape text for inclusion in a JavaScript string
pub fn js_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '=' => out.push_str("\\u003D"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Bytes escaped in a URL query component: everything but the unreserved set
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escape text for use as a URL query component, spaces becoming `+`
pub fn url_query_escape(input: &str) -> String {
    input
        .split(' ')
        .map(|part| utf8_percent_encode(part, QUERY_COMPONENT).to_string())
        .collect::<Vec<_>>()
        .join("+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sprint_spacing() {
        let values = [
            Value::Number(1.0),
            Value::Number(2.0),
            Value::from("a"),
            Value::Number(3.0),
            Value::from("b"),
            Value::from("c"),
        ];
        assert_eq!(sprint(&values), "1 2a3bc");
    }

    #[test]
    fn test_sprintln() {
        assert_eq!(
            sprintln(&[Value::from("a"), Value::Number(1.0)]),
            "a 1\n"
        );
    }

    #[test]
    fn test_sprintf_verbs() {
        let out = sprintf(
            "%s has %d items costing %.2f (%t) %q %v 100%%",
            &[
                Value::from("cart"),
                Value::Number(3.0),
                Value::Number(9.5),
                Value::Bool(true),
                Value::from("hi"),
                Value::Null,
            ],
        );
        assert_eq!(out, r#"cart has 3 items costing 9.50 (true) "hi" <nil> 100%"#);
    }

    #[test]
    fn test_sprintf_width() {
        assert_eq!(sprintf("[%5s|%-3d]", &[Value::from("ab"), Value::Number(7.0)]), "[   ab|7  ]");
    }

    #[test]
    fn test_sprintf_zero_padding() {
        assert_eq!(sprintf("%03d", &[Value::Number(7.0)]), "007");
        assert_eq!(sprintf("%05d", &[Value::Number(-42.0)]), "-0042");
        assert_eq!(sprintf("%06.2f", &[Value::Number(2.5)]), "002.50");
        assert_eq!(sprintf("%-03d|", &[Value::Number(7.0)]), "7  |");
    }

    #[test]
    fn test_sprintf_mismatches() {
        assert_eq!(sprintf("%d", &[Value::from("x")]), "%!d(string=x)");
        assert_eq!(sprintf("%s %s", &[Value::from("x")]), "x %!s(MISSING)");
        assert_eq!(sprintf("a", &[Value::Number(1.0)]), "a%!(EXTRA number=1)");
        assert_eq!(sprintf("50%", &[]), "50%!(NOVERB)");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&#34;x&#34;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_js_escape() {
        assert_eq!(js_escape("a'b\"c\\<d>\n"), "a\\'b\\\"c\\\\\\u003Cd\\u003E\\u000A");
    }

    #[test]
    fn test_url_query_escape() {
        assert_eq!(url_query_escape("a b&c=d/é"), "a+b%26c%3Dd%2F%C3%A9");
        assert_eq!(url_query_escape(" -_.~*+"), "+-_.~%2A%2B");
    }

    #[test]
    fn test_escaper_input() {
        assert_eq!(escaper_input(&[Value::from("<x>")]), "<x>");
        assert_eq!(escaper_input(&[Value::Number(1.0), Value::Number(2.0)]), "1 2");
    }
}
