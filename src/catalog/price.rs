//! Locale-aware price parsing

/// Parses a displayed price into a number
///
/// Handles both `1.234,56` and `1,234.56` grouping styles, currency prefixes and
/// suffixes (`kr.`, `DKK`, `,-`), and spaces used as thousands separators.
///
/// # Returns
///
/// * `Some(f64)` - The parsed price
/// * `None` - The text holds no digits
pub fn normalize_price(text: &str) -> Option<f64> {
    let run = digit_run(text)?;

    let last_dot = run.rfind('.');
    let last_comma = run.rfind(',');

    let normalized = match (last_dot, last_comma) {
        // Both present: whichever comes last is the decimal separator
        (Some(dot), Some(comma)) => {
            if dot > comma {
                run.replace(',', "")
            } else {
                run.replace('.', "").replace(',', ".")
            }
        }
        (Some(_), None) => resolve_single_separator(&run, '.'),
        (None, Some(_)) => resolve_single_separator(&run, ','),
        (None, None) => run,
    };

    normalized.parse::<f64>().ok()
}

/// Extracts the first run of digits and separators, dropping grouping spaces
/// and trailing separators
fn digit_run(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.iter().position(|c| c.is_ascii_digit())?;

    let mut run = String::new();
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() || c == '.' || c == ',' {
            run.push(c);
        } else if !(is_group_space(c) && followed_by_group(&chars, i + 1)) {
            break;
        }
        i += 1;
    }

    let trimmed = run.trim_end_matches(&['.', ','][..]);
    Some(trimmed.to_string())
}

fn is_group_space(c: char) -> bool {
    c == ' ' || c == '\u{a0}' || c == '\u{202f}'
}

/// True if exactly three digits start at `from` and no further digit follows
fn followed_by_group(chars: &[char], from: usize) -> bool {
    let digits = chars[from..]
        .iter()
        .take_while(|c| c.is_ascii_digit())
        .count();
    digits == 3
}

/// Decides whether a lone separator kind groups thousands or marks decimals
fn resolve_single_separator(run: &str, sep: char) -> String {
    let groups: Vec<&str> = run.split(sep).collect();
    let repeated = groups.len() > 2;
    let trailing_three = groups.last().map(|g| g.len() == 3).unwrap_or(false);

    let is_thousands = if sep == '.' {
        repeated || trailing_three
    } else {
        // A comma is read as a decimal mark unless it clearly groups thousands
        repeated && groups[1..].iter().all(|g| g.len() == 3)
    };

    if is_thousands {
        run.replace(sep, "")
    } else {
        run.replace(sep, ".")
    }
}
