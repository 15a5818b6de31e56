//! Sentence chunking for long narrations.
//!
//! Units keep their terminators and surrounding whitespace, so joining the
//! output of [`split`] yields the input unchanged.

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split `text` into sentences ending in `.`, `!` or `?`.
///
/// Runs of terminators (`?!`, `...`) stay with their sentence. A trailing
/// fragment without a terminator becomes the last unit; a whitespace-only
/// tail is folded into the previous unit. Text without any terminator is
/// returned as a single unit.
pub fn split(text: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if !is_terminator(c) {
            continue;
        }
        while let Some(&next) = chars.peek() {
            if !is_terminator(next) {
                break;
            }
            current.push(next);
            chars.next();
        }
        units.push(std::mem::take(&mut current));
    }

    if !current.is_empty() {
        match units.last_mut() {
            Some(last) if current.trim().is_empty() => last.push_str(&current),
            _ => units.push(current),
        }
    }

    if units.is_empty() {
        units.push(text.to_string());
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_round_trip() {
        let text = "A. B! C?";
        let units = split(text);
        assert_eq!(units, vec!["A.", " B!", " C?"]);
        assert_eq!(units.concat(), text);
    }

    #[test]
    fn test_no_terminator_is_single_unit() {
        let text = "just a phrase without an ending";
        assert_eq!(split(text), vec![text.to_string()]);
    }

    #[test]
    fn test_terminator_runs_stay_together() {
        let units = split("Really?! Yes... Fine.");
        assert_eq!(units, vec!["Really?!", " Yes...", " Fine."]);
    }

    #[test]
    fn test_trailing_fragment_is_kept() {
        let text = "First sentence. And a tail";
        let units = split(text);
        assert_eq!(units, vec!["First sentence.", " And a tail"]);
        assert_eq!(units.concat(), text);
    }

    #[test]
    fn test_trailing_whitespace_folds_into_last_unit() {
        let text = "One. Two.  \n";
        let units = split(text);
        assert_eq!(units.len(), 2);
        assert_eq!(units[1], " Two.  \n");
        assert_eq!(units.concat(), text);
    }

    #[test]
    fn test_units_are_never_empty() {
        let text = "Hello there, how are you? I am fine. Thanks for asking! Bye.";
        let units = split(text);
        assert_eq!(units.len(), 4);
        assert!(units.iter().all(|u| !u.is_empty()));
        assert_eq!(units.concat(), text);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Ça va? Très bien.";
        let units = split(text);
        assert_eq!(units, vec!["Ça va?", " Très bien."]);
    }
}
