/// Collapses whitespace runs to one space and trims the ends.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uppercases the first letter of each word and lowercases the rest.
/// Words separated by `-` or `'` are capitalized individually.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut start_of_word = true;
    for c in value.chars() {
        if c.is_alphabetic() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = c.is_whitespace() || c == '-' || c == '\'';
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Jane \t  DOE "), "Jane DOE");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("jean-PIERRE o'neil"), "Jean-Pierre O'Neil");
        assert_eq!(title_case("élodie MBAPPÉ"), "Élodie Mbappé");
    }
}
