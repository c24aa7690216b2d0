//! Confirm implements the interactive confirmation prompt (§4.11, §6): `apply`/`delete`
//! without `--yes` ask before touching the cluster.

use std::io::{self, BufRead, Write};

/// Confirm prints `Do you want to <prompt>? [y/N]` to stdout and reads one line from stdin,
/// accepting `y`/`yes` case-insensitively as affirmative; anything else (including EOF) is a
/// decline.
pub fn confirm(prompt: &str) -> bool {
    print!("Do you want to {prompt}? [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).unwrap_or(0) == 0 {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_y_and_yes_case_insensitively() {
        for accepted in ["y", "Y", "yes", "YES", "Yes"] {
            assert!(
                matches!(accepted.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
                "{accepted} should be accepted"
            );
        }
    }

    #[test]
    fn rejects_anything_else() {
        for rejected in ["", "n", "no", "sure", "yep"] {
            assert!(!matches!(rejected.trim().to_ascii_lowercase().as_str(), "y" | "yes"));
        }
    }
}
