//! Terminal-failure classifier — diagnostic text → should we retry under a PTY?

/// Returns true when a failure diagnostic suggests the child refused to run
/// because no real terminal is attached.
///
/// This is a pure, case-insensitive substring check. A false negative just
/// skips the PTY fallback and keeps the original failure; a false positive
/// triggers a harmless extra PTY attempt.
pub fn is_tty_failure(diagnostic: &str) -> bool {
    let msg = diagnostic.to_ascii_lowercase();
    msg.contains("not a terminal") || msg.contains("not a tty") || msg.contains("isatty")
}

#[cfg(test)]
mod tests {
    use super::is_tty_failure;

    #[test]
    fn recognizes_stdout_not_a_terminal() {
        assert!(is_tty_failure("nonzero exit 1: codex\nstdout is not a terminal"));
    }

    #[test]
    fn recognizes_not_a_tty() {
        assert!(is_tty_failure("error: stdin is Not A TTY"));
    }

    #[test]
    fn recognizes_isatty_probe() {
        assert!(is_tty_failure("isatty() check failed"));
    }

    #[test]
    fn is_case_insensitive() {
        assert!(is_tty_failure("STDOUT IS NOT A TERMINAL"));
    }

    #[test]
    fn rejects_unrelated_failures() {
        assert!(!is_tty_failure("nonzero exit 2: codex\ninvalid flag --frobnicate"));
        assert!(!is_tty_failure("timeout after 5s running: codex"));
        assert!(!is_tty_failure(""));
    }
}
