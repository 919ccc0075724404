//! OS fingerprint extraction from native scanner output

use exposcan_core::results::OsFingerprint;

use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

fn guess_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"([^,(][^(]*?)\s*\((\d{1,3})%\)").ok())
        .as_ref()
}

/// Candidate OS names with their accuracy, in report order
pub fn parse_guesses(line: &str) -> Vec<(String, u8)> {
    let pattern = match guess_pattern() {
        Some(pattern) => pattern,
        None => return Vec::new(),
    };
    pattern
        .captures_iter(line)
        .filter_map(|caps| {
            let name = caps[1].trim().trim_start_matches(',').trim().to_string();
            let accuracy = caps[2].parse::<u8>().ok()?.min(100);
            (!name.is_empty()).then_some((name, accuracy))
        })
        .collect()
}

/// Pick the best OS guess from OS detection output.
///
/// `OS details:` is an exact match and counts as 100% accurate;
/// `Aggressive OS guesses:` contributes ranked candidates. The family comes
/// from the `Running:` line when present.
pub fn parse_os_output(output: &str) -> Option<OsFingerprint> {
    let mut candidates: Vec<(String, u8)> = Vec::new();
    let mut family: Option<String> = None;

    for line in output.lines().map(str::trim) {
        if let Some(details) = line.strip_prefix("OS details:") {
            let name = details.trim();
            if !name.is_empty() {
                candidates.push((name.to_string(), 100));
            }
        } else if let Some(guesses) = line.strip_prefix("Aggressive OS guesses:") {
            candidates.extend(parse_guesses(guesses));
        } else if line.starts_with("Running") {
            if let Some((_, running)) = line.split_once(':') {
                family = running
                    .split(|c: char| c.is_whitespace() || c == '|' || c == ',')
                    .find(|word| !word.is_empty())
                    .map(str::to_string);
            }
        }
    }

    // First of the highest accuracy wins
    let best = candidates
        .into_iter()
        .fold(None::<(String, u8)>, |best, candidate| match best {
            Some(current) if current.1 >= candidate.1 => Some(current),
            _ => Some(candidate),
        })?;

    trace!(os = %best.0, accuracy = best.1, "OS guess selected");

    Some(OsFingerprint {
        name: best.0,
        accuracy: best.1,
        family,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggressive_guesses() {
        let output = "\
Running (JUST GUESSING): Linux 4.X|5.X (93%)
Aggressive OS guesses: Linux 4.15 - 5.8 (93%), Linux 5.0 - 5.5 (95%), Linux 2.6.32 (88%)
No exact OS matches for host (test conditions non-ideal).";
        let os = parse_os_output(output).unwrap();
        assert_eq!(os.name, "Linux 5.0 - 5.5");
        assert_eq!(os.accuracy, 95);
        assert_eq!(os.family.as_deref(), Some("Linux"));
    }

    #[test]
    fn test_exact_os_details() {
        let output = "\
Device type: general purpose
Running: Microsoft Windows 10
OS details: Microsoft Windows 10 1809 - 21H2";
        let os = parse_os_output(output).unwrap();
        assert_eq!(os.name, "Microsoft Windows 10 1809 - 21H2");
        assert_eq!(os.accuracy, 100);
        assert_eq!(os.family.as_deref(), Some("Microsoft"));
    }

    #[test]
    fn test_no_guess() {
        assert!(parse_os_output("Too many fingerprints match this host to give specific OS details").is_none());
        assert!(parse_guesses("").is_empty());
    }

    #[test]
    fn test_guess_list_order() {
        let guesses = parse_guesses(" FreeBSD 12.0 (91%), OpenBSD 6.4 (90%)");
        assert_eq!(
            guesses,
            vec![("FreeBSD 12.0".to_string(), 91), ("OpenBSD 6.4".to_string(), 90)]
        );
    }
}
