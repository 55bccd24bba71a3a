//! Splitting compound tasks into subtasks
//!
//! Deliberately simple: conjunctions first, then numbered lines, otherwise
//! the task stays whole. Nested conjunctions are not understood.

const CONJUNCTION: &str = " and ";

/// Break `task` into ordered subtasks
pub fn decompose(task: &str) -> Vec<String> {
    if task.contains(CONJUNCTION) {
        let parts: Vec<String> = task
            .split(CONJUNCTION)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect();
        if !parts.is_empty() {
            return parts;
        }
    }

    let numbered: Vec<String> = task.lines().filter_map(numbered_item).collect();
    if !numbered.is_empty() {
        return numbered;
    }

    vec![task.trim().to_string()]
}

/// Text of a line like `2. mix the drums` or `3) export`
fn numbered_item(line: &str) -> Option<String> {
    let line = line.trim_start();
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == line.len() {
        return None;
    }
    let item = rest
        .strip_prefix('.')
        .or_else(|| rest.strip_prefix(')'))?
        .trim();
    (!item.is_empty()).then(|| item.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_conjunction() {
        assert_eq!(
            decompose("refactor module A and analyze audio output"),
            ["refactor module A", "analyze audio output"]
        );
    }

    #[test]
    fn splits_numbered_lines() {
        let task = "Release prep:\n1. bump the version\n2) write the changelog\n  10. tag it\nthanks";
        assert_eq!(
            decompose(task),
            ["bump the version", "write the changelog", "tag it"]
        );
    }

    #[test]
    fn conjunction_wins_over_numbering() {
        let task = "1. build and test\n2. ship";
        assert_eq!(decompose(task), ["1. build", "test\n2. ship"]);
    }

    #[test]
    fn plain_task_stays_whole() {
        assert_eq!(decompose("  write a parser "), ["write a parser"]);
        // "and" inside a word is not a conjunction
        assert_eq!(decompose("build an Android app"), ["build an Android app"]);
    }

    #[test]
    fn numbers_need_a_delimiter() {
        assert_eq!(decompose("2024 roadmap"), ["2024 roadmap"]);
        assert_eq!(decompose("1."), ["1."]);
    }
}
