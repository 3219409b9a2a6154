//! Gitignore pattern matching for the staging and status walks.
//!
//! Semantics: blank and `#` lines are skipped, `!` negates, a trailing
//! `/` restricts the pattern to directories, a leading `/` (or any inner
//! `/`) anchors it to the repository root, `**` spans path segments, `*`
//! matches within a segment, `?` matches one character, and the last
//! matching pattern wins. The `.git` directory name is always excluded.

#[derive(Debug, Clone)]
struct IgnorePattern {
    negated: bool,
    dir_only: bool,
    /// Anchored patterns match from the repository root; unanchored ones
    /// match against any path suffix boundary.
    anchored: bool,
    segments: Vec<String>,
}

/// Compiled ignore rules for one repository.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<IgnorePattern>,
}

/// Match one glob segment (`*`, `?`, literals) against one path segment.
fn segment_match(pattern: &str, name: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = name.chars().collect();

    // Iterative star-backtracking glob match.
    let (mut p, mut t) = (0usize, 0usize);
    let (mut star_p, mut star_t) = (usize::MAX, 0usize);
    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star_p = p;
            star_t = t;
            p += 1;
        } else if star_p != usize::MAX {
            p = star_p + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

/// Match pattern segments against path segments with `**` spanning any
/// number of segments.
fn segments_match(pattern: &[String], path: &[&str]) -> bool {
    if pattern.is_empty() {
        return path.is_empty();
    }
    if pattern[0] == "**" {
        // `**` absorbs zero or more leading path segments.
        (0..=path.len()).any(|skip| segments_match(&pattern[1..], &path[skip..]))
    } else if path.is_empty() {
        false
    } else if segment_match(&pattern[0], path[0]) {
        segments_match(&pattern[1..], &path[1..])
    } else {
        false
    }
}

impl IgnoreMatcher {
    /// Compile the contents of an ignore file.
    pub fn from_content(content: &str) -> IgnoreMatcher {
        let mut patterns = Vec::new();
        for raw in content.lines() {
            let line = raw.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (negated, line) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let (dir_only, line) = match line.strip_suffix('/') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let (anchored, line) = match line.strip_prefix('/') {
                Some(rest) => (true, rest),
                // An inner slash also anchors the pattern to the root.
                None => (line.contains('/'), line),
            };
            if line.is_empty() {
                continue;
            }
            patterns.push(IgnorePattern {
                negated,
                dir_only,
                anchored,
                segments: line.split('/').map(|s| s.to_string()).collect(),
            });
        }
        IgnoreMatcher { patterns }
    }

    /// Decide whether `path` (forward-slash, repository-relative) is
    /// ignored. Walkers call this on directories too, both to prune and
    /// because a file under an ignored directory is itself ignored.
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        // The repository's own metadata directory never enters the
        // working tree model.
        if path == ".git" || path.starts_with(".git/") || path.ends_with("/.git") {
            return true;
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        // An ignored ancestor directory swallows everything below it; a
        // negation cannot re-include a file whose parent is excluded.
        for depth in 1..segments.len() {
            if self.matches(&segments[..depth], true) {
                return true;
            }
        }
        self.matches(&segments, is_dir)
    }

    /// Evaluate all patterns against one path; last match wins.
    fn matches(&self, segments: &[&str], is_dir: bool) -> bool {
        let mut verdict = false;
        for pattern in &self.patterns {
            if pattern.dir_only && !is_dir {
                continue;
            }
            let hit = if pattern.anchored {
                segments_match(&pattern.segments, segments)
            } else {
                // Unanchored: the pattern may start at any segment
                // boundary along the path.
                (0..segments.len())
                    .any(|start| segments_match(&pattern.segments, &segments[start..]))
            };
            if hit {
                verdict = !pattern.negated;
            }
        }
        verdict
    }
}
