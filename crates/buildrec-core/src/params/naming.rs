//! Build names derived from git coordinates.

use sha2::{Digest, Sha256};

/// Labels and names are capped at this length by the cluster.
pub const LABEL_MAX_CHARS: usize = 64;

const NAME_MAX_CHARS: usize = 53;
const HASH_SIZE: usize = 5;
const SEPARATOR: char = '-';
const UNKNOWN_BRANCH: &str = "unknown";

fn is_name_char(c: char, label: bool) -> bool {
    matches!(c, '-' | 'a'..='z' | '0'..='9') || (label && c == '.')
}

/// Last path component of a git URI without the `.git` suffix.
pub fn git_repo_humanish_part(git_uri: &str) -> &str {
    let trimmed = git_uri.trim_end_matches('/');
    let trimmed = trimmed
        .strip_suffix("/.git")
        .or_else(|| trimmed.strip_suffix(".git"))
        .unwrap_or(trimmed);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Path component of a URI; strings without a scheme are all path.
fn uri_path(uri: &str) -> &str {
    let uri = uri.split(['?', '#']).next().unwrap_or(uri);
    match uri.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |at| &rest[at..]),
        None => uri,
    }
}

/// Merge two strings into one cluster-safe name of at most `limit` chars.
///
/// Disallowed characters are dropped, then both strings are consumed one
/// character at a time each, alternately, so both keep a share of the
/// budget. Each part is stripped of separators and the parts are joined
/// with `-`.
pub fn sanitize_for_openshift(first: &str, second: &str, limit: usize, label: bool) -> String {
    let first: Vec<char> = first.chars().filter(|c| is_name_char(*c, label)).collect();
    let second: Vec<char> = second.chars().filter(|c| is_name_char(*c, label)).collect();
    let limit = limit.min(LABEL_MAX_CHARS);

    let mut kept = (String::new(), String::new());
    let mut size = SEPARATOR.len_utf8();
    'outer: for i in 0..first.len().max(second.len()) {
        for (source, out) in [(&first, &mut kept.0), (&second, &mut kept.1)] {
            if let Some(c) = source.get(i) {
                out.push(*c);
                size += 1;
                if size >= limit {
                    break 'outer;
                }
            }
        }
    }

    [kept.0.trim_matches(SEPARATOR), kept.1.trim_matches(SEPARATOR)]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Build config name for a repository and branch.
///
/// `<repo>-<branch>-<hash>`, where the hash is the first five hex digits of
/// the sha256 of `path + branch` and the whole name fits in 53 characters.
pub fn make_name_from_git(repo: &str, branch: Option<&str>) -> String {
    let branch = branch.filter(|b| !b.is_empty()).unwrap_or(UNKNOWN_BRANCH);
    let mut hasher = Sha256::new();
    hasher.update(uri_path(repo).trim_start_matches('/').as_bytes());
    hasher.update(branch.as_bytes());
    let mut hash = format!("{:x}", hasher.finalize());
    hash.truncate(HASH_SIZE);

    let limit = NAME_MAX_CHARS - HASH_SIZE - 1;
    let sanitized = sanitize_for_openshift(git_repo_humanish_part(repo), branch, limit, false);
    if sanitized.is_empty() {
        hash
    } else {
        format!("{sanitized}-{hash}")
    }
}
