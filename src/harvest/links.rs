use crate::forge::RepoId;

/// Issue numbers referenced in a PR body as whitespace-delimited `#<digits>` tokens.
///
/// Tokens with anything besides digits after the `#` (`#50,`, `(#50)`) are
/// ignored. Repeats are dropped, first occurrence wins.
pub fn extract_issue_refs(body: &str) -> Vec<u64> {
    let mut numbers = Vec::new();
    for token in body.split_whitespace() {
        let Some(digits) = token.strip_prefix('#') else {
            continue;
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(number) = digits.parse::<u64>() {
            if !numbers.contains(&number) {
                numbers.push(number);
            }
        }
    }
    numbers
}

/// Whether a changed path is the tracked resource file.
pub fn matches_resource(path: &str, resource: &str) -> bool {
    path == resource || path.ends_with(&format!("/{resource}"))
}

/// URL of a file's raw content at a commit.
pub fn raw_file_url(raw_base: &str, repo: &RepoId, sha: &str, path: &str) -> String {
    format!(
        "{}/{}/{}/raw/{}/{}",
        raw_base.trim_end_matches('/'),
        repo.owner,
        repo.name,
        sha,
        path
    )
}
