//! Strip markdown fences the model sometimes wraps code in.

const FENCE: &str = "```";

/// Remove one optional fenced-code wrapper (with or without a language tag).
/// Text without an opening fence is only trimmed, so the function is idempotent.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with(FENCE) {
        return trimmed.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    // Opening fence line, including any language tag.
    lines.remove(0);
    if lines.last().map(|l| l.trim() == FENCE).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tagged_fence() {
        let raw = "```python\nx = 1\nx\n```";
        assert_eq!(strip_code_fences(raw), "x = 1\nx");
    }

    #[test]
    fn test_strips_bare_fence_with_surrounding_whitespace() {
        let raw = "\n  ```\ndf['Refund Amount'].sum()\n```  \n";
        assert_eq!(strip_code_fences(raw), "df['Refund Amount'].sum()");
    }

    #[test]
    fn test_unterminated_fence_keeps_body() {
        assert_eq!(strip_code_fences("```python\nlen(df)"), "len(df)");
    }

    #[test]
    fn test_clean_code_is_unchanged_and_idempotent() {
        let clean = "mask = df['Date'] >= '2025-05-01'\ndf[mask]['Refund Amount'].sum()";
        assert_eq!(strip_code_fences(clean), clean);

        let once = strip_code_fences("```py\nx = 2\nx * 3\n```");
        assert_eq!(strip_code_fences(&once), once);
    }
}
