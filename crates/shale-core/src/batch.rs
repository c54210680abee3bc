//! Batch splitting on the `GO` separator
//!
//! A script is divided at every line whose trimmed content is exactly `GO`.
//! The match is case-sensitive and only applies to a line on its own, so
//! identifiers like `GOTO` or `CATEGORY` never split a statement.

/// The batch separator token
pub const BATCH_SEPARATOR: &str = "GO";

/// Split a script into trimmed, non-empty statement batches
pub fn split_batches(script: &str) -> Vec<&str> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in script.split_inclusive('\n') {
        if line.trim() == BATCH_SEPARATOR {
            push_batch(&mut batches, &script[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    push_batch(&mut batches, &script[start..]);

    batches
}

fn push_batch<'a>(batches: &mut Vec<&'a str>, chunk: &'a str) {
    let chunk = chunk.trim();
    if !chunk.is_empty() {
        batches.push(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_batch() {
        assert_eq!(split_batches("SELECT 1;"), vec!["SELECT 1;"]);
    }

    #[test]
    fn test_split_on_standalone_go() {
        let script = "CREATE TABLE a (id INT);\nGO\nCREATE TABLE b (id INT);\n  GO  \nINSERT INTO a VALUES (1);\n";
        assert_eq!(
            split_batches(script),
            vec![
                "CREATE TABLE a (id INT);",
                "CREATE TABLE b (id INT);",
                "INSERT INTO a VALUES (1);"
            ]
        );
    }

    #[test]
    fn test_empty_batches_dropped() {
        let script = "GO\n\nGO\nSELECT 1;\nGO\n   \nGO";
        assert_eq!(split_batches(script), vec!["SELECT 1;"]);
        assert!(split_batches("").is_empty());
        assert!(split_batches("  \n\t\n").is_empty());
        assert!(split_batches("GO").is_empty());
    }

    #[test]
    fn test_go_inside_text_does_not_split() {
        let script = "INSERT INTO t VALUES ('GO');\nSELECT category FROM GOTO_TABLE;\ngo\nSELECT 2;";
        assert_eq!(split_batches(script), vec![script]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let script = "SELECT 1;\r\nGO\r\nSELECT 2;\r\n";
        assert_eq!(split_batches(script), vec!["SELECT 1;", "SELECT 2;"]);
    }
}
