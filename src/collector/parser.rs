//! Parser for the inventory command's comma-separated output.
//!
//! Pure function over bytes, so it is testable without spawning anything.
//! Rules: `,` separates fields, leading whitespace of a field is dropped,
//! a field opening with `"` is quoted and may hold `,`, newlines and `""` escapes.
//! Blank lines are skipped and `\r\n` endings are accepted.

use crate::error::ExporterError;
use crate::exposition::DeviceRecord;

/// Parses raw inventory output into one record per row.
///
/// Empty output yields no records. Unterminated or stray quotes fail the whole parse.
pub fn parse_records(raw: &[u8]) -> Result<Vec<DeviceRecord>, ExporterError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ExporterError::malformed(line_of(raw, e.valid_up_to()), e.to_string()))?;

    let mut records = Vec::new();
    let mut line = 1;
    let mut rest = text;

    while !rest.is_empty() {
        let start_line = line;
        let (fields, consumed, newlines) = parse_row(rest, start_line)?;
        rest = &rest[consumed..];
        line += newlines;

        // A row holding a single empty field is a blank line.
        if fields.len() == 1 && fields[0].is_empty() {
            continue;
        }
        records.push(DeviceRecord::new(start_line, fields));
    }

    Ok(records)
}

/// Parses one row starting at the beginning of `input`.
///
/// Returns the fields, the number of bytes consumed (including the row terminator)
/// and the number of newlines consumed.
fn parse_row(input: &str, line: usize) -> Result<(Vec<String>, usize, usize), ExporterError> {
    let bytes = input.as_bytes();
    let mut fields = Vec::new();
    let mut pos = 0;
    let mut newlines = 0;

    loop {
        // Leading whitespace (but never the row terminator).
        while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t') {
            pos += 1;
        }

        let mut field = String::new();

        if pos < bytes.len() && bytes[pos] == b'"' {
            pos += 1;
            loop {
                let Some(offset) = input[pos..].find('"') else {
                    return Err(ExporterError::malformed(line, "unterminated quoted field"));
                };
                let chunk = &input[pos..pos + offset];
                newlines += chunk.matches('\n').count();
                field.push_str(chunk);
                pos += offset + 1;

                if pos < bytes.len() && bytes[pos] == b'"' {
                    field.push('"');
                    pos += 1;
                    continue;
                }
                break;
            }

            match bytes.get(pos) {
                None | Some(b',') | Some(b'\n') => {}
                Some(b'\r') if bytes.get(pos + 1).is_none_or(|b| *b == b'\n') => {}
                Some(_) => {
                    return Err(ExporterError::malformed(
                        line,
                        format!("unexpected character after quoted field {:?}", field),
                    ));
                }
            }
        } else {
            let end = input[pos..]
                .find([',', '\n'])
                .map_or(bytes.len(), |offset| pos + offset);
            let raw = input[pos..end].strip_suffix('\r').unwrap_or(&input[pos..end]);
            if raw.contains('"') {
                return Err(ExporterError::malformed(
                    line,
                    format!("bare quote in unquoted field {:?}", raw),
                ));
            }
            field.push_str(raw);
            pos = end;
        }

        fields.push(field);

        match bytes.get(pos) {
            Some(b',') => pos += 1,
            Some(b'\r') => {
                pos += 1;
                if bytes.get(pos) == Some(&b'\n') {
                    pos += 1;
                    newlines += 1;
                }
                return Ok((fields, pos, newlines));
            }
            Some(b'\n') => {
                return Ok((fields, pos + 1, newlines + 1));
            }
            _ => return Ok((fields, pos, newlines)),
        }
    }
}

/// 1-based line number of a byte offset.
fn line_of(raw: &[u8], offset: usize) -> usize {
    raw[..offset].iter().filter(|b| **b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(records: &[DeviceRecord]) -> Vec<Vec<&str>> {
        records
            .iter()
            .map(|r| r.fields.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_parse_typical_output() {
        let content = "\
GeForce RTX 3090, 0, 65, 10, 5, 24576, 20000, 4576
GeForce RTX 3090, 1, 58, 97, 41, 24576, 1024, 23552
";
        let records = parse_records(content.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            fields(&records)[0],
            vec!["GeForce RTX 3090", "0", "65", "10", "5", "24576", "20000", "4576"]
        );
        assert_eq!(records[1].fields[1], "1");
        assert_eq!(records[1].line, 2);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_records(b"").unwrap().is_empty());
        assert!(parse_records(b"\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_skips_blank_lines_and_keeps_line_numbers() {
        let records = parse_records(b"a, 0, 1\n\nb, 1, 2\n").unwrap();
        assert_eq!(fields(&records), vec![vec!["a", "0", "1"], vec!["b", "1", "2"]]);
        assert_eq!(records[1].line, 3);
    }

    #[test]
    fn test_parse_crlf() {
        let records = parse_records(b"a, 0, 1\r\nb, 1, 2\r\n").unwrap();
        assert_eq!(fields(&records), vec![vec!["a", "0", "1"], vec!["b", "1", "2"]]);
    }

    #[test]
    fn test_parse_no_trailing_newline() {
        let records = parse_records(b"a, 0, 1").unwrap();
        assert_eq!(fields(&records), vec![vec!["a", "0", "1"]]);
    }

    #[test]
    fn test_parse_keeps_trailing_whitespace() {
        let records = parse_records(b"  a  ,\t0 ").unwrap();
        assert_eq!(fields(&records), vec![vec!["a  ", "0 "]]);
    }

    #[test]
    fn test_parse_quoted_fields() {
        let content = "\"Tesla, V100\", 0, \"say \"\"hi\"\"\"\n\"multi\nline\", 1, 2\nnext, 2, 3\n";
        let records = parse_records(content.as_bytes()).unwrap();
        assert_eq!(
            fields(&records),
            vec![
                vec!["Tesla, V100", "0", "say \"hi\""],
                vec!["multi\nline", "1", "2"],
                vec!["next", "2", "3"],
            ]
        );
        assert_eq!(records[2].line, 4);
    }

    #[test]
    fn test_parse_empty_fields() {
        let records = parse_records(b"a,,c\n").unwrap();
        assert_eq!(fields(&records), vec![vec!["a", "", "c"]]);
    }

    #[test]
    fn test_parse_unterminated_quote() {
        let err = parse_records(b"ok, 0\n\"broken, 1, 2\n").unwrap_err();
        match err {
            ExporterError::MalformedRow { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("unterminated"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_bare_quote() {
        let err = parse_records(b"GeForce \"RTX\", 0\n").unwrap_err();
        assert!(matches!(err, ExporterError::MalformedRow { line: 1, .. }));
    }

    #[test]
    fn test_parse_garbage_after_quote() {
        let err = parse_records(b"\"a\"b, 0\n").unwrap_err();
        assert!(matches!(err, ExporterError::MalformedRow { line: 1, .. }));
    }

    #[test]
    fn test_parse_invalid_utf8() {
        let err = parse_records(b"ok, 0\n\xff\xfe, 1\n").unwrap_err();
        assert!(matches!(err, ExporterError::MalformedRow { line: 2, .. }));
    }
}
