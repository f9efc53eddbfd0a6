//! Lenient delimited-text parsing into rectangular-ish string cells.
//!
//! A single left-to-right scan with two states. Outside quotes a `"` opens
//! quoted mode wherever it appears in a field; inside quotes `""` is a
//! literal quote and a lone `"` closes the quoted run. `\n`, `\r\n` and bare
//! `\r` end a row. Parsing never fails: an unterminated quote swallows the
//! rest of the input into its field, rows keep whatever width they have, and
//! rows whose cells are all blank are dropped.

use log::debug;

pub const DEFAULT_DELIMITER: u8 = b',';

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    InQuotes,
}

pub fn parse(text: &str) -> Vec<Vec<String>> {
    parse_with_delimiter(text, DEFAULT_DELIMITER)
}

pub fn parse_with_delimiter(text: &str, delimiter: u8) -> Vec<Vec<String>> {
    let delimiter = char::from(delimiter);
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut state = State::Normal;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            State::InQuotes => {
                if ch == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        state = State::Normal;
                    }
                } else {
                    field.push(ch);
                }
            }
            State::Normal => match ch {
                '"' => state = State::InQuotes,
                c if c == delimiter => row.push(std::mem::take(&mut field)),
                '\r' | '\n' => {
                    if ch == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    row.push(std::mem::take(&mut field));
                    push_row(&mut rows, std::mem::take(&mut row));
                }
                other => field.push(other),
            },
        }
    }

    if state == State::InQuotes {
        debug!("Input ends inside a quoted field; trailing text is read as field content");
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        push_row(&mut rows, row);
    }
    rows
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if row_has_content(&row) {
        rows.push(row);
    }
}

pub(crate) fn row_has_content(row: &[String]) -> bool {
    row.iter().any(|cell| !cell.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn owned(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn quoted_delimiter_stays_inside_field() {
        assert_eq!(parse("a,\"b,c\",d"), owned(&[&["a", "b,c", "d"]]));
    }

    #[test]
    fn doubled_quotes_unescape() {
        assert_eq!(
            parse("\"He said \"\"hi\"\"\""),
            owned(&[&["He said \"hi\""]])
        );
    }

    #[test]
    fn line_endings_are_equivalent() {
        let lf = parse("a,b\n1,2\n3,4");
        let crlf = parse("a,b\r\n1,2\r\n3,4");
        let cr = parse("a,b\r1,2\r3,4");
        assert_eq!(lf, owned(&[&["a", "b"], &["1", "2"], &["3", "4"]]));
        assert_eq!(lf, crlf);
        assert_eq!(lf, cr);
    }

    #[test]
    fn quoted_newlines_are_field_content() {
        assert_eq!(
            parse("note,id\n\"line one\nline two\",1\n"),
            owned(&[&["note", "id"], &["line one\nline two", "1"]])
        );
    }

    #[test]
    fn blank_rows_are_dropped() {
        assert_eq!(
            parse("a,b\n\n1,2\n,\n  ,  \n3,4\n\n"),
            owned(&[&["a", "b"], &["1", "2"], &["3", "4"]])
        );
    }

    #[test]
    fn final_row_without_terminator_is_flushed() {
        assert_eq!(parse("a\nlast"), owned(&[&["a"], &["last"]]));
    }

    #[test]
    fn ragged_rows_pass_through() {
        assert_eq!(
            parse("a,b,c\n1\n1,2,3,4"),
            owned(&[&["a", "b", "c"], &["1"], &["1", "2", "3", "4"]])
        );
    }

    #[test]
    fn unterminated_quote_degrades_to_field_content() {
        let rows = parse("a,b\n1,\"open\n2,3");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "1");
        assert!(rows[1][1].starts_with("open"));
        assert!(rows[1][1].contains("2,3"));
    }

    #[test]
    fn quote_inside_unquoted_field_opens_quoted_mode() {
        assert_eq!(parse("ab\"c,d\""), owned(&[&["abc,d"]]));
        assert_eq!(parse("x,ab\"c\"d,y"), owned(&[&["x", "abcd", "y"]]));
    }

    #[test]
    fn closed_quote_resumes_plain_field() {
        assert_eq!(parse("\"a,b\"c,d"), owned(&[&["a,bc", "d"]]));
    }

    #[test]
    fn unterminated_quote_keeps_the_remaining_text() {
        assert_eq!(parse("a,\"b\nc,d"), owned(&[&["a", "b\nc,d"]]));
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert!(parse("").is_empty());
        assert!(parse("\n\r\n").is_empty());
    }

    #[test]
    fn custom_delimiter_is_respected() {
        assert_eq!(
            parse_with_delimiter("a\tb\n1\t2", b'\t'),
            owned(&[&["a", "b"], &["1", "2"]])
        );
    }

    fn cell_strategy() -> impl Strategy<Value = String> {
        "[a-z0-9 ,\"]{1,8}".prop_filter("non-blank", |s| !s.trim().is_empty())
    }

    fn quote(cell: &str) -> String {
        format!("\"{}\"", cell.replace('"', "\"\""))
    }

    proptest! {
        #[test]
        fn quoted_cells_survive_any_terminator(
            rows in proptest::collection::vec(proptest::collection::vec(cell_strategy(), 1..4), 1..5),
            terminator in prop_oneof![Just("\n"), Just("\r\n"), Just("\r")],
        ) {
            let text = rows
                .iter()
                .map(|row| row.iter().map(|c| quote(c)).collect::<Vec<_>>().join(","))
                .collect::<Vec<_>>()
                .join(terminator);
            prop_assert_eq!(parse(&text), rows);
        }
    }
}
