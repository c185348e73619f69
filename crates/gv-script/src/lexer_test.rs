use super::*;

fn texts(source: &str) -> Vec<&str> {
    tokenize(source)
        .unwrap()
        .iter()
        .map(|t| t.text(source))
        .collect()
}

#[test]
fn test_tokenize_basic_statement() {
    assert_eq!(
        texts("const x = a?.b ?? 1.5e-3;"),
        vec!["const", "x", "=", "a", "?.", "b", "??", "1.5e-3", ";"]
    );
}

#[test]
fn test_comments_are_skipped() {
    let src = "a // comment with 'quote\n/* block\n */ b";
    let tokens = tokenize(src).unwrap();
    assert_eq!(tokens.len(), 2);
    assert!(tokens[1].newline_before);
}

#[test]
fn test_template_with_nested_substitution_is_one_token() {
    let src = "sql`SELECT ${ {a: `x${1}`}.a } FROM t`;";
    let tokens = tokenize(src).unwrap();
    assert_eq!(tokens[0].text(src), "sql");
    assert_eq!(tokens[1].kind, TokenKind::Template);
    assert_eq!(tokens[2].text(src), ";");
}

#[test]
fn test_regex_versus_division() {
    let src = "x = a / b; y = /ab+c/gi.test(s)";
    let tokens = tokenize(src).unwrap();
    assert_eq!(tokens[3].kind, TokenKind::Punct);
    let regex = tokens.iter().find(|t| t.kind == TokenKind::Regex).unwrap();
    assert_eq!(regex.text(src), "/ab+c/gi");
}

#[test]
fn test_unterminated_string_reports_offset() {
    let err = tokenize("let s = 'oops\n").unwrap_err();
    assert_eq!(err.offset, 8);
    assert!(err.message.contains("string"));
}

#[test]
fn test_line_col() {
    let src = "ab\ncde\nf";
    assert_eq!(line_col(src, 0), (1, 1));
    assert_eq!(line_col(src, 4), (2, 2));
    assert_eq!(line_col(src, 7), (3, 1));
}

#[test]
fn test_matching_close() {
    let src = "f(a, (b), c) + 1";
    let tokens = tokenize(src).unwrap();
    let close = matching_close(src, &tokens, 1, "(", ")").unwrap();
    assert_eq!(tokens[close].span.start, 11);
}

#[test]
fn test_blank_range_keeps_newlines() {
    let mut bytes = b"ab\ncd".to_vec();
    blank_range(&mut bytes, 0..5);
    assert_eq!(bytes, b"  \n  ");
}
