use std::collections::BTreeMap;

use envloader::parse_str;

#[test]
fn parses_mixed_fixture() {
    let fixture = include_str!("fixtures/mixed.env");
    let map = to_map(parse_str(fixture));

    let expected: BTreeMap<String, String> = [
        ("KEY1", "value1"),
        ("KEY2", "value 2"),
        ("KEY3", ""),
        ("ABC", r#""42378462%&&3 178964@""#),
        ("mnoPQR", "42378462%&&3 ###"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_owned(), value.to_owned()))
    .collect();
    assert_eq!(map, expected);
}

#[test]
fn fixture_entries_keep_their_line_numbers() {
    let fixture = include_str!("fixtures/mixed.env");
    let lines: Vec<_> = parse_str(fixture)
        .into_iter()
        .map(|entry| (entry.key, entry.line))
        .collect();

    assert_eq!(
        lines,
        [
            ("KEY1".to_owned(), 3),
            ("KEY2".to_owned(), 4),
            ("KEY3".to_owned(), 5),
            ("ABC".to_owned(), 6),
            ("mnoPQR".to_owned(), 7),
        ]
    );
}

fn to_map(entries: Vec<envloader::Entry>) -> BTreeMap<String, String> {
    entries
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect()
}
