use super::*;

// =============================================================
// PageWindow
// =============================================================

#[test]
fn window_offset_for_third_page_of_ten() {
    let window = PageWindow::new(3, 10).unwrap();
    assert_eq!(window.offset(), 20);
    assert_eq!(window.limit(), 10);
}

#[test]
fn window_first_page_has_zero_offset() {
    let window = PageWindow::new(1, 25).unwrap();
    assert_eq!(window.offset(), 0);
}

#[test]
fn window_clamps_zero_page_to_one() {
    let window = PageWindow::new(0, 10).unwrap();
    assert_eq!(window.page(), 1);
    assert_eq!(window.offset(), 0);
}

#[test]
fn with_page_keeps_size_and_clamps() {
    let window = PageWindow::new(1, 10).unwrap().with_page(4);
    assert_eq!(window.offset(), 30);
    assert_eq!(window.with_page(0).page(), 1);
}

#[test]
fn window_rejects_zero_page_size() {
    assert_eq!(PageWindow::new(1, 0), Err(PageError::ZeroPageSize));
}

#[test]
fn window_offset_does_not_overflow_u32() {
    let window = PageWindow::new(u32::MAX, u32::MAX).unwrap();
    assert_eq!(window.offset(), u64::from(u32::MAX - 1) * u64::from(u32::MAX));
}

#[test]
fn span_covers_returned_items() {
    let window = PageWindow::new(3, 10).unwrap();
    assert_eq!(window.span(7), Some(PageSpan { first: 21, last: 27 }));
}

#[test]
fn span_is_none_for_empty_page() {
    let window = PageWindow::new(2, 10).unwrap();
    assert_eq!(window.span(0), None);
}

// =============================================================
// parse_page_param
// =============================================================

#[test]
fn parse_page_accepts_positive_integer() {
    assert_eq!(parse_page_param(Some("4")), 4);
    assert_eq!(parse_page_param(Some(" 12 ")), 12);
}

#[test]
fn parse_page_defaults_missing_and_invalid_to_one() {
    assert_eq!(parse_page_param(None), 1);
    assert_eq!(parse_page_param(Some("")), 1);
    assert_eq!(parse_page_param(Some("abc")), 1);
    assert_eq!(parse_page_param(Some("0")), 1);
    assert_eq!(parse_page_param(Some("-3")), 1);
    assert_eq!(parse_page_param(Some("2.5")), 1);
}

// =============================================================
// Next / previous heuristics
// =============================================================

#[test]
fn full_page_has_next() {
    assert!(has_next_page(10, 10));
}

#[test]
fn short_page_has_no_next() {
    assert!(!has_next_page(7, 10));
    assert!(!has_next_page(0, 10));
}

#[test]
fn previous_only_after_first_page() {
    assert!(!has_previous_page(1));
    assert!(has_previous_page(2));
}
