use super::*;

// =============================================================
// Location parsing
// =============================================================

#[test]
fn parse_splits_path_and_query() {
    let location = Location::parse("/dashboard/clients?page=3&active_only=true");
    assert_eq!(location.path, "/dashboard/clients");
    assert_eq!(location.query_value("page"), Some("3"));
    assert_eq!(location.query_value("active_only"), Some("true"));
}

#[test]
fn parse_without_query_has_empty_map() {
    let location = Location::parse("/dashboard/plans");
    assert_eq!(location.path, "/dashboard/plans");
    assert!(location.query.is_empty());
}

#[test]
fn parse_decodes_percent_encoding_and_drops_fragment() {
    let location = Location::parse("/clients?search=ana%20maria#top");
    assert_eq!(location.query_value("search"), Some("ana maria"));
}

#[test]
fn parse_empty_path_is_root() {
    assert_eq!(Location::parse("?page=2").path, "/");
}

#[test]
fn href_sorts_keys_and_encodes_values() {
    let location = Location::new("/clients").with_query("search", "a&b").with_query("page", "2");
    assert_eq!(location.href(), "/clients?page=2&search=a%26b");
}

#[test]
fn href_without_query_is_path() {
    assert_eq!(Location::new("/client/plans").href(), "/client/plans");
}

// =============================================================
// MemoryLocation
// =============================================================

#[test]
fn replace_query_rewrites_and_records_history() {
    let store = MemoryLocation::at("/dashboard/clients?page=1");
    store.replace_query("page", "4");
    assert_eq!(store.current().query_value("page"), Some("4"));
    assert_eq!(store.history(), vec![NavigationTarget::internal("/dashboard/clients?page=4")]);
}

#[test]
fn replace_query_with_same_value_is_noop() {
    let store = MemoryLocation::at("/dashboard/clients?page=2");
    store.replace_query("page", "2");
    assert!(store.history().is_empty());
}

#[test]
fn remove_query_only_records_when_present() {
    let store = MemoryLocation::at("/dashboard/clients?page=2");
    store.remove_query("search");
    assert!(store.history().is_empty());
    store.remove_query("page");
    assert_eq!(store.current().href(), "/dashboard/clients");
    assert_eq!(store.history().len(), 1);
}

#[test]
fn navigate_internal_moves_current() {
    let store = MemoryLocation::at("/dashboard/plans/create");
    store.navigate(NavigationTarget::internal("/dashboard/plans"));
    assert_eq!(store.current().path, "/dashboard/plans");
}

#[test]
fn navigate_external_keeps_current_location() {
    let store = MemoryLocation::at("/client/plans/p1/purchase");
    store.navigate(NavigationTarget::External("https://checkout.example/pay/1".to_owned()));
    assert_eq!(store.current().path, "/client/plans/p1/purchase");
    assert_eq!(
        store.last_target(),
        Some(NavigationTarget::External("https://checkout.example/pay/1".to_owned()))
    );
}

#[test]
fn clones_share_state() {
    let store = MemoryLocation::at("/dashboard/payments");
    let other = store.clone();
    other.replace_query("page", "2");
    assert_eq!(store.current().query_value("page"), Some("2"));
}
